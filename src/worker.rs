//! Broker listeners.
//!
//! The delivery worker drives the main queue through the delivery engine; the
//! dead-letter worker drains the dead-letter queue into the overflow buffer.
//! Both acknowledge a delivery only once its outcome is durable.

use std::sync::Arc;

use anyhow::{Error, Result};
use futures_util::StreamExt;
use lapin::message::Delivery;
use tracing::{debug, error, info, warn};

use crate::{
    clients::rbmq::{RabbitMqClient, header_str, header_u32},
    models::{
        routing::{HEADER_DLQ_ORIGIN, HEADER_DLQ_REASON, HEADER_RETRY_COUNT},
        status::DlqOrigin,
    },
    services::{consumer::DeliveryEngine, dead_letter::DeadLetterCapture},
};

const DELIVERY_CONSUMER_TAG: &str = "notification-delivery";
const DEAD_LETTER_CONSUMER_TAG: &str = "notification-dead-letter";

/// Set by the broker when it dead-letters a message on its own.
const HEADER_FIRST_DEATH_REASON: &str = "x-first-death-reason";
const UNKNOWN_REASON: &str = "unknown";

pub async fn run_delivery_worker(
    rabbitmq: Arc<RabbitMqClient>,
    engine: Arc<DeliveryEngine>,
    concurrency: usize,
) -> Result<(), Error> {
    let queue = rabbitmq.topology().main.queue.clone();
    let consumer = rabbitmq
        .create_consumer(&queue, DELIVERY_CONSUMER_TAG)
        .await?;

    info!(queue = %queue, concurrency, "Delivery worker started");

    consumer
        .for_each_concurrent(concurrency, |delivery| {
            let rabbitmq = Arc::clone(&rabbitmq);
            let engine = Arc::clone(&engine);

            async move {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        error!(error = %e, "Failed to receive delivery");
                        return;
                    }
                };

                handle_delivery(&rabbitmq, &engine, delivery).await;
            }
        })
        .await;

    warn!("Delivery consumer stream ended");

    Ok(())
}

async fn handle_delivery(rabbitmq: &RabbitMqClient, engine: &DeliveryEngine, delivery: Delivery) {
    let delivery_tag = delivery.delivery_tag;

    let settled = match engine.process_raw(&delivery.data).await {
        Ok(result) => {
            debug!(delivery_tag, result = %result, "Delivery processed");
            rabbitmq.acknowledge(delivery_tag).await
        }
        Err(e) => {
            // The main queue dead-letters rejects into the retry queue.
            warn!(delivery_tag, error = %e, "Handing delivery back to broker");
            rabbitmq.reject(delivery_tag, false).await
        }
    };

    if let Err(e) = settled {
        error!(delivery_tag, error = %e, "Failed to settle delivery");
    }
}

pub async fn run_dead_letter_worker(
    rabbitmq: Arc<RabbitMqClient>,
    capture: Arc<DeadLetterCapture>,
) -> Result<(), Error> {
    let queue = rabbitmq.topology().dlq.queue.clone();
    let mut consumer = rabbitmq
        .create_consumer(&queue, DEAD_LETTER_CONSUMER_TAG)
        .await?;

    info!(queue = %queue, "Dead-letter worker started");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, "Failed to receive dead-letter delivery");
                continue;
            }
        };

        let delivery_tag = delivery.delivery_tag;
        let properties = &delivery.properties;

        let origin = DlqOrigin::from_header(header_str(properties, HEADER_DLQ_ORIGIN).as_deref());
        let reason = header_str(properties, HEADER_DLQ_REASON)
            .or_else(|| header_str(properties, HEADER_FIRST_DEATH_REASON))
            .unwrap_or_else(|| UNKNOWN_REASON.to_string());
        let retry_count = header_u32(properties, HEADER_RETRY_COUNT);

        let settled = match capture
            .capture(&delivery.data, origin, &reason, retry_count)
            .await
        {
            Ok(_) => rabbitmq.acknowledge(delivery_tag).await,
            Err(e) => {
                error!(delivery_tag, error = %e, "Failed to stage dead letter, requeueing");
                rabbitmq.nack(delivery_tag, true).await
            }
        };

        if let Err(e) = settled {
            error!(delivery_tag, error = %e, "Failed to settle dead-letter delivery");
        }
    }

    warn!("Dead-letter consumer stream ended");

    Ok(())
}
