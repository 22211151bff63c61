use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, BasicRejectOptions, ConfirmSelectOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, LongString},
};
use tracing::{debug, info};

use crate::{
    clients::MessagePublisher,
    config::Config,
    models::{
        message::NotificationMessage,
        routing::{Destination, HeaderValue, MessageHeaders},
    },
};

/// Exchange, queue and routing key for one leg of the topology.
#[derive(Debug, Clone)]
pub struct Route {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

#[derive(Debug, Clone)]
pub struct Topology {
    pub main: Route,
    pub retry: Route,
    pub dlq: Route,
    pub retry_delay_ms: u32,
}

impl Topology {
    pub fn from_config(config: &Config) -> Self {
        Self {
            main: Route {
                exchange: config.main_exchange.clone(),
                queue: config.main_queue.clone(),
                routing_key: config.main_routing_key.clone(),
            },
            retry: Route {
                exchange: config.retry_exchange.clone(),
                queue: config.retry_queue.clone(),
                routing_key: config.retry_routing_key.clone(),
            },
            dlq: Route {
                exchange: config.dlq_exchange.clone(),
                queue: config.dlq_queue.clone(),
                routing_key: config.dlq_routing_key.clone(),
            },
            retry_delay_ms: config.retry_delay_ms,
        }
    }

    pub fn route(&self, destination: Destination) -> &Route {
        match destination {
            Destination::Main => &self.main,
            Destination::Retry => &self.retry,
            Destination::DeadLetter => &self.dlq,
        }
    }
}

pub struct RabbitMqClient {
    channel: Channel,
    topology: Topology,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|_| anyhow!("Failed to connect to RabbitMQ"))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|_| anyhow!("RabbitMQ channel creation failed"))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to set up QoS"))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to enable publisher confirms"))?;

        let client = Self {
            channel,
            topology: Topology::from_config(config),
        };
        client.declare_topology().await?;

        info!("RabbitMQ connection established");

        Ok(client)
    }

    async fn declare_topology(&self) -> Result<(), Error> {
        let topology = &self.topology;

        for route in [&topology.main, &topology.retry, &topology.dlq] {
            self.channel
                .exchange_declare(
                    &route.exchange,
                    ExchangeKind::Direct,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare exchange {}: {}", route.exchange, e))?;
        }

        // Rejected main deliveries take the retry leg.
        let mut main_args = FieldTable::default();
        main_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(topology.retry.exchange.as_str().into()),
        );
        main_args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(topology.retry.routing_key.as_str().into()),
        );

        // Expired retry messages flow back into main.
        let mut retry_args = FieldTable::default();
        retry_args.insert(
            "x-message-ttl".into(),
            AMQPValue::LongUInt(topology.retry_delay_ms),
        );
        retry_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(topology.main.exchange.as_str().into()),
        );
        retry_args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(topology.main.routing_key.as_str().into()),
        );

        for (route, args) in [
            (&topology.main, main_args),
            (&topology.retry, retry_args),
            (&topology.dlq, FieldTable::default()),
        ] {
            self.channel
                .queue_declare(
                    &route.queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    args,
                )
                .await
                .map_err(|e| anyhow!("Failed to declare queue {}: {}", route.queue, e))?;

            self.channel
                .queue_bind(
                    &route.queue,
                    &route.exchange,
                    &route.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to bind queue {}: {}", route.queue, e))?;

            debug!(queue = %route.queue, exchange = %route.exchange, "Queue declared");
        }

        info!(
            retry_delay_ms = topology.retry_delay_ms,
            "Broker topology declared"
        );

        Ok(())
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn is_connected(&self) -> bool {
        self.channel.status().connected()
    }

    pub async fn create_consumer(&self, queue: &str, consumer_tag: &str) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to create consumer for {}", queue))?;

        info!(queue, consumer_tag, "Consumer created");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to acknowledge message"))?;

        Ok(())
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|_| anyhow!("Failed to reject message"))?;

        Ok(())
    }

    pub async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|_| anyhow!("Failed to nack message"))?;

        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for RabbitMqClient {
    async fn publish(
        &self,
        destination: Destination,
        message: &NotificationMessage,
        headers: &MessageHeaders,
    ) -> Result<(), Error> {
        let route = self.topology.route(destination);
        let payload = serde_json::to_vec(message)?;

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into())
            .with_message_id(message.id.as_str().into())
            .with_headers(to_field_table(headers));

        let confirmation = self
            .channel
            .basic_publish(
                &route.exchange,
                &route.routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| anyhow!("Failed to publish to {}: {}", route.exchange, e))?
            .await
            .map_err(|e| anyhow!("Publish to {} was not confirmed: {}", route.exchange, e))?;

        if confirmation.is_nack() {
            return Err(anyhow!("Broker rejected publish to {}", route.exchange));
        }

        debug!(
            destination = destination.as_str(),
            idempotency_key = %message.idempotency_key,
            retry_count = message.retry_count,
            "Message published"
        );

        Ok(())
    }
}

fn to_field_table(headers: &MessageHeaders) -> FieldTable {
    let mut table = FieldTable::default();

    for (name, value) in headers.entries() {
        let value = match value {
            HeaderValue::Text(text) => AMQPValue::LongString(LongString::from(text)),
            HeaderValue::Number(number) => AMQPValue::LongLongInt(number),
            HeaderValue::Flag(flag) => AMQPValue::Boolean(flag),
        };
        table.insert(name.into(), value);
    }

    table
}

/// Reads a string-ish header from a delivery.
pub fn header_str(properties: &BasicProperties, name: &str) -> Option<String> {
    let headers = properties.headers().as_ref()?;
    let (_, value) = headers.inner().iter().find(|(key, _)| key.as_str() == name)?;

    match value {
        AMQPValue::LongString(text) => Some(String::from_utf8_lossy(text.as_bytes()).into_owned()),
        AMQPValue::ShortString(text) => Some(text.as_str().to_string()),
        AMQPValue::Boolean(flag) => Some(flag.to_string()),
        other => header_number(other).map(|n| n.to_string()),
    }
}

pub fn header_u32(properties: &BasicProperties, name: &str) -> Option<u32> {
    let headers = properties.headers().as_ref()?;
    let (_, value) = headers.inner().iter().find(|(key, _)| key.as_str() == name)?;

    header_number(value).and_then(|n| u32::try_from(n).ok())
}

fn header_number(value: &AMQPValue) -> Option<i64> {
    match value {
        AMQPValue::ShortShortInt(n) => Some(*n as i64),
        AMQPValue::ShortShortUInt(n) => Some(*n as i64),
        AMQPValue::ShortInt(n) => Some(*n as i64),
        AMQPValue::ShortUInt(n) => Some(*n as i64),
        AMQPValue::LongInt(n) => Some(*n as i64),
        AMQPValue::LongUInt(n) => Some(*n as i64),
        AMQPValue::LongLongInt(n) => Some(*n),
        AMQPValue::LongString(text) => String::from_utf8_lossy(text.as_bytes()).parse().ok(),
        _ => None,
    }
}
