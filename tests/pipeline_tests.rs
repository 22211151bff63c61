use anyhow::Result;
use notification_relay::{
    clients::{IdempotencyStore, OverflowBuffer},
    models::{
        delivery::DeliveryOutcome,
        message::PublishStatus,
        routing::{Destination, REASON_RETRY_EXCEEDED},
        status::{ConsumeResult, DlqOrigin, IdempotencyStatus},
    },
};

use crate::support::Harness;

fn transient() -> DeliveryOutcome {
    DeliveryOutcome::Transient("endpoint unavailable".to_string())
}

/// Test: A message that always fails walks every retry hop into the buffer,
/// and replay brings it home once the endpoint recovers
#[tokio::test]
async fn test_hello_round_trip_through_dead_letter_and_replay() -> Result<()> {
    let harness = Harness::new(3, transient());

    let response = harness
        .publish
        .publish("hello".to_string(), Some("k1".to_string()))
        .await;
    assert_eq!(response.status, PublishStatus::Queued);

    let results = harness.drain().await?;
    assert_eq!(
        results,
        vec![
            ConsumeResult::RetryPublished,
            ConsumeResult::RetryPublished,
            ConsumeResult::RetryPublished,
            ConsumeResult::SentToDlq,
        ]
    );

    let counts: Vec<u32> = harness
        .delivery
        .attempts()
        .iter()
        .map(|attempt| attempt.retry_count)
        .collect();
    assert_eq!(counts, vec![0, 1, 2, 3]);

    let entries = harness.pending_entries().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].origin, DlqOrigin::Manual);
    assert_eq!(entries[0].reason, REASON_RETRY_EXCEEDED);
    assert_eq!(entries[0].retry_count, Some(4));
    let staged = entries[0].message()?;
    assert_eq!(staged.retry_count, 4);
    assert_eq!(staged.payload, "hello");
    assert_eq!(staged.idempotency_key, "k1");
    assert_eq!(harness.store.status("k1").await?, IdempotencyStatus::NotFound);

    harness.delivery.set_fallback(DeliveryOutcome::Delivered);

    assert_eq!(harness.replay.replay(10).await, 1);
    let replayed = harness.broker.messages(Destination::Main).await;
    assert_eq!(replayed[0].message.retry_count, 0);

    let results = harness.drain().await?;
    assert_eq!(results, vec![ConsumeResult::Success]);
    assert_eq!(harness.store.status("k1").await?, IdempotencyStatus::Done);
    assert_eq!(harness.overflow.pending_size().await?, 0);
    assert_eq!(harness.overflow.in_flight_size().await?, 0);

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.published, 1);
    assert_eq!(snapshot.retried, 3);
    assert_eq!(snapshot.dead_lettered, 1);
    assert_eq!(snapshot.captured, 1);
    assert_eq!(snapshot.replayed, 1);
    assert_eq!(snapshot.succeeded, 1);

    Ok(())
}

/// Test: A message that recovers mid-retry is delivered once and never dead-lettered
#[tokio::test]
async fn test_recovery_during_retries() -> Result<()> {
    let harness = Harness::new(3, DeliveryOutcome::Delivered);
    harness.delivery.push(transient());
    harness.delivery.push(transient());

    harness
        .publish
        .publish("hello".to_string(), Some("k-recover".to_string()))
        .await;

    let results = harness.drain().await?;

    assert_eq!(
        results,
        vec![
            ConsumeResult::RetryPublished,
            ConsumeResult::RetryPublished,
            ConsumeResult::Success,
        ]
    );
    assert_eq!(harness.overflow.pending_size().await?, 0);
    assert_eq!(harness.store.status("k-recover").await?, IdempotencyStatus::Done);

    Ok(())
}

/// Test: Retry counts never exceed max + 1 anywhere in the pipeline
#[tokio::test]
async fn test_retry_count_is_bounded() -> Result<()> {
    let harness = Harness::new(2, transient());

    for i in 0..5 {
        harness
            .publish
            .publish(format!("payload {}", i), Some(format!("k-{}", i)))
            .await;
    }
    harness.drain().await?;

    assert!(harness.delivery.attempts().iter().all(|m| m.retry_count <= 2));

    let entries = harness.pending_entries().await?;
    assert_eq!(entries.len(), 5);
    for entry in entries {
        assert_eq!(entry.message()?.retry_count, 3);
    }

    Ok(())
}
