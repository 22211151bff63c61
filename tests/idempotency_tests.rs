use std::time::Duration;

use anyhow::Result;
use notification_relay::{
    clients::{IdempotencyStore, memory::MemoryIdempotencyStore},
    models::status::IdempotencyStatus,
};
use tokio::time::sleep;

fn store() -> MemoryIdempotencyStore {
    MemoryIdempotencyStore::new(Duration::from_secs(60), Duration::from_secs(86_400))
}

/// Test: Keys move through absent, processing and done
#[tokio::test]
async fn test_key_lifecycle() -> Result<()> {
    let store = store();
    let key = format!("test_states_{}", uuid::Uuid::new_v4());

    assert_eq!(store.status(&key).await?, IdempotencyStatus::NotFound);

    assert!(store.try_acquire(&key).await?);
    assert_eq!(store.status(&key).await?, IdempotencyStatus::Processing);
    assert!(!store.try_acquire(&key).await?);

    store.mark_done(&key).await?;
    assert_eq!(store.status(&key).await?, IdempotencyStatus::Done);
    assert!(!store.try_acquire(&key).await?);

    Ok(())
}

/// Test: Releasing a key makes it acquirable again
#[tokio::test]
async fn test_release_reopens_key() -> Result<()> {
    let store = store();

    assert!(store.try_acquire("k1").await?);
    store.release("k1").await?;

    assert_eq!(store.status("k1").await?, IdempotencyStatus::NotFound);
    assert!(store.try_acquire("k1").await?);

    Ok(())
}

/// Test: Releasing or completing a missing key is harmless
#[tokio::test]
async fn test_operations_on_missing_key() -> Result<()> {
    let store = store();

    store.release("missing").await?;
    assert_eq!(store.status("missing").await?, IdempotencyStatus::NotFound);

    store.mark_done("never-acquired").await?;
    assert_eq!(store.status("never-acquired").await?, IdempotencyStatus::Done);

    Ok(())
}

/// Test: Conditional release leaves done records in place
#[tokio::test]
async fn test_release_unless_done() -> Result<()> {
    let store = store();

    assert!(store.try_acquire("processing").await?);
    assert!(store.release_unless_done("processing").await?);
    assert_eq!(store.status("processing").await?, IdempotencyStatus::NotFound);

    assert!(store.release_unless_done("absent").await?);

    store.mark_done("done").await?;
    assert!(!store.release_unless_done("done").await?);
    assert_eq!(store.status("done").await?, IdempotencyStatus::Done);

    Ok(())
}

/// Test: Processing records expire so a crashed consumer cannot block a key
#[tokio::test]
async fn test_processing_record_expires() -> Result<()> {
    let store = MemoryIdempotencyStore::new(Duration::from_millis(50), Duration::from_millis(200));

    assert!(store.try_acquire("k1").await?);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(store.status("k1").await?, IdempotencyStatus::NotFound);
    assert!(store.try_acquire("k1").await?);

    store.mark_done("k1").await?;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(store.status("k1").await?, IdempotencyStatus::Done);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(store.status("k1").await?, IdempotencyStatus::NotFound);

    Ok(())
}
