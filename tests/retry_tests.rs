use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use anyhow::{Result, anyhow};
use notification_relay::{models::retry::RetryConfig, utils::retry_with_backoff};
use tokio::time::Instant;

use crate::support::test_config;

fn fast_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 20,
        max_delay_ms: 60,
        backoff_multiplier: 2,
    }
}

/// Test: Operations that succeed first time are not retried
#[tokio::test]
async fn test_first_success_is_not_retried() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let value = retry_with_backoff(&fast_config(3), || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("done")
        }
    })
    .await?;

    assert_eq!(value, "done");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    Ok(())
}

/// Test: A store write that fails twice succeeds on the third attempt
#[tokio::test]
async fn test_intermittent_failure_recovers() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let value = retry_with_backoff(&fast_config(5), || {
        let counter = Arc::clone(&counter);
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("connection reset"))
            } else {
                Ok(42)
            }
        }
    })
    .await?;

    assert_eq!(value, 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    Ok(())
}

/// Test: Persistent failures give up after max_attempts
#[tokio::test]
async fn test_persistent_failure_exhausts_attempts() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let result = retry_with_backoff(&fast_config(4), || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("store unavailable"))
        }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 4);

    Ok(())
}

/// Test: Backoff grows between attempts and stops at the cap
#[tokio::test]
async fn test_backoff_grows_and_is_capped() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 40,
        max_delay_ms: 100,
        backoff_multiplier: 2,
    };

    let start = Instant::now();
    let stamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let recorder = Arc::clone(&stamps);

    let _ = retry_with_backoff(&config, || {
        let recorder = Arc::clone(&recorder);
        async move {
            recorder.lock().await.push(start.elapsed().as_millis());
            Err::<(), _>(anyhow!("fail"))
        }
    })
    .await;

    let stamps = stamps.lock().await;
    assert_eq!(stamps.len(), 5);

    let gaps: Vec<u128> = stamps.windows(2).map(|pair| pair[1] - pair[0]).collect();

    // 40ms, 80ms, then capped at 100ms, each with up to 10% jitter.
    assert!(gaps[0] >= 36, "first gap {} too short", gaps[0]);
    assert!(gaps[1] >= 72, "second gap {} too short", gaps[1]);
    assert!(gaps[2] >= 90 && gaps[3] >= 90, "capped gaps too short: {:?}", gaps);

    Ok(())
}

/// Test: Store retry settings come from configuration
#[tokio::test]
async fn test_retry_config_from_environment() -> Result<()> {
    let config = test_config(&[
        ("MAX_RETRY_ATTEMPTS", "5"),
        ("INITIAL_RETRY_DELAY_MS", "250"),
    ])?;

    let retry = config.retry_config();

    assert_eq!(retry.max_attempts, 5);
    assert_eq!(retry.initial_delay_ms, 250);
    assert_eq!(retry.max_delay_ms, 2000);
    assert_eq!(retry.backoff_multiplier, 2);

    Ok(())
}
