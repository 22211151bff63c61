use std::borrow::Cow;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

use crate::models::retry::RetryConfig;

/// Prefix marking a stored body that was not valid UTF-8.
pub const BINARY_BODY_PREFIX: &str = "base64:";

/// Text form of a broker body for the Redis lists. UTF-8 bodies are kept
/// as-is; anything else is stored base64-encoded behind [`BINARY_BODY_PREFIX`]
/// so no byte is lost.
pub fn body_text(body: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(body) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(format!("{}{}", BINARY_BODY_PREFIX, STANDARD.encode(body))),
    }
}

/// Runs a store write until it succeeds or `max_attempts` is reached,
/// doubling the pause between attempts up to `max_delay_ms` with ±10% jitter.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay_ms = config.initial_delay_ms;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= config.max_attempts {
            warn!(attempts = attempt, error = %error, "event=store_write_abandoned");
            return Err(error);
        }

        let jitter = rand::random_range(-0.1..=0.1);
        let pause = (delay_ms as f64 * (1.0 + jitter)) as u64;
        debug!(attempt, pause_ms = pause, error = %error, "event=store_write_retry");

        sleep(Duration::from_millis(pause)).await;
        delay_ms = delay_ms
            .saturating_mul(config.backoff_multiplier)
            .min(config.max_delay_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_text_keeps_utf8_verbatim() {
        assert_eq!(body_text(b"{ not json"), "{ not json");
    }

    #[test]
    fn test_body_text_encodes_invalid_utf8() {
        let body = [0xff, 0xfe, b'h', b'i'];
        let text = body_text(&body);

        let encoded = text.strip_prefix(BINARY_BODY_PREFIX).unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), body);
    }
}
