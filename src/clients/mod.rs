//! Seams between the delivery pipeline and the outside world.
//!
//! Production wiring uses [`redis::RedisClient`] for the idempotency store and
//! both buffers, [`rbmq::RabbitMqClient`] as the publisher and one of the
//! strategies in [`delivery`]. The [`memory`] module provides in-process
//! implementations of the same traits.

use anyhow::{Error, Result};
use async_trait::async_trait;

use crate::models::{
    delivery::DeliveryOutcome,
    message::NotificationMessage,
    routing::{Destination, MessageHeaders},
    status::IdempotencyStatus,
};

pub mod delivery;
pub mod health;
pub mod memory;
pub mod rbmq;
pub mod redis;

/// Per-key processing state with TTL expiry.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically moves an absent key to `Processing`. Returns `false` when
    /// any record already exists.
    async fn try_acquire(&self, key: &str) -> Result<bool, Error>;

    async fn mark_done(&self, key: &str) -> Result<(), Error>;

    async fn release(&self, key: &str) -> Result<(), Error>;

    /// Deletes the record unless it is `Done`. Returns whether the key is
    /// acquirable afterwards.
    async fn release_unless_done(&self, key: &str) -> Result<bool, Error>;

    async fn status(&self, key: &str) -> Result<IdempotencyStatus, Error>;
}

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(
        &self,
        destination: Destination,
        message: &NotificationMessage,
        headers: &MessageHeaders,
    ) -> Result<(), Error>;
}

/// Durable FIFO of dead-lettered entries.
///
/// Entries are appended at the newest end. Readers never peek: an entry is
/// claimed by moving it atomically into an in-flight segment, and leaves the
/// buffer only through [`OverflowBuffer::acknowledge`] once its side effect
/// is confirmed.
#[async_trait]
pub trait OverflowBuffer: Send + Sync {
    /// Appends at the newest end and returns the pending length.
    async fn append(&self, entry: &str) -> Result<u64, Error>;

    /// Moves the oldest pending entry into the in-flight segment.
    async fn claim_oldest(&self) -> Result<Option<String>, Error>;

    /// Removes a claimed entry for good.
    async fn acknowledge(&self, entry: &str) -> Result<(), Error>;

    /// Puts a claimed entry back at the oldest end of the pending segment.
    async fn restore(&self, entry: &str) -> Result<(), Error>;

    /// Returns every in-flight entry to the oldest end, preserving order.
    async fn recover_in_flight(&self) -> Result<u64, Error>;

    async fn pending_size(&self) -> Result<u64, Error>;

    async fn in_flight_size(&self) -> Result<u64, Error>;
}

/// Terminal store for payloads that can never be reprocessed automatically.
#[async_trait]
pub trait QuarantineBuffer: Send + Sync {
    /// Stores the raw payload and returns the new quarantine size.
    async fn quarantine(&self, raw: &str) -> Result<u64, Error>;

    async fn size(&self) -> Result<u64, Error>;
}

#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    async fn attempt_delivery(&self, message: &NotificationMessage) -> DeliveryOutcome;
}
