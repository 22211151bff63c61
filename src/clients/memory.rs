//! In-process implementations of the client traits.
//!
//! They keep the same atomicity guarantees as the Redis and RabbitMQ clients
//! (every operation completes under a single lock acquisition) so the
//! pipeline behaves identically when wired against them. Used by the test
//! suite and for running the pipeline without external services.

use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    clients::{IdempotencyStore, MessagePublisher, OverflowBuffer, QuarantineBuffer},
    models::{
        message::NotificationMessage,
        routing::{Destination, MessageHeaders},
        status::IdempotencyStatus,
    },
};

pub struct MemoryIdempotencyStore {
    records: Mutex<HashMap<String, (IdempotencyStatus, Instant)>>,
    processing_ttl: Duration,
    done_ttl: Duration,
    unavailable: AtomicBool,
}

impl MemoryIdempotencyStore {
    pub fn new(processing_ttl: Duration, done_ttl: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            processing_ttl,
            done_ttl,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("Idempotency store unavailable"));
        }
        Ok(())
    }

    fn live(
        records: &mut HashMap<String, (IdempotencyStatus, Instant)>,
        key: &str,
    ) -> Option<IdempotencyStatus> {
        match records.get(key) {
            Some((status, expires_at)) if *expires_at > Instant::now() => Some(*status),
            Some(_) => {
                records.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn try_acquire(&self, key: &str) -> Result<bool, Error> {
        self.check_available()?;
        let mut records = self.records.lock().await;

        if Self::live(&mut records, key).is_some() {
            return Ok(false);
        }

        records.insert(
            key.to_string(),
            (IdempotencyStatus::Processing, Instant::now() + self.processing_ttl),
        );
        Ok(true)
    }

    async fn mark_done(&self, key: &str) -> Result<(), Error> {
        self.check_available()?;
        self.records.lock().await.insert(
            key.to_string(),
            (IdempotencyStatus::Done, Instant::now() + self.done_ttl),
        );
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), Error> {
        self.check_available()?;
        self.records.lock().await.remove(key);
        Ok(())
    }

    async fn release_unless_done(&self, key: &str) -> Result<bool, Error> {
        self.check_available()?;
        let mut records = self.records.lock().await;

        if Self::live(&mut records, key) == Some(IdempotencyStatus::Done) {
            return Ok(false);
        }

        records.remove(key);
        Ok(true)
    }

    async fn status(&self, key: &str) -> Result<IdempotencyStatus, Error> {
        self.check_available()?;
        let mut records = self.records.lock().await;
        Ok(Self::live(&mut records, key).unwrap_or(IdempotencyStatus::NotFound))
    }
}

#[derive(Default)]
struct OverflowLists {
    /// Front is the newest entry, back the oldest.
    pending: VecDeque<String>,
    /// Claim order, oldest claim first.
    in_flight: Vec<String>,
}

#[derive(Default)]
pub struct MemoryOverflowBuffer {
    lists: Mutex<OverflowLists>,
    unavailable: AtomicBool,
}

impl MemoryOverflowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail, as if the store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Pending entries from oldest to newest.
    pub async fn pending(&self) -> Vec<String> {
        self.lists.lock().await.pending.iter().rev().cloned().collect()
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("Overflow buffer unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl OverflowBuffer for MemoryOverflowBuffer {
    async fn append(&self, entry: &str) -> Result<u64, Error> {
        self.check_available()?;
        let mut lists = self.lists.lock().await;
        lists.pending.push_front(entry.to_string());
        Ok(lists.pending.len() as u64)
    }

    async fn claim_oldest(&self) -> Result<Option<String>, Error> {
        self.check_available()?;
        let mut lists = self.lists.lock().await;

        let Some(entry) = lists.pending.pop_back() else {
            return Ok(None);
        };
        lists.in_flight.push(entry.clone());

        Ok(Some(entry))
    }

    async fn acknowledge(&self, entry: &str) -> Result<(), Error> {
        self.check_available()?;
        let mut lists = self.lists.lock().await;

        if let Some(position) = lists.in_flight.iter().position(|e| e == entry) {
            lists.in_flight.remove(position);
        }
        Ok(())
    }

    async fn restore(&self, entry: &str) -> Result<(), Error> {
        self.check_available()?;
        let mut lists = self.lists.lock().await;

        if let Some(position) = lists.in_flight.iter().position(|e| e == entry) {
            lists.in_flight.remove(position);
        }
        lists.pending.push_back(entry.to_string());
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<u64, Error> {
        self.check_available()?;
        let mut lists = self.lists.lock().await;

        let in_flight = std::mem::take(&mut lists.in_flight);
        let recovered = in_flight.len() as u64;
        for entry in in_flight.into_iter().rev() {
            lists.pending.push_back(entry);
        }

        Ok(recovered)
    }

    async fn pending_size(&self) -> Result<u64, Error> {
        self.check_available()?;
        Ok(self.lists.lock().await.pending.len() as u64)
    }

    async fn in_flight_size(&self) -> Result<u64, Error> {
        self.check_available()?;
        Ok(self.lists.lock().await.in_flight.len() as u64)
    }
}

#[derive(Default)]
pub struct MemoryQuarantineBuffer {
    entries: Mutex<Vec<String>>,
    unavailable: AtomicBool,
}

impl MemoryQuarantineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("Quarantine buffer unavailable"));
        }
        Ok(())
    }

    pub async fn entries(&self) -> Vec<String> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl QuarantineBuffer for MemoryQuarantineBuffer {
    async fn quarantine(&self, raw: &str) -> Result<u64, Error> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        entries.push(raw.to_string());
        Ok(entries.len() as u64)
    }

    async fn size(&self) -> Result<u64, Error> {
        self.check_available()?;
        Ok(self.entries.lock().await.len() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub message: NotificationMessage,
    pub headers: MessageHeaders,
}

/// Records publishes per destination instead of sending them anywhere.
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<Destination, VecDeque<PublishedMessage>>>,
    unavailable: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Removes and returns the oldest message published to `destination`.
    pub async fn take(&self, destination: Destination) -> Option<PublishedMessage> {
        self.queues
            .lock()
            .await
            .get_mut(&destination)
            .and_then(|queue| queue.pop_front())
    }

    pub async fn messages(&self, destination: Destination) -> Vec<PublishedMessage> {
        self.queues
            .lock()
            .await
            .get(&destination)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn depth(&self, destination: Destination) -> usize {
        self.queues
            .lock()
            .await
            .get(&destination)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl MessagePublisher for MemoryBroker {
    async fn publish(
        &self,
        destination: Destination,
        message: &NotificationMessage,
        headers: &MessageHeaders,
    ) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("Broker unavailable"));
        }

        self.queues
            .lock()
            .await
            .entry(destination)
            .or_default()
            .push_back(PublishedMessage {
                message: message.clone(),
                headers: headers.clone(),
            });

        Ok(())
    }
}
