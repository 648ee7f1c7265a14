//! Recording in-memory transport.
//!
//! Stands in for the bus driver in tests and in the CLI's simulation mode.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{ChannelUpdate, DeviceState, DotTransport, TransportError};

/// One accepted frame
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub at: Instant,
    pub address: u8,
    pub update: ChannelUpdate,
    pub state: DeviceState,
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    addresses: Vec<u8>,
    writes: Mutex<Vec<WriteRecord>>,
    failing: Mutex<HashSet<u8>>,
    latency: Mutex<Duration>,
    refuse_connect: AtomicBool,
    rejected: AtomicUsize,
    log_writes: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryTransport {
    pub fn new(addresses: &[u8]) -> Self {
        Self {
            addresses: addresses.to_vec(),
            ..Self::default()
        }
    }

    /// Log every accepted frame at info level
    pub fn with_logging(mut self) -> Self {
        self.log_writes = true;
        self
    }

    /// Make `connect` fail
    pub fn refuse_connect(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }

    /// Reject every write to `address`
    pub fn fail_device(&self, address: u8) {
        lock(&self.failing).insert(address);
    }

    pub fn heal_device(&self, address: u8) {
        lock(&self.failing).remove(&address);
    }

    /// Delay applied to every write before it is accepted
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.writes).clone()
    }

    pub fn writes_to(&self, address: u8) -> Vec<WriteRecord> {
        lock(&self.writes)
            .iter()
            .filter(|w| w.address == address)
            .cloned()
            .collect()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    /// Writes refused because the device was marked failing
    pub fn rejected_count(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        lock(&self.writes).clear();
    }
}

#[async_trait]
impl DotTransport for MemoryTransport {
    async fn connect(&self) -> Result<Vec<u8>, TransportError> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        Ok(self.addresses.clone())
    }

    async fn write(
        &self,
        address: u8,
        update: &ChannelUpdate,
        state: &DeviceState,
    ) -> Result<(), TransportError> {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if lock(&self.failing).contains(&address) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::Rejected { address });
        }
        if self.log_writes {
            tracing::info!(
                address,
                led = ?state.led,
                vibration = ?state.vibration,
                thermal = state.thermal,
                "dot write"
            );
        }
        lock(&self.writes).push(WriteRecord {
            at: Instant::now(),
            address,
            update: *update,
            state: *state,
        });
        Ok(())
    }
}
