use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::Channel;

/// Held lock on one device channel. Released on drop.
#[derive(Debug)]
pub struct ChannelGuard {
    _guard: Option<OwnedMutexGuard<()>>,
}

/// One mutex per (device, channel).
///
/// Patterns that must not be interleaved with another pattern's writes hold
/// the channel for the duration; opportunistic writers use [`try_hold`] and
/// skip the write while the channel is taken.
///
/// [`try_hold`]: ChannelLocks::try_hold
#[derive(Debug, Default)]
pub struct ChannelLocks {
    locks: HashMap<(u8, Channel), Arc<Mutex<()>>>,
}

impl ChannelLocks {
    pub fn new(addresses: &[u8]) -> Self {
        let locks = addresses
            .iter()
            .flat_map(|&a| Channel::RESET_ORDER.map(|c| ((a, c), Arc::new(Mutex::new(())))))
            .collect();
        Self { locks }
    }

    /// Wait for the channel. Unknown channels are never contended.
    pub async fn hold(&self, address: u8, channel: Channel) -> ChannelGuard {
        let guard = match self.locks.get(&(address, channel)) {
            Some(lock) => Some(Arc::clone(lock).lock_owned().await),
            None => None,
        };
        ChannelGuard { _guard: guard }
    }

    /// Take the channel if free, `None` while someone else holds it
    pub fn try_hold(&self, address: u8, channel: Channel) -> Option<ChannelGuard> {
        match self.locks.get(&(address, channel)) {
            Some(lock) => Arc::clone(lock)
                .try_lock_owned()
                .ok()
                .map(|g| ChannelGuard { _guard: Some(g) }),
            None => Some(ChannelGuard { _guard: None }),
        }
    }

    pub fn is_held(&self, address: u8, channel: Channel) -> bool {
        self.locks
            .get(&(address, channel))
            .is_some_and(|l| l.try_lock().is_err())
    }
}
