//! Hardware gateway for haptic dots.
//!
//! The gateway owns the set of configured devices, serialises writes per
//! device, bounds every write with a timeout and keeps an in-memory mirror of
//! each device's setpoints. Failures never escape as panics: callers receive a
//! [`GatewayError`] value, log it and carry on with the next step.

pub mod device;
pub mod dots;
pub mod locks;
pub mod memory;

#[cfg(test)]
mod gateway_tests;

use async_trait::async_trait;

pub use device::{Channel, ChannelSet, ChannelUpdate, DeviceState, Rgb, Vibration};
pub use dots::{DotGateway, ResetReport};
pub use locks::{ChannelGuard, ChannelLocks};
pub use memory::{MemoryTransport, WriteRecord};

/// Low-level link to the physical dots (bus framing lives behind this)
#[async_trait]
pub trait DotTransport: Send + Sync {
    /// Open the link and return the addresses that answered
    async fn connect(&self) -> Result<Vec<u8>, TransportError>;

    /// Write one frame. `state` is the full device state after the update.
    async fn write(
        &self,
        address: u8,
        update: &ChannelUpdate,
        state: &DeviceState,
    ) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,

    #[error("device {address} rejected the write")]
    Rejected { address: u8 },

    #[error("transport I/O error")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway not started")]
    NotStarted,

    #[error("unknown device address {0}")]
    UnknownDevice(u8),

    #[error("write to device {address} timed out")]
    Timeout { address: u8 },

    #[error("write to device {address} failed")]
    Transport {
        address: u8,
        #[source]
        source: TransportError,
    },
}
