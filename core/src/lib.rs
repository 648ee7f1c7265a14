pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod gateway;
pub mod patterns;
pub mod service;
pub mod signals;
pub mod supervisor;
pub mod timeline;

// Re-exports for convenience
pub use dispatcher::TickReport;
pub use engine::HapticEngine;
pub use gateway::{DotGateway, DotTransport, MemoryTransport};
pub use service::{PlaybackHandle, SimulatedPlayback, spawn_playback_service};
pub use signals::{HapticSignal, SignalBus};
pub use timeline::{EventStore, HapticEvent};

#[cfg(test)]
mod testing;
