pub mod definition;
pub mod event;
pub mod store;

pub use definition::SequenceDefinition;
pub use event::{EntrySetpoint, HapticEvent};
pub use store::{EventStore, PageBoundary, SequenceError, SequenceInfo};
