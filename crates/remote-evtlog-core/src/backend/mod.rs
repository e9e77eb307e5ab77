//! Event log backends.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(windows)]
#[allow(unsafe_code)]
pub mod wevtapi;

#[cfg(feature = "memory")]
pub use memory::{HandleKind, HandleLedger, MemoryEvent, MemoryEventLog, MessageSource};

#[cfg(windows)]
pub use wevtapi::WevtApi;
