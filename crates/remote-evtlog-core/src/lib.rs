//! Core abstractions for remote event log retrieval.
//!
//! This crate provides the fundamental building blocks:
//! - `EventLogApi` - The seam to the remote event log service
//! - `probe_then_allocate` - Two-phase buffer sizing shared by every render call
//! - `StructuredRecord` - One rendered event log record
//! - `Diagnostics` - Level-gated, component-tagged diagnostic output
//! - `RemoteTarget` / `QueryOptions` - Invocation configuration
//! - Backends: in-memory (feature `memory`) and wevtapi (Windows only)

pub mod api;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod diagnostics;
pub mod escape;
pub mod record;

pub use api::{ApiError, EventLogApi, QueryFlags, RemoteLogin};
pub use buffer::{ProbeError, decode_wide, probe_then_allocate};
pub use config::{
    DEFAULT_BATCH_SIZE, DEFAULT_LOG_NAME, LAST_RECORD_SENTINEL, QueryOptions, RemoteTarget,
};
pub use diagnostics::{
    DebugLevel, Diagnostic, DiagnosticSink, Diagnostics, MemorySink, Severity, TracingSink,
};
pub use escape::escape_backslashes;
pub use record::{OutputMode, QueryMode, StructuredRecord};
