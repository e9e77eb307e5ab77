//! Invocation and per-record error types.

use remote_evtlog_core::{ApiError, ProbeError, api::codes};
use thiserror::Error;

/// Failure of a whole invocation.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The remote session context could not be created.
    #[error("Failed to connect to remote computer: {0}")]
    Session(ApiError),
    #[error("Could not open the '{0}' log on this machine")]
    ChannelNotFound(String),
    #[error("The specified search query is not valid")]
    InvalidQuery,
    /// Query issuance failed for another reason.
    #[error("Could not read event logs: {0}")]
    Query(ApiError),
    /// A fetch failed with something other than end-of-results.
    #[error("Failed to fetch next batch: {0}")]
    Fetch(ApiError),
    #[error("Out of memory allocating {required} units")]
    Allocation { required: usize },
    /// Writing to the output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The blocking task running the invocation panicked or was cancelled.
    #[cfg(feature = "tokio")]
    #[error("Invocation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Status reported by `ERROR_SUCCESS`.
pub const STATUS_SUCCESS: u32 = 0;

/// Status for output failures.
const ERROR_WRITE_FAULT: u32 = 29;

/// Status for an invocation task that did not finish.
#[cfg(feature = "tokio")]
const ERROR_PROCESS_ABORTED: u32 = 1067;

impl EventLogError {
    /// Integer status for callers that want one (never [`STATUS_SUCCESS`]).
    #[must_use]
    pub const fn status_code(&self) -> u32 {
        match self {
            Self::Session(e) | Self::Query(e) | Self::Fetch(e) => e.code(),
            Self::ChannelNotFound(_) => codes::ERROR_EVT_CHANNEL_NOT_FOUND,
            Self::InvalidQuery => codes::ERROR_EVT_INVALID_QUERY,
            Self::Allocation { .. } => codes::ERROR_OUTOFMEMORY,
            Self::Io(_) => ERROR_WRITE_FAULT,
            #[cfg(feature = "tokio")]
            Self::Join(_) => ERROR_PROCESS_ABORTED,
        }
    }
}

/// Failure to turn one raw record into a structured record.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to render event XML: {0}")]
    Serialize(ProbeError),
    #[error("Malformed event XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Event XML is missing <{0}>")]
    MissingField(&'static str),
    #[error("Record id is not a number: {0:?}")]
    InvalidRecordId(String),
}

impl RenderError {
    /// Units that could not be allocated, if this failure ends the stream.
    /// Every other failure skips one record.
    #[must_use]
    pub const fn fatal_allocation(&self) -> Option<usize> {
        match self {
            Self::Serialize(ProbeError::Allocation { required }) => Some(*required),
            _ => None,
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for RenderError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(e.into())
    }
}
