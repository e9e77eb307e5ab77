//! Remote event log enumeration.
//!
//! This crate drives one invocation end to end:
//! - `SessionFactory` - Authenticated session contexts
//! - `ResultStream` - Paged, newest-first enumeration
//! - `RecordRenderer` / `MessageResolver` - Field extraction and message lookup
//! - `RecordWriter` - JSON and delimited framing
//! - `QueryEngine` - Input normalization and orchestration

pub mod engine;
pub mod error;
pub mod output;
pub mod renderer;
pub mod resolver;
pub mod session;
#[cfg(feature = "tokio")]
pub mod spawn;
pub mod stream;

use std::io::Write;

pub use engine::QueryEngine;
pub use error::{EventLogError, RenderError, STATUS_SUCCESS};
pub use output::{DELIMITED_HEADER, DELIMITER, RecordWriter};
pub use renderer::{RecordRenderer, Rendered};
pub use resolver::{MessageResolver, Resolution};
pub use session::SessionFactory;
#[cfg(feature = "tokio")]
pub use spawn::spawn_query;
pub use stream::{ResultStream, StreamOutcome, StreamSummary};

use remote_evtlog_core::{EventLogApi, QueryOptions, RemoteTarget};

/// Write every record matching `options` to `out`, reporting through `tracing`.
///
/// # Errors
/// See [`QueryEngine::run`].
pub fn query<A: EventLogApi, W: Write>(
    api: A,
    target: &RemoteTarget,
    options: &QueryOptions,
    out: W,
) -> Result<StreamOutcome, EventLogError> {
    QueryEngine::new(api).query(target, options, out)
}

/// Id of the newest record in `options.log_name`, reporting through `tracing`.
///
/// # Errors
/// See [`QueryEngine::run`].
pub fn fetch_latest_record_id<A: EventLogApi>(
    api: A,
    target: &RemoteTarget,
    options: &QueryOptions,
) -> Result<Option<u64>, EventLogError> {
    QueryEngine::new(api).fetch_latest_record_id(target, options)
}

/// Integer status of an invocation: [`STATUS_SUCCESS`] or the failure's code.
#[must_use]
pub fn status_of<T>(result: &Result<T, EventLogError>) -> u32 {
    result.as_ref().map_or_else(EventLogError::status_code, |_| STATUS_SUCCESS)
}

#[cfg(test)]
mod tests {
    use remote_evtlog_core::{
        ApiError,
        backend::{MemoryEvent, MemoryEventLog},
    };

    use super::*;

    #[test]
    fn test_free_functions() {
        let log = MemoryEventLog::new();
        log.push_event("Application", MemoryEvent::new(5, 1000, "App"));
        let target = RemoteTarget::new("localhost", "", "", "");

        let result = query(&log, &target, &QueryOptions::default(), std::io::sink());
        assert_eq!(status_of(&result), STATUS_SUCCESS);
        assert_eq!(
            fetch_latest_record_id(&log, &target, &QueryOptions::default()).unwrap(),
            Some(5)
        );

        log.fail_sessions(ApiError::Other(5));
        let result = fetch_latest_record_id(&log, &target, &QueryOptions::default());
        assert_eq!(status_of(&result), 5);
    }
}
