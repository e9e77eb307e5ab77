//! Running invocations from async code.

use std::sync::Arc;

use remote_evtlog_core::{EventLogApi, QueryOptions, RemoteTarget};

use crate::{engine::QueryEngine, error::EventLogError, stream::StreamOutcome};

/// Run [`QueryEngine::query`] on the blocking pool, collecting the output.
///
/// The event-log calls block for the whole enumeration, so they must not run
/// on an async worker.
///
/// # Errors
/// Returns the invocation's error, or [`EventLogError::Join`] if the task
/// panicked.
pub async fn spawn_query<A>(
    engine: Arc<QueryEngine<A>>,
    target: RemoteTarget,
    options: QueryOptions,
) -> Result<(Vec<u8>, StreamOutcome), EventLogError>
where
    A: EventLogApi + Send + Sync + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut out = Vec::new();
        let outcome = engine.query(&target, &options, &mut out)?;
        Ok((out, outcome))
    })
    .await?
}
