//! Top-level orchestration of one invocation.

use std::{io::Write, sync::Arc};

use remote_evtlog_core::{
    ApiError, DEFAULT_LOG_NAME, DiagnosticSink, Diagnostics, EventLogApi, LAST_RECORD_SENTINEL,
    QueryFlags, QueryMode, QueryOptions, RemoteTarget, TracingSink,
};
use tracing::info_span;
use uuid::Uuid;

use crate::{
    error::EventLogError,
    output::RecordWriter,
    session::SessionFactory,
    stream::{ResultStream, StreamOutcome},
};

const COMPONENT: &str = "QueryEngine";

/// Inputs after defaulting.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Normalized {
    log_name: String,
    query: Option<String>,
    mode: QueryMode,
}

/// Apply the defaulting rules in order: empty log name, empty query, then
/// the last-record sentinel (exact match) which also clears the filter.
fn normalize(options: &QueryOptions, mode: QueryMode) -> Normalized {
    let log_name = if options.log_name.is_empty() {
        DEFAULT_LOG_NAME.to_owned()
    } else {
        options.log_name.clone()
    };
    let query = options.query.clone().filter(|q| !q.is_empty());
    if query.as_deref() == Some(LAST_RECORD_SENTINEL) {
        return Normalized {
            log_name,
            query: None,
            mode: QueryMode::LastRecordOnly,
        };
    }
    Normalized {
        log_name,
        query,
        mode,
    }
}

/// Runs invocations against one event-log service.
///
/// Invocations share nothing but the diagnostic sink, so one engine can serve
/// concurrent callers when `A` is `Sync`.
pub struct QueryEngine<A: EventLogApi> {
    api: A,
    sink: Arc<dyn DiagnosticSink>,
}

impl<A: EventLogApi> QueryEngine<A> {
    /// An engine reporting diagnostics through `tracing`.
    #[must_use]
    pub fn new(api: A) -> Self {
        Self {
            api,
            sink: Arc::new(TracingSink),
        }
    }

    /// Send diagnostics to `sink` instead.
    #[must_use]
    pub fn with_diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Enumerate and write every matching record, newest first.
    ///
    /// Passing [`LAST_RECORD_SENTINEL`] as the query turns this into a
    /// last-record fetch, reported as [`StreamOutcome::LastRecord`].
    ///
    /// # Errors
    /// See [`QueryEngine::run`].
    pub fn query<W: Write>(
        &self,
        target: &RemoteTarget,
        options: &QueryOptions,
        out: W,
    ) -> Result<StreamOutcome, EventLogError> {
        self.run(target, options, QueryMode::Default, out)
    }

    /// Id of the newest record in `options.log_name`, or `None` if the log is
    /// empty. The query and output settings of `options` are ignored.
    ///
    /// # Errors
    /// See [`QueryEngine::run`].
    pub fn fetch_latest_record_id(
        &self,
        target: &RemoteTarget,
        options: &QueryOptions,
    ) -> Result<Option<u64>, EventLogError> {
        let options = options.clone().with_query(LAST_RECORD_SENTINEL);
        match self.run(target, &options, QueryMode::LastRecordOnly, std::io::sink())? {
            StreamOutcome::LastRecord(record_id) => Ok(record_id),
            StreamOutcome::Completed(_) => Ok(None),
        }
    }

    /// Run one invocation, writing records to `out`.
    ///
    /// The session is released once, after the stream finishes or query
    /// issuance fails. Setup failures write nothing to `out`.
    ///
    /// # Errors
    /// Returns error if the session or query cannot be created, a fetch fails
    /// or the output rejects a write.
    pub fn run<W: Write>(
        &self,
        target: &RemoteTarget,
        options: &QueryOptions,
        mode: QueryMode,
        out: W,
    ) -> Result<StreamOutcome, EventLogError> {
        let diagnostics = Diagnostics::new(options.debug, Arc::clone(&self.sink));
        let request = normalize(options, mode);

        let span = info_span!(
            "invocation",
            id = %Uuid::new_v4(),
            host = %target.host,
            channel = %request.log_name,
        );
        let _guard = span.enter();

        if request.mode == QueryMode::LastRecordOnly {
            diagnostics.basic(COMPONENT, "Mode is last record fetch");
        }
        match &request.query {
            Some(query) => diagnostics.trace(COMPONENT, format!("Using query: {query}")),
            None => diagnostics.trace(COMPONENT, "(no query specified)"),
        }

        let session = SessionFactory::new(&self.api, &diagnostics).open(target)?;

        diagnostics.trace(COMPONENT, "Attempting to query the EventLog...");
        let mut results = self
            .api
            .query(
                &session,
                &request.log_name,
                request.query.as_deref(),
                QueryFlags::reverse_channel(),
            )
            .map_err(|e| query_failed(&diagnostics, &request.log_name, e))?;

        let mut writer = RecordWriter::new(out, options.output);
        let outcome = ResultStream::new(&self.api, &diagnostics, options.effective_batch_size())
            .drive(&session, &mut results, request.mode, &mut writer);
        let flushed = writer.finish();
        drop(results);
        drop(session);

        let outcome = outcome?;
        flushed?;
        Ok(outcome)
    }
}

fn query_failed(diagnostics: &Diagnostics, log_name: &str, error: ApiError) -> EventLogError {
    match error {
        ApiError::ChannelNotFound => {
            diagnostics.error(
                COMPONENT,
                format!("Could not open the '{log_name}' log on this machine."),
            );
            EventLogError::ChannelNotFound(log_name.to_owned())
        }
        ApiError::InvalidQuery => {
            diagnostics.error(COMPONENT, "The specified search query is not valid.");
            EventLogError::InvalidQuery
        }
        other => {
            diagnostics.error(
                COMPONENT,
                format!(
                    "Could not read event logs due to the following Windows error: {}.",
                    other.code()
                ),
            );
            EventLogError::Query(other)
        }
    }
}
