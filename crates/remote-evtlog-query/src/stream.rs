//! Paged enumeration of a result set.

use std::io::Write;

use remote_evtlog_core::{ApiError, Diagnostics, EventLogApi, QueryMode};

use crate::{
    error::EventLogError,
    output::RecordWriter,
    renderer::{RecordRenderer, Rendered},
};

const COMPONENT: &str = "ResultStream";

/// Counts for a stream that ran to exhaustion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Records written to the output.
    pub emitted: usize,
    /// Records that failed to render and were reported instead.
    pub skipped: usize,
}

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed(StreamSummary),
    /// Id of the newest record, or `None` for an empty result set.
    LastRecord(Option<u64>),
}

/// What to do after a batch.
enum Step {
    Continue,
    Stop(u64),
}

/// Drives fetch and render over one result set.
///
/// Every record handle of a batch is owned by the batch and released when
/// it goes out of scope, including on early exit.
pub struct ResultStream<'a, A: EventLogApi> {
    api: &'a A,
    diagnostics: &'a Diagnostics,
    renderer: RecordRenderer<'a, A>,
    batch_size: usize,
}

impl<'a, A: EventLogApi> ResultStream<'a, A> {
    #[must_use]
    pub fn new(api: &'a A, diagnostics: &'a Diagnostics, batch_size: usize) -> Self {
        Self {
            api,
            diagnostics,
            renderer: RecordRenderer::new(api, diagnostics),
            batch_size: batch_size.max(1),
        }
    }

    /// Fetch until the result set is exhausted or, in
    /// [`QueryMode::LastRecordOnly`], the first record renders.
    ///
    /// # Errors
    /// Returns [`EventLogError::Fetch`] for fetch failures other than
    /// end-of-results, [`EventLogError::Allocation`] if a record cannot be
    /// buffered and [`EventLogError::Io`] if the output rejects a write.
    pub fn drive<W: Write>(
        &self,
        session: &A::Session,
        results: &mut A::ResultSet,
        mode: QueryMode,
        writer: &mut RecordWriter<W>,
    ) -> Result<StreamOutcome, EventLogError> {
        if mode == QueryMode::Default {
            writer.begin()?;
        }

        let mut summary = StreamSummary::default();
        loop {
            let batch = match self.api.next_batch(results, self.batch_size) {
                Ok(batch) if batch.is_empty() => break,
                Ok(batch) => batch,
                Err(ApiError::NoMoreItems) => break,
                Err(e) => {
                    self.diagnostics.error(
                        COMPONENT,
                        format!("Failed to fetch next batch with following error: {}", e.code()),
                    );
                    return Err(EventLogError::Fetch(e));
                }
            };
            self.diagnostics
                .trace(COMPONENT, format!("Fetched {} records", batch.len()));

            if let Step::Stop(record_id) =
                self.render_batch(session, batch, mode, writer, &mut summary)?
            {
                return Ok(StreamOutcome::LastRecord(Some(record_id)));
            }
        }

        self.diagnostics.trace(COMPONENT, "No more records");
        Ok(match mode {
            QueryMode::Default => StreamOutcome::Completed(summary),
            QueryMode::LastRecordOnly => StreamOutcome::LastRecord(None),
        })
    }

    fn render_batch<W: Write>(
        &self,
        session: &A::Session,
        batch: Vec<A::Record>,
        mode: QueryMode,
        writer: &mut RecordWriter<W>,
        summary: &mut StreamSummary,
    ) -> Result<Step, EventLogError> {
        for record in batch {
            match self.renderer.render(session, &record, mode) {
                Ok(Rendered::RecordId(record_id)) => return Ok(Step::Stop(record_id)),
                Ok(Rendered::Record(rendered)) => {
                    writer.write_record(&rendered)?;
                    summary.emitted += 1;
                }
                Err(e) => {
                    self.diagnostics
                        .error(COMPONENT, format!("Failed to render record: {e}"));
                    if let Some(required) = e.fatal_allocation() {
                        return Err(EventLogError::Allocation { required });
                    }
                    summary.skipped += 1;
                }
            }
        }
        Ok(Step::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use remote_evtlog_core::{
        DebugLevel, MemorySink, OutputMode, QueryFlags, RemoteLogin,
        backend::{HandleKind, MemoryEvent, MemoryEventLog},
    };

    use super::*;

    fn log_with(ids: &[u64]) -> MemoryEventLog {
        let log = MemoryEventLog::new();
        log.register_publisher("Contoso");
        for &id in ids {
            log.push_event(
                "Application",
                MemoryEvent::new(id, 1000, "Contoso").with_message(format!("event {id}")),
            );
        }
        log
    }

    fn drive(
        log: &MemoryEventLog,
        mode: QueryMode,
        output: OutputMode,
        batch_size: usize,
    ) -> (Result<StreamOutcome, EventLogError>, String, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let diag = Diagnostics::new(DebugLevel::Silent, sink.clone());
        let login = RemoteLogin {
            server: "localhost",
            domain: None,
            user: "",
            password: "",
        };
        let session = log.open_session(&login).unwrap();
        let mut results = log
            .query(&session, "Application", None, QueryFlags::reverse_channel())
            .unwrap();
        let mut writer = RecordWriter::new(Vec::new(), output);
        let outcome =
            ResultStream::new(log, &diag, batch_size).drive(&session, &mut results, mode, &mut writer);
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        (outcome, out, sink)
    }

    #[test]
    fn test_emits_every_record_newest_first() {
        let log = log_with(&[1, 2, 3]);
        let (outcome, out, sink) = drive(&log, QueryMode::Default, OutputMode::Structured, 2);
        assert_eq!(
            outcome.unwrap(),
            StreamOutcome::Completed(StreamSummary {
                emitted: 3,
                skipped: 0
            })
        );
        let ids: Vec<String> = serde_json::Deserializer::from_str(&out)
            .into_iter::<serde_json::Value>()
            .map(|v| v.unwrap()["record_id"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(ids, ["3", "2", "1"]);
        assert!(sink.is_empty());

        let ledger = log.ledger();
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.acquired(HandleKind::Record), 3);
        assert_eq!(ledger.released(HandleKind::Record), 3);
        assert_eq!(ledger.double_releases(), 0);
    }

    #[test]
    fn test_last_record_releases_rest_of_batch() {
        let log = log_with(&[10, 11, 12]);
        let (outcome, out, _) = drive(&log, QueryMode::LastRecordOnly, OutputMode::Delimited, 3);
        assert_eq!(outcome.unwrap(), StreamOutcome::LastRecord(Some(12)));
        assert!(out.is_empty());
        assert_eq!(log.total_renders(), 1);
        assert_eq!(log.render_count(12), 1);

        let ledger = log.ledger();
        assert_eq!(ledger.acquired(HandleKind::Record), 3);
        assert_eq!(ledger.released(HandleKind::Record), 3);
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_last_record_on_empty_set() {
        let log = log_with(&[]);
        let (outcome, out, _) = drive(&log, QueryMode::LastRecordOnly, OutputMode::Delimited, 1);
        assert_eq!(outcome.unwrap(), StreamOutcome::LastRecord(None));
        assert!(out.is_empty());
    }

    #[test]
    fn test_fetch_error_is_reported() {
        let log = log_with(&[1, 2, 3]);
        log.fail_fetch_after(1, ApiError::Other(1726));
        let (outcome, out, sink) = drive(&log, QueryMode::Default, OutputMode::Delimited, 1);
        assert!(matches!(
            outcome,
            Err(EventLogError::Fetch(ApiError::Other(1726)))
        ));
        assert!(out.starts_with(crate::output::DELIMITED_HEADER));
        assert_eq!(out.matches("||event 3").count(), 1);
        assert_eq!(sink.from_component(COMPONENT).len(), 1);
        assert_eq!(log.ledger().live(), 0);
    }

    #[test]
    fn test_render_error_skips_record() {
        let log = MemoryEventLog::new();
        log.push_event("Application", MemoryEvent::new(1, 1000, "App"));
        log.push_event(
            "Application",
            MemoryEvent::new(2, 1000, "App").failing_render(ApiError::Other(1359)),
        );
        log.push_event("Application", MemoryEvent::new(3, 1000, "App"));

        let (outcome, out, sink) = drive(&log, QueryMode::Default, OutputMode::Structured, 1);
        assert_eq!(
            outcome.unwrap(),
            StreamOutcome::Completed(StreamSummary {
                emitted: 2,
                skipped: 1
            })
        );
        assert_eq!(out.matches("\"record_id\"").count(), 2);
        assert_eq!(sink.from_component(COMPONENT).len(), 1);
        assert_eq!(log.ledger().live(), 0);
        assert_eq!(log.ledger().released(HandleKind::Record), 3);
    }

    #[test]
    fn test_allocation_failure_ends_stream() {
        let log = MemoryEventLog::new();
        log.push_event("Application", MemoryEvent::new(1, 1000, "App"));
        log.push_event(
            "Application",
            MemoryEvent::new(2, 1000, "App").failing_probe(ApiError::InsufficientBuffer {
                required: usize::MAX,
            }),
        );
        log.push_event("Application", MemoryEvent::new(3, 1000, "App"));

        let (outcome, out, sink) = drive(&log, QueryMode::Default, OutputMode::Structured, 3);
        assert!(matches!(
            outcome,
            Err(EventLogError::Allocation {
                required: usize::MAX
            })
        ));
        assert_eq!(out.matches("\"record_id\"").count(), 1);
        assert!(out.contains("\"record_id\":\"3\""));
        assert!(!out.contains("\"record_id\":\"1\""));
        assert_eq!(sink.from_component(COMPONENT).len(), 1);

        let ledger = log.ledger();
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.released(HandleKind::Record), 3);
        assert_eq!(ledger.double_releases(), 0);
    }

    #[test]
    fn test_last_record_skips_unrenderable_newest() {
        let log = MemoryEventLog::new();
        log.push_event("Application", MemoryEvent::new(4, 1000, "App"));
        log.push_event(
            "Application",
            MemoryEvent::new(5, 1000, "App").failing_probe(ApiError::Other(87)),
        );
        let (outcome, _, _) = drive(&log, QueryMode::LastRecordOnly, OutputMode::Structured, 1);
        assert_eq!(outcome.unwrap(), StreamOutcome::LastRecord(Some(4)));
    }
}
