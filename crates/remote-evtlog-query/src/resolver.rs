//! Best-effort lookup of the human-readable message for a record.

use remote_evtlog_core::{
    ApiError, Diagnostics, EventLogApi, decode_wide, escape_backslashes, probe_then_allocate,
};

const COMPONENT: &str = "MessageResolver";

/// Outcome of a message lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Message text, backslash-escaped for embedding.
    Message(String),
    /// Publisher metadata is available but yielded no message.
    NoMessage,
    /// Publisher metadata could not be opened.
    NoPublisher,
}

impl Resolution {
    /// The message, if any.
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        match self {
            Self::Message(text) => Some(text),
            Self::NoMessage | Self::NoPublisher => None,
        }
    }
}

/// Resolves provider messages. Never fails the stream.
pub struct MessageResolver<'a, A: EventLogApi> {
    api: &'a A,
    diagnostics: &'a Diagnostics,
}

impl<'a, A: EventLogApi> MessageResolver<'a, A> {
    #[must_use]
    pub const fn new(api: &'a A, diagnostics: &'a Diagnostics) -> Self {
        Self { api, diagnostics }
    }

    /// Look up the message `publisher` defines for `record`.
    pub fn resolve(&self, session: &A::Session, publisher: &str, record: &A::Record) -> Resolution {
        // Unregistered publishers are common; reporting them would flood the output.
        let Ok(metadata) = self.api.open_publisher(session, publisher) else {
            self.diagnostics
                .trace(COMPONENT, "Publisher metadata not found. Assume empty");
            return Resolution::NoPublisher;
        };
        self.diagnostics.trace(
            COMPONENT,
            "Publisher metadata found. Attempting to get message string",
        );

        let formatted =
            probe_then_allocate(|buf| self.api.format_message(&metadata, record, buf));
        drop(metadata);

        match formatted {
            Ok(units) => Resolution::Message(escape_backslashes(&decode_wide(&units))),
            Err(e)
                if matches!(
                    e.api_error(),
                    Some(ApiError::MessageNotFound | ApiError::MessageIdNotFound)
                ) =>
            {
                self.diagnostics
                    .trace(COMPONENT, "Message string not found. Assume empty");
                Resolution::NoMessage
            }
            Err(e) => {
                self.diagnostics
                    .error(COMPONENT, format!("EvtFormatMessage failed: {e}"));
                Resolution::NoMessage
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use remote_evtlog_core::{
        DebugLevel, MemorySink, QueryFlags, RemoteLogin,
        backend::{HandleKind, MemoryEvent, MemoryEventLog, MessageSource},
    };

    use super::*;

    fn resolve_one(log: &MemoryEventLog, level: DebugLevel) -> (Resolution, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let diag = Diagnostics::new(level, sink.clone());
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
        let record = log.next_batch(&mut results, 1).unwrap().remove(0);
        let resolution = MessageResolver::new(log, &diag).resolve(&session, "Contoso", &record);
        (resolution, sink)
    }

    #[test]
    fn test_message_is_escaped() {
        let log = MemoryEventLog::new();
        log.register_publisher("Contoso");
        log.push_event(
            "Application",
            MemoryEvent::new(1, 1000, "Contoso").with_message(r"Faulting module C:\app\x.dll"),
        );
        let (resolution, sink) = resolve_one(&log, DebugLevel::Basic);
        assert_eq!(
            resolution,
            Resolution::Message(r"Faulting module C:\\app\\x.dll".to_owned())
        );
        assert!(sink.is_empty());
        assert_eq!(log.ledger().live_of(HandleKind::Publisher), 0);
    }

    #[test]
    fn test_missing_publisher_is_silent() {
        let log = MemoryEventLog::new();
        log.push_event("Application", MemoryEvent::new(1, 1000, "Contoso"));
        let (resolution, sink) = resolve_one(&log, DebugLevel::Basic);
        assert_eq!(resolution, Resolution::NoPublisher);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_missing_message_is_silent() {
        for source in [MessageSource::NotFound, MessageSource::IdNotFound] {
            let log = MemoryEventLog::new();
            log.register_publisher("Contoso");
            log.push_event(
                "Application",
                MemoryEvent::new(1, 1000, "Contoso").with_message_source(source),
            );
            let (resolution, sink) = resolve_one(&log, DebugLevel::Basic);
            assert_eq!(resolution, Resolution::NoMessage);
            assert!(sink.is_empty());
        }
    }

    #[test]
    fn test_missing_message_after_sizing_is_silent() {
        for error in [ApiError::MessageNotFound, ApiError::MessageIdNotFound] {
            let log = MemoryEventLog::new();
            log.register_publisher("Contoso");
            log.push_event(
                "Application",
                MemoryEvent::new(1, 1000, "Contoso")
                    .with_message_source(MessageSource::FailFill(error)),
            );
            let (resolution, sink) = resolve_one(&log, DebugLevel::Basic);
            assert_eq!(resolution, Resolution::NoMessage);
            assert!(sink.is_empty());
        }
    }

    #[test]
    fn test_failure_after_sizing_is_reported() {
        let log = MemoryEventLog::new();
        log.register_publisher("Contoso");
        log.push_event(
            "Application",
            MemoryEvent::new(1, 1000, "Contoso")
                .with_message_source(MessageSource::FailFill(ApiError::Other(1815))),
        );
        let (resolution, sink) = resolve_one(&log, DebugLevel::Silent);
        assert_eq!(resolution, Resolution::NoMessage);
        assert_eq!(sink.from_component(COMPONENT).len(), 1);
    }

    #[test]
    fn test_unexpected_failure_is_reported() {
        let log = MemoryEventLog::new();
        log.register_publisher("Contoso");
        log.push_event(
            "Application",
            MemoryEvent::new(1, 1000, "Contoso")
                .with_message_source(MessageSource::Fail(ApiError::Other(15029))),
        );
        let (resolution, sink) = resolve_one(&log, DebugLevel::Silent);
        assert_eq!(resolution, Resolution::NoMessage);
        assert_eq!(sink.from_component(COMPONENT).len(), 1);
    }

    #[test]
    fn test_verbose_traces_lookup() {
        let log = MemoryEventLog::new();
        log.push_event("Application", MemoryEvent::new(1, 1000, "Contoso"));
        let (_, sink) = resolve_one(&log, DebugLevel::Verbose);
        assert_eq!(sink.from_component(COMPONENT).len(), 1);
    }
}
