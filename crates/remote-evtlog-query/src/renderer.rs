//! Conversion of one raw record into a [`StructuredRecord`].

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use remote_evtlog_core::{
    Diagnostics, EventLogApi, QueryMode, Severity, StructuredRecord, decode_wide,
    probe_then_allocate,
};

use crate::{
    error::RenderError,
    resolver::{MessageResolver, Resolution},
};

const COMPONENT: &str = "RecordRenderer";

/// What [`RecordRenderer::render`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Record(StructuredRecord),
    /// [`QueryMode::LastRecordOnly`] fast path: the id alone.
    RecordId(u64),
}

/// Renders raw records, resolving their messages.
pub struct RecordRenderer<'a, A: EventLogApi> {
    api: &'a A,
    diagnostics: &'a Diagnostics,
    resolver: MessageResolver<'a, A>,
}

impl<'a, A: EventLogApi> RecordRenderer<'a, A> {
    #[must_use]
    pub const fn new(api: &'a A, diagnostics: &'a Diagnostics) -> Self {
        Self {
            api,
            diagnostics,
            resolver: MessageResolver::new(api, diagnostics),
        }
    }

    /// Render `record`. In [`QueryMode::LastRecordOnly`] only the record id
    /// is extracted and message resolution is skipped.
    ///
    /// # Errors
    /// Returns error if the record cannot be serialized or lacks a required
    /// system field.
    pub fn render(
        &self,
        session: &A::Session,
        record: &A::Record,
        mode: QueryMode,
    ) -> Result<Rendered, RenderError> {
        self.diagnostics
            .trace(COMPONENT, "Attempting to read event XML with no buffer");
        let units = probe_then_allocate(|buf| self.api.render_xml(record, buf))
            .map_err(RenderError::Serialize)?;
        self.diagnostics
            .trace(COMPONENT, format!("Read {} units of event XML", units.len()));

        let xml = decode_wide(&units);
        drop(units);
        if self.diagnostics.enabled(Severity::Trace) {
            self.diagnostics.trace(COMPONENT, format!("Raw XML: {xml}"));
        }

        let fields = SystemFields::parse(&xml)?;
        let record_id = fields.record_id()?;
        if mode == QueryMode::LastRecordOnly {
            return Ok(Rendered::RecordId(record_id));
        }

        let provider = required(fields.provider.as_ref(), "Provider")?;
        self.diagnostics
            .trace(COMPONENT, format!("Publisher is: {provider}"));
        let resolution = self.resolver.resolve(session, provider, record);
        let provider_name = if resolution == Resolution::NoPublisher {
            String::new()
        } else {
            provider.to_owned()
        };

        Ok(Rendered::Record(StructuredRecord {
            record_id,
            event_id: required(fields.event_id.as_ref(), "EventID")?.to_owned(),
            channel: required(fields.channel.as_ref(), "Channel")?.to_owned(),
            provider_name,
            computer: required(fields.computer.as_ref(), "Computer")?.to_owned(),
            time_created: required(fields.time_created.as_ref(), "TimeCreated")?.to_owned(),
            task: required(fields.task.as_ref(), "Task")?.to_owned(),
            level: required(fields.level.as_ref(), "Level")?.to_owned(),
            message: resolution.into_message().unwrap_or_default(),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum TextField {
    RecordId,
    EventId,
    Channel,
    Computer,
    Task,
    Level,
}

/// Required `<System>` values of an event document.
#[derive(Debug, Default)]
struct SystemFields {
    record_id: Option<String>,
    event_id: Option<String>,
    channel: Option<String>,
    provider: Option<String>,
    computer: Option<String>,
    time_created: Option<String>,
    task: Option<String>,
    level: Option<String>,
}

impl SystemFields {
    fn parse(xml: &str) -> Result<Self, RenderError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut fields = Self::default();
        let mut in_system = false;
        let mut current: Option<TextField> = None;
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if e.local_name().as_ref() == b"System" {
                        in_system = true;
                    } else if in_system {
                        current = fields.open(&e)?;
                    }
                }
                Event::Empty(e) if in_system => {
                    fields.open(&e)?;
                }
                Event::Text(t) => {
                    if let Some(field) = current {
                        fields.slot(field).push_str(&t.unescape()?);
                    }
                }
                Event::End(e) => {
                    current = None;
                    if e.local_name().as_ref() == b"System" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(fields)
    }

    /// Record that `e` was seen; returns the field its text fills, if any.
    fn open(&mut self, e: &BytesStart<'_>) -> Result<Option<TextField>, RenderError> {
        let field = match e.local_name().as_ref() {
            b"EventRecordID" => TextField::RecordId,
            b"EventID" => TextField::EventId,
            b"Channel" => TextField::Channel,
            b"Computer" => TextField::Computer,
            b"Task" => TextField::Task,
            b"Level" => TextField::Level,
            b"Provider" => {
                self.provider = attribute(e, "Name")?;
                return Ok(None);
            }
            b"TimeCreated" => {
                self.time_created = attribute(e, "SystemTime")?;
                return Ok(None);
            }
            _ => return Ok(None),
        };
        self.slot(field);
        Ok(Some(field))
    }

    fn slot(&mut self, field: TextField) -> &mut String {
        let slot = match field {
            TextField::RecordId => &mut self.record_id,
            TextField::EventId => &mut self.event_id,
            TextField::Channel => &mut self.channel,
            TextField::Computer => &mut self.computer,
            TextField::Task => &mut self.task,
            TextField::Level => &mut self.level,
        };
        slot.get_or_insert_with(String::new)
    }

    fn record_id(&self) -> Result<u64, RenderError> {
        let raw = required(self.record_id.as_ref(), "EventRecordID")?;
        raw.trim()
            .parse()
            .map_err(|_| RenderError::InvalidRecordId(raw.to_owned()))
    }
}

fn required<'s>(value: Option<&'s String>, name: &'static str) -> Result<&'s str, RenderError> {
    value.map(String::as_str).ok_or(RenderError::MissingField(name))
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, RenderError> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}
