//! In-memory event log.
//!
//! Useful for tests and offline development. Every handle it hands out is
//! tracked in a [`HandleLedger`], so callers can check that each one is
//! released exactly once.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, RwLock},
};

use crate::{
    api::{ApiError, EventLogApi, QueryFlags, RemoteLogin},
    config::DEFAULT_LOG_NAME,
};

/// Status returned when a publisher is not registered.
const ERROR_FILE_NOT_FOUND: u32 = 2;

/// Kind of handle tracked by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Session,
    ResultSet,
    Record,
    Publisher,
}

#[derive(Default)]
struct LedgerInner {
    next_id: u64,
    live: HashMap<u64, HandleKind>,
    acquired: HashMap<HandleKind, usize>,
    released: HashMap<HandleKind, usize>,
    double_releases: usize,
}

/// Acquire/release bookkeeping for every handle the backend issues.
#[derive(Default)]
pub struct HandleLedger {
    inner: Mutex<LedgerInner>,
}

impl HandleLedger {
    fn acquire(self: &Arc<Self>, kind: HandleKind) -> Handle {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.live.insert(id, kind);
        *inner.acquired.entry(kind).or_default() += 1;
        Handle {
            id,
            ledger: Arc::clone(self),
        }
    }

    fn release(&self, id: u64) {
        let mut inner = self.lock();
        match inner.live.remove(&id) {
            Some(kind) => *inner.released.entry(kind).or_default() += 1,
            None => inner.double_releases += 1,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Handles acquired and not yet released.
    #[must_use]
    pub fn live(&self) -> usize {
        self.lock().live.len()
    }

    /// Live handles of `kind`.
    #[must_use]
    pub fn live_of(&self, kind: HandleKind) -> usize {
        self.lock().live.values().filter(|&&k| k == kind).count()
    }

    #[must_use]
    pub fn acquired(&self, kind: HandleKind) -> usize {
        self.lock().acquired.get(&kind).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn released(&self, kind: HandleKind) -> usize {
        self.lock().released.get(&kind).copied().unwrap_or(0)
    }

    /// Releases of handles that were not live.
    #[must_use]
    pub fn double_releases(&self) -> usize {
        self.lock().double_releases
    }
}

/// One ledger entry; released on drop.
struct Handle {
    id: u64,
    ledger: Arc<HandleLedger>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.ledger.release(self.id);
    }
}

/// How the provider message for an event resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSource {
    Text(String),
    NotFound,
    IdNotFound,
    Fail(ApiError),
    /// Sizing succeeds but the sized call fails.
    FailFill(ApiError),
}

/// Where rendering an event as XML fails, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderFault {
    Probe(ApiError),
    Fill(ApiError),
}

/// An event stored in the in-memory log.
#[derive(Debug, Clone)]
pub struct MemoryEvent {
    pub record_id: u64,
    pub event_id: String,
    pub provider: String,
    pub computer: String,
    pub time_created: String,
    pub task: String,
    pub level: String,
    pub message: MessageSource,
    raw_xml: Option<String>,
    render_fault: Option<RenderFault>,
}

impl MemoryEvent {
    /// An event with plausible system fields and no message.
    #[must_use]
    pub fn new(record_id: u64, event_id: u32, provider: impl Into<String>) -> Self {
        Self {
            record_id,
            event_id: event_id.to_string(),
            provider: provider.into(),
            computer: "WIN-HOST01".to_owned(),
            time_created: format!("2024-03-01T12:00:{:02}.000000000Z", record_id % 60),
            task: "0".to_owned(),
            level: "4".to_owned(),
            message: MessageSource::NotFound,
            raw_xml: None,
            render_fault: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = MessageSource::Text(message.into());
        self
    }

    #[must_use]
    pub fn with_message_source(mut self, message: MessageSource) -> Self {
        self.message = message;
        self
    }

    #[must_use]
    pub fn with_computer(mut self, computer: impl Into<String>) -> Self {
        self.computer = computer.into();
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Serve this XML verbatim instead of the generated document.
    #[must_use]
    pub fn with_raw_xml(mut self, xml: impl Into<String>) -> Self {
        self.raw_xml = Some(xml.into());
        self
    }

    /// Fail the size probe with `error`.
    #[must_use]
    pub fn failing_probe(mut self, error: ApiError) -> Self {
        self.render_fault = Some(RenderFault::Probe(error));
        self
    }

    /// Fail the sized render call with `error`.
    #[must_use]
    pub fn failing_render(mut self, error: ApiError) -> Self {
        self.render_fault = Some(RenderFault::Fill(error));
        self
    }

    /// The event XML as the service would render it.
    #[must_use]
    pub fn to_xml(&self, channel: &str) -> String {
        if let Some(raw) = &self.raw_xml {
            return raw.clone();
        }
        format!(
            "<Event xmlns='http://schemas.microsoft.com/win/2004/08/events/event'>\
             <System>\
             <Provider Name='{provider}'/>\
             <EventID Qualifiers='0'>{event_id}</EventID>\
             <Version>0</Version>\
             <Level>{level}</Level>\
             <Task>{task}</Task>\
             <Opcode>0</Opcode>\
             <Keywords>0x80000000000000</Keywords>\
             <TimeCreated SystemTime='{time}'/>\
             <EventRecordID>{record_id}</EventRecordID>\
             <Correlation/>\
             <Execution ProcessID='0' ThreadID='0'/>\
             <Channel>{channel}</Channel>\
             <Computer>{computer}</Computer>\
             <Security/>\
             </System>\
             <EventData><Data>payload</Data></EventData>\
             </Event>",
            provider = xml_attr(&self.provider),
            event_id = self.event_id,
            level = self.level,
            task = self.task,
            time = self.time_created,
            record_id = self.record_id,
            channel = xml_text(channel),
            computer = xml_text(&self.computer),
        )
    }
}

fn xml_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn xml_attr(s: &str) -> String {
    xml_text(s).replace('\'', "&apos;").replace('"', "&quot;")
}

/// A login as received by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRecord {
    pub server: String,
    pub domain: Option<String>,
    pub user: String,
}

/// A query as received by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    pub channel: String,
    pub query: Option<String>,
    pub flags: QueryFlags,
}

type EventFilter = Box<dyn Fn(&MemoryEvent) -> bool + Send + Sync>;

enum QueryBehavior {
    Reject,
    Filter(EventFilter),
}

struct FetchFault {
    after: usize,
    error: ApiError,
}

/// Session handle.
pub struct MemorySession {
    _handle: Handle,
}

/// Result set handle.
pub struct MemoryResultSet {
    _handle: Handle,
    pending: VecDeque<(Arc<MemoryEvent>, Arc<str>)>,
    fetched: usize,
}

/// Record handle.
pub struct MemoryRecord {
    _handle: Handle,
    event: Arc<MemoryEvent>,
    channel: Arc<str>,
}

/// Publisher metadata handle.
pub struct MemoryPublisher {
    _handle: Handle,
}

/// In-memory event log service.
pub struct MemoryEventLog {
    ledger: Arc<HandleLedger>,
    channels: RwLock<HashMap<String, Vec<Arc<MemoryEvent>>>>,
    publishers: RwLock<Vec<String>>,
    queries_behavior: RwLock<HashMap<String, QueryBehavior>>,
    session_fault: RwLock<Option<ApiError>>,
    fetch_fault: RwLock<Option<FetchFault>>,
    logins: Mutex<Vec<LoginRecord>>,
    queries: Mutex<Vec<QueryRecord>>,
    renders: Mutex<HashMap<u64, usize>>,
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventLog {
    /// An empty log with an empty default channel.
    #[must_use]
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        channels.insert(DEFAULT_LOG_NAME.to_owned(), Vec::new());
        Self {
            ledger: Arc::new(HandleLedger::default()),
            channels: RwLock::new(channels),
            publishers: RwLock::new(Vec::new()),
            queries_behavior: RwLock::new(HashMap::new()),
            session_fault: RwLock::new(None),
            fetch_fault: RwLock::new(None),
            logins: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            renders: Mutex::new(HashMap::new()),
        }
    }

    /// Append `event` to `channel` (creating it). Events are stored oldest first.
    pub fn push_event(&self, channel: &str, event: MemoryEvent) {
        write(&self.channels)
            .entry(channel.to_owned())
            .or_default()
            .push(Arc::new(event));
    }

    /// Create an empty channel.
    pub fn add_channel(&self, channel: &str) {
        write(&self.channels).entry(channel.to_owned()).or_default();
    }

    /// Register provider metadata for `publisher`.
    pub fn register_publisher(&self, publisher: &str) {
        write(&self.publishers).push(publisher.to_owned());
    }

    /// Reject `query` as malformed.
    pub fn reject_query(&self, query: &str) {
        write(&self.queries_behavior).insert(query.to_owned(), QueryBehavior::Reject);
    }

    /// Apply `filter` when `query` is issued. Unregistered queries match everything.
    pub fn register_filter<F>(&self, query: &str, filter: F)
    where
        F: Fn(&MemoryEvent) -> bool + Send + Sync + 'static,
    {
        write(&self.queries_behavior)
            .insert(query.to_owned(), QueryBehavior::Filter(Box::new(filter)));
    }

    /// Fail every session open with `error`.
    pub fn fail_sessions(&self, error: ApiError) {
        *write(&self.session_fault) = Some(error);
    }

    /// After `after` records have been fetched from a cursor, fail the next fetch.
    pub fn fail_fetch_after(&self, after: usize, error: ApiError) {
        *write(&self.fetch_fault) = Some(FetchFault { after, error });
    }

    #[must_use]
    pub fn ledger(&self) -> Arc<HandleLedger> {
        Arc::clone(&self.ledger)
    }

    /// Logins received so far.
    #[must_use]
    pub fn logins(&self) -> Vec<LoginRecord> {
        lock(&self.logins).clone()
    }

    /// Queries received so far.
    #[must_use]
    pub fn queries(&self) -> Vec<QueryRecord> {
        lock(&self.queries).clone()
    }

    /// Sized render calls made for `record_id`.
    #[must_use]
    pub fn render_count(&self, record_id: u64) -> usize {
        lock(&self.renders).get(&record_id).copied().unwrap_or(0)
    }

    /// Sized render calls across all records.
    #[must_use]
    pub fn total_renders(&self) -> usize {
        lock(&self.renders).values().sum()
    }
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn copy_wide(text: &str, buffer: &mut [u16]) -> Result<usize, ApiError> {
    let wide: Vec<u16> = text.encode_utf16().chain(Some(0)).collect();
    if buffer.len() < wide.len() {
        return Err(ApiError::InsufficientBuffer {
            required: wide.len(),
        });
    }
    buffer[..wide.len()].copy_from_slice(&wide);
    Ok(wide.len())
}

impl EventLogApi for MemoryEventLog {
    type Session = MemorySession;
    type ResultSet = MemoryResultSet;
    type Record = MemoryRecord;
    type Publisher = MemoryPublisher;

    fn open_session(&self, login: &RemoteLogin<'_>) -> Result<MemorySession, ApiError> {
        lock(&self.logins).push(LoginRecord {
            server: login.server.to_owned(),
            domain: login.domain.map(str::to_owned),
            user: login.user.to_owned(),
        });
        if let Some(error) = *read(&self.session_fault) {
            return Err(error);
        }
        Ok(MemorySession {
            _handle: self.ledger.acquire(HandleKind::Session),
        })
    }

    fn query(
        &self,
        _session: &MemorySession,
        channel: &str,
        query: Option<&str>,
        flags: QueryFlags,
    ) -> Result<MemoryResultSet, ApiError> {
        lock(&self.queries).push(QueryRecord {
            channel: channel.to_owned(),
            query: query.map(str::to_owned),
            flags,
        });

        let channels = read(&self.channels);
        let events = channels.get(channel).ok_or(ApiError::ChannelNotFound)?;
        let behaviors = read(&self.queries_behavior);
        let filter = match query.and_then(|q| behaviors.get(q)) {
            Some(QueryBehavior::Reject) => return Err(ApiError::InvalidQuery),
            Some(QueryBehavior::Filter(f)) => Some(f),
            None => None,
        };

        let channel: Arc<str> = Arc::from(channel);
        let mut pending: VecDeque<_> = events
            .iter()
            .filter(|e| {
                let event: &MemoryEvent = e;
                filter.is_none_or(|f| f(event))
            })
            .map(|e| (Arc::clone(e), Arc::clone(&channel)))
            .collect();
        if flags.reverse_direction {
            pending.make_contiguous().reverse();
        }

        Ok(MemoryResultSet {
            _handle: self.ledger.acquire(HandleKind::ResultSet),
            pending,
            fetched: 0,
        })
    }

    fn next_batch(
        &self,
        results: &mut MemoryResultSet,
        max: usize,
    ) -> Result<Vec<MemoryRecord>, ApiError> {
        let mut take = max.max(1);
        if let Some(fault) = read(&self.fetch_fault).as_ref() {
            if results.fetched >= fault.after {
                return Err(fault.error);
            }
            take = take.min(fault.after - results.fetched);
        }
        if results.pending.is_empty() {
            return Err(ApiError::NoMoreItems);
        }

        let mut batch = Vec::with_capacity(take);
        while batch.len() < take {
            let Some((event, channel)) = results.pending.pop_front() else {
                break;
            };
            batch.push(MemoryRecord {
                _handle: self.ledger.acquire(HandleKind::Record),
                event,
                channel,
            });
        }
        results.fetched += batch.len();
        Ok(batch)
    }

    fn render_xml(&self, record: &MemoryRecord, buffer: &mut [u16]) -> Result<usize, ApiError> {
        match record.event.render_fault {
            Some(RenderFault::Probe(error)) => return Err(error),
            Some(RenderFault::Fill(error)) if !buffer.is_empty() => return Err(error),
            _ => {}
        }
        let xml = record.event.to_xml(&record.channel);
        let result = copy_wide(&xml, buffer);
        if result.is_ok() {
            *lock(&self.renders).entry(record.event.record_id).or_default() += 1;
        }
        result
    }

    fn open_publisher(
        &self,
        _session: &MemorySession,
        publisher: &str,
    ) -> Result<MemoryPublisher, ApiError> {
        if read(&self.publishers).iter().any(|p| p == publisher) {
            Ok(MemoryPublisher {
                _handle: self.ledger.acquire(HandleKind::Publisher),
            })
        } else {
            Err(ApiError::Other(ERROR_FILE_NOT_FOUND))
        }
    }

    fn format_message(
        &self,
        _publisher: &MemoryPublisher,
        record: &MemoryRecord,
        buffer: &mut [u16],
    ) -> Result<usize, ApiError> {
        match &record.event.message {
            MessageSource::Text(text) => copy_wide(text, buffer),
            MessageSource::NotFound => Err(ApiError::MessageNotFound),
            MessageSource::IdNotFound => Err(ApiError::MessageIdNotFound),
            MessageSource::Fail(error) => Err(*error),
            MessageSource::FailFill(_) if buffer.is_empty() => {
                Err(ApiError::InsufficientBuffer { required: 1 })
            }
            MessageSource::FailFill(error) => Err(*error),
        }
    }
}
