//! The seam between query logic and the remote event log service.

use thiserror::Error;

/// Win32 status codes surfaced by the event log service.
pub mod codes {
    pub const ERROR_OUTOFMEMORY: u32 = 14;
    pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
    pub const ERROR_NO_MORE_ITEMS: u32 = 259;
    pub const ERROR_EVT_INVALID_QUERY: u32 = 15001;
    pub const ERROR_EVT_CHANNEL_NOT_FOUND: u32 = 15007;
    pub const ERROR_EVT_MESSAGE_NOT_FOUND: u32 = 15027;
    pub const ERROR_EVT_MESSAGE_ID_NOT_FOUND: u32 = 15028;
}

/// Failure reported by an event log service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Destination buffer too small; `required` is in UTF-16 code units.
    #[error("Insufficient buffer (required {required} units)")]
    InsufficientBuffer { required: usize },
    #[error("No more items")]
    NoMoreItems,
    #[error("Channel not found")]
    ChannelNotFound,
    #[error("Invalid query")]
    InvalidQuery,
    #[error("Message not found")]
    MessageNotFound,
    #[error("Message id not found")]
    MessageIdNotFound,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Windows error {0}")]
    Other(u32),
}

impl ApiError {
    /// Map a raw status code. `required` is only used for buffer-too-small.
    #[must_use]
    pub const fn from_code(code: u32, required: usize) -> Self {
        match code {
            codes::ERROR_INSUFFICIENT_BUFFER => Self::InsufficientBuffer { required },
            codes::ERROR_NO_MORE_ITEMS => Self::NoMoreItems,
            codes::ERROR_EVT_CHANNEL_NOT_FOUND => Self::ChannelNotFound,
            codes::ERROR_EVT_INVALID_QUERY => Self::InvalidQuery,
            codes::ERROR_EVT_MESSAGE_NOT_FOUND => Self::MessageNotFound,
            codes::ERROR_EVT_MESSAGE_ID_NOT_FOUND => Self::MessageIdNotFound,
            codes::ERROR_OUTOFMEMORY => Self::OutOfMemory,
            other => Self::Other(other),
        }
    }

    /// The raw status code.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::InsufficientBuffer { .. } => codes::ERROR_INSUFFICIENT_BUFFER,
            Self::NoMoreItems => codes::ERROR_NO_MORE_ITEMS,
            Self::ChannelNotFound => codes::ERROR_EVT_CHANNEL_NOT_FOUND,
            Self::InvalidQuery => codes::ERROR_EVT_INVALID_QUERY,
            Self::MessageNotFound => codes::ERROR_EVT_MESSAGE_NOT_FOUND,
            Self::MessageIdNotFound => codes::ERROR_EVT_MESSAGE_ID_NOT_FOUND,
            Self::OutOfMemory => codes::ERROR_OUTOFMEMORY,
            Self::Other(code) => *code,
        }
    }
}

/// Login material handed to [`EventLogApi::open_session`].
///
/// Borrowed for the duration of the call only; the caller owns (and scrubs)
/// the underlying credentials.
#[derive(Clone, Copy)]
pub struct RemoteLogin<'a> {
    pub server: &'a str,
    /// `None` selects the default/local authentication domain.
    pub domain: Option<&'a str>,
    pub user: &'a str,
    pub password: &'a str,
}

impl std::fmt::Debug for RemoteLogin<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLogin")
            .field("server", &self.server)
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Flags for [`EventLogApi::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryFlags {
    /// The path names a channel (as opposed to a log file).
    pub channel_path: bool,
    /// Yield newest records first.
    pub reverse_direction: bool,
}

impl QueryFlags {
    /// Channel path, newest first.
    #[must_use]
    pub const fn reverse_channel() -> Self {
        Self {
            channel_path: true,
            reverse_direction: true,
        }
    }
}

/// Operations of the remote event log service.
///
/// Every handle type releases its underlying resource exactly once, when
/// dropped. A handle is never released any other way.
pub trait EventLogApi {
    /// Authenticated connection context to a host.
    type Session;
    /// Open server-side enumeration cursor.
    type ResultSet;
    /// One unparsed record.
    type Record;
    /// Provider metadata holding message templates.
    type Publisher;

    /// Create a session context. Does not necessarily connect.
    ///
    /// # Errors
    /// Returns error if the context cannot be created.
    fn open_session(&self, login: &RemoteLogin<'_>) -> Result<Self::Session, ApiError>;

    /// Open a cursor over `channel`. `None` matches every record.
    ///
    /// # Errors
    /// Returns error if the channel is unknown or the query is malformed.
    fn query(
        &self,
        session: &Self::Session,
        channel: &str,
        query: Option<&str>,
        flags: QueryFlags,
    ) -> Result<Self::ResultSet, ApiError>;

    /// Fetch up to `max` records.
    ///
    /// # Errors
    /// Returns [`ApiError::NoMoreItems`] once the cursor is exhausted.
    fn next_batch(
        &self,
        results: &mut Self::ResultSet,
        max: usize,
    ) -> Result<Vec<Self::Record>, ApiError>;

    /// Render a record as event XML into `buffer`, returning the units used.
    ///
    /// # Errors
    /// Returns [`ApiError::InsufficientBuffer`] with the required size when
    /// `buffer` is too small.
    fn render_xml(&self, record: &Self::Record, buffer: &mut [u16]) -> Result<usize, ApiError>;

    /// Open provider metadata for `publisher`.
    ///
    /// # Errors
    /// Returns error if the publisher is not registered on the host.
    fn open_publisher(
        &self,
        session: &Self::Session,
        publisher: &str,
    ) -> Result<Self::Publisher, ApiError>;

    /// Format the event message text into `buffer`, returning the units used.
    ///
    /// # Errors
    /// Returns [`ApiError::InsufficientBuffer`] with the required size when
    /// `buffer` is too small, or a message lookup failure.
    fn format_message(
        &self,
        publisher: &Self::Publisher,
        record: &Self::Record,
        buffer: &mut [u16],
    ) -> Result<usize, ApiError>;
}

impl<T: EventLogApi + ?Sized> EventLogApi for &T {
    type Session = T::Session;
    type ResultSet = T::ResultSet;
    type Record = T::Record;
    type Publisher = T::Publisher;

    fn open_session(&self, login: &RemoteLogin<'_>) -> Result<Self::Session, ApiError> {
        (**self).open_session(login)
    }

    fn query(
        &self,
        session: &Self::Session,
        channel: &str,
        query: Option<&str>,
        flags: QueryFlags,
    ) -> Result<Self::ResultSet, ApiError> {
        (**self).query(session, channel, query, flags)
    }

    fn next_batch(
        &self,
        results: &mut Self::ResultSet,
        max: usize,
    ) -> Result<Vec<Self::Record>, ApiError> {
        (**self).next_batch(results, max)
    }

    fn render_xml(&self, record: &Self::Record, buffer: &mut [u16]) -> Result<usize, ApiError> {
        (**self).render_xml(record, buffer)
    }

    fn open_publisher(
        &self,
        session: &Self::Session,
        publisher: &str,
    ) -> Result<Self::Publisher, ApiError> {
        (**self).open_publisher(session, publisher)
    }

    fn format_message(
        &self,
        publisher: &Self::Publisher,
        record: &Self::Record,
        buffer: &mut [u16],
    ) -> Result<usize, ApiError> {
        (**self).format_message(publisher, record, buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        for err in [
            ApiError::NoMoreItems,
            ApiError::ChannelNotFound,
            ApiError::InvalidQuery,
            ApiError::MessageNotFound,
            ApiError::MessageIdNotFound,
            ApiError::OutOfMemory,
            ApiError::Other(5),
        ] {
            assert_eq!(ApiError::from_code(err.code(), 0), err);
        }
        assert_eq!(
            ApiError::from_code(122, 64),
            ApiError::InsufficientBuffer { required: 64 }
        );
    }

    #[test]
    fn test_login_debug_redacts_password() {
        let login = RemoteLogin {
            server: "dc01",
            domain: None,
            user: "admin",
            password: "hunter2",
        };
        let debug = format!("{login:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
