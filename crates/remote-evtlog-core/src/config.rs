//! Invocation configuration.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{DebugLevel, OutputMode};

/// Channel read when no log name is supplied.
pub const DEFAULT_LOG_NAME: &str = "Application";

/// Query string that selects "latest record id only".
pub const LAST_RECORD_SENTINEL: &str = "LAST_RECORD";

/// Records fetched per round-trip.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Host and credentials for one invocation.
#[derive(Clone, Deserialize)]
pub struct RemoteTarget {
    /// IP or host name.
    pub host: String,
    /// Authentication domain; empty selects the default.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub username: String,
    /// Zeroed when dropped.
    #[serde(default = "empty_password")]
    pub password: Zeroizing<String>,
}

fn empty_password() -> Zeroizing<String> {
    Zeroizing::new(String::new())
}

impl Default for RemoteTarget {
    fn default() -> Self {
        Self::new("", "", "", "")
    }
}

impl RemoteTarget {
    /// Create a target.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        domain: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            domain: domain.into(),
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

impl std::fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("host", &self.host)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// What to read and how to emit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Channel name; empty selects [`DEFAULT_LOG_NAME`].
    pub log_name: String,
    /// XPath filter; empty or `None` matches everything.
    pub query: Option<String>,
    pub output: OutputMode,
    pub debug: DebugLevel,
    /// Records per fetch. Zero is treated as one.
    pub batch_size: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            log_name: DEFAULT_LOG_NAME.to_owned(),
            query: None,
            output: OutputMode::default(),
            debug: DebugLevel::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl QueryOptions {
    /// Options reading `log_name`.
    #[must_use]
    pub fn for_log(log_name: impl Into<String>) -> Self {
        Self {
            log_name: log_name.into(),
            ..Self::default()
        }
    }

    /// Set the query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: DebugLevel) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Batch size with the zero case folded to one.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}
