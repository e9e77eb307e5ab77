//! Remote session establishment.

use remote_evtlog_core::{Diagnostics, EventLogApi, RemoteLogin, RemoteTarget};
use zeroize::Zeroizing;

use crate::error::EventLogError;

const COMPONENT: &str = "SessionFactory";

/// Opens authenticated session contexts on a target host.
pub struct SessionFactory<'a, A: EventLogApi> {
    api: &'a A,
    diagnostics: &'a Diagnostics,
}

impl<'a, A: EventLogApi> SessionFactory<'a, A> {
    #[must_use]
    pub const fn new(api: &'a A, diagnostics: &'a Diagnostics) -> Self {
        Self { api, diagnostics }
    }

    /// Open a session on `target.host`.
    ///
    /// An empty domain selects default authentication. The credential copies
    /// made for the call are zeroed before this returns, on every path.
    /// Success does not mean the host is reachable; that surfaces on the
    /// first query or fetch.
    ///
    /// # Errors
    /// Returns [`EventLogError::Session`] if the context cannot be created.
    pub fn open(&self, target: &RemoteTarget) -> Result<A::Session, EventLogError> {
        let domain = if target.domain.is_empty() {
            self.diagnostics
                .basic(COMPONENT, "Empty domain supplied. Using default authentication");
            None
        } else {
            Some(Zeroizing::new(target.domain.clone()))
        };
        let user = Zeroizing::new(target.username.clone());
        let password = Zeroizing::new(target.password.as_str().to_owned());

        self.diagnostics.trace(
            COMPONENT,
            format!(
                "Attempting to connect to '{}' on domain '{}' as '{}'",
                target.host,
                domain.as_deref().map_or("", String::as_str),
                user.as_str()
            ),
        );

        let login = RemoteLogin {
            server: &target.host,
            domain: domain.as_deref().map(String::as_str),
            user: &user,
            password: &password,
        };
        let result = self.api.open_session(&login);
        drop((domain, user, password));

        result.map_err(|e| {
            self.diagnostics.error(
                COMPONENT,
                format!(
                    "Failed to connect to remote computer. Error code is {}",
                    e.code()
                ),
            );
            EventLogError::Session(e)
        })
    }
}
