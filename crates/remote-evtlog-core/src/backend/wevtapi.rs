//! Windows event log service (wevtapi) backend.

use std::ptr;

use windows_sys::Win32::{
    Foundation::GetLastError,
    System::EventLog::{
        EVT_HANDLE, EVT_RPC_LOGIN, EvtClose, EvtFormatMessage, EvtFormatMessageEvent, EvtNext,
        EvtOpenPublisherMetadata, EvtOpenSession, EvtQuery, EvtQueryChannelPath,
        EvtQueryReverseDirection, EvtRender, EvtRenderEventXml, EvtRpcLogin,
        EvtRpcLoginAuthNegotiate,
    },
};
use zeroize::Zeroizing;

use crate::api::{ApiError, EventLogApi, QueryFlags, RemoteLogin};

const INFINITE: u32 = u32::MAX;

fn null_handle() -> EVT_HANDLE {
    0 as EVT_HANDLE
}

fn is_null(handle: EVT_HANDLE) -> bool {
    handle as usize == 0
}

fn last_error(required: usize) -> ApiError {
    // SAFETY: reads thread-local error state only.
    let code = unsafe { GetLastError() };
    ApiError::from_code(code, required)
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(Some(0)).collect()
}

fn to_wide_secret(s: &str) -> Zeroizing<Vec<u16>> {
    Zeroizing::new(to_wide(s))
}

fn buffer_len(buffer: &[u16]) -> u32 {
    u32::try_from(buffer.len()).unwrap_or(u32::MAX)
}

/// Owned `EVT_HANDLE`, closed on drop.
pub struct EvtHandle(EVT_HANDLE);

// SAFETY: wevtapi handles are not tied to the creating thread.
unsafe impl Send for EvtHandle {}

impl EvtHandle {
    fn from_raw(handle: EVT_HANDLE) -> Option<Self> {
        if is_null(handle) { None } else { Some(Self(handle)) }
    }

    const fn raw(&self) -> EVT_HANDLE {
        self.0
    }
}

impl Drop for EvtHandle {
    fn drop(&mut self) {
        // SAFETY: the handle is live and owned by this wrapper.
        unsafe {
            EvtClose(self.0);
        }
    }
}

/// wevtapi-backed [`EventLogApi`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WevtApi;

impl WevtApi {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventLogApi for WevtApi {
    type Session = EvtHandle;
    type ResultSet = EvtHandle;
    type Record = EvtHandle;
    type Publisher = EvtHandle;

    fn open_session(&self, login: &RemoteLogin<'_>) -> Result<EvtHandle, ApiError> {
        let mut server = to_wide(login.server);
        let mut user = to_wide_secret(login.user);
        let mut password = to_wide_secret(login.password);
        let mut domain = login.domain.map(to_wide_secret);

        let rpc_login = EVT_RPC_LOGIN {
            Server: server.as_mut_ptr(),
            User: user.as_mut_ptr(),
            Domain: domain
                .as_mut()
                .map_or(ptr::null_mut(), |d| d.as_mut_ptr()),
            Password: password.as_mut_ptr(),
            Flags: EvtRpcLoginAuthNegotiate as u32,
        };

        // SAFETY: every pointer in `rpc_login` refers to a NUL-terminated
        // buffer that outlives the call.
        let handle = unsafe {
            EvtOpenSession(
                EvtRpcLogin,
                ptr::from_ref(&rpc_login).cast(),
                0,
                0,
            )
        };
        let error = if is_null(handle) { Some(last_error(0)) } else { None };
        drop((user, password, domain));

        match EvtHandle::from_raw(handle) {
            Some(session) => Ok(session),
            None => Err(error.unwrap_or(ApiError::Other(0))),
        }
    }

    fn query(
        &self,
        session: &EvtHandle,
        channel: &str,
        query: Option<&str>,
        flags: QueryFlags,
    ) -> Result<EvtHandle, ApiError> {
        let channel = to_wide(channel);
        let query = query.map(to_wide);
        let mut raw_flags = 0u32;
        if flags.channel_path {
            raw_flags |= EvtQueryChannelPath as u32;
        }
        if flags.reverse_direction {
            raw_flags |= EvtQueryReverseDirection as u32;
        }

        // SAFETY: path and query are NUL-terminated and outlive the call.
        let handle = unsafe {
            EvtQuery(
                session.raw(),
                channel.as_ptr(),
                query.as_ref().map_or(ptr::null(), |q| q.as_ptr()),
                raw_flags,
            )
        };
        EvtHandle::from_raw(handle).ok_or_else(|| last_error(0))
    }

    fn next_batch(&self, results: &mut EvtHandle, max: usize) -> Result<Vec<EvtHandle>, ApiError> {
        let max = max.max(1);
        let mut events = vec![null_handle(); max];
        let mut returned = 0u32;

        // SAFETY: `events` has room for `max` handles.
        let ok = unsafe {
            EvtNext(
                results.raw(),
                u32::try_from(max).unwrap_or(u32::MAX),
                events.as_mut_ptr(),
                INFINITE,
                0,
                &raw mut returned,
            )
        };
        if ok == 0 {
            return Err(last_error(0));
        }

        let returned = usize::try_from(returned).unwrap_or(0).min(max);
        Ok(events
            .into_iter()
            .take(returned)
            .filter_map(EvtHandle::from_raw)
            .collect())
    }

    fn render_xml(&self, record: &EvtHandle, buffer: &mut [u16]) -> Result<usize, ApiError> {
        let mut used_bytes = 0u32;
        let mut property_count = 0u32;
        let size_bytes = buffer_len(buffer).saturating_mul(2);

        // SAFETY: `buffer` is valid for `size_bytes` bytes.
        let ok = unsafe {
            EvtRender(
                null_handle(),
                record.raw(),
                EvtRenderEventXml as u32,
                size_bytes,
                if buffer.is_empty() {
                    ptr::null_mut()
                } else {
                    buffer.as_mut_ptr().cast()
                },
                &raw mut used_bytes,
                &raw mut property_count,
            )
        };
        let units = (used_bytes as usize).div_ceil(2);
        if ok == 0 {
            return Err(last_error(units));
        }
        Ok(units)
    }

    fn open_publisher(&self, session: &EvtHandle, publisher: &str) -> Result<EvtHandle, ApiError> {
        let publisher = to_wide(publisher);

        // SAFETY: `publisher` is NUL-terminated and outlives the call.
        let handle = unsafe {
            EvtOpenPublisherMetadata(session.raw(), publisher.as_ptr(), ptr::null(), 0, 0)
        };
        EvtHandle::from_raw(handle).ok_or_else(|| last_error(0))
    }

    fn format_message(
        &self,
        publisher: &EvtHandle,
        record: &EvtHandle,
        buffer: &mut [u16],
    ) -> Result<usize, ApiError> {
        let mut used = 0u32;

        // SAFETY: `buffer` is valid for `buffer.len()` UTF-16 units.
        let ok = unsafe {
            EvtFormatMessage(
                publisher.raw(),
                record.raw(),
                0,
                0,
                ptr::null(),
                EvtFormatMessageEvent as u32,
                buffer_len(buffer),
                if buffer.is_empty() {
                    ptr::null_mut()
                } else {
                    buffer.as_mut_ptr()
                },
                &raw mut used,
            )
        };
        if ok == 0 {
            return Err(last_error(used as usize));
        }
        Ok(used as usize)
    }
}
