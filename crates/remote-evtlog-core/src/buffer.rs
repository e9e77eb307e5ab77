//! Two-phase "probe, then allocate" buffer sizing.
//!
//! Render and format calls on the event log service report the size they
//! need by failing with [`ApiError::InsufficientBuffer`] when handed an empty
//! destination. [`probe_then_allocate`] performs that dance once for every
//! caller.

use thiserror::Error;

use crate::ApiError;

/// Failure while filling a probed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The sizing call failed for a reason other than buffer-too-small.
    #[error("Size probe failed: {0}")]
    Probe(ApiError),
    /// The buffer of the reported size could not be allocated.
    #[error("Failed to allocate {required} units")]
    Allocation { required: usize },
    /// The call with a correctly sized buffer failed.
    #[error("Render into sized buffer failed: {0}")]
    Fill(ApiError),
}

impl ProbeError {
    /// The service error behind this failure, if any.
    #[must_use]
    pub const fn api_error(&self) -> Option<ApiError> {
        match self {
            Self::Probe(e) | Self::Fill(e) => Some(*e),
            Self::Allocation { .. } => None,
        }
    }
}

/// Run `fill` against an empty buffer to learn the required size, then once
/// more against a buffer of exactly that size.
///
/// The returned buffer is truncated to the units actually used, without
/// trailing NULs. A first call that succeeds means the content is empty.
///
/// # Errors
/// See [`ProbeError`].
pub fn probe_then_allocate<F>(mut fill: F) -> Result<Vec<u16>, ProbeError>
where
    F: FnMut(&mut [u16]) -> Result<usize, ApiError>,
{
    let required = match fill(&mut []) {
        Ok(_) => return Ok(Vec::new()),
        Err(ApiError::InsufficientBuffer { required }) => required,
        Err(e) => return Err(ProbeError::Probe(e)),
    };

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(required)
        .map_err(|_| ProbeError::Allocation { required })?;
    buffer.resize(required, 0);

    let used = fill(&mut buffer).map_err(ProbeError::Fill)?;
    buffer.truncate(used.min(required));
    while buffer.last() == Some(&0) {
        buffer.pop();
    }
    Ok(buffer)
}

/// Decode UTF-16 text, replacing invalid sequences.
#[must_use]
pub fn decode_wide(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(text: &str) -> impl FnMut(&mut [u16]) -> Result<usize, ApiError> + '_ {
        move |buf: &mut [u16]| {
            let wide: Vec<u16> = text.encode_utf16().chain(Some(0)).collect();
            if buf.len() < wide.len() {
                return Err(ApiError::InsufficientBuffer {
                    required: wide.len(),
                });
            }
            buf[..wide.len()].copy_from_slice(&wide);
            Ok(wide.len())
        }
    }

    #[test]
    fn test_probe_then_fill() {
        let buf = probe_then_allocate(source("<Event/>")).unwrap();
        assert_eq!(decode_wide(&buf), "<Event/>");
    }

    #[test]
    fn test_calls_exactly_twice() {
        let mut calls = Vec::new();
        let mut inner = source("abc");
        probe_then_allocate(|buf| {
            calls.push(buf.len());
            inner(buf)
        })
        .unwrap();
        assert_eq!(calls, vec![0, 4]);
    }

    #[test]
    fn test_probe_failure_is_propagated() {
        let err = probe_then_allocate(|_| Err(ApiError::Other(87))).unwrap_err();
        assert_eq!(err, ProbeError::Probe(ApiError::Other(87)));
    }

    #[test]
    fn test_second_call_failure_is_hard() {
        let mut first = true;
        let err = probe_then_allocate(|_| {
            if first {
                first = false;
                Err(ApiError::InsufficientBuffer { required: 8 })
            } else {
                Err(ApiError::Other(1))
            }
        })
        .unwrap_err();
        assert_eq!(err, ProbeError::Fill(ApiError::Other(1)));
    }

    #[test]
    fn test_huge_size_reports_allocation_failure() {
        let err = probe_then_allocate(|_| {
            Err(ApiError::InsufficientBuffer {
                required: usize::MAX,
            })
        })
        .unwrap_err();
        assert_eq!(
            err,
            ProbeError::Allocation {
                required: usize::MAX
            }
        );
    }

    #[test]
    fn test_empty_content() {
        assert!(probe_then_allocate(|_| Ok(0)).unwrap().is_empty());
    }
}
