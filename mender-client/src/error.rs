//! Client error types
//!
//! Re-exports mender-error and provides client-specific conveniences.

pub use mender_error::{Error, ErrorKind, ErrorStatus, Result};

use crate::backend::BackendRole;

/// Wrap a reqwest failure that happened before any response bytes arrived.
pub fn transport_failed(role: BackendRole, endpoint: &str, err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::NetworkFailed
    };
    Error::new(kind, err.to_string())
        .with_operation("client::send")
        .with_context("backend", role.as_str())
        .with_context("endpoint", endpoint)
        .set_source(err)
}

/// A backend answered, but not with a success status.
///
/// Client errors other than 408 and 429 will not go away on retry.
pub fn backend_rejected(role: BackendRole, status: u16, body: &str) -> Error {
    let err = Error::new(
        ErrorKind::BackendRejected,
        format!("status {}: {}", status, truncate(body, 200)),
    )
    .with_operation("client::send")
    .with_context("backend", role.as_str())
    .with_context("status", status.to_string());

    if (400..500).contains(&status) && status != 408 && status != 429 {
        err.with_status(ErrorStatus::Permanent)
    } else {
        err
    }
}

/// Both backends failed before either could stream.
///
/// The fallback was the retry, so a temporary secondary failure is persistent now.
pub fn backend_unavailable(primary: &Error, secondary: Error) -> Error {
    let status = secondary.status().persist();
    Error::new(
        ErrorKind::BackendUnavailable,
        format!("primary: {}; secondary: {}", primary.message(), secondary.message()),
    )
    .with_status(status)
    .with_operation("client::request_completion")
    .with_context("primary_kind", primary.kind().as_str())
    .set_source(secondary)
}

/// A wire record that is not valid JSON.
pub fn decode_failed(role: BackendRole, record: &str, reason: &str) -> Error {
    Error::new(ErrorKind::DecodeFailed, reason)
        .with_operation("client::decode")
        .with_context("backend", role.as_str())
        .with_context("record", truncate(record, 200))
}

/// The body stream broke after streaming had begun.
pub fn stream_interrupted(role: BackendRole, err: reqwest::Error) -> Error {
    Error::stream_interrupted(role.as_str(), err.to_string())
        .with_operation("client::stream")
        .set_source(err)
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
