//! Classify curl errors and HTTP status codes into transfer error kinds.

use crate::engine::TransferErrorKind;

/// Classify a final HTTP status. `None` means success (2xx).
pub fn classify_http_status(code: u32) -> Option<TransferErrorKind> {
    match code {
        200..=299 => None,
        408 | 504 => Some(TransferErrorKind::Timeout),
        _ => Some(TransferErrorKind::Http(u16::try_from(code).unwrap_or(u16::MAX))),
    }
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> TransferErrorKind {
    if e.is_operation_timedout() {
        return TransferErrorKind::Timeout;
    }
    if e.is_aborted_by_callback() {
        return TransferErrorKind::Aborted;
    }
    if e.is_write_error() {
        return TransferErrorKind::Io;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
        || e.is_ssl_connect_error()
    {
        return TransferErrorKind::Connection;
    }
    TransferErrorKind::Other
}
