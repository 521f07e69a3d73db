// SQLite binding - the native capability over rusqlite
//
// - connection: connection wrapper and prepared statements
// - params: argument conversion for binding
// - query: forward-only cursor and typed value extraction

pub mod connection;
pub mod params;
pub mod query;

pub use connection::SqliteConnection;

use std::time::Instant;

use rusqlite::ErrorCode;

use crate::native::{NativeError, NativeErrorKind};

/// Translate a rusqlite failure, classifying interrupts as cancellation.
pub(crate) fn map_sqlite_error(err: rusqlite::Error) -> NativeError {
    let kind = match err.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => NativeErrorKind::Cancelled,
        _ => NativeErrorKind::Other,
    };
    NativeError::wrap(kind, err)
}

/// Like [`map_sqlite_error`], but an interrupt after `deadline` counts as a timeout.
pub(crate) fn map_with_deadline(err: rusqlite::Error, deadline: Option<Instant>) -> NativeError {
    let native = map_sqlite_error(err);
    match deadline {
        Some(deadline) if native.kind() == NativeErrorKind::Cancelled && Instant::now() >= deadline => {
            native.with_kind(NativeErrorKind::TimedOut)
        }
        _ => native,
    }
}
