//! The driver-facing capability the engine runs on top of.
//!
//! A backend provides a [`NativeConnection`] that prepares [`NativeStatement`]s, which in turn
//! yield forward-only [`NativeCursor`]s. The traits are object safe so statements and cursors
//! can borrow from their parent for exactly as long as one call lasts.

use std::error::Error as StdError;
use std::io::Read;
use std::time::Duration;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use thiserror::Error;

/// Broad classification of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorKind {
    /// The statement was cancelled (interrupt, administrator kill).
    Cancelled,
    /// The statement exceeded its timeout.
    TimedOut,
    /// Anything else the driver reports.
    Other,
}

/// A failure reported by the native driver.
///
/// Never returned from the public API directly; it is always the `source()` of a
/// [`crate::SqlWardenError`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct NativeError {
    kind: NativeErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl NativeError {
    #[must_use]
    pub fn new(kind: NativeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a driver error, keeping it as the source.
    #[must_use]
    pub fn wrap<E>(kind: NativeErrorKind, err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(NativeErrorKind::Other, message)
    }

    /// Reclassify, e.g. an interrupt that fired because a deadline passed.
    #[must_use]
    pub fn with_kind(mut self, kind: NativeErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Prefix the message with where the failure happened, keeping kind and source.
    #[must_use]
    pub fn with_context(mut self, context: impl AsRef<str>) -> Self {
        self.message = format!("{}: {}", context.as_ref(), self.message);
        self
    }

    #[must_use]
    pub fn kind(&self) -> NativeErrorKind {
        self.kind
    }

    /// True when the driver signalled cancellation or a timeout.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.kind,
            NativeErrorKind::Cancelled | NativeErrorKind::TimedOut
        )
    }
}

impl From<std::io::Error> for NativeError {
    fn from(err: std::io::Error) -> Self {
        NativeError::wrap(NativeErrorKind::Other, err)
    }
}

/// SQL type carried by a typed null so the driver never has to guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Char,
    Varchar,
    Clob,
    Blob,
    Timestamp,
}

/// Anything the engine acquires and must release exactly once.
///
/// Implementations must also release the underlying handle when dropped without `close`,
/// so an unwinding panic cannot leak it.
pub trait NativeResource {
    /// Release the resource, reporting any driver failure.
    ///
    /// # Errors
    /// Returns the driver's close failure.
    fn close(self: Box<Self>) -> Result<(), NativeError>;
}

/// A live connection able to prepare statements.
pub trait NativeConnection {
    /// Prepare `sql`, which already uses the driver's placeholder syntax.
    ///
    /// # Errors
    /// Returns the driver's failure to parse or prepare the statement.
    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn NativeStatement + 'c>, NativeError>;
}

impl<T: NativeConnection + ?Sized> NativeConnection for &mut T {
    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn NativeStatement + 'c>, NativeError> {
        (**self).prepare(sql)
    }
}

impl<T: NativeConnection + ?Sized> NativeConnection for Box<T> {
    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn NativeStatement + 'c>, NativeError> {
        (**self).prepare(sql)
    }
}

/// A prepared statement. Bind positions are 1-based.
pub trait NativeStatement: NativeResource {
    /// # Errors
    /// Returns the driver's failure to apply the timeout.
    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), NativeError>;

    /// # Errors
    /// Returns the driver's failure to apply the limit.
    fn set_max_rows(&mut self, max_rows: usize) -> Result<(), NativeError>;

    /// # Errors
    /// Returns the driver's bind failure.
    fn bind_null(&mut self, position: usize, sql_type: SqlType) -> Result<(), NativeError>;

    /// # Errors
    /// Returns the driver's bind failure.
    fn bind_i32(&mut self, position: usize, value: i32) -> Result<(), NativeError>;

    /// # Errors
    /// Returns the driver's bind failure.
    fn bind_i64(&mut self, position: usize, value: i64) -> Result<(), NativeError>;

    /// # Errors
    /// Returns the driver's bind failure.
    fn bind_f32(&mut self, position: usize, value: f32) -> Result<(), NativeError>;

    /// # Errors
    /// Returns the driver's bind failure.
    fn bind_f64(&mut self, position: usize, value: f64) -> Result<(), NativeError>;

    /// Bind a decimal keeping its scale.
    ///
    /// # Errors
    /// Returns the driver's bind failure.
    fn bind_decimal(&mut self, position: usize, value: &Decimal) -> Result<(), NativeError>;

    /// # Errors
    /// Returns the driver's bind failure.
    fn bind_str(&mut self, position: usize, value: &str) -> Result<(), NativeError>;

    /// Bind a timestamp already truncated to milliseconds.
    ///
    /// # Errors
    /// Returns the driver's bind failure.
    fn bind_timestamp(&mut self, position: usize, value: NaiveDateTime) -> Result<(), NativeError>;

    /// # Errors
    /// Returns the driver's bind failure.
    fn bind_bytes(&mut self, position: usize, value: &[u8]) -> Result<(), NativeError>;

    /// Bind UTF-8 character data from a reader; `length` is `None` when unknown.
    ///
    /// # Errors
    /// Returns the driver's bind failure or a read failure.
    fn bind_char_stream(
        &mut self,
        position: usize,
        reader: &mut dyn Read,
        length: Option<u64>,
    ) -> Result<(), NativeError>;

    /// Bind binary data from a reader; `length` is `None` when unknown.
    ///
    /// # Errors
    /// Returns the driver's bind failure or a read failure.
    fn bind_byte_stream(
        &mut self,
        position: usize,
        reader: &mut dyn Read,
        length: Option<u64>,
    ) -> Result<(), NativeError>;

    /// Run the statement and open a cursor over its rows.
    ///
    /// # Errors
    /// Returns the driver's execution failure.
    fn execute_query<'s>(&'s mut self) -> Result<Box<dyn NativeCursor + 's>, NativeError>;

    /// Run a DML statement, returning the affected row count.
    ///
    /// # Errors
    /// Returns the driver's execution failure.
    fn execute_update(&mut self) -> Result<usize, NativeError>;

    /// Run a statement that produces neither rows nor a count (DDL).
    ///
    /// # Errors
    /// Returns the driver's execution failure.
    fn execute(&mut self) -> Result<(), NativeError>;

    /// Key generated by the last successful insert, if the driver reports one.
    ///
    /// # Errors
    /// Returns the driver's failure to read the key.
    fn generated_key(&mut self) -> Result<Option<i64>, NativeError>;
}

/// A forward-only cursor. Column ordinals are 1-based.
///
/// Primitive reads return zero for SQL null; callers check [`NativeCursor::was_null`].
pub trait NativeCursor: NativeResource {
    /// # Errors
    /// Returns the driver's fetch failure.
    fn next(&mut self) -> Result<bool, NativeError>;

    fn column_count(&self) -> usize;

    fn column_name(&self, ordinal: usize) -> Option<&str>;

    /// Whether the most recent read saw SQL null.
    fn was_null(&self) -> bool;

    /// # Errors
    /// Returns a conversion failure.
    fn get_i64(&mut self, ordinal: usize) -> Result<i64, NativeError>;

    /// # Errors
    /// Returns a conversion failure.
    fn get_f64(&mut self, ordinal: usize) -> Result<f64, NativeError>;

    /// # Errors
    /// Returns a conversion failure.
    fn get_decimal(&mut self, ordinal: usize) -> Result<Option<Decimal>, NativeError>;

    /// # Errors
    /// Returns a conversion failure.
    fn get_string(&mut self, ordinal: usize) -> Result<Option<String>, NativeError>;

    /// # Errors
    /// Returns a conversion failure.
    fn get_bytes(&mut self, ordinal: usize) -> Result<Option<Vec<u8>>, NativeError>;

    /// # Errors
    /// Returns a conversion failure.
    fn get_timestamp(&mut self, ordinal: usize) -> Result<Option<NaiveDateTime>, NativeError>;
}
