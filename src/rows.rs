//! Typed, null-aware access to the rows of a running query.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::diagnostics::StatementContext;
use crate::error::SqlWardenError;
use crate::native::{NativeCursor, NativeError};
use crate::types::{normalize_decimal, truncate_to_millis};

/// Something that identifies a column: a 1-based ordinal or a column name.
///
/// Name matching ignores ASCII case.
pub trait ColumnIndex {
    /// # Errors
    /// Returns `SqlWardenError::RowAccess` when the column does not exist.
    fn ordinal(&self, rows: &mut Rows<'_>) -> Result<usize, SqlWardenError>;
}

impl ColumnIndex for usize {
    fn ordinal(&self, rows: &mut Rows<'_>) -> Result<usize, SqlWardenError> {
        let count = rows.column_count();
        if *self == 0 || *self > count {
            return Err(SqlWardenError::RowAccess(format!(
                "column ordinal {self} out of range 1..={count}"
            )));
        }
        Ok(*self)
    }
}

impl ColumnIndex for &str {
    fn ordinal(&self, rows: &mut Rows<'_>) -> Result<usize, SqlWardenError> {
        rows.lookup_name(self)
    }
}

/// Forward-only view over a query's rows.
///
/// Accessors are valid only after [`Rows::next`] returned `true`. Reads of SQL null come
/// back as `None`, decimals have trailing zero scale stripped, and timestamps are
/// truncated to milliseconds.
pub struct Rows<'r> {
    cursor: &'r mut dyn NativeCursor,
    ctx: &'r StatementContext<'r>,
    positioned: bool,
    exhausted: bool,
    rows_read: usize,
    names: Option<HashMap<String, usize>>,
}

impl<'r> Rows<'r> {
    pub(crate) fn new(cursor: &'r mut dyn NativeCursor, ctx: &'r StatementContext<'r>) -> Self {
        Self {
            cursor,
            ctx,
            positioned: false,
            exhausted: false,
            rows_read: 0,
            names: None,
        }
    }

    /// Advance to the next row.
    ///
    /// # Errors
    /// Returns `QueryCancelledOrTimedOut` or `Execution` when the fetch fails.
    pub fn next(&mut self) -> Result<bool, SqlWardenError> {
        if self.exhausted {
            self.positioned = false;
            return Ok(false);
        }
        match self.cursor.next() {
            Ok(true) => {
                self.positioned = true;
                self.rows_read += 1;
                Ok(true)
            }
            Ok(false) => {
                self.positioned = false;
                self.exhausted = true;
                Ok(false)
            }
            Err(err) => {
                self.positioned = false;
                self.exhausted = true;
                Err(self.ctx.native_error(err))
            }
        }
    }

    /// Rows successfully fetched so far.
    #[must_use]
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.cursor.column_count()
    }

    /// Column names as reported by the driver, in ordinal order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        (1..=self.column_count())
            .map(|i| self.cursor.column_name(i).unwrap_or_default().to_string())
            .collect()
    }

    fn lookup_name(&mut self, name: &str) -> Result<usize, SqlWardenError> {
        let names = match &mut self.names {
            Some(names) => names,
            slot @ None => {
                let mut map = HashMap::with_capacity(self.cursor.column_count());
                for ordinal in 1..=self.cursor.column_count() {
                    if let Some(column) = self.cursor.column_name(ordinal) {
                        // first occurrence wins for duplicate names
                        map.entry(column.to_ascii_lowercase()).or_insert(ordinal);
                    }
                }
                slot.insert(map)
            }
        };
        names
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| SqlWardenError::RowAccess(format!("no column named {name}")))
    }

    fn position<I: ColumnIndex>(&mut self, column: I) -> Result<usize, SqlWardenError> {
        if !self.positioned {
            return Err(SqlWardenError::RowAccess(
                "no current row; call next() and check it returned true".to_string(),
            ));
        }
        column.ordinal(self)
    }

    fn read_err(&self, ordinal: usize, err: NativeError) -> SqlWardenError {
        let name = self.cursor.column_name(ordinal).unwrap_or("?");
        self.ctx
            .native_error(err.with_context(format!("column {ordinal} ({name})")))
    }

    /// Execution failure tied to this statement, for checks made on fetched values.
    pub(crate) fn failure(&self, message: &str) -> SqlWardenError {
        self.ctx.failure(message)
    }

    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    pub fn get_i64<I: ColumnIndex>(&mut self, column: I) -> Result<Option<i64>, SqlWardenError> {
        let ordinal = self.position(column)?;
        let value = self
            .cursor
            .get_i64(ordinal)
            .map_err(|e| self.read_err(ordinal, e))?;
        Ok((!self.cursor.was_null()).then_some(value))
    }

    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value or a
    /// value outside `i32`.
    pub fn get_i32<I: ColumnIndex>(&mut self, column: I) -> Result<Option<i32>, SqlWardenError> {
        let ordinal = self.position(column)?;
        self.get_i64(ordinal)?
            .map(|v| {
                i32::try_from(v).map_err(|_| {
                    self.read_err(ordinal, NativeError::other(format!("value {v} does not fit in i32")))
                })
            })
            .transpose()
    }

    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    pub fn get_f64<I: ColumnIndex>(&mut self, column: I) -> Result<Option<f64>, SqlWardenError> {
        let ordinal = self.position(column)?;
        let value = self
            .cursor
            .get_f64(ordinal)
            .map_err(|e| self.read_err(ordinal, e))?;
        Ok((!self.cursor.was_null()).then_some(value))
    }

    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_f32<I: ColumnIndex>(&mut self, column: I) -> Result<Option<f32>, SqlWardenError> {
        Ok(self.get_f64(column)?.map(|v| v as f32))
    }

    /// Decimal with trailing zero scale removed (`5.30` reads as `5.3`).
    ///
    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    pub fn get_decimal<I: ColumnIndex>(
        &mut self,
        column: I,
    ) -> Result<Option<Decimal>, SqlWardenError> {
        let ordinal = self.position(column)?;
        let value = self
            .cursor
            .get_decimal(ordinal)
            .map_err(|e| self.read_err(ordinal, e))?;
        Ok(value.map(normalize_decimal))
    }

    /// Text or character large object.
    ///
    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    pub fn get_string<I: ColumnIndex>(
        &mut self,
        column: I,
    ) -> Result<Option<String>, SqlWardenError> {
        let ordinal = self.position(column)?;
        self.cursor
            .get_string(ordinal)
            .map_err(|e| self.read_err(ordinal, e))
    }

    /// Binary large object.
    ///
    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    pub fn get_bytes<I: ColumnIndex>(
        &mut self,
        column: I,
    ) -> Result<Option<Vec<u8>>, SqlWardenError> {
        let ordinal = self.position(column)?;
        self.cursor
            .get_bytes(ordinal)
            .map_err(|e| self.read_err(ordinal, e))
    }

    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    pub fn get_timestamp<I: ColumnIndex>(
        &mut self,
        column: I,
    ) -> Result<Option<NaiveDateTime>, SqlWardenError> {
        let ordinal = self.position(column)?;
        let value = self
            .cursor
            .get_timestamp(ordinal)
            .map_err(|e| self.read_err(ordinal, e))?;
        Ok(value.map(truncate_to_millis))
    }

    /// Booleans stored as `'Y'`/`'N'`; `1`/`0` and `true`/`false` are also accepted.
    ///
    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for a value that is not a
    /// boolean.
    pub fn get_bool<I: ColumnIndex>(&mut self, column: I) -> Result<Option<bool>, SqlWardenError> {
        let ordinal = self.position(column)?;
        let Some(text) = self.get_string(ordinal)? else {
            return Ok(None);
        };
        match text.trim().to_ascii_lowercase().as_str() {
            "y" | "1" | "t" | "true" => Ok(Some(true)),
            "n" | "0" | "f" | "false" => Ok(Some(false)),
            other => Err(self.read_err(
                ordinal,
                NativeError::other(format!("value '{other}' is not a boolean")),
            )),
        }
    }

    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    pub fn get_i64_or_zero<I: ColumnIndex>(&mut self, column: I) -> Result<i64, SqlWardenError> {
        Ok(self.get_i64(column)?.unwrap_or(0))
    }

    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    pub fn get_i32_or_zero<I: ColumnIndex>(&mut self, column: I) -> Result<i32, SqlWardenError> {
        Ok(self.get_i32(column)?.unwrap_or(0))
    }

    /// # Errors
    /// Returns `RowAccess` for an unknown column, `Execution` for an unreadable value.
    pub fn get_string_or_empty<I: ColumnIndex>(
        &mut self,
        column: I,
    ) -> Result<String, SqlWardenError> {
        Ok(self.get_string(column)?.unwrap_or_default())
    }
}
