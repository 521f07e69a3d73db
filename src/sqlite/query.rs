use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime};
use rusqlite::types::Value;
use rust_decimal::Decimal;

use super::map_with_deadline;
use crate::native::{NativeCursor, NativeError, NativeErrorKind, NativeResource};
use crate::types::parse_timestamp;

/// Forward-only cursor over `rusqlite::Rows`, copying each row's values on fetch.
pub(crate) struct SqliteCursor<'s> {
    rows: rusqlite::Rows<'s>,
    columns: Vec<String>,
    current: Vec<Value>,
    last_was_null: bool,
    fetched: usize,
    max_rows: Option<usize>,
    deadline: Option<Instant>,
}

impl<'s> SqliteCursor<'s> {
    pub(crate) fn new(
        rows: rusqlite::Rows<'s>,
        columns: Vec<String>,
        max_rows: Option<usize>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            rows,
            columns,
            current: Vec::new(),
            last_was_null: false,
            fetched: 0,
            max_rows,
            deadline,
        }
    }

    fn value(&mut self, ordinal: usize) -> Result<&Value, NativeError> {
        let value = ordinal
            .checked_sub(1)
            .and_then(|idx| self.current.get(idx))
            .ok_or_else(|| NativeError::other(format!("no value at column {ordinal}")))?;
        self.last_was_null = matches!(value, Value::Null);
        Ok(value)
    }
}

fn type_error(expected: &str, value: &Value) -> NativeError {
    NativeError::other(format!("cannot read {value:?} as {expected}"))
}

// Only integral reals inside the i64 range convert.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn real_to_i64(value: f64) -> Result<i64, NativeError> {
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    if value.fract() == 0.0 && in_range {
        Ok(value as i64)
    } else {
        Err(NativeError::other(format!("cannot read {value} as an integer without losing precision")))
    }
}

impl NativeResource for SqliteCursor<'_> {
    fn close(self: Box<Self>) -> Result<(), NativeError> {
        // dropping the rows resets the statement
        Ok(())
    }
}

impl NativeCursor for SqliteCursor<'_> {
    fn next(&mut self) -> Result<bool, NativeError> {
        self.current.clear();
        if self.max_rows.is_some_and(|max| self.fetched >= max) {
            return Ok(false);
        }
        let deadline = self.deadline;
        let Some(row) = self
            .rows
            .next()
            .map_err(|e| map_with_deadline(e, deadline))?
        else {
            return Ok(false);
        };
        for idx in 0..self.columns.len() {
            let value: Value = row.get(idx).map_err(|e| map_with_deadline(e, deadline))?;
            self.current.push(value);
        }
        self.fetched += 1;
        Ok(true)
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, ordinal: usize) -> Option<&str> {
        ordinal
            .checked_sub(1)
            .and_then(|idx| self.columns.get(idx))
            .map(String::as_str)
    }

    fn was_null(&self) -> bool {
        self.last_was_null
    }

    fn get_i64(&mut self, ordinal: usize) -> Result<i64, NativeError> {
        match self.value(ordinal)? {
            Value::Null => Ok(0),
            Value::Integer(i) => Ok(*i),
            Value::Real(f) => real_to_i64(*f),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| NativeError::other(format!("cannot read '{s}' as an integer: {e}"))),
            other @ Value::Blob(_) => Err(type_error("an integer", other)),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn get_f64(&mut self, ordinal: usize) -> Result<f64, NativeError> {
        match self.value(ordinal)? {
            Value::Null => Ok(0.0),
            Value::Integer(i) => Ok(*i as f64),
            Value::Real(f) => Ok(*f),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| NativeError::other(format!("cannot read '{s}' as a float: {e}"))),
            other @ Value::Blob(_) => Err(type_error("a float", other)),
        }
    }

    fn get_decimal(&mut self, ordinal: usize) -> Result<Option<Decimal>, NativeError> {
        let parse = |text: &str| {
            Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .map_err(|e| NativeError::other(format!("cannot read '{text}' as a decimal: {e}")))
        };
        match self.value(ordinal)? {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(Decimal::from(*i))),
            // SQLite stores numeric affinity values with a fractional part as REAL
            Value::Real(f) => parse(&f.to_string()).map(Some),
            Value::Text(s) => parse(s.trim()).map(Some),
            other @ Value::Blob(_) => Err(type_error("a decimal", other)),
        }
    }

    fn get_string(&mut self, ordinal: usize) -> Result<Option<String>, NativeError> {
        match self.value(ordinal)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            Value::Integer(i) => Ok(Some(i.to_string())),
            Value::Real(f) => Ok(Some(f.to_string())),
            Value::Blob(b) => String::from_utf8(b.clone())
                .map(Some)
                .map_err(|e| NativeError::wrap(NativeErrorKind::Other, e)),
        }
    }

    fn get_bytes(&mut self, ordinal: usize) -> Result<Option<Vec<u8>>, NativeError> {
        match self.value(ordinal)? {
            Value::Null => Ok(None),
            Value::Blob(b) => Ok(Some(b.clone())),
            Value::Text(s) => Ok(Some(s.clone().into_bytes())),
            other => Err(type_error("bytes", other)),
        }
    }

    fn get_timestamp(&mut self, ordinal: usize) -> Result<Option<NaiveDateTime>, NativeError> {
        match self.value(ordinal)? {
            Value::Null => Ok(None),
            Value::Text(s) => parse_timestamp(s)
                .map(Some)
                .ok_or_else(|| NativeError::other(format!("cannot read '{s}' as a timestamp"))),
            // integer timestamps are epoch milliseconds
            Value::Integer(millis) => DateTime::from_timestamp_millis(*millis)
                .map(|at| Some(at.naive_utc()))
                .ok_or_else(|| NativeError::other(format!("timestamp {millis} out of range"))),
            other => Err(type_error("a timestamp", other)),
        }
    }
}
