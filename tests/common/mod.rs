#![allow(dead_code)]

//! Scripted native connection for dialects without a bundled driver.
//!
//! Each `prepare` consumes the next queued [`Outcome`]; every call the engine makes is
//! recorded in the shared [`Journal`] so tests can assert on SQL, binds, and close counts.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Read;
use std::rc::Rc;
use std::time::Duration;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sql_warden::native::{
    NativeConnection, NativeCursor, NativeError, NativeErrorKind, NativeResource, NativeStatement,
    SqlType,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Text(String),
}

/// What the next prepared statement does when executed.
#[derive(Debug, Clone)]
pub enum Outcome {
    Rows {
        columns: Vec<&'static str>,
        rows: Vec<Vec<Cell>>,
        /// 1-based row whose fetch fails.
        fail_at_row: Option<usize>,
    },
    Count(usize),
    Fail(NativeErrorKind),
}

impl Outcome {
    pub fn rows(columns: Vec<&'static str>, rows: Vec<Vec<Cell>>) -> Self {
        Outcome::Rows {
            columns,
            rows,
            fail_at_row: None,
        }
    }

    pub fn single_int(column: &'static str, value: i64) -> Self {
        Outcome::rows(vec![column], vec![vec![Cell::Int(value)]])
    }
}

#[derive(Debug, Default)]
pub struct Journal {
    pub outcomes: VecDeque<Outcome>,
    pub prepared: Vec<String>,
    /// Bind calls per prepared statement, rendered as `position:value`.
    pub binds: Vec<Vec<String>>,
    pub timeouts: Vec<Duration>,
    pub max_rows: Vec<usize>,
    pub statements_closed: usize,
    pub cursors_closed: usize,
    pub fail_prepare: bool,
    pub fail_bind_at: Option<usize>,
    pub fail_statement_close: bool,
    pub fail_cursor_close: bool,
    pub generated_key: Option<i64>,
}

pub type SharedJournal = Rc<RefCell<Journal>>;

pub struct MockConnection {
    journal: SharedJournal,
}

impl MockConnection {
    pub fn new() -> (Self, SharedJournal) {
        let journal = Rc::new(RefCell::new(Journal::default()));
        (
            Self {
                journal: Rc::clone(&journal),
            },
            journal,
        )
    }
}

impl NativeConnection for MockConnection {
    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn NativeStatement + 'c>, NativeError> {
        let mut journal = self.journal.borrow_mut();
        journal.prepared.push(sql.to_string());
        if journal.fail_prepare {
            return Err(NativeError::other(format!("syntax error near {sql}")));
        }
        journal.binds.push(Vec::new());
        let outcome = journal.outcomes.pop_front().unwrap_or(Outcome::Count(0));
        Ok(Box::new(MockStatement {
            journal: Rc::clone(&self.journal),
            outcome: Some(outcome),
        }))
    }
}

struct MockStatement {
    journal: SharedJournal,
    outcome: Option<Outcome>,
}

impl MockStatement {
    fn record(&mut self, position: usize, value: String) -> Result<(), NativeError> {
        let mut journal = self.journal.borrow_mut();
        if journal.fail_bind_at == Some(position) {
            return Err(NativeError::other(format!("cannot bind position {position}")));
        }
        if let Some(binds) = journal.binds.last_mut() {
            binds.push(format!("{position}:{value}"));
        }
        Ok(())
    }

    fn take_outcome(&mut self) -> Result<Outcome, NativeError> {
        match self.outcome.take() {
            Some(Outcome::Fail(kind)) => Err(NativeError::new(kind, "scripted failure")),
            Some(outcome) => Ok(outcome),
            None => Err(NativeError::other("statement executed twice")),
        }
    }
}

impl NativeResource for MockStatement {
    fn close(self: Box<Self>) -> Result<(), NativeError> {
        let mut journal = self.journal.borrow_mut();
        journal.statements_closed += 1;
        if journal.fail_statement_close {
            Err(NativeError::other("statement close failed"))
        } else {
            Ok(())
        }
    }
}

impl NativeStatement for MockStatement {
    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), NativeError> {
        self.journal.borrow_mut().timeouts.push(timeout);
        Ok(())
    }

    fn set_max_rows(&mut self, max_rows: usize) -> Result<(), NativeError> {
        self.journal.borrow_mut().max_rows.push(max_rows);
        Ok(())
    }

    fn bind_null(&mut self, position: usize, sql_type: SqlType) -> Result<(), NativeError> {
        self.record(position, format!("null({sql_type:?})"))
    }

    fn bind_i32(&mut self, position: usize, value: i32) -> Result<(), NativeError> {
        self.record(position, value.to_string())
    }

    fn bind_i64(&mut self, position: usize, value: i64) -> Result<(), NativeError> {
        self.record(position, value.to_string())
    }

    fn bind_f32(&mut self, position: usize, value: f32) -> Result<(), NativeError> {
        self.record(position, value.to_string())
    }

    fn bind_f64(&mut self, position: usize, value: f64) -> Result<(), NativeError> {
        self.record(position, value.to_string())
    }

    fn bind_decimal(&mut self, position: usize, value: &Decimal) -> Result<(), NativeError> {
        self.record(position, value.to_string())
    }

    fn bind_str(&mut self, position: usize, value: &str) -> Result<(), NativeError> {
        self.record(position, format!("'{value}'"))
    }

    fn bind_timestamp(&mut self, position: usize, value: NaiveDateTime) -> Result<(), NativeError> {
        self.record(position, value.to_string())
    }

    fn bind_bytes(&mut self, position: usize, value: &[u8]) -> Result<(), NativeError> {
        self.record(position, format!("{value:?}"))
    }

    fn bind_char_stream(
        &mut self,
        position: usize,
        reader: &mut dyn Read,
        length: Option<u64>,
    ) -> Result<(), NativeError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        self.record(position, format!("stream({length:?}) {text}"))
    }

    fn bind_byte_stream(
        &mut self,
        position: usize,
        reader: &mut dyn Read,
        length: Option<u64>,
    ) -> Result<(), NativeError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.record(position, format!("stream({length:?}) {bytes:?}"))
    }

    fn execute_query<'s>(&'s mut self) -> Result<Box<dyn NativeCursor + 's>, NativeError> {
        match self.take_outcome()? {
            Outcome::Rows {
                columns,
                rows,
                fail_at_row,
            } => Ok(Box::new(MockCursor {
                journal: Rc::clone(&self.journal),
                columns,
                rows: rows.into(),
                current: Vec::new(),
                fetched: 0,
                fail_at_row,
                was_null: false,
            })),
            other => Err(NativeError::other(format!("{other:?} is not a query result"))),
        }
    }

    fn execute_update(&mut self) -> Result<usize, NativeError> {
        match self.take_outcome()? {
            Outcome::Count(count) => Ok(count),
            other => Err(NativeError::other(format!("{other:?} is not an update result"))),
        }
    }

    fn execute(&mut self) -> Result<(), NativeError> {
        self.execute_update().map(|_| ())
    }

    fn generated_key(&mut self) -> Result<Option<i64>, NativeError> {
        Ok(self.journal.borrow().generated_key)
    }
}

struct MockCursor {
    journal: SharedJournal,
    columns: Vec<&'static str>,
    rows: VecDeque<Vec<Cell>>,
    current: Vec<Cell>,
    fetched: usize,
    fail_at_row: Option<usize>,
    was_null: bool,
}

impl MockCursor {
    fn cell(&mut self, ordinal: usize) -> Result<Cell, NativeError> {
        let cell = ordinal
            .checked_sub(1)
            .and_then(|idx| self.current.get(idx))
            .cloned()
            .ok_or_else(|| NativeError::other(format!("no column {ordinal}")))?;
        self.was_null = cell == Cell::Null;
        Ok(cell)
    }
}

impl NativeResource for MockCursor {
    fn close(self: Box<Self>) -> Result<(), NativeError> {
        let mut journal = self.journal.borrow_mut();
        journal.cursors_closed += 1;
        if journal.fail_cursor_close {
            Err(NativeError::other("cursor close failed"))
        } else {
            Ok(())
        }
    }
}

impl NativeCursor for MockCursor {
    fn next(&mut self) -> Result<bool, NativeError> {
        if self.fail_at_row == Some(self.fetched + 1) {
            return Err(NativeError::other("connection reset while fetching"));
        }
        match self.rows.pop_front() {
            Some(row) => {
                self.current = row;
                self.fetched += 1;
                Ok(true)
            }
            None => {
                self.current.clear();
                Ok(false)
            }
        }
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, ordinal: usize) -> Option<&str> {
        ordinal
            .checked_sub(1)
            .and_then(|idx| self.columns.get(idx))
            .copied()
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    fn get_i64(&mut self, ordinal: usize) -> Result<i64, NativeError> {
        match self.cell(ordinal)? {
            Cell::Null => Ok(0),
            Cell::Int(v) => Ok(v),
            Cell::Text(s) => s.parse().map_err(|_| NativeError::other(format!("not a number: {s}"))),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn get_f64(&mut self, ordinal: usize) -> Result<f64, NativeError> {
        Ok(self.get_i64(ordinal)? as f64)
    }

    fn get_decimal(&mut self, ordinal: usize) -> Result<Option<Decimal>, NativeError> {
        match self.cell(ordinal)? {
            Cell::Null => Ok(None),
            Cell::Int(v) => Ok(Some(Decimal::from(v))),
            Cell::Text(s) => s
                .parse()
                .map(Some)
                .map_err(|_| NativeError::other(format!("not a decimal: {s}"))),
        }
    }

    fn get_string(&mut self, ordinal: usize) -> Result<Option<String>, NativeError> {
        match self.cell(ordinal)? {
            Cell::Null => Ok(None),
            Cell::Int(v) => Ok(Some(v.to_string())),
            Cell::Text(s) => Ok(Some(s)),
        }
    }

    fn get_bytes(&mut self, ordinal: usize) -> Result<Option<Vec<u8>>, NativeError> {
        Ok(self.get_string(ordinal)?.map(String::into_bytes))
    }

    fn get_timestamp(&mut self, ordinal: usize) -> Result<Option<NaiveDateTime>, NativeError> {
        match self.get_string(ordinal)? {
            None => Ok(None),
            Some(text) => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
                .map(Some)
                .map_err(|e| NativeError::wrap(NativeErrorKind::Other, e)),
        }
    }
}

/// Route engine logs to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
