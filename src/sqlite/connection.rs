use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use rusqlite::types::Null;
use rusqlite::{InterruptHandle, ToSql};
use rust_decimal::Decimal;

use super::params::{decimal_text, read_bytes, read_text, timestamp_text};
use super::query::SqliteCursor;
use super::{map_sqlite_error, map_with_deadline};
use crate::error::SqlWardenError;
use crate::native::{
    NativeConnection, NativeCursor, NativeError, NativeResource, NativeStatement, SqlType,
};

// VM instructions between deadline checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// A rusqlite connection exposed as a native connection.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open (or create) a database file.
    ///
    /// # Errors
    /// Returns `SqlWardenError::Execution` when the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqlWardenError> {
        rusqlite::Connection::open(path)
            .map(Self::from_connection)
            .map_err(|e| SqlWardenError::native(map_sqlite_error(e)))
    }

    /// # Errors
    /// Returns `SqlWardenError::Execution` when SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, SqlWardenError> {
        rusqlite::Connection::open_in_memory()
            .map(Self::from_connection)
            .map_err(|e| SqlWardenError::native(map_sqlite_error(e)))
    }

    #[must_use]
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Handle that cancels the running statement from another thread.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    #[must_use]
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    #[must_use]
    pub fn into_inner(self) -> rusqlite::Connection {
        self.conn
    }
}

impl NativeConnection for SqliteConnection {
    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn NativeStatement + 'c>, NativeError> {
        let stmt = self.conn.prepare(sql).map_err(map_sqlite_error)?;
        Ok(Box::new(SqliteStatement {
            conn: &self.conn,
            stmt: Some(stmt),
            timeout: None,
            deadline: None,
            max_rows: None,
        }))
    }
}

/// A prepared statement. Holds a progress handler on the connection while a timeout is armed.
pub(crate) struct SqliteStatement<'c> {
    conn: &'c rusqlite::Connection,
    stmt: Option<rusqlite::Statement<'c>>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    max_rows: Option<usize>,
}

impl<'c> SqliteStatement<'c> {
    fn stmt(&mut self) -> Result<&mut rusqlite::Statement<'c>, NativeError> {
        self.stmt
            .as_mut()
            .ok_or_else(|| NativeError::other("statement already closed"))
    }

    fn bind<T: ToSql>(&mut self, position: usize, value: T) -> Result<(), NativeError> {
        self.stmt()?
            .raw_bind_parameter(position, value)
            .map_err(map_sqlite_error)
    }

    fn arm_timeout(&mut self) {
        if let Some(timeout) = self.timeout {
            let deadline = Instant::now() + timeout;
            self.deadline = Some(deadline);
            self.conn
                .progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));
        }
    }

    fn disarm_timeout(&mut self) {
        if self.deadline.take().is_some() {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}

impl NativeResource for SqliteStatement<'_> {
    fn close(mut self: Box<Self>) -> Result<(), NativeError> {
        self.disarm_timeout();
        match self.stmt.take() {
            Some(stmt) => stmt.finalize().map_err(map_sqlite_error),
            None => Ok(()),
        }
    }
}

impl Drop for SqliteStatement<'_> {
    fn drop(&mut self) {
        self.disarm_timeout();
    }
}

impl NativeStatement for SqliteStatement<'_> {
    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), NativeError> {
        self.timeout = Some(timeout);
        Ok(())
    }

    fn set_max_rows(&mut self, max_rows: usize) -> Result<(), NativeError> {
        self.max_rows = Some(max_rows);
        Ok(())
    }

    fn bind_null(&mut self, position: usize, _sql_type: SqlType) -> Result<(), NativeError> {
        // SQLite nulls are untyped
        self.bind(position, Null)
    }

    fn bind_i32(&mut self, position: usize, value: i32) -> Result<(), NativeError> {
        self.bind(position, value)
    }

    fn bind_i64(&mut self, position: usize, value: i64) -> Result<(), NativeError> {
        self.bind(position, value)
    }

    fn bind_f32(&mut self, position: usize, value: f32) -> Result<(), NativeError> {
        self.bind(position, f64::from(value))
    }

    fn bind_f64(&mut self, position: usize, value: f64) -> Result<(), NativeError> {
        self.bind(position, value)
    }

    fn bind_decimal(&mut self, position: usize, value: &Decimal) -> Result<(), NativeError> {
        self.bind(position, decimal_text(value))
    }

    fn bind_str(&mut self, position: usize, value: &str) -> Result<(), NativeError> {
        self.bind(position, value)
    }

    fn bind_timestamp(&mut self, position: usize, value: NaiveDateTime) -> Result<(), NativeError> {
        self.bind(position, timestamp_text(value))
    }

    fn bind_bytes(&mut self, position: usize, value: &[u8]) -> Result<(), NativeError> {
        self.bind(position, value)
    }

    fn bind_char_stream(
        &mut self,
        position: usize,
        reader: &mut dyn Read,
        length: Option<u64>,
    ) -> Result<(), NativeError> {
        let text = read_text(reader, length)?;
        self.bind(position, text)
    }

    fn bind_byte_stream(
        &mut self,
        position: usize,
        reader: &mut dyn Read,
        length: Option<u64>,
    ) -> Result<(), NativeError> {
        let bytes = read_bytes(reader, length)?;
        self.bind(position, bytes)
    }

    fn execute_query<'s>(&'s mut self) -> Result<Box<dyn NativeCursor + 's>, NativeError> {
        self.arm_timeout();
        let deadline = self.deadline;
        let max_rows = self.max_rows;
        let stmt = self.stmt()?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt.raw_query();
        Ok(Box::new(SqliteCursor::new(rows, columns, max_rows, deadline)))
    }

    fn execute_update(&mut self) -> Result<usize, NativeError> {
        self.arm_timeout();
        let deadline = self.deadline;
        self.stmt()?
            .raw_execute()
            .map_err(|e| map_with_deadline(e, deadline))
    }

    fn execute(&mut self) -> Result<(), NativeError> {
        self.execute_update().map(|_| ())
    }

    fn generated_key(&mut self) -> Result<Option<i64>, NativeError> {
        Ok(Some(self.conn.last_insert_rowid()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SqliteConnection {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.inner()
            .execute_batch("create table t (id integer primary key, name text, amount numeric)")
            .unwrap();
        conn
    }

    #[test]
    fn binds_and_reports_generated_key() {
        let mut conn = table();
        let mut stmt = conn.prepare("insert into t (name) values (?1)").unwrap();
        stmt.bind_str(1, "first").unwrap();
        assert_eq!(stmt.execute_update().unwrap(), 1);
        assert_eq!(stmt.generated_key().unwrap(), Some(1));
        stmt.close().unwrap();
    }

    #[test]
    fn out_of_range_position_is_a_bind_error() {
        let mut conn = table();
        let mut stmt = conn.prepare("insert into t (name) values (?1)").unwrap();
        assert!(stmt.bind_str(2, "nope").is_err());
        stmt.close().unwrap();
    }

    #[test]
    fn prepare_error_is_reported() {
        let mut conn = table();
        let err = conn.prepare("select * from missing").err().unwrap();
        assert!(err.to_string().contains("missing"), "{err}");
        assert!(!err.is_cancellation());
    }

    #[test]
    fn expired_deadline_interrupts_as_timeout() {
        let mut conn = table();
        let mut stmt = conn
            .prepare(
                "with recursive c(x) as (select 1 union all select x + 1 from c) \
                 select count(*) from c",
            )
            .unwrap();
        stmt.set_query_timeout(Duration::from_millis(20)).unwrap();
        let outcome = stmt.execute_query().and_then(|mut cursor| cursor.next());
        let err = outcome.err().unwrap();
        assert_eq!(err.kind(), crate::native::NativeErrorKind::TimedOut);
        stmt.close().unwrap();
    }

    #[test]
    fn closing_removes_the_progress_handler() {
        let mut conn = table();
        {
            let mut stmt = conn.prepare("select 1").unwrap();
            stmt.set_query_timeout(Duration::from_millis(1)).unwrap();
            let mut cursor = stmt.execute_query().unwrap();
            let _ = cursor.next();
            cursor.close().unwrap();
            stmt.close().unwrap();
        }
        std::thread::sleep(Duration::from_millis(5));
        let mut stmt = conn.prepare("select count(*) from t").unwrap();
        let mut cursor = stmt.execute_query().unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_i64(1).unwrap(), 0);
        cursor.close().unwrap();
        stmt.close().unwrap();
    }
}
