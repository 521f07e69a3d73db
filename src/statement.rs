//! Fluent statement builders.
//!
//! A [`Database`] hands out one builder per statement kind. Builders accumulate typed
//! arguments and options, then a terminal method runs the statement. Argument mistakes
//! that can be detected while building (mixing positional and named arguments, naming an
//! argument twice) are held back and reported by the terminal call, so call chains stay
//! infallible.

use std::io::Read;
use std::marker::PhantomData;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::args::{Arguments, TypedArgument};
use crate::dialect::{DialectProfile, DialectTag};
use crate::error::SqlWardenError;
use crate::executor::{self, Request};
use crate::native::NativeConnection;
use crate::options::Options;
use crate::rows::Rows;

/// A native connection paired with the options that govern every statement run on it.
///
/// # Examples
/// ```rust,no_run
/// use sql_warden::prelude::*;
///
/// # fn demo() -> Result<(), SqlWardenError> {
/// let conn = SqliteConnection::open_in_memory()?;
/// let mut db = Database::new(conn, Options::new(DialectTag::Sqlite));
/// db.to_ddl("create table t (a integer)").execute()?;
/// db.to_insert("insert into t (a) values (?)").arg(32).insert_expecting(1)?;
///
/// let total = db
///     .to_select("select sum(a) from t where a > :min")
///     .arg_named("min", 0)
///     .query_i64_or_none()?;
/// assert_eq!(total, Some(32));
/// # Ok(()) }
/// ```
pub struct Database<C> {
    conn: C,
    options: Options,
}

impl<C: NativeConnection> Database<C> {
    #[must_use]
    pub fn new(conn: C, options: Options) -> Self {
        Self { conn, options }
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[must_use]
    pub fn dialect(&self) -> DialectTag {
        self.options.dialect
    }

    #[must_use]
    pub fn profile(&self) -> &'static DialectProfile {
        self.options.profile()
    }

    /// Current time from the application clock, truncated to milliseconds.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        self.options.clock.now()
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    #[must_use]
    pub fn into_inner(self) -> C {
        self.conn
    }

    pub fn to_select(&mut self, sql: impl Into<String>) -> SqlSelect<'_, C> {
        Statement::new(&mut self.conn, &self.options, sql.into())
    }

    pub fn to_insert(&mut self, sql: impl Into<String>) -> SqlInsert<'_, C> {
        Statement::new(&mut self.conn, &self.options, sql.into())
    }

    pub fn to_update(&mut self, sql: impl Into<String>) -> SqlUpdate<'_, C> {
        Statement::new(&mut self.conn, &self.options, sql.into())
    }

    pub fn to_delete(&mut self, sql: impl Into<String>) -> SqlDelete<'_, C> {
        Statement::new(&mut self.conn, &self.options, sql.into())
    }

    pub fn to_ddl(&mut self, sql: impl Into<String>) -> SqlDdl<'_, C> {
        Statement::new(&mut self.conn, &self.options, sql.into())
    }
}

/// Marker for `select` statements.
pub enum Select {}
/// Marker for `insert` statements.
pub enum Insert {}
/// Marker for `update` statements.
pub enum Update {}
/// Marker for `delete` statements.
pub enum Delete {}
/// Marker for DDL and other statements without results.
pub enum Ddl {}

pub type SqlSelect<'a, C> = Statement<'a, C, Select>;
pub type SqlInsert<'a, C> = Statement<'a, C, Insert>;
pub type SqlUpdate<'a, C> = Statement<'a, C, Update>;
pub type SqlDelete<'a, C> = Statement<'a, C, Delete>;
pub type SqlDdl<'a, C> = Statement<'a, C, Ddl>;

/// A statement being built. `K` fixes which terminal methods exist.
#[must_use = "a statement does nothing until a terminal method runs it"]
pub struct Statement<'a, C: ?Sized, K> {
    conn: &'a mut C,
    options: &'a Options,
    sql: String,
    args: Arguments,
    timeout: Option<Duration>,
    max_rows: Option<usize>,
    deferred: Option<SqlWardenError>,
    kind: PhantomData<K>,
}

impl<'a, C, K> Statement<'a, C, K>
where
    C: NativeConnection + ?Sized,
{
    fn new(conn: &'a mut C, options: &'a Options, sql: String) -> Self {
        Self {
            conn,
            options,
            sql,
            args: Arguments::Empty,
            timeout: None,
            max_rows: None,
            deferred: None,
            kind: PhantomData,
        }
    }

    fn push(mut self, arg: TypedArgument) -> Self {
        if self.deferred.is_none() {
            if let Err(message) = self.args.push_positional(arg) {
                self.deferred = Some(SqlWardenError::mixed_styles(message));
            }
        }
        self
    }

    fn push_named(mut self, name: &str, arg: TypedArgument) -> Self {
        if self.deferred.is_none() {
            if let Err((message, mixed)) = self.args.push_named(name, arg) {
                self.deferred = Some(if mixed {
                    SqlWardenError::mixed_styles(message)
                } else {
                    SqlWardenError::parameter_mismatch(message)
                });
            }
        }
        self
    }

    fn run<T>(
        self,
        run: impl FnOnce(&mut C, Request<'_>) -> Result<T, SqlWardenError>,
    ) -> Result<T, SqlWardenError> {
        self.run_reporting(false, run)
    }

    /// Hand the collected state to `run`, or report the first deferred builder error.
    /// Quiet statements report at warn level.
    fn run_reporting<T>(
        self,
        quiet: bool,
        run: impl FnOnce(&mut C, Request<'_>) -> Result<T, SqlWardenError>,
    ) -> Result<T, SqlWardenError> {
        let Statement {
            conn,
            options,
            sql,
            args,
            timeout,
            max_rows,
            deferred,
            kind: _,
        } = self;
        if let Some(err) = deferred {
            return Err(executor::reject(options, &sql, err, quiet));
        }
        let mut request = Request::new(options, &sql, args);
        request.timeout = timeout;
        request.max_rows = max_rows;
        request.quiet = quiet;
        run(conn, request)
    }

    /// Positional argument. `Option<T>` binds a null typed as `T`.
    pub fn arg(self, value: impl Into<TypedArgument>) -> Self {
        self.push(value.into())
    }

    /// Named argument for a `:name` marker; the leading `:` is optional.
    pub fn arg_named(self, name: &str, value: impl Into<TypedArgument>) -> Self {
        self.push_named(name, value.into())
    }

    /// Boolean stored as `'Y'` or `'N'`.
    pub fn arg_bool(self, value: bool) -> Self {
        self.push(TypedArgument::Boolean(Some(value)))
    }

    pub fn arg_bool_named(self, name: &str, value: bool) -> Self {
        self.push_named(name, TypedArgument::Boolean(Some(value)))
    }

    pub fn arg_clob(self, text: impl Into<String>) -> Self {
        self.push(TypedArgument::clob(text))
    }

    pub fn arg_clob_named(self, name: &str, text: impl Into<String>) -> Self {
        self.push_named(name, TypedArgument::clob(text))
    }

    /// Character large object read from `reader` at bind time. `length` may be unknown.
    pub fn arg_clob_stream(self, reader: impl Read + Send + 'static, length: Option<u64>) -> Self {
        self.push(TypedArgument::clob_stream(reader, length))
    }

    pub fn arg_clob_stream_named(
        self,
        name: &str,
        reader: impl Read + Send + 'static,
        length: Option<u64>,
    ) -> Self {
        self.push_named(name, TypedArgument::clob_stream(reader, length))
    }

    pub fn arg_blob(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.push(TypedArgument::blob(bytes))
    }

    pub fn arg_blob_named(self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.push_named(name, TypedArgument::blob(bytes))
    }

    /// Binary large object read from `reader` at bind time. `length` may be unknown.
    pub fn arg_blob_stream(self, reader: impl Read + Send + 'static, length: Option<u64>) -> Self {
        self.push(TypedArgument::blob_stream(reader, length))
    }

    pub fn arg_blob_stream_named(
        self,
        name: &str,
        reader: impl Read + Send + 'static,
        length: Option<u64>,
    ) -> Self {
        self.push_named(name, TypedArgument::blob_stream(reader, length))
    }

    /// The application clock's current time, bound as a timestamp.
    pub fn arg_date_now_per_app(self) -> Self {
        let now = self.options.clock.now();
        self.push(TypedArgument::Timestamp(Some(now)))
    }

    pub fn arg_date_now_per_app_named(self, name: &str) -> Self {
        let now = self.options.clock.now();
        self.push_named(name, TypedArgument::Timestamp(Some(now)))
    }

    /// The database's current time, written into the SQL rather than bound.
    pub fn arg_date_now_per_db(self) -> Self {
        self.push(TypedArgument::date_now_per_db())
    }

    pub fn arg_date_now_per_db_named(self, name: &str) -> Self {
        self.push_named(name, TypedArgument::date_now_per_db())
    }

    /// Statement timeout for this execution, overriding [`Options::default_timeout_secs`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<C> Statement<'_, C, Select>
where
    C: NativeConnection + ?Sized,
{
    /// Stop fetching after `max_rows` rows.
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    /// Run the query and pass its rows to `handler`, positioned before the first row.
    ///
    /// # Errors
    /// Returns rewrite, bind, execution, or fetch failures, or the handler's own error.
    pub fn query<T, F>(self, handler: F) -> Result<T, SqlWardenError>
    where
        F: FnOnce(&mut Rows<'_>) -> Result<T, SqlWardenError>,
    {
        self.run(|conn, request| executor::query(conn, request, handler))
    }

    /// Map the first row, if there is one.
    ///
    /// # Errors
    /// See [`Statement::query`].
    pub fn query_first_or_none<T, F>(self, mapper: F) -> Result<Option<T>, SqlWardenError>
    where
        F: FnOnce(&mut Rows<'_>) -> Result<T, SqlWardenError>,
    {
        self.query(|rows| {
            if rows.next()? {
                mapper(rows).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Map every row.
    ///
    /// # Errors
    /// See [`Statement::query`].
    pub fn query_many<T, F>(self, mut mapper: F) -> Result<Vec<T>, SqlWardenError>
    where
        F: FnMut(&mut Rows<'_>) -> Result<T, SqlWardenError>,
    {
        self.query(|rows| {
            let mut out = Vec::new();
            while rows.next()? {
                out.push(mapper(rows)?);
            }
            Ok(out)
        })
    }

    /// First column of the first row; `None` for no rows or SQL null.
    ///
    /// # Errors
    /// See [`Statement::query`].
    pub fn query_i64_or_none(self) -> Result<Option<i64>, SqlWardenError> {
        Ok(self.query_first_or_none(|rows| rows.get_i64(1usize))?.flatten())
    }

    /// # Errors
    /// See [`Statement::query`].
    pub fn query_string_or_none(self) -> Result<Option<String>, SqlWardenError> {
        Ok(self.query_first_or_none(|rows| rows.get_string(1usize))?.flatten())
    }

    /// # Errors
    /// See [`Statement::query`].
    pub fn query_timestamp_or_none(self) -> Result<Option<NaiveDateTime>, SqlWardenError> {
        Ok(self.query_first_or_none(|rows| rows.get_timestamp(1usize))?.flatten())
    }
}

impl<C> Statement<'_, C, Insert>
where
    C: NativeConnection + ?Sized,
{
    /// Marks where the next value of `sequence` goes. Used with
    /// [`Statement::insert_returning_pk_seq`].
    pub fn arg_pk_seq(self, sequence: &str) -> Self {
        self.push(TypedArgument::pk_seq(sequence))
    }

    pub fn arg_pk_seq_named(self, name: &str, sequence: &str) -> Self {
        self.push_named(name, TypedArgument::pk_seq(sequence))
    }

    /// # Errors
    /// Returns rewrite, bind, or execution failures.
    pub fn insert(self) -> Result<usize, SqlWardenError> {
        self.run(|conn, request| executor::update(conn, request, None))
    }

    /// # Errors
    /// Returns `WrongRowCount` when the insert did not affect exactly `expected` rows.
    pub fn insert_expecting(self, expected: usize) -> Result<usize, SqlWardenError> {
        self.run(|conn, request| executor::update(conn, request, Some(expected)))
    }

    /// Insert one row and return the primary key assigned from the `arg_pk_seq` sequence.
    ///
    /// `pk_column` names the key column for dialects that read it back with `returning`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` without an `arg_pk_seq` argument and `WrongRowCount` when the
    /// insert did not affect exactly one row.
    pub fn insert_returning_pk_seq(self, pk_column: &str) -> Result<i64, SqlWardenError> {
        self.run(|conn, request| executor::insert_returning_pk(conn, request, pk_column))
    }
}

impl<C> Statement<'_, C, Update>
where
    C: NativeConnection + ?Sized,
{
    /// # Errors
    /// Returns rewrite, bind, or execution failures.
    pub fn update(self) -> Result<usize, SqlWardenError> {
        self.run(|conn, request| executor::update(conn, request, None))
    }

    /// # Errors
    /// Returns `WrongRowCount` when the update did not affect exactly `expected` rows.
    pub fn update_expecting(self, expected: usize) -> Result<usize, SqlWardenError> {
        self.run(|conn, request| executor::update(conn, request, Some(expected)))
    }
}

impl<C> Statement<'_, C, Delete>
where
    C: NativeConnection + ?Sized,
{
    /// # Errors
    /// Returns rewrite, bind, or execution failures.
    pub fn delete(self) -> Result<usize, SqlWardenError> {
        self.run(|conn, request| executor::update(conn, request, None))
    }

    /// # Errors
    /// Returns `WrongRowCount` when the delete did not affect exactly `expected` rows.
    pub fn delete_expecting(self, expected: usize) -> Result<usize, SqlWardenError> {
        self.run(|conn, request| executor::update(conn, request, Some(expected)))
    }
}

impl<C> Statement<'_, C, Ddl>
where
    C: NativeConnection + ?Sized,
{
    /// # Errors
    /// Returns rewrite, bind, or execution failures.
    pub fn execute(self) -> Result<(), SqlWardenError> {
        self.run(|conn, request| executor::ddl(conn, request))
    }

    /// Execute and ignore any failure, e.g. `drop table` on a table that may not exist.
    pub fn execute_quietly(self) {
        let _ignored = self.run_reporting(true, |conn, request| {
            executor::ddl_quietly(conn, request);
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{NativeError, NativeStatement};
    use std::sync::{Arc, Mutex};

    /// A connection that refuses to prepare anything.
    struct Unreachable;

    impl NativeConnection for Unreachable {
        fn prepare<'c>(
            &'c mut self,
            sql: &str,
        ) -> Result<Box<dyn NativeStatement + 'c>, NativeError> {
            Err(NativeError::other(format!("unexpected prepare of {sql}")))
        }
    }

    fn db() -> Database<Unreachable> {
        Database::new(Unreachable, Options::new(DialectTag::Sqlite))
    }

    #[test]
    fn positional_after_named_is_reported_at_execution() {
        let mut db = db();
        let err = db
            .to_update("update t set a = :a")
            .arg_named("a", 1)
            .arg(2)
            .update()
            .unwrap_err();
        assert!(matches!(err, SqlWardenError::MixedParameterStyle { .. }), "{err}");
    }

    #[test]
    fn named_after_positional_is_reported_at_execution() {
        let mut db = db();
        let err = db
            .to_select("select 1 from t where a = ?")
            .arg(1)
            .arg_named("b", 2)
            .query_i64_or_none()
            .unwrap_err();
        assert!(matches!(err, SqlWardenError::MixedParameterStyle { .. }), "{err}");
    }

    #[test]
    fn duplicate_name_is_a_mismatch() {
        let mut db = db();
        let err = db
            .to_delete("delete from t where a = :a")
            .arg_named("a", 1)
            .arg_named(":a", 2)
            .delete()
            .unwrap_err();
        assert!(matches!(err, SqlWardenError::ParameterMismatch { .. }), "{err}");
        assert!(err.error_code().is_some());
    }

    #[test]
    fn first_deferred_error_is_kept() {
        let mut db = db();
        let err = db
            .to_insert("insert into t values (?)")
            .arg(1)
            .arg_named("a", 2)
            .arg_named("b", 3)
            .insert()
            .unwrap_err();
        assert!(matches!(err, SqlWardenError::MixedParameterStyle { ref message, .. } if message.contains(":a")));
    }

    #[test]
    fn rewrite_failures_never_reach_prepare() {
        let mut db = db();
        let err = db
            .to_update("update t set a = ?")
            .update()
            .unwrap_err();
        assert!(matches!(err, SqlWardenError::ParameterMismatch { .. }), "{err}");
    }

    #[test]
    fn prepare_failure_is_an_execution_error() {
        let mut db = db();
        let err = db.to_ddl("create table t (a int)").execute().unwrap_err();
        assert!(matches!(err, SqlWardenError::Execution { source: Some(_), .. }), "{err}");
    }

    #[test]
    fn quiet_ddl_swallows_failures() {
        let mut db = db();
        db.to_ddl("drop table missing").execute_quietly();
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn quiet_builder_errors_are_only_warnings() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut db = db();
            db.to_ddl("drop table t where a = ?")
                .arg(1)
                .arg_named("a", 2)
                .execute_quietly();
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("ignoring failure of quiet statement"), "{logs}");
        assert!(!logs.contains("ERROR"), "{logs}");
    }

    #[test]
    fn app_clock_is_exposed() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|d| d.and_hms_milli_opt(12, 0, 0, 5))
            .unwrap();
        let options = Options::builder(DialectTag::Sqlite)
            .clock(crate::options::Clock::fixed(at))
            .finish();
        let db = Database::new(Unreachable, options);
        assert_eq!(db.now(), at);
        assert_eq!(db.dialect(), DialectTag::Sqlite);
    }
}
