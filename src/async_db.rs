use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use crate::error::SqlWardenError;
use crate::native::{NativeConnection, NativeError};
use crate::statement::Database;

/// A [`Database`] shared between async tasks.
///
/// The engine is blocking, so each [`AsyncDatabase::run`] call takes the lock and runs its
/// closure on tokio's blocking pool. One closure runs at a time per connection.
pub struct AsyncDatabase<C> {
    inner: Arc<Mutex<Database<C>>>,
}

impl<C> Clone for AsyncDatabase<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> AsyncDatabase<C>
where
    C: NativeConnection + Send + 'static,
{
    #[must_use]
    pub fn new(db: Database<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `func` against the database on the blocking pool.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use sql_warden::prelude::*;
    ///
    /// # async fn demo() -> Result<(), SqlWardenError> {
    /// let conn = SqliteConnection::open_in_memory()?;
    /// let db = AsyncDatabase::new(Database::new(conn, Options::new(DialectTag::Sqlite)));
    /// let one = db
    ///     .run(|db| db.to_select("select 1").query_i64_or_none())
    ///     .await?;
    /// assert_eq!(one, Some(1));
    /// # Ok(()) }
    /// ```
    ///
    /// # Errors
    /// Returns whatever `func` returns, or `Execution` if the blocking task panicked or was
    /// cancelled.
    pub async fn run<F, R>(&self, func: F) -> Result<R, SqlWardenError>
    where
        F: FnOnce(&mut Database<C>) -> Result<R, SqlWardenError> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || {
            let mut guard = inner.blocking_lock();
            func(&mut guard)
        })
        .await
        .map_err(|e| {
            SqlWardenError::native(NativeError::other(format!(
                "spawn_blocking join error: {e}"
            )))
        })?
    }
}
