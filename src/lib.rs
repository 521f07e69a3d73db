//! Safety layer over a relational database driver.
//!
//! Statements are written with `?` or `:name` markers and typed arguments. The crate rewrites
//! them for the target dialect, binds every argument with an explicit SQL type, runs the
//! statement with guaranteed release of native statements and cursors, and projects rows
//! through null-aware typed accessors. Failures carry a short correlation code that also
//! appears in the log line written for them.
//!
//! ```rust,no_run
//! use sql_warden::prelude::*;
//!
//! # fn demo() -> Result<(), SqlWardenError> {
//! let conn = SqliteConnection::open_in_memory()?;
//! let options = Options::builder(DialectTag::Sqlite).detailed_errors(true).finish();
//! let mut db = Database::new(conn, options);
//!
//! db.to_ddl("drop table users").execute_quietly();
//! db.to_ddl("create table users (id integer primary key, name text)").execute()?;
//! let id = db
//!     .to_insert("insert into users (id, name) values (?, ?)")
//!     .arg_pk_seq("users_seq")
//!     .arg("alice")
//!     .insert_returning_pk_seq("id")?;
//!
//! let name = db
//!     .to_select("select name from users where id = :id")
//!     .arg_named("id", id)
//!     .query_string_or_none()?;
//! assert_eq!(name.as_deref(), Some("alice"));
//! # Ok(()) }
//! ```

pub mod args;
pub mod binder;
pub mod diagnostics;
pub mod dialect;
pub mod error;
mod executor;
mod guard;
pub mod native;
pub mod options;
pub mod prelude;
pub mod rewrite;
pub mod rows;
pub mod statement;
pub mod types;

#[cfg(feature = "tokio")]
pub mod async_db;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use args::{Arguments, DialectRewrite, LobSource, ParameterBindingMode, TypedArgument};
pub use dialect::{
    DialectProfile, DialectTag, IdentifierCase, PkStrategy, PlaceholderStyle, profile_for,
};
pub use error::SqlWardenError;
pub use native::{
    NativeConnection, NativeCursor, NativeError, NativeErrorKind, NativeResource,
    NativeStatement, SqlType,
};
pub use options::{Clock, Options, OptionsBuilder};
pub use rows::{ColumnIndex, Rows};
pub use statement::{
    Database, Ddl, Delete, Insert, Select, SqlDdl, SqlDelete, SqlInsert, SqlSelect, SqlUpdate,
    Statement, Update,
};

#[cfg(feature = "tokio")]
pub use async_db::AsyncDatabase;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;
