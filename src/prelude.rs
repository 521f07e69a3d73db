//! Convenient imports for common functionality.
//!
//! ```rust
//! use sql_warden::prelude::*;
//! ```

pub use crate::args::TypedArgument;
pub use crate::dialect::DialectTag;
pub use crate::error::SqlWardenError;
pub use crate::native::{NativeConnection, SqlType};
pub use crate::options::{Clock, Options, OptionsBuilder};
pub use crate::rows::Rows;
pub use crate::statement::Database;

#[cfg(feature = "tokio")]
pub use crate::async_db::AsyncDatabase;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteConnection;
