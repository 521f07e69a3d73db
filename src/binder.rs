//! Attach resolved arguments to a native statement.

use crate::args::{LobSource, TypedArgument};
use crate::native::{NativeError, NativeStatement, SqlType};
use crate::types::truncate_to_millis;

/// A bind call the driver rejected, with its 1-based position.
#[derive(Debug)]
pub struct BindFailure {
    pub position: usize,
    pub source: NativeError,
}

/// Bind `args` to `stmt` in order, starting at position 1.
///
/// Streaming LOBs are handed to the driver as readers; rewrite markers must already have
/// been spliced into the SQL and are rejected here.
///
/// # Errors
/// Returns the first failing position with the driver's error.
pub fn bind_arguments(
    stmt: &mut dyn NativeStatement,
    args: &mut [TypedArgument],
) -> Result<(), BindFailure> {
    for (idx, arg) in args.iter_mut().enumerate() {
        let position = idx + 1;
        bind_one(stmt, position, arg).map_err(|source| BindFailure { position, source })?;
    }
    Ok(())
}

fn bind_one(
    stmt: &mut dyn NativeStatement,
    position: usize,
    arg: &mut TypedArgument,
) -> Result<(), NativeError> {
    match arg {
        TypedArgument::Integer(Some(v)) => stmt.bind_i32(position, *v),
        TypedArgument::Long(Some(v)) => stmt.bind_i64(position, *v),
        TypedArgument::Float(Some(v)) => stmt.bind_f32(position, *v),
        TypedArgument::Double(Some(v)) => stmt.bind_f64(position, *v),
        TypedArgument::Decimal(Some(v)) => stmt.bind_decimal(position, v),
        TypedArgument::Text(Some(v)) => stmt.bind_str(position, v),
        TypedArgument::Boolean(Some(v)) => stmt.bind_str(position, if *v { "Y" } else { "N" }),
        TypedArgument::Timestamp(Some(v)) => stmt.bind_timestamp(position, truncate_to_millis(*v)),
        TypedArgument::Clob(Some(LobSource::Materialized(text))) => stmt.bind_str(position, text),
        TypedArgument::Clob(Some(LobSource::Stream { reader, length })) => {
            stmt.bind_char_stream(position, reader.as_mut(), *length)
        }
        TypedArgument::Blob(Some(LobSource::Materialized(bytes))) => {
            stmt.bind_bytes(position, bytes)
        }
        TypedArgument::Blob(Some(LobSource::Stream { reader, length })) => {
            stmt.bind_byte_stream(position, reader.as_mut(), *length)
        }
        TypedArgument::Integer(None) => stmt.bind_null(position, SqlType::Integer),
        TypedArgument::Long(None) => stmt.bind_null(position, SqlType::BigInt),
        TypedArgument::Float(None) => stmt.bind_null(position, SqlType::Real),
        TypedArgument::Double(None) => stmt.bind_null(position, SqlType::Double),
        TypedArgument::Decimal(None) => stmt.bind_null(position, SqlType::Numeric),
        TypedArgument::Text(None) => stmt.bind_null(position, SqlType::Varchar),
        TypedArgument::Boolean(None) => stmt.bind_null(position, SqlType::Char),
        TypedArgument::Clob(None) => stmt.bind_null(position, SqlType::Clob),
        TypedArgument::Blob(None) => stmt.bind_null(position, SqlType::Blob),
        TypedArgument::Timestamp(None) => stmt.bind_null(position, SqlType::Timestamp),
        TypedArgument::Rewrite(rewrite) => Err(NativeError::other(format!(
            "{rewrite:?} must be rewritten into the SQL text, not bound"
        ))),
    }
}
