//! Typed statement arguments.

use std::fmt;
use std::io::Read;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::dialect::DialectProfile;
use crate::native::SqlType;
use crate::types::{TIMESTAMP_FORMAT, truncate_to_millis};

/// Large-object content: either fully in memory or a live stream.
pub enum LobSource<T> {
    Materialized(T),
    /// A reader whose total length may be unknown.
    Stream {
        reader: Box<dyn Read + Send>,
        length: Option<u64>,
    },
}

impl<T: fmt::Debug> fmt::Debug for LobSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LobSource::Materialized(value) => f.debug_tuple("Materialized").field(value).finish(),
            LobSource::Stream { length, .. } => f
                .debug_struct("Stream")
                .field("length", length)
                .finish_non_exhaustive(),
        }
    }
}

/// SQL spliced into the statement text instead of being bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialectRewrite {
    /// The database's own current time.
    CurrentTimestamp,
    /// Next value of the named sequence; also marks the primary key for
    /// `insert_returning_pk_seq`.
    NextSequenceValue(String),
}

/// One argument for a placeholder. `None` payloads are typed nulls.
///
/// Scalars convert with `into()`, and `Option<T>` produces a null of `T`'s SQL type:
/// ```rust
/// # use sql_warden::prelude::*;
/// let a: TypedArgument = 32.into();
/// let b: TypedArgument = None::<i64>.into();
/// assert!(!a.is_null());
/// assert!(b.is_null());
/// ```
#[derive(Debug)]
pub enum TypedArgument {
    Integer(Option<i32>),
    Long(Option<i64>),
    Float(Option<f32>),
    Double(Option<f64>),
    Decimal(Option<Decimal>),
    Text(Option<String>),
    /// Stored as `'Y'` / `'N'`.
    Boolean(Option<bool>),
    Clob(Option<LobSource<String>>),
    Blob(Option<LobSource<Vec<u8>>>),
    Timestamp(Option<NaiveDateTime>),
    Rewrite(DialectRewrite),
}

impl TypedArgument {
    #[must_use]
    pub fn clob(text: impl Into<String>) -> Self {
        TypedArgument::Clob(Some(LobSource::Materialized(text.into())))
    }

    /// Character data read from `reader` at bind time. `length` is `None` when unknown.
    #[must_use]
    pub fn clob_stream(reader: impl Read + Send + 'static, length: Option<u64>) -> Self {
        TypedArgument::Clob(Some(LobSource::Stream {
            reader: Box::new(reader),
            length,
        }))
    }

    #[must_use]
    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        TypedArgument::Blob(Some(LobSource::Materialized(bytes.into())))
    }

    /// Binary data read from `reader` at bind time. `length` is `None` when unknown.
    #[must_use]
    pub fn blob_stream(reader: impl Read + Send + 'static, length: Option<u64>) -> Self {
        TypedArgument::Blob(Some(LobSource::Stream {
            reader: Box::new(reader),
            length,
        }))
    }

    #[must_use]
    pub fn date_now_per_db() -> Self {
        TypedArgument::Rewrite(DialectRewrite::CurrentTimestamp)
    }

    #[must_use]
    pub fn pk_seq(sequence: impl Into<String>) -> Self {
        TypedArgument::Rewrite(DialectRewrite::NextSequenceValue(sequence.into()))
    }

    /// A typed null for `sql_type`.
    #[must_use]
    pub fn null(sql_type: SqlType) -> Self {
        match sql_type {
            SqlType::Integer => TypedArgument::Integer(None),
            SqlType::BigInt => TypedArgument::Long(None),
            SqlType::Real => TypedArgument::Float(None),
            SqlType::Double => TypedArgument::Double(None),
            SqlType::Numeric => TypedArgument::Decimal(None),
            SqlType::Char => TypedArgument::Boolean(None),
            SqlType::Varchar => TypedArgument::Text(None),
            SqlType::Clob => TypedArgument::Clob(None),
            SqlType::Blob => TypedArgument::Blob(None),
            SqlType::Timestamp => TypedArgument::Timestamp(None),
        }
    }

    /// True for typed nulls. Rewrite markers are never null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            TypedArgument::Integer(v) => v.is_none(),
            TypedArgument::Long(v) => v.is_none(),
            TypedArgument::Float(v) => v.is_none(),
            TypedArgument::Double(v) => v.is_none(),
            TypedArgument::Decimal(v) => v.is_none(),
            TypedArgument::Text(v) => v.is_none(),
            TypedArgument::Boolean(v) => v.is_none(),
            TypedArgument::Clob(v) => v.is_none(),
            TypedArgument::Blob(v) => v.is_none(),
            TypedArgument::Timestamp(v) => v.is_none(),
            TypedArgument::Rewrite(_) => false,
        }
    }

    /// SQL type of the value, used for typed nulls.
    #[must_use]
    pub fn sql_type(&self) -> Option<SqlType> {
        Some(match self {
            TypedArgument::Integer(_) => SqlType::Integer,
            TypedArgument::Long(_) => SqlType::BigInt,
            TypedArgument::Float(_) => SqlType::Real,
            TypedArgument::Double(_) => SqlType::Double,
            TypedArgument::Decimal(_) => SqlType::Numeric,
            TypedArgument::Text(_) => SqlType::Varchar,
            TypedArgument::Boolean(_) => SqlType::Char,
            TypedArgument::Clob(_) => SqlType::Clob,
            TypedArgument::Blob(_) => SqlType::Blob,
            TypedArgument::Timestamp(_) => SqlType::Timestamp,
            TypedArgument::Rewrite(_) => return None,
        })
    }

    /// SQL fragment to splice in place of the placeholder, if this is a rewrite marker.
    #[must_use]
    pub fn rewrite_sql(&self, profile: &DialectProfile) -> Option<String> {
        match self {
            TypedArgument::Rewrite(DialectRewrite::CurrentTimestamp) => {
                Some(profile.current_timestamp.to_string())
            }
            TypedArgument::Rewrite(DialectRewrite::NextSequenceValue(sequence)) => {
                Some(profile.sequence_next_value(sequence))
            }
            _ => None,
        }
    }

    /// Copy the argument when it can be bound more than once. Streams cannot.
    #[must_use]
    pub fn try_clone(&self) -> Option<TypedArgument> {
        Some(match self {
            TypedArgument::Integer(v) => TypedArgument::Integer(*v),
            TypedArgument::Long(v) => TypedArgument::Long(*v),
            TypedArgument::Float(v) => TypedArgument::Float(*v),
            TypedArgument::Double(v) => TypedArgument::Double(*v),
            TypedArgument::Decimal(v) => TypedArgument::Decimal(*v),
            TypedArgument::Text(v) => TypedArgument::Text(v.clone()),
            TypedArgument::Boolean(v) => TypedArgument::Boolean(*v),
            TypedArgument::Timestamp(v) => TypedArgument::Timestamp(*v),
            TypedArgument::Rewrite(r) => TypedArgument::Rewrite(r.clone()),
            TypedArgument::Clob(None) => TypedArgument::Clob(None),
            TypedArgument::Blob(None) => TypedArgument::Blob(None),
            TypedArgument::Clob(Some(LobSource::Materialized(s))) => {
                TypedArgument::Clob(Some(LobSource::Materialized(s.clone())))
            }
            TypedArgument::Blob(Some(LobSource::Materialized(b))) => {
                TypedArgument::Blob(Some(LobSource::Materialized(b.clone())))
            }
            TypedArgument::Clob(Some(LobSource::Stream { .. }))
            | TypedArgument::Blob(Some(LobSource::Stream { .. })) => return None,
        })
    }

    /// Render as a SQL literal for diagnostics, e.g. `'value'` for text.
    #[must_use]
    pub fn render_literal(&self) -> String {
        fn quoted(text: &str) -> String {
            format!("'{}'", text.replace('\'', "''"))
        }
        if self.is_null() {
            return "null".to_string();
        }
        match self {
            TypedArgument::Integer(Some(v)) => v.to_string(),
            TypedArgument::Long(Some(v)) => v.to_string(),
            TypedArgument::Float(Some(v)) => v.to_string(),
            TypedArgument::Double(Some(v)) => v.to_string(),
            TypedArgument::Decimal(Some(v)) => v.to_string(),
            TypedArgument::Text(Some(v)) => quoted(v),
            TypedArgument::Boolean(Some(v)) => quoted(if *v { "Y" } else { "N" }),
            TypedArgument::Timestamp(Some(v)) => {
                quoted(&truncate_to_millis(*v).format(TIMESTAMP_FORMAT).to_string())
            }
            TypedArgument::Clob(Some(LobSource::Materialized(s))) => {
                format!("<clob {} chars>", s.chars().count())
            }
            TypedArgument::Blob(Some(LobSource::Materialized(b))) => {
                format!("<blob {} bytes>", b.len())
            }
            TypedArgument::Clob(Some(LobSource::Stream { .. })) => "<clob stream>".to_string(),
            TypedArgument::Blob(Some(LobSource::Stream { .. })) => "<blob stream>".to_string(),
            TypedArgument::Rewrite(r) => format!("{r:?}"),
            _ => "null".to_string(),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for TypedArgument {
                fn from(value: $ty) -> Self {
                    TypedArgument::$variant(Some(value.into()))
                }
            }

            impl From<Option<$ty>> for TypedArgument {
                fn from(value: Option<$ty>) -> Self {
                    TypedArgument::$variant(value.map(Into::into))
                }
            }
        )*
    };
}

impl_from_scalar!(
    i32 => Integer,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => Text,
    &str => Text,
    bool => Boolean,
    NaiveDateTime => Timestamp,
    Vec<u8> => Blob,
);

impl From<LobSource<Vec<u8>>> for TypedArgument {
    fn from(value: LobSource<Vec<u8>>) -> Self {
        TypedArgument::Blob(Some(value))
    }
}

impl From<Vec<u8>> for LobSource<Vec<u8>> {
    fn from(value: Vec<u8>) -> Self {
        LobSource::Materialized(value)
    }
}

/// Arguments collected by a builder, in exactly one binding mode.
#[derive(Debug, Default)]
pub enum Arguments {
    #[default]
    Empty,
    Positional(Vec<TypedArgument>),
    /// Names are stored without a leading `:`, case-sensitive.
    Named(Vec<(String, TypedArgument)>),
}

/// Which binding mode a set of arguments uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterBindingMode {
    Positional,
    Named,
}

impl Arguments {
    #[must_use]
    pub fn mode(&self) -> Option<ParameterBindingMode> {
        match self {
            Arguments::Empty => None,
            Arguments::Positional(_) => Some(ParameterBindingMode::Positional),
            Arguments::Named(_) => Some(ParameterBindingMode::Named),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Arguments::Empty => 0,
            Arguments::Positional(args) => args.len(),
            Arguments::Named(args) => args.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a positional argument.
    ///
    /// # Errors
    /// Returns a message when named arguments were already registered.
    pub fn push_positional(&mut self, arg: TypedArgument) -> Result<(), String> {
        match self {
            Arguments::Empty => {
                *self = Arguments::Positional(vec![arg]);
                Ok(())
            }
            Arguments::Positional(args) => {
                args.push(arg);
                Ok(())
            }
            Arguments::Named(_) => {
                Err("positional argument supplied after named arguments".to_string())
            }
        }
    }

    /// Register a named argument; a leading `:` is stripped.
    ///
    /// # Errors
    /// Returns `(message, mixed)` where `mixed` is true when positional arguments were
    /// already supplied and false for a duplicate or empty name.
    pub fn push_named(&mut self, name: &str, arg: TypedArgument) -> Result<(), (String, bool)> {
        let name = name.strip_prefix(':').unwrap_or(name);
        if name.is_empty() {
            return Err(("argument name must not be empty".to_string(), false));
        }
        match self {
            Arguments::Empty => {
                *self = Arguments::Named(vec![(name.to_string(), arg)]);
                Ok(())
            }
            Arguments::Named(args) => {
                if args.iter().any(|(existing, _)| existing == name) {
                    return Err((format!("argument :{name} supplied more than once"), false));
                }
                args.push((name.to_string(), arg));
                Ok(())
            }
            Arguments::Positional(_) => Err((
                format!("named argument :{name} supplied after positional arguments"),
                true,
            )),
        }
    }

    /// Find the sequence marker used by `insert_returning_pk_seq`.
    pub(crate) fn pk_seq_mut(&mut self) -> Option<&mut TypedArgument> {
        let is_pk = |arg: &TypedArgument| {
            matches!(arg, TypedArgument::Rewrite(DialectRewrite::NextSequenceValue(_)))
        };
        match self {
            Arguments::Empty => None,
            Arguments::Positional(args) => args.iter_mut().find(|a| is_pk(a)),
            Arguments::Named(args) => args.iter_mut().map(|(_, a)| a).find(|a| is_pk(a)),
        }
    }
}
