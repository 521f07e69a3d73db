use thiserror::Error;

use crate::diagnostics::ErrorDetail;
use crate::native::NativeError;

/// Every failure the engine reports.
///
/// Driver errors never escape on their own: they are wrapped here and reachable through
/// [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum SqlWardenError {
    #[error("Mixed parameter styles: {message} {detail}")]
    MixedParameterStyle { message: String, detail: ErrorDetail },

    #[error("Parameter mismatch: {message} {detail}")]
    ParameterMismatch { message: String, detail: ErrorDetail },

    #[error("Invalid argument: {message} {detail}")]
    InvalidArgument { message: String, detail: ErrorDetail },

    #[error("Failed to bind parameter {position} {detail}")]
    Bind {
        position: usize,
        detail: ErrorDetail,
        #[source]
        source: NativeError,
    },

    #[error("Expected {expected} row(s) to be affected but was {actual} {detail}")]
    WrongRowCount {
        expected: usize,
        actual: usize,
        detail: ErrorDetail,
    },

    #[error("Query cancelled or timed out {detail}")]
    QueryCancelledOrTimedOut {
        detail: ErrorDetail,
        #[source]
        source: NativeError,
    },

    #[error("Error executing SQL {detail}")]
    Execution {
        detail: ErrorDetail,
        #[source]
        source: Option<NativeError>,
    },

    #[error("Row access error: {0}")]
    RowAccess(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SqlWardenError {
    /// Correlation code shared between this error and the log line written for it.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.detail().map(ErrorDetail::code)
    }

    /// SQL attached in detailed mode.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        self.detail().and_then(ErrorDetail::sql)
    }

    #[must_use]
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            Self::MixedParameterStyle { detail, .. }
            | Self::ParameterMismatch { detail, .. }
            | Self::InvalidArgument { detail, .. }
            | Self::Bind { detail, .. }
            | Self::WrongRowCount { detail, .. }
            | Self::QueryCancelledOrTimedOut { detail, .. }
            | Self::Execution { detail, .. } => Some(detail),
            Self::RowAccess(_) | Self::ConfigError(_) => None,
        }
    }

    /// Replace the detail, keeping the variant. Used once the SQL context is known.
    pub(crate) fn with_detail(mut self, replacement: ErrorDetail) -> Self {
        match &mut self {
            Self::MixedParameterStyle { detail, .. }
            | Self::ParameterMismatch { detail, .. }
            | Self::InvalidArgument { detail, .. }
            | Self::Bind { detail, .. }
            | Self::WrongRowCount { detail, .. }
            | Self::QueryCancelledOrTimedOut { detail, .. }
            | Self::Execution { detail, .. } => *detail = replacement,
            Self::RowAccess(_) | Self::ConfigError(_) => {}
        }
        self
    }

    /// Wrap a driver failure outside any statement context.
    pub(crate) fn native(source: NativeError) -> Self {
        if source.is_cancellation() {
            Self::QueryCancelledOrTimedOut {
                detail: ErrorDetail::terse(),
                source,
            }
        } else {
            Self::Execution {
                detail: ErrorDetail::terse(),
                source: Some(source),
            }
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            detail: ErrorDetail::terse(),
        }
    }

    pub(crate) fn parameter_mismatch(message: impl Into<String>) -> Self {
        Self::ParameterMismatch {
            message: message.into(),
            detail: ErrorDetail::terse(),
        }
    }

    pub(crate) fn mixed_styles(message: impl Into<String>) -> Self {
        Self::MixedParameterStyle {
            message: message.into(),
            detail: ErrorDetail::terse(),
        }
    }
}
