//! Error detail, correlation codes, and per-statement timing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{Level, debug, error, warn};

use crate::error::SqlWardenError;
use crate::native::NativeError;
use crate::options::Options;
use crate::rewrite::{RewriteError, RewriteErrorKind, RewrittenStatement};

const CODE_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CODE_LEN: usize = 6;

static CODE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a short correlation code that ties an error message to its log line.
#[must_use]
pub fn new_error_code() -> String {
    let clock = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() ^ u64::from(d.subsec_nanos()))
        .unwrap_or_default();
    let sequence = CODE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut value = clock
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(sequence.wrapping_mul(1_442_695_040_888_963_407));
    value ^= value >> 29;

    let mut code = String::with_capacity(CODE_LEN);
    for _ in 0..CODE_LEN {
        code.push(char::from(CODE_ALPHABET[(value % 36) as usize]));
        value /= 36;
    }
    code
}

/// Correlation code plus optional SQL context attached to an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    code: String,
    sql: Option<String>,
}

impl ErrorDetail {
    #[must_use]
    pub fn new(code: String, sql: Option<String>) -> Self {
        Self { code, sql }
    }

    /// A fresh code and no SQL.
    #[must_use]
    pub fn terse() -> Self {
        Self::new(new_error_code(), None)
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "(errorCode={}): {sql}", self.code),
            None => write!(f, "(errorCode={})", self.code),
        }
    }
}

/// Named elapsed-time checkpoints for one statement.
///
/// A disabled metric never reads the clock.
#[derive(Debug)]
pub struct Metric {
    last: Option<Instant>,
    checkpoints: Vec<(&'static str, Duration)>,
}

impl Metric {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            last: enabled.then(Instant::now),
            checkpoints: Vec::new(),
        }
    }

    /// Metric enabled whenever debug logging is on.
    #[must_use]
    pub fn for_logging() -> Self {
        Self::new(tracing::enabled!(Level::DEBUG))
    }

    pub fn checkpoint(&mut self, name: &'static str) {
        if let Some(last) = self.last {
            let now = Instant::now();
            self.checkpoints.push((name, now - last));
            self.last = Some(now);
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.last.is_some()
    }

    #[must_use]
    pub fn checkpoints(&self) -> &[(&'static str, Duration)] {
        &self.checkpoints
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.checkpoints.iter().map(|(_, d)| *d).sum()
    }

    /// Render as `total=1.2ms(prepare=0.3ms,execute=0.9ms)`.
    #[must_use]
    pub fn message(&self) -> String {
        let parts = self
            .checkpoints
            .iter()
            .map(|(name, d)| format!("{name}={:.3}ms", d.as_secs_f64() * 1000.0))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "total={:.3}ms({parts})",
            self.total().as_secs_f64() * 1000.0
        )
    }
}

/// SQL context for one statement execution, used to build errors and log lines.
pub(crate) struct StatementContext<'o> {
    options: &'o Options,
    template: &'o str,
    native_sql: Option<String>,
    debug_sql: Option<String>,
}

impl<'o> StatementContext<'o> {
    pub(crate) fn new(options: &'o Options, template: &'o str) -> Self {
        Self {
            options,
            template,
            native_sql: None,
            debug_sql: None,
        }
    }

    /// Record the rewritten form. The substituted form is rendered only when some consumer
    /// (detailed errors or parameter logging) will use it.
    pub(crate) fn attach(&mut self, rewritten: &RewrittenStatement) {
        self.native_sql = Some(rewritten.sql().to_string());
        if self.options.detailed_errors || self.options.log_parameters {
            self.debug_sql = Some(rewritten.debug_sql());
        }
    }

    fn sql_for_logs(&self) -> &str {
        self.native_sql.as_deref().unwrap_or(self.template)
    }

    fn detail_text(&self) -> Option<String> {
        if !self.options.detailed_errors {
            return None;
        }
        Some(match (&self.native_sql, &self.debug_sql) {
            (Some(native), Some(debug)) => format!("{native}|{debug}"),
            (Some(native), None) => native.clone(),
            _ => self.template.to_string(),
        })
    }

    pub(crate) fn detail(&self) -> ErrorDetail {
        ErrorDetail::new(new_error_code(), self.detail_text())
    }

    pub(crate) fn contextualize(&self, err: SqlWardenError) -> SqlWardenError {
        if err.detail().is_some() {
            err.with_detail(self.detail())
        } else {
            err
        }
    }

    pub(crate) fn rewrite_error(&self, err: RewriteError) -> SqlWardenError {
        let detail = self.detail();
        let RewriteError { kind, message } = err;
        match kind {
            RewriteErrorKind::MixedStyles => SqlWardenError::MixedParameterStyle { message, detail },
            RewriteErrorKind::Mismatch => SqlWardenError::ParameterMismatch { message, detail },
            RewriteErrorKind::InvalidArgument => SqlWardenError::InvalidArgument { message, detail },
        }
    }

    pub(crate) fn bind_error(&self, position: usize, source: NativeError) -> SqlWardenError {
        SqlWardenError::Bind {
            position,
            detail: self.detail(),
            source,
        }
    }

    /// Translate a failure raised while preparing, executing, or fetching.
    pub(crate) fn native_error(&self, source: NativeError) -> SqlWardenError {
        if source.is_cancellation() {
            SqlWardenError::QueryCancelledOrTimedOut {
                detail: self.detail(),
                source,
            }
        } else {
            SqlWardenError::Execution {
                detail: self.detail(),
                source: Some(source),
            }
        }
    }

    pub(crate) fn failure(&self, message: &str) -> SqlWardenError {
        let mut detail = self.detail();
        detail.sql = Some(match detail.sql.take() {
            Some(sql) => format!("{message}: {sql}"),
            None => message.to_string(),
        });
        SqlWardenError::Execution {
            detail,
            source: None,
        }
    }

    pub(crate) fn wrong_row_count(&self, expected: usize, actual: usize) -> SqlWardenError {
        SqlWardenError::WrongRowCount {
            expected,
            actual,
            detail: self.detail(),
        }
    }

    pub(crate) fn log_close_failure(&self, resource: &str, err: &NativeError) {
        warn!(resource, sql = %self.sql_for_logs(), error = %err, "failed to close native {resource}");
    }

    pub(crate) fn log_success(&self, metric: &Metric) {
        if !metric.is_enabled() {
            return;
        }
        match (&self.debug_sql, self.options.log_parameters) {
            (Some(debug_sql), true) => {
                debug!(timing = %metric.message(), sql = %self.sql_for_logs(), params = %debug_sql, "statement finished");
            }
            _ => debug!(timing = %metric.message(), sql = %self.sql_for_logs(), "statement finished"),
        }
    }

    pub(crate) fn log_ignored_failure(&self, err: &SqlWardenError) {
        let code = err.error_code().unwrap_or("-");
        warn!(error_code = code, sql = %self.sql_for_logs(), error = %err, "ignoring failure of quiet statement");
    }

    pub(crate) fn log_failure(&self, err: &SqlWardenError) {
        let code = err.error_code().unwrap_or("-");
        match (&self.debug_sql, self.options.log_parameters) {
            (Some(debug_sql), true) => {
                error!(error_code = code, sql = %self.sql_for_logs(), params = %debug_sql, error = %err, "statement failed");
            }
            _ => error!(error_code = code, sql = %self.sql_for_logs(), error = %err, "statement failed"),
        }
    }
}
