use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::Deserialize;

use crate::dialect::{DialectProfile, DialectTag};
use crate::types::truncate_to_millis;

type ClockFn = dyn Fn() -> NaiveDateTime + Send + Sync;

/// Application clock used for `arg_date_now_per_app`.
///
/// Substitute a fixed clock in tests to get deterministic timestamps.
#[derive(Clone)]
pub struct Clock(Arc<ClockFn>);

impl Clock {
    /// The local system clock.
    #[must_use]
    pub fn system() -> Self {
        Self(Arc::new(|| Local::now().naive_local()))
    }

    /// A clock that always reports `at`.
    #[must_use]
    pub fn fixed(at: NaiveDateTime) -> Self {
        Self(Arc::new(move || at))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Current time truncated to millisecond precision.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        truncate_to_millis((self.0)())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Clock")
    }
}

/// Engine configuration shared by every statement run through a [`crate::Database`].
///
/// Deserializable so it can live in an application config file:
/// ```rust
/// # use sql_warden::prelude::*;
/// let options = Options::builder(DialectTag::Postgres)
///     .detailed_errors(true)
///     .finish();
/// assert!(options.detailed_errors);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    pub dialect: DialectTag,
    /// Include rewritten SQL and literal parameter values in error messages.
    /// This may leak sensitive data into logs and user-facing errors.
    #[serde(default)]
    pub detailed_errors: bool,
    /// Log the parameter-substituted SQL at debug level.
    #[serde(default)]
    pub log_parameters: bool,
    /// Statement timeout applied when a builder does not set one.
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
    #[serde(skip)]
    pub clock: Clock,
}

impl Options {
    #[must_use]
    pub fn new(dialect: DialectTag) -> Self {
        Self {
            dialect,
            detailed_errors: false,
            log_parameters: false,
            default_timeout_secs: None,
            clock: Clock::system(),
        }
    }

    #[must_use]
    pub fn builder(dialect: DialectTag) -> OptionsBuilder {
        OptionsBuilder::new(dialect)
    }

    #[must_use]
    pub fn profile(&self) -> &'static DialectProfile {
        self.dialect.profile()
    }

    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }
}

/// Fluent builder for [`Options`].
#[derive(Debug, Clone)]
pub struct OptionsBuilder {
    opts: Options,
}

impl OptionsBuilder {
    #[must_use]
    pub fn new(dialect: DialectTag) -> Self {
        Self {
            opts: Options::new(dialect),
        }
    }

    #[must_use]
    pub fn detailed_errors(mut self, enabled: bool) -> Self {
        self.opts.detailed_errors = enabled;
        self
    }

    #[must_use]
    pub fn log_parameters(mut self, enabled: bool) -> Self {
        self.opts.log_parameters = enabled;
        self
    }

    #[must_use]
    pub fn default_timeout_secs(mut self, secs: u64) -> Self {
        self.opts.default_timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.opts.clock = clock;
        self
    }

    #[must_use]
    pub fn finish(self) -> Options {
        self.opts
    }
}
