//! Supported database kinds and their static rewrite rules.

use std::borrow::Cow;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::SqlWardenError;

/// The database kinds the engine knows how to rewrite for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectTag {
    /// Oracle Database
    Oracle,
    /// `PostgreSQL`
    #[value(alias = "postgresql")]
    #[serde(alias = "postgresql")]
    Postgres,
    /// Microsoft SQL Server
    #[value(name = "sqlserver", alias = "mssql")]
    #[serde(alias = "mssql")]
    SqlServer,
    /// Apache Derby
    Derby,
    /// `HyperSQL`
    Hsqldb,
    /// `SQLite`
    Sqlite,
}

impl DialectTag {
    /// Static profile for this dialect.
    #[must_use]
    pub fn profile(self) -> &'static DialectProfile {
        match self {
            DialectTag::Oracle => &ORACLE,
            DialectTag::Postgres => &POSTGRES,
            DialectTag::SqlServer => &SQL_SERVER,
            DialectTag::Derby => &DERBY,
            DialectTag::Hsqldb => &HSQLDB,
            DialectTag::Sqlite => &SQLITE,
        }
    }

    /// Guess the dialect from a connection URL such as `jdbc:postgresql://host/db`,
    /// `postgres://host/db`, or `sqlite:app.db`.
    #[must_use]
    pub fn from_url(url: &str) -> Option<DialectTag> {
        const PREFIXES: [(&str, DialectTag); 9] = [
            ("jdbc:oracle:", DialectTag::Oracle),
            ("jdbc:postgresql:", DialectTag::Postgres),
            ("postgres://", DialectTag::Postgres),
            ("postgresql://", DialectTag::Postgres),
            ("jdbc:sqlserver:", DialectTag::SqlServer),
            ("jdbc:derby:", DialectTag::Derby),
            ("jdbc:hsqldb:", DialectTag::Hsqldb),
            ("jdbc:sqlite:", DialectTag::Sqlite),
            ("sqlite:", DialectTag::Sqlite),
        ];
        let lowered = url.trim().to_ascii_lowercase();
        PREFIXES
            .iter()
            .find(|(prefix, _)| lowered.starts_with(prefix))
            .map(|(_, tag)| *tag)
    }
}

impl FromStr for DialectTag {
    type Err = SqlWardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <DialectTag as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| SqlWardenError::ConfigError(format!("unknown database dialect: {s}")))
    }
}

/// Look up the profile for a configured dialect name.
///
/// # Errors
/// Returns `SqlWardenError::ConfigError` for an unknown tag.
pub fn profile_for(tag: &str) -> Result<&'static DialectProfile, SqlWardenError> {
    tag.parse::<DialectTag>().map(DialectTag::profile)
}

/// Placeholder syntax the native driver expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// Bare `?`.
    Question,
    /// Numbered `?1`, `?2` (`SQLite`).
    QuestionNumbered,
    /// Numbered `$1`, `$2` (`PostgreSQL` wire protocol).
    Dollar,
}

impl PlaceholderStyle {
    /// Placeholder text for the 1-based `index`.
    #[must_use]
    pub fn placeholder(self, index: usize) -> Cow<'static, str> {
        match self {
            PlaceholderStyle::Question => Cow::Borrowed("?"),
            PlaceholderStyle::QuestionNumbered => Cow::Owned(format!("?{index}")),
            PlaceholderStyle::Dollar => Cow::Owned(format!("${index}")),
        }
    }
}

/// How a generated primary key is obtained after an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkStrategy {
    /// Query the sequence first, then bind the value into the insert.
    SequencePreQuery,
    /// One statement: `insert ... returning pk`.
    InsertReturning,
    /// Ask the driver for the key it generated.
    GeneratedKeys,
}

/// Case applied by the database to unquoted identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierCase {
    Upper,
    Lower,
    Preserve,
}

/// Read-only per-dialect rules.
#[derive(Debug, PartialEq, Eq)]
pub struct DialectProfile {
    pub tag: DialectTag,
    pub placeholder: PlaceholderStyle,
    /// SQL expression for the database's current time, at millisecond precision.
    pub current_timestamp: &'static str,
    sequence_next_value: &'static str,
    value_query: &'static str,
    pub pk_strategy: PkStrategy,
    /// `$tag$ ... $tag$` string bodies exist (`PostgreSQL`); elsewhere `$` is an identifier
    /// character.
    pub dollar_quoting: bool,
    /// How column names come back for identifiers created unquoted.
    pub unquoted_identifiers: IdentifierCase,
    quote_open: char,
    quote_close: char,
}

const SEQ: &str = "{seq}";
const EXPR: &str = "{expr}";

impl DialectProfile {
    /// Expression yielding the next value of `sequence`.
    #[must_use]
    pub fn sequence_next_value(&self, sequence: &str) -> String {
        self.sequence_next_value.replace(SEQ, sequence)
    }

    /// Whether the dialect has real sequences. Without them the sequence expression is a
    /// `null` that lets the database assign the key itself.
    #[must_use]
    pub fn supports_sequences(&self) -> bool {
        self.sequence_next_value.contains(SEQ)
    }

    /// Standalone query returning one row holding the value of `expr`.
    #[must_use]
    pub fn value_query(&self, expr: &str) -> String {
        self.value_query.replace(EXPR, expr)
    }

    /// Standalone query returning the next value of `sequence`.
    #[must_use]
    pub fn sequence_value_query(&self, sequence: &str) -> String {
        self.value_query(&self.sequence_next_value(sequence))
    }

    /// Quote an identifier, doubling any embedded closing quote.
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push(self.quote_open);
        for c in name.chars() {
            if c == self.quote_close {
                quoted.push(c);
            }
            quoted.push(c);
        }
        quoted.push(self.quote_close);
        quoted
    }

    /// Name the database reports for an identifier created unquoted.
    #[must_use]
    pub fn normalize_identifier(&self, name: &str) -> String {
        match self.unquoted_identifiers {
            IdentifierCase::Upper => name.to_uppercase(),
            IdentifierCase::Lower => name.to_lowercase(),
            IdentifierCase::Preserve => name.to_string(),
        }
    }
}

static ORACLE: DialectProfile = DialectProfile {
    tag: DialectTag::Oracle,
    placeholder: PlaceholderStyle::Question,
    current_timestamp: "systimestamp(3)",
    sequence_next_value: "{seq}.nextval",
    value_query: "select {expr} from dual",
    pk_strategy: PkStrategy::SequencePreQuery,
    dollar_quoting: false,
    unquoted_identifiers: IdentifierCase::Upper,
    quote_open: '"',
    quote_close: '"',
};

static POSTGRES: DialectProfile = DialectProfile {
    tag: DialectTag::Postgres,
    placeholder: PlaceholderStyle::Dollar,
    current_timestamp: "date_trunc('milliseconds',localtimestamp)",
    sequence_next_value: "nextval('{seq}')",
    value_query: "select {expr}",
    pk_strategy: PkStrategy::InsertReturning,
    dollar_quoting: true,
    unquoted_identifiers: IdentifierCase::Lower,
    quote_open: '"',
    quote_close: '"',
};

static SQL_SERVER: DialectProfile = DialectProfile {
    tag: DialectTag::SqlServer,
    placeholder: PlaceholderStyle::Question,
    current_timestamp: "current_timestamp",
    sequence_next_value: "next value for {seq}",
    value_query: "select {expr}",
    pk_strategy: PkStrategy::GeneratedKeys,
    dollar_quoting: false,
    unquoted_identifiers: IdentifierCase::Preserve,
    quote_open: '[',
    quote_close: ']',
};

static DERBY: DialectProfile = DialectProfile {
    tag: DialectTag::Derby,
    placeholder: PlaceholderStyle::Question,
    current_timestamp: "current_timestamp",
    sequence_next_value: "next value for {seq}",
    value_query: "values {expr}",
    pk_strategy: PkStrategy::GeneratedKeys,
    dollar_quoting: false,
    unquoted_identifiers: IdentifierCase::Upper,
    quote_open: '"',
    quote_close: '"',
};

static HSQLDB: DialectProfile = DialectProfile {
    tag: DialectTag::Hsqldb,
    placeholder: PlaceholderStyle::Question,
    current_timestamp: "localtimestamp",
    sequence_next_value: "next value for {seq}",
    value_query: "select {expr} from (values(0))",
    pk_strategy: PkStrategy::GeneratedKeys,
    dollar_quoting: false,
    unquoted_identifiers: IdentifierCase::Upper,
    quote_open: '"',
    quote_close: '"',
};

static SQLITE: DialectProfile = DialectProfile {
    tag: DialectTag::Sqlite,
    placeholder: PlaceholderStyle::QuestionNumbered,
    current_timestamp: "strftime('%Y-%m-%d %H:%M:%f','now','localtime')",
    sequence_next_value: "null",
    value_query: "select {expr}",
    pk_strategy: PkStrategy::GeneratedKeys,
    dollar_quoting: false,
    unquoted_identifiers: IdentifierCase::Preserve,
    quote_open: '"',
    quote_close: '"',
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_case_insensitively_with_aliases() {
        assert_eq!("POSTGRES".parse::<DialectTag>().unwrap(), DialectTag::Postgres);
        assert_eq!("postgresql".parse::<DialectTag>().unwrap(), DialectTag::Postgres);
        assert_eq!("mssql".parse::<DialectTag>().unwrap(), DialectTag::SqlServer);
        assert_eq!("SqlServer".parse::<DialectTag>().unwrap(), DialectTag::SqlServer);
        assert!(matches!(
            profile_for("db2"),
            Err(SqlWardenError::ConfigError(msg)) if msg.contains("db2")
        ));
    }

    #[test]
    fn every_tag_maps_to_its_own_profile() {
        for tag in DialectTag::value_variants() {
            assert_eq!(tag.profile().tag, *tag);
        }
    }

    #[test]
    fn sequence_expressions_per_dialect() {
        assert_eq!(DialectTag::Oracle.profile().sequence_next_value("s1"), "s1.nextval");
        assert_eq!(
            DialectTag::Oracle.profile().sequence_value_query("s1"),
            "select s1.nextval from dual"
        );
        assert_eq!(DialectTag::Postgres.profile().sequence_next_value("s1"), "nextval('s1')");
        assert_eq!(
            DialectTag::Derby.profile().sequence_value_query("s1"),
            "values next value for s1"
        );
        assert!(!DialectTag::Sqlite.profile().supports_sequences());
        assert_eq!(DialectTag::Sqlite.profile().sequence_next_value("s1"), "null");
    }

    #[test]
    fn placeholders_follow_driver_syntax() {
        assert_eq!(DialectTag::Oracle.profile().placeholder.placeholder(3), "?");
        assert_eq!(DialectTag::Postgres.profile().placeholder.placeholder(3), "$3");
        assert_eq!(DialectTag::Sqlite.profile().placeholder.placeholder(3), "?3");
    }

    #[test]
    fn identifier_quoting_and_case() {
        let sql_server = DialectTag::SqlServer.profile();
        assert_eq!(sql_server.quote_identifier("a]b"), "[a]]b]");
        let pg = DialectTag::Postgres.profile();
        assert_eq!(pg.quote_identifier("My\"Col"), "\"My\"\"Col\"");
        assert_eq!(pg.normalize_identifier("MyCol"), "mycol");
        assert_eq!(DialectTag::Oracle.profile().normalize_identifier("MyCol"), "MYCOL");
        assert_eq!(DialectTag::Sqlite.profile().normalize_identifier("MyCol"), "MyCol");
    }

    #[test]
    fn guesses_dialect_from_url() {
        assert_eq!(
            DialectTag::from_url("jdbc:postgresql://localhost/app"),
            Some(DialectTag::Postgres)
        );
        assert_eq!(DialectTag::from_url("postgres://u@h/db"), Some(DialectTag::Postgres));
        assert_eq!(
            DialectTag::from_url("jdbc:oracle:thin:@localhost:1521/XE"),
            Some(DialectTag::Oracle)
        );
        assert_eq!(DialectTag::from_url("sqlite:app.db"), Some(DialectTag::Sqlite));
        assert_eq!(DialectTag::from_url("mysql://h/db"), None);
    }
}
