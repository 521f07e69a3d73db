use std::time::Duration;

use sql_warden::dialect::{IdentifierCase, PkStrategy, profile_for};
use sql_warden::prelude::*;

#[test]
fn options_deserialize_with_defaults() {
    let options: Options = serde_json::from_str(r#"{ "dialect": "postgresql" }"#).unwrap();
    assert_eq!(options.dialect, DialectTag::Postgres);
    assert!(!options.detailed_errors);
    assert!(!options.log_parameters);
    assert_eq!(options.default_timeout(), None);
}

#[test]
fn options_deserialize_every_field() {
    let options: Options = serde_json::from_str(
        r#"{
            "dialect": "mssql",
            "detailed_errors": true,
            "log_parameters": true,
            "default_timeout_secs": 30
        }"#,
    )
    .unwrap();
    assert_eq!(options.dialect, DialectTag::SqlServer);
    assert!(options.detailed_errors);
    assert!(options.log_parameters);
    assert_eq!(options.default_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(options.profile().pk_strategy, PkStrategy::GeneratedKeys);
}

#[test]
fn unknown_dialect_fails_to_load() {
    assert!(serde_json::from_str::<Options>(r#"{ "dialect": "db2" }"#).is_err());
    assert!(matches!(
        profile_for("  informix "),
        Err(SqlWardenError::ConfigError(_))
    ));
    assert_eq!(profile_for(" Oracle ").unwrap().tag, DialectTag::Oracle);
}

#[test]
fn dialect_guessed_from_connection_urls() {
    let cases = [
        ("jdbc:oracle:thin:@db:1521/xe", Some(DialectTag::Oracle)),
        ("postgres://app@localhost/app", Some(DialectTag::Postgres)),
        ("jdbc:sqlserver://db;databaseName=app", Some(DialectTag::SqlServer)),
        ("jdbc:derby:memory:app;create=true", Some(DialectTag::Derby)),
        ("jdbc:hsqldb:mem:app", Some(DialectTag::Hsqldb)),
        ("sqlite:app.db", Some(DialectTag::Sqlite)),
        ("mysql://localhost/app", None),
    ];
    for (url, expected) in cases {
        assert_eq!(DialectTag::from_url(url), expected, "{url}");
    }
}

#[test]
fn identifier_case_follows_the_dialect() {
    let oracle = DialectTag::Oracle.profile();
    assert_eq!(oracle.unquoted_identifiers, IdentifierCase::Upper);
    assert_eq!(oracle.normalize_identifier("user_id"), "USER_ID");
    assert_eq!(DialectTag::Postgres.profile().normalize_identifier("User_Id"), "user_id");
    assert_eq!(DialectTag::SqlServer.profile().quote_identifier("a]b"), "[a]]b]");
    assert_eq!(DialectTag::Sqlite.profile().quote_identifier("a\"b"), "\"a\"\"b\"");
}

#[test]
fn sequences_only_where_the_dialect_has_them() {
    assert!(DialectTag::Oracle.profile().supports_sequences());
    assert!(DialectTag::Hsqldb.profile().supports_sequences());
    assert!(!DialectTag::Sqlite.profile().supports_sequences());
    assert_eq!(
        DialectTag::Hsqldb.profile().sequence_value_query("s"),
        "select next value for s from (values(0))"
    );
}
