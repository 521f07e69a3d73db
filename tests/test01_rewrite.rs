use sql_warden::args::{Arguments, TypedArgument};
use sql_warden::dialect::DialectTag;
use sql_warden::rewrite::{RewriteErrorKind, rewrite};

fn ints(n: usize) -> Arguments {
    let values = (0..n)
        .map(|i| TypedArgument::from(i64::try_from(i).unwrap_or_default()))
        .collect::<Vec<_>>();
    if values.is_empty() {
        Arguments::Empty
    } else {
        Arguments::Positional(values)
    }
}

#[test]
fn n_markers_with_n_arguments_keep_call_order() {
    for tag in [DialectTag::Oracle, DialectTag::Postgres, DialectTag::Sqlite] {
        for n in 0..8 {
            let template = format!(
                "select * from t where a in ({})",
                vec!["?"; n].join(", ")
            );
            let rewritten = rewrite(&template, ints(n), tag.profile()).unwrap();
            assert_eq!(rewritten.args().len(), n, "{tag:?} with {n} markers");
            for (i, arg) in rewritten.args().iter().enumerate() {
                assert_eq!(arg.render_literal(), i.to_string());
            }
        }
    }
}

#[test]
fn wrong_argument_count_is_a_mismatch() {
    for (markers, supplied) in [(1, 0), (0, 1), (2, 3), (3, 2)] {
        let template = format!("insert into t values ({})", vec!["?"; markers].join(","));
        let err = rewrite(&template, ints(supplied), DialectTag::Derby.profile()).unwrap_err();
        assert_eq!(err.kind, RewriteErrorKind::Mismatch, "{markers} vs {supplied}");
    }
}

#[test]
fn mixed_markers_are_rejected_whatever_was_supplied() {
    for args in [
        ints(0),
        ints(2),
        Arguments::Named(vec![("b".to_string(), TypedArgument::from(1))]),
    ] {
        let err = rewrite("select ? from t where b = :b", args, DialectTag::Hsqldb.profile())
            .unwrap_err();
        assert_eq!(err.kind, RewriteErrorKind::MixedStyles);
    }
}

#[test]
fn literal_markers_consume_nothing() {
    let rewritten = rewrite(
        "select * from t where s = 'has a ? inside' and u = 'it''s :not a param'",
        Arguments::Empty,
        DialectTag::Oracle.profile(),
    )
    .unwrap();
    assert!(rewritten.args().is_empty());
    assert_eq!(
        rewritten.sql(),
        "select * from t where s = 'has a ? inside' and u = 'it''s :not a param'"
    );
}

#[test]
fn named_markers_follow_dialect_placeholders() {
    let args = || {
        Arguments::Named(vec![
            ("id".to_string(), TypedArgument::from(7)),
            ("name".to_string(), TypedArgument::from("x")),
        ])
    };
    let sql = "update t set name = :name where id = :id or parent = :id";

    let pg = rewrite(sql, args(), DialectTag::Postgres.profile()).unwrap();
    assert_eq!(pg.sql(), "update t set name = $1 where id = $2 or parent = $3");
    assert_eq!(pg.args().len(), 3);

    let lite = rewrite(sql, args(), DialectTag::Sqlite.profile()).unwrap();
    assert_eq!(lite.sql(), "update t set name = ?1 where id = ?2 or parent = ?3");

    let ora = rewrite(sql, args(), DialectTag::Oracle.profile()).unwrap();
    assert_eq!(ora.sql(), "update t set name = ? where id = ? or parent = ?");
    assert_eq!(
        ora.debug_sql(),
        "update t set name = 'x' where id = 7 or parent = 7"
    );
}

#[test]
fn current_timestamp_is_spliced_per_dialect() {
    let args = || {
        Arguments::Positional(vec![
            TypedArgument::from(1),
            TypedArgument::date_now_per_db(),
        ])
    };
    let sql = "update t set a = ?, modified = ?";
    let ora = rewrite(sql, args(), DialectTag::Oracle.profile()).unwrap();
    assert_eq!(ora.sql(), "update t set a = ?, modified = systimestamp(3)");
    assert_eq!(ora.args().len(), 1);
    let pg = rewrite(sql, args(), DialectTag::Postgres.profile()).unwrap();
    assert_eq!(
        pg.sql(),
        "update t set a = $1, modified = date_trunc('milliseconds',localtimestamp)"
    );
}

#[test]
fn dollar_identifiers_keep_their_markers() {
    for tag in [DialectTag::Oracle, DialectTag::Postgres, DialectTag::SqlServer] {
        let rewritten = rewrite(
            "select a$b$c from sys.v$session where sid = ?",
            ints(1),
            tag.profile(),
        )
        .unwrap();
        assert_eq!(rewritten.args().len(), 1, "{tag:?}");
        assert!(rewritten.sql().starts_with("select a$b$c from sys.v$session"), "{tag:?}");
    }
}
