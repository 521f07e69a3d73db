//! Run one statement against a native connection with scoped cleanup.
//!
//! Every entry point rewrites the template, prepares, binds, and executes inside
//! [`with_resource`], so the statement (and the cursor, for queries) is closed on every exit
//! path. Failures are logged once here with their correlation code.

use std::time::Duration;

use crate::args::{Arguments, DialectRewrite, TypedArgument};
use crate::binder::bind_arguments;
use crate::diagnostics::{Metric, StatementContext};
use crate::dialect::PkStrategy;
use crate::error::SqlWardenError;
use crate::guard::with_resource;
use crate::native::{NativeConnection, NativeError, NativeStatement};
use crate::options::Options;
use crate::rewrite::{RewrittenStatement, rewrite};
use crate::rows::Rows;

/// Everything a builder collected for one execution.
pub(crate) struct Request<'a> {
    pub(crate) options: &'a Options,
    pub(crate) template: &'a str,
    pub(crate) args: Arguments,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_rows: Option<usize>,
    pub(crate) quiet: bool,
}

impl<'a> Request<'a> {
    pub(crate) fn new(options: &'a Options, template: &'a str, args: Arguments) -> Self {
        Self {
            options,
            template,
            args,
            timeout: None,
            max_rows: None,
            quiet: false,
        }
    }
}

/// Report a failure detected before anything reached the driver.
pub(crate) fn reject(
    options: &Options,
    template: &str,
    err: SqlWardenError,
    quiet: bool,
) -> SqlWardenError {
    let ctx = StatementContext::new(options, template);
    let err = ctx.contextualize(err);
    report(&ctx, quiet, &err);
    err
}

fn configure(
    stmt: &mut dyn NativeStatement,
    timeout: Option<Duration>,
    max_rows: Option<usize>,
) -> Result<(), NativeError> {
    if let Some(timeout) = timeout {
        stmt.set_query_timeout(timeout)?;
    }
    if let Some(max_rows) = max_rows {
        stmt.set_max_rows(max_rows)?;
    }
    Ok(())
}

/// Rewrite, prepare, configure, and bind, then hand the statement to `work`.
///
/// `amend` may extend the rewritten SQL before it is prepared.
fn execute_with<C, T, M, W>(
    conn: &mut C,
    request: Request<'_>,
    amend: M,
    work: W,
) -> Result<T, SqlWardenError>
where
    C: NativeConnection + ?Sized,
    M: FnOnce(&mut RewrittenStatement),
    W: FnOnce(&StatementContext<'_>, &mut dyn NativeStatement, &mut Metric) -> Result<T, SqlWardenError>,
{
    let Request {
        options,
        template,
        args,
        timeout,
        max_rows,
        quiet,
    } = request;

    let mut ctx = StatementContext::new(options, template);
    let mut rewritten = match rewrite(template, args, options.profile()) {
        Ok(rewritten) => rewritten,
        Err(err) => {
            let err = ctx.rewrite_error(err);
            report(&ctx, quiet, &err);
            return Err(err);
        }
    };
    amend(&mut rewritten);
    ctx.attach(&rewritten);
    let (sql, mut args) = rewritten.into_parts();

    let ctx = &ctx;
    let sql = sql.as_str();
    let timeout = timeout.or_else(|| options.default_timeout());
    let mut metric = Metric::for_logging();

    let outcome = with_resource(
        ctx,
        "statement",
        move || conn.prepare(sql).map_err(|e| ctx.native_error(e)),
        |stmt| {
            metric.checkpoint("prepare");
            configure(stmt, timeout, max_rows).map_err(|e| ctx.native_error(e))?;
            bind_arguments(stmt, &mut args).map_err(|f| ctx.bind_error(f.position, f.source))?;
            metric.checkpoint("bind");
            work(ctx, stmt, &mut metric)
        },
    );
    metric.checkpoint("close");

    match &outcome {
        Ok(_) => ctx.log_success(&metric),
        Err(err) => report(ctx, quiet, err),
    }
    outcome
}

fn report(ctx: &StatementContext<'_>, quiet: bool, err: &SqlWardenError) {
    if quiet {
        ctx.log_ignored_failure(err);
    } else {
        ctx.log_failure(err);
    }
}

/// Execute a query and hand its rows to `handler`, positioned before the first row.
///
/// # Errors
/// Returns rewrite, bind, execution, or fetch failures, or whatever `handler` returns.
pub(crate) fn query<C, T, F>(
    conn: &mut C,
    request: Request<'_>,
    handler: F,
) -> Result<T, SqlWardenError>
where
    C: NativeConnection + ?Sized,
    F: FnOnce(&mut Rows<'_>) -> Result<T, SqlWardenError>,
{
    execute_with(conn, request, |_| {}, |ctx, stmt, metric| {
        let value = with_resource(
            ctx,
            "cursor",
            move || stmt.execute_query().map_err(|e| ctx.native_error(e)),
            |cursor| {
                metric.checkpoint("execute");
                let mut rows = Rows::new(cursor, ctx);
                handler(&mut rows)
            },
        )?;
        metric.checkpoint("fetch");
        Ok(value)
    })
}

/// Execute a DML statement, optionally asserting the affected row count afterwards.
///
/// # Errors
/// Returns `WrongRowCount` when `expected` is set and differs from the driver's count.
pub(crate) fn update<C>(
    conn: &mut C,
    request: Request<'_>,
    expected: Option<usize>,
) -> Result<usize, SqlWardenError>
where
    C: NativeConnection + ?Sized,
{
    execute_with(conn, request, |_| {}, |ctx, stmt, metric| {
        let count = stmt.execute_update().map_err(|e| ctx.native_error(e))?;
        metric.checkpoint("execute");
        match expected {
            Some(expected) if expected != count => Err(ctx.wrong_row_count(expected, count)),
            _ => Ok(count),
        }
    })
}

/// Execute a statement that returns nothing.
pub(crate) fn ddl<C>(conn: &mut C, request: Request<'_>) -> Result<(), SqlWardenError>
where
    C: NativeConnection + ?Sized,
{
    execute_with(conn, request, |_| {}, |ctx, stmt, metric| {
        stmt.execute().map_err(|e| ctx.native_error(e))?;
        metric.checkpoint("execute");
        Ok(())
    })
}

/// Like [`ddl`], but any failure is logged at warn level and dropped.
pub(crate) fn ddl_quietly<C>(conn: &mut C, mut request: Request<'_>)
where
    C: NativeConnection + ?Sized,
{
    request.quiet = true;
    let _ignored = ddl(conn, request);
}

/// Insert one row and return the key assigned to it, whichever way the dialect assigns keys.
///
/// The arguments must include one `pk_seq` marker naming the key's sequence.
///
/// # Errors
/// Returns `InvalidArgument` without a `pk_seq` marker, `WrongRowCount` when the insert did
/// not affect exactly one row, and `Execution` when no key could be read back.
pub(crate) fn insert_returning_pk<C>(
    conn: &mut C,
    mut request: Request<'_>,
    pk_column: &str,
) -> Result<i64, SqlWardenError>
where
    C: NativeConnection + ?Sized,
{
    let sequence = match request.args.pk_seq_mut() {
        Some(TypedArgument::Rewrite(DialectRewrite::NextSequenceValue(sequence))) => {
            sequence.clone()
        }
        _ => {
            return Err(reject(
                request.options,
                request.template,
                SqlWardenError::invalid_argument(
                    "insert_returning_pk_seq requires an arg_pk_seq argument",
                ),
                request.quiet,
            ));
        }
    };
    let options = request.options;

    match options.profile().pk_strategy {
        PkStrategy::SequencePreQuery => {
            let sequence_sql = options.profile().sequence_value_query(&sequence);
            let key = query(
                conn,
                Request::new(options, &sequence_sql, Arguments::Empty),
                |rows| {
                    if !rows.next()? {
                        return Err(rows.failure(&format!("sequence {sequence} returned no row")));
                    }
                    rows.get_i64(1usize)?.ok_or_else(|| {
                        rows.failure(&format!("sequence {sequence} returned null"))
                    })
                },
            )?;
            if let Some(marker) = request.args.pk_seq_mut() {
                *marker = TypedArgument::Long(Some(key));
            }
            update(conn, request, Some(1))?;
            Ok(key)
        }
        PkStrategy::InsertReturning => {
            let returning = format!("returning {pk_column}");
            execute_with(
                conn,
                request,
                |rewritten| rewritten.append_clause(&returning),
                |ctx, stmt, metric| {
                    let key = with_resource(
                        ctx,
                        "cursor",
                        move || stmt.execute_query().map_err(|e| ctx.native_error(e)),
                        |cursor| {
                            metric.checkpoint("execute");
                            let mut rows = Rows::new(cursor, ctx);
                            if !rows.next()? {
                                return Err(ctx.failure("insert returned no row"));
                            }
                            rows.get_i64(1usize)?
                                .ok_or_else(|| ctx.failure("insert returned a null key"))
                        },
                    )?;
                    metric.checkpoint("fetch");
                    Ok(key)
                },
            )
        }
        PkStrategy::GeneratedKeys => execute_with(conn, request, |_| {}, |ctx, stmt, metric| {
            let count = stmt.execute_update().map_err(|e| ctx.native_error(e))?;
            metric.checkpoint("execute");
            if count != 1 {
                return Err(ctx.wrong_row_count(1, count));
            }
            stmt.generated_key()
                .map_err(|e| ctx.native_error(e))?
                .ok_or_else(|| ctx.failure("driver reported no generated key"))
        }),
    }
}
