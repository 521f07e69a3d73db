//! Scoped release of native resources.

use crate::diagnostics::StatementContext;
use crate::error::SqlWardenError;
use crate::native::NativeResource;

/// Acquire a resource, run `body` against it, and close it on every exit path.
///
/// Close failures never hide a failure from `body`; they are logged instead. When `body`
/// succeeded, a close failure becomes the reported error. If `body` panics, the resource is
/// released by its `Drop` implementation.
///
/// # Errors
/// Returns the acquisition failure, the body failure, or the close failure, in that order of
/// precedence.
pub(crate) fn with_resource<R, T, A, B>(
    ctx: &StatementContext<'_>,
    label: &'static str,
    acquire: A,
    body: B,
) -> Result<T, SqlWardenError>
where
    R: NativeResource + ?Sized,
    A: FnOnce() -> Result<Box<R>, SqlWardenError>,
    B: FnOnce(&mut R) -> Result<T, SqlWardenError>,
{
    let mut resource = acquire()?;
    let outcome = body(&mut *resource);
    let closed = resource.close();

    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => {
            ctx.log_close_failure(label, &close_err);
            Err(ctx.native_error(close_err))
        }
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(close_err)) => {
            ctx.log_close_failure(label, &close_err);
            Err(primary)
        }
    }
}
