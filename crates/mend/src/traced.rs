//! Tracing spans around database calls.
//!
//! Every adapter funnels its statements through these helpers, so all engines
//! log `db.execute` / `db.query` spans with the same fields.

use mend_schema::Engine;
use std::future::Future;
use tracing::Instrument;

/// Run a statement inside a `db.execute` span, recording the rows affected.
pub(crate) async fn execute<E>(
    engine: Engine,
    sql: &str,
    statement: impl Future<Output = Result<u64, E>>,
) -> Result<u64, E> {
    let span = tracing::debug_span!(
        "db.execute",
        engine = %engine,
        sql = %sql,
        affected = tracing::field::Empty,
        failed = tracing::field::Empty,
    );
    let result = statement.instrument(span.clone()).await;
    match &result {
        Ok(affected) => span.record("affected", *affected),
        Err(_) => span.record("failed", true),
    };
    result
}

/// Run a query inside a `db.query` span, recording the number of rows.
pub(crate) async fn query<T, E>(
    engine: Engine,
    sql: &str,
    params: usize,
    query: impl Future<Output = Result<Vec<T>, E>>,
) -> Result<Vec<T>, E> {
    let span = tracing::debug_span!(
        "db.query",
        engine = %engine,
        sql = %sql,
        params = params,
        rows = tracing::field::Empty,
    );
    let rows = query.instrument(span.clone()).await?;
    span.record("rows", rows.len());
    Ok(rows)
}
