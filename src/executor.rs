use crate::{
    decode::{build_execute_statement, decode_outcome},
    stream::{StreamConnection, StreamHandle},
    transport::Transport,
    wire::Request,
    Params, QueryOutcome, Result,
};

/// Submits one statement on `stream` and decodes the outcome.
///
/// The statement is sent exactly once. An engine-side rejection is returned
/// as [`QueryOutcome::Error`]; transport and protocol failures are `Err` and
/// leave the stream closed.
pub async fn execute<T, P>(
    conn: &StreamConnection<T>,
    stream: &StreamHandle,
    sql: &str,
    params: P,
) -> Result<QueryOutcome>
where
    T: Transport,
    P: Into<Params>,
{
    execute_at(conn, stream, 0, sql, params.into()).await
}

/// Same as [`execute`], tagging engine errors with `statement_index`.
pub(crate) async fn execute_at<T: Transport>(
    conn: &StreamConnection<T>,
    stream: &StreamHandle,
    statement_index: usize,
    sql: &str,
    params: Params,
) -> Result<QueryOutcome> {
    let stmt = build_execute_statement(sql, params, true)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(stream = stream.id(), statement_index, sql, "executing statement");

    let result = conn.exchange(stream, Request::Execute { stmt }).await?;
    decode_outcome(result, statement_index, sql)
}
