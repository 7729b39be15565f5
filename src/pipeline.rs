//! Sequential execution of a statement list over one stream.
//!
//! Statements run strictly one after another on the connection's stream. If
//! the server ends that stream between two statements, the next statement
//! goes out on a freshly opened one. An engine-side rejection is recorded and the run moves
//! on; a transport failure is recorded as the outcome of the statement that
//! hit it and ends the run. Cancellation is observed between statements.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    executor::execute_at,
    schema::has_schema_change,
    stream::{StreamConnection, StreamHandle},
    transport::Transport, BunnyDbError, Params, QueryError, QueryOutcome, Result,
};

/// Cooperative cancellation signal for a run in progress.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops dispatch before the next statement.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Emitted once per statement, before it is sent.
#[derive(Debug)]
pub struct QueryProgress<'a> {
    pub statement_index: usize,
    pub total_statements: usize,
    pub statement_text: &'a str,
    /// Entries for the statements already finished in this run.
    pub log_so_far: &'a [LogEntry],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub order: usize,
    pub sql: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatementResult {
    pub order: usize,
    pub outcome: QueryOutcome,
}

/// How a run ended.
#[derive(Debug)]
pub enum RunStatus {
    /// Every statement was attempted.
    Completed,
    /// The statement at `order` failed at transport level; later statements
    /// were not sent.
    Aborted { order: usize, error: BunnyDbError },
    /// Cancelled before the statement at `next` was sent.
    Cancelled { next: usize },
}

/// Aggregate outcome of one run.
#[derive(Debug)]
pub struct PipelineResult {
    pub results: Vec<StatementResult>,
    pub log: Vec<LogEntry>,
    pub status: RunStatus,
    pub total_statements: usize,
}

impl PipelineResult {
    pub fn is_complete(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    /// `true` when some statements were never attempted.
    pub fn is_partial(&self) -> bool {
        self.results.len() < self.total_statements
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, RunStatus::Aborted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, RunStatus::Cancelled { .. })
    }

    /// Whether executed statements may have changed the schema, meaning
    /// cached schema metadata should be reloaded.
    pub fn schema_changed(&self) -> bool {
        has_schema_change(&self.log)
    }
}

/// Runs `statements` in order, reporting progress through `on_progress`.
pub async fn run<T, S, F>(
    conn: &StreamConnection<T>,
    statements: &[S],
    on_progress: F,
) -> Result<PipelineResult>
where
    T: Transport,
    S: AsRef<str>,
    F: FnMut(&QueryProgress<'_>),
{
    run_with_cancel(conn, statements, None, on_progress).await
}

/// Same as [`run`], stopping early once `cancel` is raised.
pub async fn run_cancellable<T, S, F>(
    conn: &StreamConnection<T>,
    statements: &[S],
    cancel: &CancelFlag,
    on_progress: F,
) -> Result<PipelineResult>
where
    T: Transport,
    S: AsRef<str>,
    F: FnMut(&QueryProgress<'_>),
{
    run_with_cancel(conn, statements, Some(cancel), on_progress).await
}

async fn run_with_cancel<T, S, F>(
    conn: &StreamConnection<T>,
    statements: &[S],
    cancel: Option<&CancelFlag>,
    mut on_progress: F,
) -> Result<PipelineResult>
where
    T: Transport,
    S: AsRef<str>,
    F: FnMut(&QueryProgress<'_>),
{
    let mut stream = conn.acquire_stream()?;
    let total_statements = statements.len();
    let mut results = Vec::with_capacity(total_statements);
    let mut log = Vec::with_capacity(total_statements);
    let mut status = RunStatus::Completed;

    #[cfg(feature = "tracing")]
    tracing::info!(stream = stream.id(), total_statements, "starting run");

    for (order, sql) in statements.iter().enumerate() {
        let sql = sql.as_ref();
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            status = RunStatus::Cancelled { next: order };
            break;
        }

        on_progress(&QueryProgress {
            statement_index: order,
            total_statements,
            statement_text: sql,
            log_so_far: &log,
        });

        let attempt = match reopen_if_closed(conn, &mut stream) {
            Ok(()) => execute_at(conn, &stream, order, sql, Params::default()).await,
            Err(error) => Err(error),
        };
        match attempt {
            Ok(outcome) => {
                log.push(LogEntry {
                    order,
                    sql: sql.to_owned(),
                    succeeded: outcome.is_ok(),
                    error: outcome.error().map(|error| error.message.clone()),
                });
                results.push(StatementResult { order, outcome });
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(order, error = %error, "aborting run");

                let message = error.to_string();
                log.push(LogEntry {
                    order,
                    sql: sql.to_owned(),
                    succeeded: false,
                    error: Some(message.clone()),
                });
                results.push(StatementResult {
                    order,
                    outcome: QueryOutcome::Error(QueryError {
                        statement_index: order,
                        message,
                        code: None,
                        sql: sql.to_owned(),
                    }),
                });
                status = RunStatus::Aborted { order, error };
                break;
            }
        }
    }

    Ok(PipelineResult {
        results,
        log,
        status,
        total_statements,
    })
}

/// Swaps in a new stream when the server closed the previous one without
/// a transport failure, i.e. it stopped handing out batons.
fn reopen_if_closed<T: Transport>(
    conn: &StreamConnection<T>,
    stream: &mut StreamHandle,
) -> Result<()> {
    if stream.is_closed() {
        *stream = conn.acquire_stream()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        pipeline::{run, run_cancellable, CancelFlag, RunStatus},
        testing::FakeEngine,
        BunnyDbError, StreamConnection,
    };

    #[tokio::test]
    async fn engine_error_does_not_stop_neighbours() {
        let conn = StreamConnection::new(FakeEngine::default());
        let result = run(&conn, &["SELECT 1;", "SELEC BAD;", "SELECT 2;"], |_| {})
            .await
            .expect("run must start");

        assert!(result.is_complete());
        assert!(!result.is_partial());
        assert_eq!(result.results.len(), 3);
        let orders: Vec<usize> = result.results.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert!(result.results[0].outcome.is_ok());
        assert_eq!(
            result.results[1]
                .outcome
                .error()
                .map(|error| error.statement_index),
            Some(1)
        );
        assert!(result.results[2].outcome.is_ok());
        let succeeded: Vec<bool> = result.log.iter().map(|entry| entry.succeeded).collect();
        assert_eq!(succeeded, vec![true, false, true]);
    }

    #[tokio::test]
    async fn transport_error_aborts_remaining_statements() {
        let conn = StreamConnection::new(FakeEngine::default());
        let result = run(
            &conn,
            &["SELECT 1;", "CRASH_CONNECTION;", "SELECT 2;"],
            |_| {},
        )
        .await
        .expect("run must start");

        assert_eq!(result.results.len(), 2);
        assert!(result.is_partial());
        assert!(result.is_aborted());
        assert!(matches!(
            result.status,
            RunStatus::Aborted {
                order: 1,
                error: BunnyDbError::Http { status: 502, .. }
            }
        ));
        assert!(!result.results[1].outcome.is_ok());
        assert_eq!(result.log.len(), 2);
        assert_eq!(
            conn.transport().executed(),
            vec!["SELECT 1;".to_owned(), "CRASH_CONNECTION;".to_owned()]
        );
    }

    #[tokio::test]
    async fn next_run_reopens_after_transport_abort() {
        let conn = StreamConnection::new(FakeEngine::default());
        run(&conn, &["CRASH_CONNECTION;"], |_| {})
            .await
            .expect("run must start");
        let result = run(&conn, &["SELECT 1;"], |_| {})
            .await
            .expect("run must start");

        assert!(result.is_complete());
        assert_eq!(conn.streams_opened(), 2);
        assert_eq!(conn.transport().batons().last(), Some(&None));
    }

    #[tokio::test]
    async fn one_stream_is_shared_by_the_whole_run() {
        let conn = StreamConnection::new(FakeEngine::default());
        run(&conn, &["SELECT 1;", "SELECT 2;", "SELECT 3;"], |_| {})
            .await
            .expect("run must start");

        assert_eq!(conn.streams_opened(), 1);
        let batons = conn.transport().batons();
        assert_eq!(batons[0], None);
        assert!(batons[1..].iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn server_closed_stream_is_replaced_mid_run() {
        let conn = StreamConnection::new(FakeEngine::default().dropping_batons());
        let result = run(&conn, &["SELECT 1;", "SELECT 2;", "SELECT 3;"], |_| {})
            .await
            .expect("run must start");

        assert!(result.is_complete());
        assert!(result.log.iter().all(|entry| entry.succeeded));
        assert_eq!(
            conn.transport().executed(),
            vec!["SELECT 1;", "SELECT 2;", "SELECT 3;"]
        );
        assert_eq!(conn.streams_opened(), 3);
        assert!(conn.transport().batons().iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn progress_is_emitted_in_order_before_each_statement() {
        let conn = StreamConnection::new(FakeEngine::default());
        let mut seen = Vec::new();
        run(
            &conn,
            &["SELECT 1;", "SELEC BAD;", "SELECT 2;"],
            |progress| {
                seen.push((
                    progress.statement_index,
                    progress.total_statements,
                    progress.statement_text.to_owned(),
                    progress.log_so_far.len(),
                ));
            },
        )
        .await
        .expect("run must start");

        assert_eq!(
            seen,
            vec![
                (0, 3, "SELECT 1;".to_owned(), 0),
                (1, 3, "SELEC BAD;".to_owned(), 1),
                (2, 3, "SELECT 2;".to_owned(), 2),
            ]
        );
    }

    #[tokio::test]
    async fn cancellation_stops_between_statements() {
        let conn = StreamConnection::new(FakeEngine::default());
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let result = run_cancellable(
            &conn,
            &["SELECT 1;", "SELECT 2;", "SELECT 3;"],
            &cancel,
            |progress| {
                if progress.statement_index == 1 {
                    trigger.cancel();
                }
            },
        )
        .await
        .expect("run must start");

        assert!(result.is_cancelled());
        assert!(matches!(result.status, RunStatus::Cancelled { next: 2 }));
        assert_eq!(result.results.len(), 2);
        assert!(result.is_partial());
    }

    #[tokio::test]
    async fn empty_statement_list_completes_without_traffic() {
        let conn = StreamConnection::new(FakeEngine::default());
        let result = run::<_, &str, _>(&conn, &[], |_| {})
            .await
            .expect("run must start");
        assert!(result.is_complete());
        assert!(result.results.is_empty());
        assert!(conn.transport().executed().is_empty());
    }

    #[tokio::test]
    async fn closed_connection_fails_before_anything_runs() {
        let conn = StreamConnection::new(FakeEngine::default());
        conn.close().await.expect("close must succeed");
        let err = run(&conn, &["SELECT 1;"], |_| {})
            .await
            .expect_err("must refuse");
        assert!(matches!(err, BunnyDbError::ConnectionClosed));
        assert!(conn.transport().executed().is_empty());
    }

    #[tokio::test]
    async fn schema_change_flag_follows_log() {
        let conn = StreamConnection::new(FakeEngine::default());
        let ddl = run(&conn, &["CREATE TABLE t (x int);"], |_| {})
            .await
            .expect("run must start");
        assert!(ddl.schema_changed());

        let dml = run(
            &conn,
            &["SELECT * FROM t;", "INSERT INTO t VALUES (1);"],
            |_| {},
        )
        .await
        .expect("run must start");
        assert!(!dml.schema_changed());
    }
}
