use std::fmt;

use crate::{
    executor::execute,
    pipeline::{self, CancelFlag, PipelineResult, QueryProgress},
    segment::{locate, segment, Dialect},
    stream::StreamConnection,
    transport::{normalize_bearer_authorization, HttpTransport, Transport},
    BunnyDbError, ClientOptions, Params, QueryOutcome, Result, ResultSet, SchemaItem, Value,
};

/// Formats a database ID into the canonical pipeline URL.
///
/// Example: `"abc123"` → `"https://abc123.lite.bunnydb.net/v2/pipeline"`
pub fn db_id_to_pipeline_url(db_id: &str) -> String {
    format!("https://{}.lite.bunnydb.net/v2/pipeline", db_id.trim())
}

/// Quotes an identifier, doubling every `"` inside it.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Database driver running SQL over one Bunny.net Database stream.
pub struct BunnyDbClient<T = HttpTransport> {
    conn: StreamConnection<T>,
}

impl<T: fmt::Debug> fmt::Debug for BunnyDbClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BunnyDbClient")
            .field("conn", &self.conn)
            .finish()
    }
}

impl BunnyDbClient<HttpTransport> {
    /// Creates a client with a raw authorization header value.
    pub fn new(pipeline_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::new_raw_auth(pipeline_url, token)
    }

    /// Creates a client with a full raw authorization value.
    ///
    /// Example: `"Bearer <token>"` or any custom scheme.
    pub fn new_raw_auth(pipeline_url: impl Into<String>, authorization: impl Into<String>) -> Self {
        Self::with_transport(HttpTransport::new(pipeline_url, authorization))
    }

    /// Creates a client from a bearer token.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn new_bearer(pipeline_url: impl Into<String>, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        Self::new_raw_auth(pipeline_url, authorization)
    }

    /// Creates a client from a Bunny Database ID and a bearer token.
    ///
    /// ```no_run
    /// use bunnydb_runner::BunnyDbClient;
    ///
    /// let db = BunnyDbClient::from_db_id("my-db-id", "my-token");
    /// ```
    pub fn from_db_id(db_id: impl AsRef<str>, token: impl AsRef<str>) -> Self {
        let url = db_id_to_pipeline_url(db_id.as_ref());
        Self::new_bearer(url, token)
    }

    /// Creates a client from `BUNNYDB_PIPELINE_URL` and `BUNNYDB_TOKEN`.
    ///
    /// Returns an error if either variable is missing or empty.
    pub fn from_env() -> std::result::Result<Self, String> {
        let url = required_env("BUNNYDB_PIPELINE_URL")?;
        let token = required_env("BUNNYDB_TOKEN")?;
        Ok(Self::new_bearer(url, token))
    }

    /// Creates a client from `BUNNYDB_ID` and `BUNNYDB_TOKEN`.
    pub fn from_env_db_id() -> std::result::Result<Self, String> {
        let db_id = required_env("BUNNYDB_ID")?;
        let token = required_env("BUNNYDB_TOKEN")?;
        Ok(Self::from_db_id(db_id, token))
    }

    /// Applies client options such as the request timeout.
    pub fn with_options(self, opts: ClientOptions) -> Self {
        Self::with_transport(self.conn.into_transport().with_options(opts))
    }
}

impl<T: Transport> BunnyDbClient<T> {
    /// Creates a client over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            conn: StreamConnection::new(transport),
        }
    }

    pub fn connection(&self) -> &StreamConnection<T> {
        &self.conn
    }

    /// Executes one statement on the current stream.
    pub async fn query<P: Into<Params>>(&self, sql: &str, params: P) -> Result<QueryOutcome> {
        let stream = self.conn.acquire_stream()?;
        execute(&self.conn, &stream, sql, params).await
    }

    /// Runs `statements` one after another on one stream.
    ///
    /// Only a closed connection fails the call; statement and transport
    /// failures are reported inside the returned [`PipelineResult`].
    pub async fn run_statements<S, F>(&self, statements: &[S], on_progress: F) -> Result<PipelineResult>
    where
        S: AsRef<str>,
        F: FnMut(&QueryProgress<'_>),
    {
        pipeline::run(&self.conn, statements, on_progress).await
    }

    /// Same as [`Self::run_statements`], stopping once `cancel` is raised.
    pub async fn run_statements_cancellable<S, F>(
        &self,
        statements: &[S],
        cancel: &CancelFlag,
        on_progress: F,
    ) -> Result<PipelineResult>
    where
        S: AsRef<str>,
        F: FnMut(&QueryProgress<'_>),
    {
        pipeline::run_cancellable(&self.conn, statements, cancel, on_progress).await
    }

    /// Segments `sql` and runs every statement.
    ///
    /// Segmentation errors are returned before anything is sent.
    pub async fn run_script<F>(&self, sql: &str, dialect: Dialect, on_progress: F) -> Result<PipelineResult>
    where
        F: FnMut(&QueryProgress<'_>),
    {
        let statements = segment(sql, dialect)?;
        let texts: Vec<&str> = statements.iter().map(|s| s.text.as_str()).collect();
        self.run_statements(&texts, on_progress).await
    }

    /// Runs the statement under the caret at byte `offset`, if any.
    pub async fn run_at_cursor<F>(
        &self,
        sql: &str,
        dialect: Dialect,
        offset: usize,
        on_progress: F,
    ) -> Result<Option<PipelineResult>>
    where
        F: FnMut(&QueryProgress<'_>),
    {
        let statements = segment(sql, dialect)?;
        let Some(statement) = locate(&statements, offset) else {
            return Ok(None);
        };
        self.run_statements(&[statement.text.as_str()], on_progress)
            .await
            .map(Some)
    }

    /// Lists the tables recorded in `sqlite_schema`.
    pub async fn table_list(&self) -> Result<Vec<SchemaItem>> {
        let result = self
            .query("SELECT * FROM sqlite_schema;", ())
            .await?
            .into_result_set()?;

        Ok(result
            .iter_rows()
            .filter(|row| row.get_text("type") == Some("table"))
            .filter_map(|row| row.get_text("name"))
            .map(|name| SchemaItem {
                name: name.to_owned(),
            })
            .collect())
    }

    /// Reads one page of `table`.
    ///
    /// `limit` and `offset` above `i64::MAX` fail with
    /// [`BunnyDbError::InvalidArgument`] before anything is sent.
    pub async fn select_page(&self, table: &str, limit: u64, offset: u64) -> Result<ResultSet> {
        let bounds = [to_integer("limit", limit)?, to_integer("offset", offset)?];
        let sql = format!(
            "SELECT * FROM {} LIMIT ? OFFSET ?;",
            quote_identifier(table)
        );
        self.query(&sql, bounds).await?
            .into_result_set()
    }

    /// Fetches the first row of `table` whose `column` equals `value`.
    ///
    /// Used to preview the row a foreign key points at.
    pub async fn find_first(
        &self,
        table: &str,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<ResultSet> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ? LIMIT 1;",
            quote_identifier(table),
            quote_identifier(column)
        );
        self.query(&sql, [value.into()]).await?.into_result_set()
    }

    /// Closes the connection. Later calls fail with
    /// [`BunnyDbError::ConnectionClosed`].
    pub async fn close(&self) -> Result<()> {
        self.conn.close().await
    }
}

fn to_integer(name: &str, value: u64) -> Result<Value> {
    i64::try_from(value)
        .map(Value::Integer)
        .map_err(|_| BunnyDbError::InvalidArgument(format!("{name} {value} exceeds i64::MAX")))
}

fn required_env(name: &str) -> std::result::Result<String, String> {
    let value =
        std::env::var(name).map_err(|_| format!("missing {name} environment variable"))?;
    if value.trim().is_empty() {
        return Err(format!("{name} is set but empty"));
    }
    Ok(value)
}
