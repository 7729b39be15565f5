/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum BunnyDbError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Response decoding or protocol-shape validation error.
    #[error("decode error: {0}")]
    Decode(String),
    /// A caller-supplied argument cannot be encoded; nothing was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The stream handle refers to a stream that is no longer open.
    #[error("stream is closed")]
    StreamClosed,
    /// The connection was explicitly closed and cannot be used again.
    #[error("connection is closed")]
    ConnectionClosed,
    /// SQL text could not be split into statements.
    #[error("segmentation error at offset {offset}: {message}")]
    Segmentation { offset: usize, message: String },
    /// Statement rejected by the database engine.
    #[error("sql error: {message}")]
    Sql {
        /// Error message text from upstream API.
        message: String,
        /// Optional engine-specific error code.
        code: Option<String>,
    },
}

impl BunnyDbError {
    /// Returns `true` for failures that leave the stream unusable.
    ///
    /// A pipeline run stops dispatching statements after one of these.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Http { .. } | Self::Decode(_) | Self::StreamClosed
        )
    }
}
