/// Configures HTTP behavior of the default transport.
///
/// There is no retry setting: a statement is sent exactly once, and retry
/// policy belongs to the caller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}
