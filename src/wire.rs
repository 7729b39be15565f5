//! Hrana-over-HTTP pipeline messages.
//!
//! A request without a baton opens a new server stream. Every response that
//! keeps the stream alive carries the baton for the next request; a missing
//! baton means the server has closed the stream.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    #[serde(default)]
    pub baton: Option<String>,
    pub requests: Vec<Request>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Execute { stmt: ExecuteStatement },
    Close {},
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteStatement {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_args: Option<Vec<NamedArg>>,
    pub want_rows: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedArg {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Value {
    Null {},
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    #[serde(default)]
    pub baton: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub results: Vec<PipelineResult>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub response: Option<ResponseEnvelope>,
    #[serde(default)]
    pub error: Option<PipelineError>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub result: Option<ExecuteResult>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    #[serde(default)]
    pub cols: Vec<Col>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub affected_row_count: u64,
    #[serde(default)]
    pub last_insert_rowid: Option<String>,
    #[serde(default)]
    pub replication_index: Option<String>,
    #[serde(default)]
    pub rows_read: Option<u64>,
    #[serde(default)]
    pub rows_written: Option<u64>,
    #[serde(default)]
    pub query_duration_ms: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Col {
    pub name: String,
    #[serde(default)]
    pub decltype: Option<String>,
}

#[cfg(test)]
impl PipelineResult {
    /// Builds a successful `execute` result.
    pub fn execute_ok(result: ExecuteResult) -> Self {
        Self {
            kind: "ok".to_owned(),
            response: Some(ResponseEnvelope {
                kind: "execute".to_owned(),
                result: Some(result),
            }),
            error: None,
        }
    }

    /// Builds a successful `close` result.
    pub fn close_ok() -> Self {
        Self {
            kind: "ok".to_owned(),
            response: Some(ResponseEnvelope {
                kind: "close".to_owned(),
                result: None,
            }),
            error: None,
        }
    }

    /// Builds an engine error result.
    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            kind: "error".to_owned(),
            response: None,
            error: Some(PipelineError {
                message: message.into(),
                code: code.map(str::to_owned),
            }),
        }
    }
}
