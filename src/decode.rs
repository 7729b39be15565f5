use crate::{
    wire::{self, ExecuteStatement, NamedArg},
    BunnyDbError, Col, ExecutionStats, Params, QueryError, QueryOutcome, ResultSet, Value,
};

pub(crate) fn build_execute_statement(
    sql: &str,
    params: Params,
    want_rows: bool,
) -> Result<ExecuteStatement, BunnyDbError> {
    match params {
        Params::Positional(values) => {
            let args = values
                .into_iter()
                .map(encode_value)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ExecuteStatement {
                sql: sql.to_owned(),
                args: (!args.is_empty()).then_some(args),
                named_args: None,
                want_rows,
            })
        }
        Params::Named(values) => {
            let named_args = values
                .into_iter()
                .map(|(name, value)| {
                    let name = normalize_named_parameter_name(&name)?;
                    let value = encode_value(value)?;
                    Ok(NamedArg { name, value })
                })
                .collect::<Result<Vec<_>, BunnyDbError>>()?;

            Ok(ExecuteStatement {
                sql: sql.to_owned(),
                args: None,
                named_args: (!named_args.is_empty()).then_some(named_args),
                want_rows,
            })
        }
    }
}

/// Decodes the single `execute` result of an exchange.
///
/// Engine rejections become [`QueryOutcome::Error`]; malformed payloads are
/// protocol errors.
pub(crate) fn decode_outcome(
    result: wire::PipelineResult,
    statement_index: usize,
    sql: &str,
) -> Result<QueryOutcome, BunnyDbError> {
    match result.kind.as_str() {
        "ok" => {
            let response = result.response.ok_or_else(|| {
                BunnyDbError::Decode(format!(
                    "missing response payload for statement {statement_index}"
                ))
            })?;
            if response.kind != "execute" {
                return Err(BunnyDbError::Decode(format!(
                    "expected execute response for statement {statement_index}, got '{}'",
                    response.kind
                )));
            }
            let execute_result = response.result.ok_or_else(|| {
                BunnyDbError::Decode(format!(
                    "missing execute result payload for statement {statement_index}"
                ))
            })?;
            Ok(QueryOutcome::Rows(decode_result_set(execute_result)?))
        }
        "error" => {
            let error = result.error.ok_or_else(|| {
                BunnyDbError::Decode(format!(
                    "missing error payload for statement {statement_index}"
                ))
            })?;
            Ok(QueryOutcome::Error(QueryError {
                statement_index,
                message: error.message,
                code: error.code,
                sql: sql.to_owned(),
            }))
        }
        other => Err(BunnyDbError::Decode(format!(
            "unknown pipeline result type '{other}' for statement {statement_index}"
        ))),
    }
}

/// Checks the result of a `close` request.
pub(crate) fn ensure_close_success(result: wire::PipelineResult) -> Result<(), BunnyDbError> {
    match result.kind.as_str() {
        "ok" => {
            let response = result.response.ok_or_else(|| {
                BunnyDbError::Decode("missing close response payload".to_owned())
            })?;
            if response.kind != "close" {
                return Err(BunnyDbError::Decode(format!(
                    "expected close response, got '{}'",
                    response.kind
                )));
            }
            Ok(())
        }
        "error" => {
            let error = result
                .error
                .ok_or_else(|| BunnyDbError::Decode("missing error payload for close".to_owned()))?;
            Err(BunnyDbError::Sql {
                message: error.message,
                code: error.code,
            })
        }
        other => Err(BunnyDbError::Decode(format!(
            "unknown pipeline result type '{other}' for close"
        ))),
    }
}

pub(crate) fn decode_result_set(result: wire::ExecuteResult) -> Result<ResultSet, BunnyDbError> {
    let cols = result
        .cols
        .into_iter()
        .map(|col| Col {
            name: col.name,
            decltype: col.decltype,
        })
        .collect();

    let rows = result
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, BunnyDbError>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let last_insert_rowid = result
        .last_insert_rowid
        .map(|value| {
            value.parse::<i64>().map_err(|err| {
                BunnyDbError::Decode(format!("invalid last_insert_rowid '{value}': {err}"))
            })
        })
        .transpose()?;

    Ok(ResultSet {
        cols,
        row_count: rows.len(),
        rows,
        stats: ExecutionStats {
            affected_row_count: result.affected_row_count,
            last_insert_rowid,
            replication_index: result.replication_index,
            rows_read: result.rows_read,
            rows_written: result.rows_written,
            query_duration_ms: result.query_duration_ms,
        },
    })
}

pub(crate) fn decode_value(value: wire::Value) -> Result<Value, BunnyDbError> {
    match value {
        wire::Value::Null {} => Ok(Value::Null),
        wire::Value::Integer { value } => value
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|err| BunnyDbError::Decode(format!("invalid integer value '{value}': {err}"))),
        wire::Value::Float { value } => Ok(Value::Float(value)),
        wire::Value::Text { value } => Ok(Value::Text(value)),
        wire::Value::Blob { base64 } => Ok(Value::BlobBase64(base64)),
    }
}

fn encode_value(value: Value) -> Result<wire::Value, BunnyDbError> {
    match value {
        Value::Null => Ok(wire::Value::Null {}),
        Value::Integer(value) => Ok(wire::Value::Integer {
            value: value.to_string(),
        }),
        Value::Float(value) => {
            if !value.is_finite() {
                return Err(BunnyDbError::InvalidArgument(format!(
                    "non-finite float value '{value}' is unsupported"
                )));
            }
            Ok(wire::Value::Float { value })
        }
        Value::Text(value) => Ok(wire::Value::Text { value }),
        Value::BlobBase64(base64) => Ok(wire::Value::Blob { base64 }),
    }
}

fn normalize_named_parameter_name(name: &str) -> Result<String, BunnyDbError> {
    let normalized = name.trim_start_matches([':', '@', '$']);
    if normalized.is_empty() {
        return Err(BunnyDbError::InvalidArgument(
            "named parameter name cannot be empty".to_owned(),
        ));
    }
    Ok(normalized.to_owned())
}
