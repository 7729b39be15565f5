//! In-memory engine used by unit tests.
//!
//! Statements starting with `CRASH_CONNECTION` fail at transport level,
//! statements starting with `SELEC ` are rejected by the engine, everything
//! else returns one row echoing the SQL text.

use std::{
    future::{self, Future},
    sync::{Mutex, PoisonError},
};

use crate::{
    transport::Transport,
    wire::{self, ExecuteResult, PipelineRequest, PipelineResponse, PipelineResult, Request},
    BunnyDbError, Result,
};

#[derive(Debug, Default)]
pub(crate) struct FakeEngine {
    requests: Mutex<Vec<PipelineRequest>>,
    drop_batons: bool,
}

impl FakeEngine {
    /// Never hands out a baton, so every stream ends after one exchange.
    pub(crate) fn dropping_batons(mut self) -> Self {
        self.drop_batons = true;
        self
    }

    pub(crate) fn batons(&self) -> Vec<Option<String>> {
        self.requests()
            .into_iter()
            .map(|request| request.baton)
            .collect()
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .flat_map(|request| request.requests)
            .filter_map(|request| match request {
                Request::Execute { stmt } => Some(stmt.sql),
                Request::Close {} => None,
            })
            .collect()
    }

    pub(crate) fn close_requests(&self) -> usize {
        self.requests()
            .into_iter()
            .flat_map(|request| request.requests)
            .filter(|request| matches!(request, Request::Close {}))
            .count()
    }

    fn requests(&self) -> Vec<PipelineRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn respond(&self, payload: &PipelineRequest) -> Result<PipelineResponse> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        requests.push(payload.clone());

        let mut results = Vec::with_capacity(payload.requests.len());
        let mut closing = false;
        for request in &payload.requests {
            match request {
                Request::Close {} => {
                    closing = true;
                    results.push(PipelineResult::close_ok());
                }
                Request::Execute { stmt } => {
                    let upper = stmt.sql.trim_start().to_ascii_uppercase();
                    if upper.starts_with("CRASH_CONNECTION") {
                        return Err(BunnyDbError::Http {
                            status: 502,
                            body: "upstream connection reset".to_owned(),
                        });
                    }
                    if upper.starts_with("SELEC ") {
                        results.push(PipelineResult::error(
                            "near \"SELEC\": syntax error",
                            Some("SQLITE_ERROR"),
                        ));
                        continue;
                    }
                    results.push(PipelineResult::execute_ok(ExecuteResult {
                        cols: vec![wire::Col {
                            name: "sql".to_owned(),
                            decltype: Some("TEXT".to_owned()),
                        }],
                        rows: vec![vec![wire::Value::Text {
                            value: stmt.sql.clone(),
                        }]],
                        ..ExecuteResult::default()
                    }));
                }
            }
        }

        let baton = if closing || self.drop_batons {
            None
        } else {
            Some(format!("baton-{}", requests.len()))
        };
        Ok(PipelineResponse {
            baton,
            base_url: None,
            results,
        })
    }
}

impl Transport for FakeEngine {
    fn send(
        &self,
        _base_url: Option<&str>,
        payload: &PipelineRequest,
    ) -> impl Future<Output = Result<PipelineResponse>> + Send {
        future::ready(self.respond(payload))
    }
}
