use std::{fmt, future::Future, time::Duration};

use reqwest::header;

use crate::{
    wire::{PipelineRequest, PipelineResponse},
    BunnyDbError, ClientOptions, Result,
};

/// Sends one pipeline request and returns the decoded response.
///
/// Implementations perform exactly one exchange per call and never retry.
/// `base_url` is the stream's redirect target when the server supplied one.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        base_url: Option<&str>,
        payload: &PipelineRequest,
    ) -> impl Future<Output = Result<PipelineResponse>> + Send;
}

/// Hrana-over-HTTP transport backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    pipeline_url: String,
    token: String,
    options: ClientOptions,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("pipeline_url", &self.pipeline_url)
            .field("token", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl HttpTransport {
    /// Creates a transport with a full raw authorization value.
    pub fn new(pipeline_url: impl Into<String>, authorization: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            pipeline_url: pipeline_url.into(),
            token: authorization.into(),
            options: ClientOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    pub fn pipeline_url(&self) -> &str {
        &self.pipeline_url
    }

    fn target_url(&self, base_url: Option<&str>) -> String {
        match base_url {
            Some(base) => format!("{}/v2/pipeline", base.trim_end_matches('/')),
            None => self.pipeline_url.clone(),
        }
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        base_url: Option<&str>,
        payload: &PipelineRequest,
    ) -> impl Future<Output = Result<PipelineResponse>> + Send {
        let request = self
            .http
            .post(self.target_url(base_url))
            .header(header::AUTHORIZATION, &self.token)
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(Duration::from_millis(self.options.timeout_ms))
            .json(payload);

        async move {
            let response = request.send().await.map_err(BunnyDbError::Transport)?;
            let status = response.status();
            let body = response.text().await.map_err(BunnyDbError::Transport)?;

            if !status.is_success() {
                return Err(BunnyDbError::Http {
                    status: status.as_u16(),
                    body,
                });
            }

            serde_json::from_str::<PipelineResponse>(&body).map_err(|err| {
                BunnyDbError::Decode(format!(
                    "invalid pipeline response JSON: {err}; body: {body}"
                ))
            })
        }
    }
}

pub(crate) fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
