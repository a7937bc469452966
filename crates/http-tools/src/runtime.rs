//! Downstream executor: performs the outbound HTTP call behind a `tools/call`.
//!
//! The executor never fails. Every outcome is rendered as the textual tool result:
//! - 2xx + JSON body: the body verbatim
//! - 2xx + non-JSON body: `{"result": <body>}`
//! - non-2xx: `{"error": {"code": <status>, "message": <reason>, "details": <body>}}`
//! - unreachable downstream: a synthesized "server offline" error (and a mode change)
//! - anything else: `{"error": {"code": -2, "message": "Unexpected error", ...}}`

use crate::mode::OperationMode;
use crate::request::PreparedRequest;
use crate::safety::{is_network_error, origin_url, redact_url_str, sanitize_reqwest_error};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use std::time::Duration;

/// Per-call timeout for downstream requests.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the offline-recovery reachability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Error code used in the synthesized offline payload.
pub const OFFLINE_ERROR_CODE: i64 = -1;
/// Error code used for failures that are neither HTTP nor network errors.
pub const UNEXPECTED_ERROR_CODE: i64 = -2;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub call_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownstreamExecutor {
    client: Client,
    config: ExecutorConfig,
}

impl DownstreamExecutor {
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Execute a prepared request and render the outcome as tool result text.
    ///
    /// While `mode` is [`OperationMode::Offline`], a reachability probe against the downstream
    /// origin runs first: success reports [`OperationMode::Online`] through `on_mode_change`
    /// and the real call proceeds; failure short-circuits with the offline payload. A network
    /// failure during the real call reports [`OperationMode::Offline`].
    pub async fn execute(
        &self,
        request: &PreparedRequest,
        mode: OperationMode,
        mut on_mode_change: impl FnMut(OperationMode),
    ) -> String {
        if mode.is_offline() {
            match self.probe(&request.url).await {
                Ok(()) => on_mode_change(OperationMode::Online),
                Err(cause) => {
                    tracing::debug!(
                        url = %redact_url_str(&request.url),
                        %cause,
                        "downstream still unreachable"
                    );
                    return offline_payload(&request.url, &cause);
                }
            }
        }

        match self.send(request).await {
            Ok(text) => text,
            Err(e) if is_network_error(&e) => {
                let cause = sanitize_reqwest_error(&e);
                tracing::warn!(
                    url = %redact_url_str(&request.url),
                    %cause,
                    "downstream request failed"
                );
                on_mode_change(OperationMode::Offline);
                offline_payload(&request.url, &cause)
            }
            Err(e) => unexpected_payload(&sanitize_reqwest_error(&e)),
        }
    }

    async fn send(&self, request: &PreparedRequest) -> reqwest::Result<String> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .timeout(self.config.call_timeout);

        if let Some(body) = request.body.as_ref().filter(|b| !b.is_null()) {
            // serde_json leaves non-ASCII characters unescaped.
            let encoded = serde_json::to_string(body).unwrap_or_else(|_| body.to_string());
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(encoded);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown");
            return Ok(json!({
                "error": {
                    "code": status.as_u16(),
                    "message": reason,
                    "details": text,
                }
            })
            .to_string());
        }

        if serde_json::from_str::<Value>(&text).is_ok() {
            Ok(text)
        } else {
            Ok(json!({ "result": text }).to_string())
        }
    }

    /// HEAD the origin of `url`. Any HTTP response counts as reachable (404/405 are fine);
    /// only transport errors and timeouts fail the probe.
    async fn probe(&self, url: &str) -> Result<(), String> {
        let Some(origin) = origin_url(url) else {
            return Err(format!("cannot derive an origin from '{}'", redact_url_str(url)));
        };
        self.client
            .head(origin.as_str())
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sanitize_reqwest_error(&e))
    }
}

impl Default for DownstreamExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

fn offline_payload(url: &str, cause: &str) -> String {
    json!({
        "error": {
            "code": OFFLINE_ERROR_CODE,
            "message": "Server offline",
            "details": format!("Unable to reach {}: {cause}", redact_url_str(url)),
        }
    })
    .to_string()
}

fn unexpected_payload(details: &str) -> String {
    json!({
        "error": {
            "code": UNEXPECTED_ERROR_CODE,
            "message": "Unexpected error",
            "details": details,
        }
    })
    .to_string()
}
