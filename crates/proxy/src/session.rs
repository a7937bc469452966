//! Gateway session: the stdio read/dispatch/write loop and the online/offline state machine.
//!
//! One request is handled to completion (including any downstream HTTP call) before the next
//! line is read. The session exclusively owns the tool source (and so the tool registry) and
//! the [`OperationMode`]; cache writes run as detached background tasks that nothing waits on
//! except the final drain at end of input.

use crate::cache::CacheStore;
use crate::error::Result;
use crate::protocol::{
    INTERNAL_ERROR, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, SERVER_NAME,
};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::task::JoinSet;
use unrelated_http_tools::mode::{OperationMode, transition};
use unrelated_http_tools::runtime::DownstreamExecutor;
use unrelated_http_tools::safety::redact_url_str;
use unrelated_openapi_tools::runtime::OpenApiToolSource;

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<JsonObject>,
}

pub struct GatewaySession {
    source: OpenApiToolSource,
    executor: DownstreamExecutor,
    cache: CacheStore,
    mode: OperationMode,
    tools: Vec<Tool>,
    cache_writes: JoinSet<()>,
}

impl GatewaySession {
    #[must_use]
    pub fn new(source: OpenApiToolSource, executor: DownstreamExecutor, cache: CacheStore) -> Self {
        Self {
            source,
            executor,
            cache,
            mode: OperationMode::Online,
            tools: Vec::new(),
            cache_writes: JoinSet::new(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Serve line-delimited JSON-RPC until `reader` reaches end of input, then wait for
    /// pending cache writes.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading input or writing output fails.
    pub async fn run<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if let Some(out) = self.handle_line(&line).await {
                writer.write_all(out.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            while self.cache_writes.try_join_next().is_some() {}
        }

        tracing::info!("end of input, shutting down");
        self.finish().await;
        Ok(())
    }

    /// Wait for all background cache writes to complete.
    pub async fn finish(&mut self) {
        while self.cache_writes.join_next().await.is_some() {}
    }

    /// Handle one input line, returning the serialized response (if one is due).
    ///
    /// Blank lines, malformed JSON and notifications produce no output.
    pub async fn handle_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed input line");
                return None;
            }
        };

        let response = self.handle_request(request).await?;
        match serde_json::to_string(&response) {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                None
            }
        }
    }

    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() || request.method == "notifications/initialized" {
            tracing::debug!(method = %request.method, "received notification");
            return None;
        }
        let id = request.id.unwrap_or_default();

        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize().await),
            "tools/list" => Ok(self.list_tools().await),
            "tools/call" => self.call_tool(request.params).await,
            other => {
                tracing::debug!(method = %other, "unknown method");
                Err(JsonRpcError::method_not_found(other))
            }
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::ok(id, result),
            Err(error) => JsonRpcResponse::err(id, error),
        })
    }

    async fn initialize(&mut self) -> Value {
        match self.source.generate_live_tools().await {
            Ok(tools) => {
                transition(&mut self.mode, OperationMode::Online);
                self.spawn_cache_write(tools.clone());
                self.tools = tools;
            }
            Err(e) => {
                tracing::warn!(error = %e, "live tool generation failed, falling back to cache");
                transition(&mut self.mode, OperationMode::Offline);
                self.use_cached_tools().await;
            }
        }

        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        })
    }

    async fn list_tools(&mut self) -> Value {
        if self.tools.is_empty() {
            if self.mode.is_offline() {
                self.use_cached_tools().await;
            } else {
                match self.source.generate_live_tools().await {
                    Ok(tools) => {
                        self.spawn_cache_write(tools.clone());
                        self.tools = tools;
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "live tool generation failed, falling back to cache"
                        );
                        transition(&mut self.mode, OperationMode::Offline);
                        self.use_cached_tools().await;
                    }
                }
            }
        }

        json!({ "tools": self.tools })
    }

    async fn call_tool(
        &mut self,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
        let params: CallToolParams =
            serde_json::from_value(params).map_err(JsonRpcError::invalid_params)?;
        tracing::debug!(tool = %params.name, arguments = ?params.arguments, "tools/call");

        let result = match self
            .source
            .prepare_http_request(&params.name, params.arguments.as_ref())
        {
            Ok(request) => {
                tracing::debug!(
                    method = %request.method,
                    url = %redact_url_str(&request.url),
                    body = ?request.body,
                    "prepared downstream request"
                );
                let text = self
                    .executor
                    .execute(&request, self.mode, |next| {
                        transition(&mut self.mode, next);
                    })
                    .await;
                if is_error_payload(&text) {
                    CallToolResult::error(vec![Content::text(text)])
                } else {
                    CallToolResult::success(vec![Content::text(text)])
                }
            }
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "tool call failed");
                let text = json!({ "error": e.to_string() }).to_string();
                CallToolResult::error(vec![Content::text(text)])
            }
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError {
            code: INTERNAL_ERROR,
            message: e.to_string(),
        })
    }

    /// Replace the tool list with the cached one (empty on a miss). The registry is rebuilt
    /// from the loaded document so cached tools stay callable.
    async fn use_cached_tools(&mut self) {
        self.source.rebuild_registry();
        self.tools = self
            .cache
            .load(self.source.spec_url())
            .await
            .unwrap_or_default();
        tracing::info!(count = self.tools.len(), "serving cached tools");
    }

    fn spawn_cache_write(&mut self, tools: Vec<Tool>) {
        let cache = self.cache.clone();
        let spec_url = self.source.spec_url().to_string();
        self.cache_writes.spawn(async move {
            match cache.save(&spec_url, &tools).await {
                Ok(path) => tracing::info!(
                    path = %path.display(),
                    count = tools.len(),
                    "saved tools cache"
                ),
                Err(e) => tracing::warn!(error = %e, "failed to save tools cache"),
            }
        });
    }
}

/// Whether a tool result text is a JSON object carrying an `error` key.
fn is_error_payload(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.as_object().map(|o| o.contains_key("error")))
        .unwrap_or(false)
}
