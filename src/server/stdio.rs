//! Stdio line protocol for the analysis service.
//!
//! This module provides:
//! - JSON-RPC 2.0 request/response handling
//! - Method dispatch onto the shared application state
//! - Newline-delimited server loop over stdin/stdout, including the
//!   streaming query variant that interleaves progress notifications

use std::pin::pin;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{ProtocolError, ProtocolResult};
use crate::pipeline::Stage;

use super::{QueryRequest, SharedState};

#[cfg(test)]
#[path = "stdio_tests.rs"]
mod stdio_tests;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null when the request carried none).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Server identification returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// Capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Whether query/stream progress notifications are supported.
    pub streaming: bool,
}

/// Result of the initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Server capabilities.
    pub capabilities: Capabilities,
}

/// Parameters for conversation/history.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub conversation_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Parameters for conversation/clear.
#[derive(Debug, Deserialize)]
pub struct ClearParams {
    pub conversation_id: String,
}

/// Parameters for suggestions/list.
#[derive(Debug, Default, Deserialize)]
pub struct SuggestionsParams {
    #[serde(default)]
    pub query: Option<String>,
}

/// Parameters for report/export.
#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub conversation_id: String,
    #[serde(default = "default_export_format")]
    pub format: String,
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
}

fn default_export_format() -> String {
    "markdown".to_string()
}

fn default_include_metadata() -> bool {
    true
}

/// Analysis server running over stdio.
///
/// Handles newline-delimited JSON-RPC 2.0 messages over stdin/stdout.
pub struct StdioServer {
    /// Shared application state.
    state: SharedState,
}

impl StdioServer {
    /// Create a new stdio server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("NexMind analysis server starting...");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                // The streaming method writes notifications while it runs,
                // so it is driven here where stdout is available
                Ok(request) if request.method == "query/stream" => {
                    self.handle_query_stream(request.id, request.params, &mut stdout)
                        .await?
                }
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            // Only send a response if not a notification (per JSON-RPC 2.0 spec)
            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request.
    /// Returns None for notifications (requests without id) per JSON-RPC 2.0
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" => {
                // Notification - no response per JSON-RPC 2.0
                debug!("Received initialized notification");
                None
            }
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            "query/process" => Some(self.handle_query(request.id, request.params).await),
            "conversation/history" => Some(self.handle_history(request.id, request.params).await),
            "conversation/clear" => Some(self.handle_clear(request.id, request.params).await),
            "system/info" => Some(into_success(request.id, &self.state.system_info())),
            "suggestions/list" => Some(self.handle_suggestions(request.id, request.params)),
            "report/export" => Some(self.handle_export(request.id, request.params).await),
            method => {
                // For unknown methods, only respond if it's a request (has id)
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            server_info: ServerInfo {
                name: "nexmind-agent".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: Capabilities { streaming: true },
        };

        into_success(id, &result)
    }

    /// Handle query/process request
    async fn handle_query(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let request: QueryRequest = match parse_params("query/process", params) {
            Ok(request) => request,
            Err(e) => return protocol_error_response(id, &e),
        };

        info!(query = %request.query, "Handling query");
        let response = self.state.process_query(request).await;
        into_success(id, &response)
    }

    /// Handle query/stream: run one query while forwarding stage progress.
    ///
    /// Progress events are written as `query/progress` notifications in
    /// stage order ahead of the terminal response, which carries the final
    /// report tagged with the terminal stage.
    async fn handle_query_stream(
        &self,
        id: Option<Value>,
        params: Option<Value>,
        stdout: &mut tokio::io::Stdout,
    ) -> std::io::Result<Option<JsonRpcResponse>> {
        let is_notification = id.is_none();

        let request: QueryRequest = match parse_params("query/stream", params) {
            Ok(request) => request,
            Err(e) => {
                if is_notification {
                    return Ok(None);
                }
                return Ok(Some(protocol_error_response(id, &e)));
            }
        };

        info!(query = %request.query, "Handling streaming query");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut run = pin!(self.state.process_query_streaming(request, tx));

        let response = loop {
            tokio::select! {
                maybe_update = rx.recv() => {
                    match maybe_update {
                        Some(update) => {
                            write_notification(stdout, "query/progress", &update).await?;
                        }
                        // Sender dropped; only completion remains
                        None => break run.as_mut().await,
                    }
                }
                response = run.as_mut() => {
                    // Flush updates that raced with completion, in order
                    while let Ok(update) = rx.try_recv() {
                        write_notification(stdout, "query/progress", &update).await?;
                    }
                    break response;
                }
            }
        };

        if is_notification {
            return Ok(None);
        }

        Ok(Some(match serde_json::to_value(&response) {
            Ok(mut value) => {
                if let Some(object) = value.as_object_mut() {
                    object.insert(
                        "stage".to_string(),
                        Value::String(Stage::Done.as_str().to_string()),
                    );
                }
                JsonRpcResponse::success(id, value)
            }
            Err(e) => {
                error!(error = %e, "Failed to serialize streaming response");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }))
    }

    /// Handle conversation/history request
    async fn handle_history(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: HistoryParams = match parse_params("conversation/history", params) {
            Ok(params) => params,
            Err(e) => return protocol_error_response(id, &e),
        };

        let response = self.state.history(&params.conversation_id, params.limit).await;
        into_success(id, &response)
    }

    /// Handle conversation/clear request
    async fn handle_clear(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ClearParams = match parse_params("conversation/clear", params) {
            Ok(params) => params,
            Err(e) => return protocol_error_response(id, &e),
        };

        let response = self.state.clear_conversation(&params.conversation_id).await;
        into_success(id, &response)
    }

    /// Handle suggestions/list request
    fn handle_suggestions(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: SuggestionsParams = match parse_optional_params("suggestions/list", params) {
            Ok(params) => params,
            Err(e) => return protocol_error_response(id, &e),
        };

        into_success(id, &self.state.suggestions(params.query.as_deref()))
    }

    /// Handle report/export request
    async fn handle_export(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ExportParams = match parse_params("report/export", params) {
            Ok(params) => params,
            Err(e) => return protocol_error_response(id, &e),
        };

        info!(conversation = %params.conversation_id, "Handling report export");
        match self
            .state
            .export_report(
                &params.conversation_id,
                &params.format,
                params.include_metadata,
            )
            .await
        {
            Ok(response) => into_success(id, &response),
            Err(e) => protocol_error_response(id, &e),
        }
    }
}

/// Write one JSON-RPC notification line
async fn write_notification<T: Serialize>(
    stdout: &mut tokio::io::Stdout,
    method: &str,
    params: &T,
) -> std::io::Result<()> {
    let notification = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    });
    let text = serde_json::to_string(&notification)?;

    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> ProtocolResult<T> {
    match params {
        Some(params) => {
            serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParameters {
                method: method.to_string(),
                message: e.to_string(),
            })
        }
        None => Err(ProtocolError::InvalidParameters {
            method: method.to_string(),
            message: "missing params".to_string(),
        }),
    }
}

fn parse_optional_params<T: DeserializeOwned + Default>(
    method: &str,
    params: Option<Value>,
) -> ProtocolResult<T> {
    match params {
        Some(params) => {
            serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParameters {
                method: method.to_string(),
                message: e.to_string(),
            })
        }
        None => Ok(T::default()),
    }
}

fn into_success<T: Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            error!(error = %e, "Failed to serialize result");
            JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
        }
    }
}

fn protocol_error_response(id: Option<Value>, error: &ProtocolError) -> JsonRpcResponse {
    JsonRpcResponse::error(id, error_code(error), error.to_string())
}

fn error_code(error: &ProtocolError) -> i32 {
    match error {
        ProtocolError::InvalidRequest { .. } => -32600,
        ProtocolError::UnknownMethod { .. } => -32601,
        ProtocolError::InvalidParameters { .. } => -32602,
        ProtocolError::Json(_) => -32700,
    }
}
