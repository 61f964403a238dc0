//! Unit tests for the stdio protocol implementation.
//!
//! Tests JSON-RPC 2.0 request/response handling, parameter parsing, and
//! method dispatch against offline-safe handlers.

use super::*;
use std::sync::Arc;

use serde_json::json;

use crate::config::{
    AgentConfig, Config, LogFormat, LoggingConfig, ModelConfig, RequestConfig, SearchConfig,
    SearchEngine,
};
use crate::server::{AppState, OFF_TOPIC_GUIDANCE};

fn create_test_server() -> StdioServer {
    let config = Config {
        model: ModelConfig {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
        },
        search: SearchConfig {
            engine: SearchEngine::DuckDuckGo,
            tavily_api_key: None,
            brave_api_key: None,
        },
        request: RequestConfig::default(),
        agent: AgentConfig {
            max_execution_time_secs: 300,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        },
    };

    let state = AppState::new(config).unwrap();
    StdioServer::new(Arc::new(state))
}

fn request(method: &str, id: Option<Value>, params: Option<Value>) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id,
        method: method.to_string(),
        params,
    }
}

// ============================================================================
// JsonRpcResponse tests
// ============================================================================

#[test]
fn test_jsonrpc_response_success_with_id() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"result": "ok"}));

    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, json!(1));
    assert!(response.result.is_some());
    assert!(response.error.is_none());
}

#[test]
fn test_jsonrpc_response_success_without_id() {
    let response = JsonRpcResponse::success(None, json!({}));

    assert_eq!(response.id, Value::Null);
}

#[test]
fn test_jsonrpc_response_error() {
    let response = JsonRpcResponse::error(Some(json!(42)), -32600, "Invalid request");

    assert_eq!(response.id, json!(42));
    assert!(response.result.is_none());

    let error = response.error.unwrap();
    assert_eq!(error.code, -32600);
    assert_eq!(error.message, "Invalid request");
}

#[test]
fn test_jsonrpc_response_serialization_omits_absent_halves() {
    let success = serde_json::to_string(&JsonRpcResponse::success(Some(json!(1)), json!(true)))
        .unwrap();
    assert!(success.contains("\"jsonrpc\":\"2.0\""));
    assert!(success.contains("\"result\""));
    assert!(!success.contains("\"error\""));

    let error =
        serde_json::to_string(&JsonRpcResponse::error(Some(json!(1)), -32601, "nope")).unwrap();
    assert!(error.contains("\"error\""));
    assert!(!error.contains("\"result\""));
}

// ============================================================================
// JsonRpcRequest deserialization tests
// ============================================================================

#[test]
fn test_jsonrpc_request_deserialization() {
    let json_str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
    let request: JsonRpcRequest = serde_json::from_str(json_str).unwrap();

    assert_eq!(request.jsonrpc, "2.0");
    assert_eq!(request.id, Some(json!(1)));
    assert_eq!(request.method, "initialize");
    assert!(request.params.is_some());
}

#[test]
fn test_jsonrpc_request_without_params() {
    let json_str = r#"{"jsonrpc":"2.0","id":2,"method":"system/info"}"#;
    let request: JsonRpcRequest = serde_json::from_str(json_str).unwrap();

    assert_eq!(request.method, "system/info");
    assert!(request.params.is_none());
}

#[test]
fn test_jsonrpc_notification_has_no_id() {
    let json_str = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;
    let request: JsonRpcRequest = serde_json::from_str(json_str).unwrap();

    assert!(request.id.is_none());
}

// ============================================================================
// Parameter parsing tests
// ============================================================================

#[test]
fn test_history_params_limit_defaults_to_none() {
    let params: HistoryParams =
        serde_json::from_value(json!({"conversation_id": "abc"})).unwrap();
    assert_eq!(params.conversation_id, "abc");
    assert!(params.limit.is_none());
}

#[test]
fn test_export_params_defaults() {
    let params: ExportParams =
        serde_json::from_value(json!({"conversation_id": "abc"})).unwrap();
    assert_eq!(params.format, "markdown");
    assert!(params.include_metadata);
}

#[test]
fn test_query_request_conversation_defaults() {
    let request: QueryRequest =
        serde_json::from_value(json!({"query": "腾讯控股财务分析"})).unwrap();
    assert_eq!(request.conversation_id, "default");
    assert!(request.user_id.is_none());
}

#[test]
fn test_parse_params_missing() {
    let parsed: ProtocolResult<HistoryParams> = parse_params("conversation/history", None);
    assert!(matches!(
        parsed,
        Err(ProtocolError::InvalidParameters { .. })
    ));
}

#[test]
fn test_parse_optional_params_missing_is_default() {
    let parsed: SuggestionsParams = parse_optional_params("suggestions/list", None).unwrap();
    assert!(parsed.query.is_none());
}

#[test]
fn test_error_codes() {
    let invalid = ProtocolError::InvalidRequest {
        message: "x".to_string(),
    };
    let unknown = ProtocolError::UnknownMethod {
        method: "x".to_string(),
    };
    let params = ProtocolError::InvalidParameters {
        method: "x".to_string(),
        message: "y".to_string(),
    };

    assert_eq!(error_code(&invalid), -32600);
    assert_eq!(error_code(&unknown), -32601);
    assert_eq!(error_code(&params), -32602);
}

// ============================================================================
// Dispatch tests
// ============================================================================

#[tokio::test]
async fn test_ping_returns_empty_object() {
    let server = create_test_server();
    let response = server
        .handle_request(request("ping", Some(json!(1)), None))
        .await
        .unwrap();

    assert_eq!(response.result, Some(json!({})));
}

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let server = create_test_server();
    let response = server
        .handle_request(request("initialize", Some(json!(1)), None))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "nexmind-agent");
    assert_eq!(result["capabilities"]["streaming"], true);
}

#[tokio::test]
async fn test_initialized_notification_gets_no_response() {
    let server = create_test_server();
    let response = server
        .handle_request(request("initialized", None, None))
        .await;

    assert!(response.is_none());
}

#[tokio::test]
async fn test_unknown_method_errors_only_for_requests() {
    let server = create_test_server();

    let as_request = server
        .handle_request(request("no/such", Some(json!(1)), None))
        .await
        .unwrap();
    assert_eq!(as_request.error.unwrap().code, -32601);

    let as_notification = server.handle_request(request("no/such", None, None)).await;
    assert!(as_notification.is_none());
}

#[tokio::test]
async fn test_query_process_requires_params() {
    let server = create_test_server();
    let response = server
        .handle_request(request("query/process", Some(json!(1)), None))
        .await
        .unwrap();

    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_query_process_rejects_off_topic() {
    let server = create_test_server();
    let response = server
        .handle_request(request(
            "query/process",
            Some(json!(1)),
            Some(json!({"query": "你好", "conversation_id": "greet"})),
        ))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["content"], OFF_TOPIC_GUIDANCE);
    assert_eq!(result["metadata"]["status"], "rejected");
}

#[tokio::test]
async fn test_suggestions_without_params() {
    let server = create_test_server();
    let response = server
        .handle_request(request("suggestions/list", Some(json!(1)), None))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["suggestions"].as_array().unwrap().len(), 8);
    assert_eq!(result["categories"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_history_of_unknown_conversation_is_empty() {
    let server = create_test_server();
    let response = server
        .handle_request(request(
            "conversation/history",
            Some(json!(1)),
            Some(json!({"conversation_id": "nobody"})),
        ))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["total_messages"], 0);
    assert_eq!(result["messages"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_clear_conversation_acknowledges() {
    let server = create_test_server();
    let response = server
        .handle_request(request(
            "conversation/clear",
            Some(json!(1)),
            Some(json!({"conversation_id": "c9"})),
        ))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["message"], "对话 c9 已清除");
}

#[tokio::test]
async fn test_export_of_missing_conversation_errors() {
    let server = create_test_server();
    let response = server
        .handle_request(request(
            "report/export",
            Some(json!(1)),
            Some(json!({"conversation_id": "nobody"})),
        ))
        .await
        .unwrap();

    let error = response.error.unwrap();
    assert_eq!(error.code, -32600);
    assert!(error.message.contains("未找到对话记录"));
}

#[tokio::test]
async fn test_system_info_dispatch() {
    let server = create_test_server();
    let response = server
        .handle_request(request("system/info", Some(json!(1)), None))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["app_name"], "NexMind");
    assert_eq!(result["features"].as_array().unwrap().len(), 6);
}
