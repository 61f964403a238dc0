//! Unit tests for chat API types.
//!
//! Tests request/response types, serialization, deserialization,
//! and builder patterns for chat completion communication.

use super::*;

// Message tests
#[test]
fn test_message_system() {
    let msg = Message::system("你是一个专业的企业分析师");
    assert!(matches!(msg.role, MessageRole::System));
    assert_eq!(msg.content, "你是一个专业的企业分析师");
}

#[test]
fn test_message_user() {
    let msg = Message::user("分析腾讯控股");
    assert!(matches!(msg.role, MessageRole::User));
    assert_eq!(msg.content, "分析腾讯控股");
}

#[test]
fn test_message_assistant() {
    let msg = Message::assistant("好的");
    assert!(matches!(msg.role, MessageRole::Assistant));
    assert_eq!(msg.content, "好的");
}

#[test]
fn test_message_role_serializes_lowercase() {
    let json = serde_json::to_string(&Message::user("hi")).unwrap();
    assert!(json.contains("\"role\":\"user\""));

    let json = serde_json::to_string(&Message::system("hi")).unwrap();
    assert!(json.contains("\"role\":\"system\""));
}

// ChatRequest tests
#[test]
fn test_chat_request_new() {
    let req = ChatRequest::new("gpt-4o-mini", vec![Message::user("test")]);
    assert_eq!(req.model, "gpt-4o-mini");
    assert_eq!(req.messages.len(), 1);
    assert!(!req.stream);
    assert_eq!(req.temperature, 0.1);
    assert_eq!(req.max_tokens, 4000);
}

#[test]
fn test_chat_request_builder() {
    let req = ChatRequest::new("gpt-4o-mini", vec![])
        .with_temperature(0.2)
        .with_max_tokens(2000);
    assert_eq!(req.temperature, 0.2);
    assert_eq!(req.max_tokens, 2000);
}

#[test]
fn test_chat_request_serializes_stream_flag() {
    let req = ChatRequest::new("gpt-4o-mini", vec![Message::user("test")]);
    let json = serde_json::to_string(&req).unwrap();
    assert!(json.contains("\"stream\":false"));
    assert!(json.contains("\"model\":\"gpt-4o-mini\""));
}

// GenerationOptions tests
#[test]
fn test_generation_options_default_is_empty() {
    let opts = GenerationOptions::new();
    assert!(opts.temperature.is_none());
    assert!(opts.max_tokens.is_none());
}

#[test]
fn test_generation_options_builder() {
    let opts = GenerationOptions::new()
        .with_temperature(0.2)
        .with_max_tokens(2000);
    assert_eq!(opts.temperature, Some(0.2));
    assert_eq!(opts.max_tokens, Some(2000));
}

// ChatResponse tests
#[test]
fn test_chat_response_deserialization() {
    let json = r#"{
        "id": "chatcmpl-123",
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": "分析完成"},
                "finish_reason": "stop"
            }
        ],
        "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25}
    }"#;

    let response: ChatResponse = serde_json::from_str(json).unwrap();
    assert_eq!(response.choices.len(), 1);
    assert_eq!(response.choices[0].message.content, "分析完成");
    assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
    assert_eq!(response.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(response.usage.unwrap().total_tokens, Some(25));
}

#[test]
fn test_chat_response_tolerates_missing_usage() {
    let json = r#"{
        "choices": [
            {"message": {"role": "assistant", "content": "ok"}}
        ]
    }"#;

    let response: ChatResponse = serde_json::from_str(json).unwrap();
    assert_eq!(response.choices[0].message.content, "ok");
    assert!(response.usage.is_none());
    assert!(response.model.is_none());
}
