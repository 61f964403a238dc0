//! Config environment variable tests
//!
//! These tests verify that Config::from_env() reads, validates, and
//! defaults its environment variables. Each test first resets the full
//! variable set so nothing leaks in from the host environment or between
//! tests.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use serial_test::serial;
use std::env;

use nexmind_agent::config::{Config, LogFormat, SearchEngine};
use nexmind_agent::error::AppError;

const ALL_VARS: [&str; 14] = [
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "OPENAI_MODEL",
    "OPENAI_TEMPERATURE",
    "OPENAI_MAX_TOKENS",
    "SEARCH_ENGINE",
    "TAVILY_API_KEY",
    "BRAVE_API_KEY",
    "REQUEST_TIMEOUT_MS",
    "MAX_RETRIES",
    "RETRY_DELAY_MS",
    "MAX_EXECUTION_TIME",
    "LOG_LEVEL",
    "LOG_FORMAT",
];

/// Remove every configuration variable
fn reset_env() {
    for var in ALL_VARS {
        env::remove_var(var);
    }
}

/// Minimal valid environment: an API key and the keyless search engine
fn set_required() {
    env::set_var("OPENAI_API_KEY", "sk-test");
    env::set_var("SEARCH_ENGINE", "duckduckgo");
}

#[test]
#[serial]
fn test_missing_api_key_fails() {
    reset_env();

    let result = Config::from_env();
    match result {
        Err(AppError::Config { message }) => {
            assert!(message.contains("OPENAI_API_KEY"), "got: {}", message);
        }
        other => panic!("Expected Config error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_defaults_applied() {
    reset_env();
    set_required();

    let config = Config::from_env().unwrap();
    assert_eq!(config.model.base_url, "https://api.openai.com/v1");
    assert_eq!(config.model.model, "gpt-4o-mini");
    assert!((config.model.temperature - 0.1).abs() < f64::EPSILON);
    assert_eq!(config.model.max_tokens, 4000);
    assert_eq!(config.request.timeout_ms, 30000);
    assert_eq!(config.request.max_retries, 3);
    assert_eq!(config.request.retry_delay_ms, 1000);
    assert_eq!(config.agent.max_execution_time_secs, 300);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
#[serial]
fn test_engine_defaults_to_tavily_and_requires_its_key() {
    reset_env();
    env::set_var("OPENAI_API_KEY", "sk-test");

    let result = Config::from_env();
    match result {
        Err(AppError::Config { message }) => {
            assert!(message.contains("TAVILY_API_KEY"), "got: {}", message);
        }
        other => panic!("Expected Config error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_tavily_engine_with_key() {
    reset_env();
    env::set_var("OPENAI_API_KEY", "sk-test");
    env::set_var("TAVILY_API_KEY", "tvly-test");

    let config = Config::from_env().unwrap();
    assert_eq!(config.search.engine, SearchEngine::Tavily);
    assert_eq!(config.search.tavily_api_key.as_deref(), Some("tvly-test"));
}

#[test]
#[serial]
fn test_unknown_engine_falls_back_to_duckduckgo() {
    reset_env();
    env::set_var("OPENAI_API_KEY", "sk-test");
    env::set_var("SEARCH_ENGINE", "bing");

    let config = Config::from_env().unwrap();
    assert_eq!(config.search.engine, SearchEngine::DuckDuckGo);
}

#[test]
#[serial]
fn test_brave_engine_requires_its_key() {
    reset_env();
    env::set_var("OPENAI_API_KEY", "sk-test");
    env::set_var("SEARCH_ENGINE", "brave");

    let result = Config::from_env();
    match result {
        Err(AppError::Config { message }) => {
            assert!(message.contains("BRAVE_API_KEY"), "got: {}", message);
        }
        other => panic!("Expected Config error, got {:?}", other),
    }

    env::set_var("BRAVE_API_KEY", "brave-test");
    let config = Config::from_env().unwrap();
    assert_eq!(config.search.engine, SearchEngine::Brave);
    assert_eq!(config.search.brave_api_key.as_deref(), Some("brave-test"));
}

#[test]
#[serial]
fn test_empty_provider_key_counts_as_missing() {
    reset_env();
    env::set_var("OPENAI_API_KEY", "sk-test");
    env::set_var("SEARCH_ENGINE", "tavily");
    env::set_var("TAVILY_API_KEY", "");

    assert!(Config::from_env().is_err());
}

#[test]
#[serial]
fn test_overrides_applied() {
    reset_env();
    set_required();
    env::set_var("OPENAI_BASE_URL", "https://proxy.internal/v1");
    env::set_var("OPENAI_MODEL", "gpt-4o");
    env::set_var("OPENAI_TEMPERATURE", "0.7");
    env::set_var("OPENAI_MAX_TOKENS", "1000");
    env::set_var("REQUEST_TIMEOUT_MS", "60000");
    env::set_var("MAX_RETRIES", "5");
    env::set_var("RETRY_DELAY_MS", "2000");
    env::set_var("MAX_EXECUTION_TIME", "60");
    env::set_var("LOG_LEVEL", "debug");
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.model.base_url, "https://proxy.internal/v1");
    assert_eq!(config.model.model, "gpt-4o");
    assert!((config.model.temperature - 0.7).abs() < f64::EPSILON);
    assert_eq!(config.model.max_tokens, 1000);
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);
    assert_eq!(config.request.retry_delay_ms, 2000);
    assert_eq!(config.agent.max_execution_time_secs, 60);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
#[serial]
fn test_invalid_number_uses_default() {
    reset_env();
    set_required();
    env::set_var("OPENAI_TEMPERATURE", "not-a-number");
    env::set_var("MAX_EXECUTION_TIME", "soon");

    let config = Config::from_env().unwrap();
    assert!((config.model.temperature - 0.1).abs() < f64::EPSILON);
    assert_eq!(config.agent.max_execution_time_secs, 300);
}

#[test]
#[serial]
fn test_log_format_is_case_insensitive() {
    reset_env();
    set_required();
    env::set_var("LOG_FORMAT", "JSON");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);
}
