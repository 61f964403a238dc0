use std::env;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub model: ModelConfig,
    pub search: SearchConfig,
    pub request: RequestConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

/// Chat-completion backend configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Search provider configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub engine: SearchEngine,
    pub tavily_api_key: Option<String>,
    pub brave_api_key: Option<String>,
}

/// The configured web-search backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    DuckDuckGo,
    Tavily,
    Brave,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Pipeline execution limits
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Wall-clock budget for one query, enforced at the service boundary.
    pub max_execution_time_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl SearchEngine {
    /// String identifier used in configuration and log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::DuckDuckGo => "duckduckgo",
            SearchEngine::Tavily => "tavily",
            SearchEngine::Brave => "brave",
        }
    }
}

impl std::fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SearchEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckduckgo" => Ok(SearchEngine::DuckDuckGo),
            "tavily" => Ok(SearchEngine::Tavily),
            "brave" => Ok(SearchEngine::Brave),
            _ => Err(format!("Unknown search engine: {}", s)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let model = ModelConfig {
            api_key: env::var("OPENAI_API_KEY").map_err(|_| AppError::Config {
                message: "OPENAI_API_KEY is required".to_string(),
            })?,
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            temperature: env::var("OPENAI_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.1),
            max_tokens: env::var("OPENAI_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4000),
        };

        // An unrecognized engine name falls back to the keyless provider.
        let engine = match env::var("SEARCH_ENGINE") {
            Ok(s) => s.parse().unwrap_or(SearchEngine::DuckDuckGo),
            Err(_) => SearchEngine::Tavily,
        };

        let search = SearchConfig {
            engine,
            tavily_api_key: env::var("TAVILY_API_KEY").ok().filter(|s| !s.is_empty()),
            brave_api_key: env::var("BRAVE_API_KEY").ok().filter(|s| !s.is_empty()),
        };

        if search.engine == SearchEngine::Tavily && search.tavily_api_key.is_none() {
            return Err(AppError::Config {
                message: "TAVILY_API_KEY is required when SEARCH_ENGINE=tavily".to_string(),
            });
        }
        if search.engine == SearchEngine::Brave && search.brave_api_key.is_none() {
            return Err(AppError::Config {
                message: "BRAVE_API_KEY is required when SEARCH_ENGINE=brave".to_string(),
            });
        }

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let agent = AgentConfig {
            max_execution_time_secs: env::var("MAX_EXECUTION_TIME")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            model,
            search,
            request,
            agent,
            logging,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_execution_time_secs: 300,
        }
    }
}
