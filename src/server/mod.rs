//! Service layer around the analysis pipeline.
//!
//! This module provides:
//! - Shared application state (configuration, conversation store, agent)
//! - Conversation-aware query processing with the off-topic pre-filter
//!   and the overall execution budget
//! - History, suggestions, system-info, and report-export operations
//! - The stdio JSON-RPC surface (`stdio` submodule)

pub mod stdio;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use futures::FutureExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::analysis::compile_pattern;
use crate::config::Config;
use crate::conversation::{
    ConversationMessage, ConversationRole, ConversationStore, MemoryStore, MAX_HISTORY,
};
use crate::error::{AppResult, ProtocolError, ProtocolResult};
use crate::pipeline::{panic_message, AnalysisAgent, ProgressUpdate};

/// Reply sent when a query is off topic for company analysis.
pub const OFF_TOPIC_GUIDANCE: &str = "您好！我是NexMind企业分析助手，专注于提供公司和行业分析服务。请输入您想了解的企业名称或分析需求，例如：腾讯控股财务分析、比亚迪股份投资价值、贵州茅台行业地位。";

/// Reply sent when the wall-clock budget expires.
pub const TIMEOUT_MESSAGE: &str = "抱歉，查询处理时间过长，请稍后重试或简化您的查询。";

/// Minimum character count for an AI message to count as an exportable report.
const EXPORT_MIN_CHARS: usize = 500;

/// Messages returned by a history lookup when no limit is given.
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Suggestion list cap.
const MAX_SUGGESTIONS: usize = 8;

const RELEVANCE_KEYWORDS: [&str; 19] = [
    "公司", "企业", "集团", "股份", "分析", "财务", "投资", "股票", "行业", "风险", "竞争",
    "年报", "市值", "估值", "业绩", "company", "stock", "finance", "invest",
];

const BASE_SUGGESTIONS: [&str; 8] = [
    "腾讯控股有限公司分析",
    "阿里巴巴集团财务状况",
    "比亚迪股份投资价值",
    "中国平安保险分析",
    "贵州茅台行业地位",
    "美团点评竞争优势",
    "小米集团风险评估",
    "京东集团发展前景",
];

const SUGGESTION_CATEGORIES: [&str; 6] =
    ["基本信息", "财务分析", "行业地位", "竞争分析", "风险评估", "投资建议"];

const FEATURES: [&str; 6] = [
    "企业基本信息分析",
    "财务数据分析",
    "行业地位评估",
    "竞争环境分析",
    "风险评估",
    "投资建议生成",
];

const SUPPORTED_QUERIES: [&str; 5] = [
    "公司基本信息查询",
    "财务状况分析",
    "行业地位评估",
    "投资价值分析",
    "风险评估报告",
];

/// One incoming query.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_conversation_id() -> String {
    "default".to_string()
}

/// Terminal status of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Completed,
    Rejected,
    Timeout,
    Error,
}

/// Bookkeeping attached to every query response.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMetadata {
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: QueryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_results_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryMetadata {
    fn new(conversation_id: String, user_id: Option<String>, status: QueryStatus) -> Self {
        Self {
            conversation_id,
            user_id,
            timestamp: Utc::now(),
            status,
            plan_steps: None,
            search_results_count: None,
            error: None,
        }
    }
}

/// The service-level reply for one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub content: String,
    pub metadata: QueryMetadata,
}

/// Conversation history served to callers.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub messages: Vec<ConversationMessage>,
    pub total_messages: usize,
    pub timestamp: DateTime<Utc>,
}

/// Acknowledgement for a cleared conversation.
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Query suggestions served to callers.
#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
    pub categories: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Static service description.
#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub app_name: String,
    pub version: String,
    pub search_engine: String,
    pub ai_model: String,
    pub features: Vec<String>,
    pub supported_queries: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// An exported report with its suggested filename.
#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub content: String,
    pub format: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
}

/// Off-topic pre-filter.
///
/// A query is in scope when it mentions any relevance keyword or looks
/// like a company name: a Chinese run ending in a corporate suffix, or
/// English words ending in a mandatory Inc/Corp/Ltd/Co/Group/Holdings
/// token. Ambiguous queries are rejected rather than guessed at.
pub struct RelevanceFilter {
    chinese_name: Regex,
    english_name: Regex,
}

impl RelevanceFilter {
    /// Compile the name-shape patterns
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            chinese_name: compile_pattern(
                r"[\x{4e00}-\x{9fff}]+(?:公司|集团|股份|有限|科技|实业|银行|保险|证券)",
            )?,
            english_name: compile_pattern(
                r"[A-Za-z]+(?:\s+[A-Za-z]+)*\s+(?:Inc|Corp|Ltd|Co|Group|Holdings)\b",
            )?,
        })
    }

    /// Whether a query should reach the pipeline
    pub fn is_relevant(&self, query: &str) -> bool {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return false;
        }

        let lowered = trimmed.to_lowercase();
        if RELEVANCE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            return true;
        }

        self.chinese_name.is_match(trimmed) || self.english_name.is_match(trimmed)
    }
}

/// Application state shared across protocol handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// In-memory conversation store, owned by the service process.
    pub store: MemoryStore,
    /// The staged analysis pipeline.
    pub agent: AnalysisAgent,
    /// Off-topic query pre-filter.
    pub filter: RelevanceFilter,
}

impl AppState {
    /// Create state with components built from configuration
    pub fn new(config: Config) -> AppResult<Self> {
        let agent = AnalysisAgent::new(&config)?;
        Self::with_agent(config, agent)
    }

    /// Create state over an externally constructed agent (for testing)
    pub fn with_agent(config: Config, agent: AnalysisAgent) -> AppResult<Self> {
        Ok(Self {
            config,
            store: MemoryStore::new(),
            agent,
            filter: RelevanceFilter::new()?,
        })
    }

    /// Process one query end to end.
    ///
    /// The user message is logged first; off-topic queries are answered
    /// with fixed guidance without ever reaching the pipeline. The
    /// pipeline run is bounded by the configured execution budget, and
    /// every path appends exactly one AI reply to the conversation.
    pub async fn process_query(&self, request: QueryRequest) -> QueryResponse {
        self.process_query_inner(request, None).await
    }

    /// Process one query, forwarding per-stage progress to `progress`.
    pub async fn process_query_streaming(
        &self,
        request: QueryRequest,
        progress: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> QueryResponse {
        self.process_query_inner(request, Some(progress)).await
    }

    async fn process_query_inner(
        &self,
        request: QueryRequest,
        progress: Option<mpsc::UnboundedSender<ProgressUpdate>>,
    ) -> QueryResponse {
        let QueryRequest {
            query,
            conversation_id,
            user_id,
        } = request;

        info!(query = %query, conversation = %conversation_id, "Processing query");
        self.store
            .append(&conversation_id, ConversationMessage::user(query.as_str()))
            .await;

        if !self.filter.is_relevant(&query) {
            info!(query = %query, "Query rejected as off topic");
            self.store
                .append(&conversation_id, ConversationMessage::ai(OFF_TOPIC_GUIDANCE))
                .await;
            return QueryResponse {
                content: OFF_TOPIC_GUIDANCE.to_string(),
                metadata: QueryMetadata::new(conversation_id, user_id, QueryStatus::Rejected),
            };
        }

        let budget = Duration::from_secs(self.config.agent.max_execution_time_secs);
        let run = AssertUnwindSafe(self.agent.run(&query, progress.as_ref())).catch_unwind();

        let (content, metadata) = match tokio::time::timeout(budget, run).await {
            Ok(Ok(outcome)) => {
                let mut metadata = QueryMetadata::new(
                    conversation_id.clone(),
                    user_id,
                    QueryStatus::Completed,
                );
                metadata.plan_steps = Some(outcome.plan_steps);
                metadata.search_results_count = Some(outcome.search_results_count);
                (outcome.report, metadata)
            }
            Ok(Err(panic)) => {
                let reason = panic_message(panic);
                error!(reason = %reason, "Query processing panicked");
                let mut metadata =
                    QueryMetadata::new(conversation_id.clone(), user_id, QueryStatus::Error);
                metadata.error = Some(reason.clone());
                (
                    format!(
                        "抱歉，处理您的查询时发生了错误：{}。请稍后重试或联系技术支持。",
                        reason
                    ),
                    metadata,
                )
            }
            Err(_) => {
                // The dropped pipeline future abandons its in-flight calls
                warn!(
                    query = %query,
                    budget_secs = self.config.agent.max_execution_time_secs,
                    "Query exceeded the execution budget"
                );
                (
                    TIMEOUT_MESSAGE.to_string(),
                    QueryMetadata::new(conversation_id.clone(), user_id, QueryStatus::Timeout),
                )
            }
        };

        self.store
            .append(&conversation_id, ConversationMessage::ai(content.as_str()))
            .await;

        QueryResponse { content, metadata }
    }

    /// The most recent messages of a conversation plus its total count
    pub async fn history(&self, conversation_id: &str, limit: Option<usize>) -> HistoryResponse {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let (messages, total_messages) = self.store.history(conversation_id, limit).await;
        HistoryResponse {
            conversation_id: conversation_id.to_string(),
            messages,
            total_messages,
            timestamp: Utc::now(),
        }
    }

    /// Drop a conversation; clearing an unknown one succeeds the same way
    pub async fn clear_conversation(&self, conversation_id: &str) -> ClearResponse {
        self.store.clear(conversation_id).await;
        info!(conversation = %conversation_id, "Conversation cleared");
        ClearResponse {
            message: format!("对话 {} 已清除", conversation_id),
            timestamp: Utc::now(),
        }
    }

    /// Query suggestions, optionally specialized to a partial query
    pub fn suggestions(&self, query: Option<&str>) -> SuggestionsResponse {
        let mut suggestions: Vec<String> = Vec::new();

        if let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) {
            suggestions.extend([
                format!("{}基本信息", query),
                format!("{}财务分析", query),
                format!("{}投资价值", query),
                format!("{}行业地位", query),
                format!("{}风险评估", query),
            ]);
        }
        suggestions.extend(BASE_SUGGESTIONS.iter().map(|s| s.to_string()));
        suggestions.truncate(MAX_SUGGESTIONS);

        SuggestionsResponse {
            suggestions,
            categories: SUGGESTION_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            timestamp: Utc::now(),
        }
    }

    /// Static description of the running service
    pub fn system_info(&self) -> SystemInfo {
        SystemInfo {
            app_name: "NexMind".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            search_engine: self.config.search.engine.as_str().to_string(),
            ai_model: self.config.model.model.clone(),
            features: FEATURES.iter().map(|s| s.to_string()).collect(),
            supported_queries: SUPPORTED_QUERIES.iter().map(|s| s.to_string()).collect(),
            timestamp: Utc::now(),
        }
    }

    /// Export the most recent full report from a conversation.
    ///
    /// A report is the newest AI message longer than [`EXPORT_MIN_CHARS`]
    /// characters; shorter replies are progress chatter, not reports.
    pub async fn export_report(
        &self,
        conversation_id: &str,
        format: &str,
        include_metadata: bool,
    ) -> ProtocolResult<ExportResponse> {
        let (messages, _) = self.store.history(conversation_id, MAX_HISTORY).await;
        if messages.is_empty() {
            return Err(ProtocolError::InvalidRequest {
                message: "未找到对话记录".to_string(),
            });
        }

        let report = messages
            .iter()
            .rev()
            .find(|m| m.role == ConversationRole::Ai && m.content.chars().count() > EXPORT_MIN_CHARS)
            .ok_or_else(|| ProtocolError::InvalidRequest {
                message: "未找到可导出的报告".to_string(),
            })?;

        let mut content = report.content.clone();
        if include_metadata {
            content = format!(
                "\n---\n**导出信息**\n- 对话ID: {}\n- 导出时间: {}\n- 格式: {}\n- 来源: NexMind AI 企业分析平台\n---\n\n{}",
                conversation_id,
                Local::now().format("%Y年%m月%d日 %H:%M:%S"),
                format,
                content
            );
        }

        Ok(ExportResponse {
            content,
            format: format.to_string(),
            filename: format!(
                "nexmind_report_{}_{}.md",
                conversation_id,
                Local::now().format("%Y%m%d_%H%M%S")
            ),
            timestamp: Utc::now(),
        })
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
