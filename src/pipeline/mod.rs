//! Staged query pipeline.
//!
//! One query flows through four strictly linear stages: plan, search,
//! analyze, report. Every stage degrades to a documented default when its
//! work fails, so a run always terminates with usable report text and is
//! never allowed to surface a fault to the caller.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::analysis::{compile_pattern, AnalysisRecord, Analyzer};
use crate::config::Config;
use crate::error::AppResult;
use crate::extract::extract_record;
use crate::llm::{GenerationOptions, LlmClient, Message};
use crate::prompts;
use crate::report::ReportComposer;
use crate::search::{SearchClient, SearchResult, MAX_SEARCH_QUERIES};

/// Result cap per individual search query during the search stage.
const SEARCH_RESULTS_PER_QUERY: usize = 3;

/// Timeout applied to each search query independently.
const SEARCH_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Substitute plan used whenever derivation fails or yields nothing.
const DEFAULT_PLAN: [&str; 6] = [
    "收集公司基本信息和背景",
    "分析公司财务状况",
    "评估行业地位和市场份额",
    "分析主要竞争对手",
    "识别潜在风险和机遇",
    "生成投资建议和总结",
];

/// One state of the linear pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Plan,
    Search,
    Analyze,
    Report,
    Done,
}

impl Stage {
    /// Wire identifier for the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Search => "search",
            Stage::Analyze => "analyze",
            Stage::Report => "report",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One per-stage progress event, also forwarded to streaming callers.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub stage: Stage,
    pub description: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    fn completed(stage: Stage, description: String) -> Self {
        Self {
            stage,
            description,
            status: "completed".to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Everything a finished run hands back to the service layer.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: String,
    pub plan_steps: usize,
    pub search_results_count: usize,
    pub progress: Vec<ProgressUpdate>,
}

/// Detects a company name for search-query expansion.
///
/// Deliberately narrower than the analyzer's topic heuristic: only the
/// plain corporate-suffix shapes qualify a query for templated search
/// variants. The English pattern matches any letter run, so expansion is
/// additionally gated on the query talking about a company at all.
pub struct CompanyDetector {
    patterns: Vec<Regex>,
}

impl CompanyDetector {
    /// Compile the detection patterns
    pub fn new() -> AppResult<Self> {
        let patterns = vec![
            compile_pattern(r"([\x{4e00}-\x{9fff}]+(?:公司|集团|股份|有限|科技|实业))")?,
            compile_pattern(r"([A-Za-z]+(?:\s+[A-Za-z]+)*(?:\s+(?:Inc|Corp|Ltd|Co))?)")?,
        ];
        Ok(Self { patterns })
    }

    /// First matching pattern wins; `None` when nothing name-shaped appears.
    pub fn detect(&self, query: &str) -> Option<String> {
        for pattern in &self.patterns {
            if let Some(captures) = pattern.captures(query) {
                if let Some(matched) = captures.get(1) {
                    let name = matched.as_str().trim();
                    if !name.is_empty() {
                        return Some(name.to_string());
                    }
                }
            }
        }
        None
    }
}

/// Derive the search-stage queries for one run.
///
/// The original query always leads. When it mentions a company (公司 or
/// 企业) and a name is detected, the four topical variants follow; the
/// list is then cut to the fan-out cap, so the last variant is usually
/// dropped in favor of the original query.
fn derive_search_queries(detector: &CompanyDetector, query: &str) -> Vec<String> {
    let mut queries = vec![query.to_string()];

    if query.contains("公司") || query.contains("企业") {
        if let Some(name) = detector.detect(query) {
            queries.extend([
                format!("{} 财务报表", name),
                format!("{} 年报", name),
                format!("{} 行业地位", name),
                format!("{} 竞争对手", name),
            ]);
        }
    }

    queries.truncate(MAX_SEARCH_QUERIES);
    queries
}

fn default_plan() -> Vec<String> {
    DEFAULT_PLAN.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drives one query through the staged pipeline.
pub struct AnalysisAgent {
    llm: LlmClient,
    search: SearchClient,
    analyzer: Analyzer,
    composer: ReportComposer,
    detector: CompanyDetector,
}

impl AnalysisAgent {
    /// Build the agent and its stage components from configuration
    pub fn new(config: &Config) -> AppResult<Self> {
        let llm = LlmClient::new(&config.model, config.request.clone())?;
        let search = SearchClient::new(&config.search)?;
        Self::with_clients(llm, search)
    }

    /// Build the agent over externally constructed clients (for testing)
    pub fn with_clients(llm: LlmClient, search: SearchClient) -> AppResult<Self> {
        let analyzer = Analyzer::new(llm.clone())?;
        let composer = ReportComposer::new(llm.clone());
        let detector = CompanyDetector::new()?;

        Ok(Self {
            llm,
            search,
            analyzer,
            composer,
            detector,
        })
    }

    /// Run the full pipeline for one query.
    ///
    /// The returned outcome always carries report text; stage failures
    /// degrade in place and never escape. Progress updates are recorded in
    /// stage order and, when a sender is supplied, forwarded live as each
    /// stage completes.
    pub async fn run(
        &self,
        query: &str,
        progress: Option<&mpsc::UnboundedSender<ProgressUpdate>>,
    ) -> PipelineOutcome {
        info!(query = %query, "Starting analysis pipeline");
        let mut updates = Vec::new();

        let plan = self.plan_stage(query).await;
        push_progress(
            &mut updates,
            progress,
            Stage::Plan,
            format!("已制定分析计划，共{}个步骤", plan.len()),
        );

        let queries = derive_search_queries(&self.detector, query);
        let results = self
            .search
            .search_many(&queries, SEARCH_RESULTS_PER_QUERY, SEARCH_QUERY_TIMEOUT)
            .await;
        push_progress(
            &mut updates,
            progress,
            Stage::Search,
            format!("已收集到{}条相关信息", results.len()),
        );

        let record = self.analyze_stage(query, &results).await;
        push_progress(
            &mut updates,
            progress,
            Stage::Analyze,
            "企业数据分析完成".to_string(),
        );

        let report = self.report_stage(query, &record, &results).await;
        push_progress(
            &mut updates,
            progress,
            Stage::Report,
            "企业分析报告生成完成".to_string(),
        );

        info!(
            query = %query,
            plan_steps = plan.len(),
            results = results.len(),
            "Pipeline complete"
        );

        PipelineOutcome {
            report,
            plan_steps: plan.len(),
            search_results_count: results.len(),
            progress: updates,
        }
    }

    /// Derive the step list, substituting the default plan on any failure.
    async fn plan_stage(&self, query: &str) -> Vec<String> {
        let messages = vec![
            Message::system(prompts::PLANNING_PROMPT),
            Message::user(format!("用户查询：{}", query)),
        ];

        let reply = match self.llm.chat(messages, GenerationOptions::new()).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Plan derivation failed, using default plan");
                return default_plan();
            }
        };

        let steps: Vec<String> = extract_record(&reply)
            .and_then(|record| match record.get("plan") {
                Some(Value::Array(items)) => Some(
                    items
                        .iter()
                        .filter_map(|item| item.as_str())
                        .map(str::to_string)
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        if steps.is_empty() {
            warn!("Plan reply carried no usable steps, using default plan");
            return default_plan();
        }

        info!(steps = steps.len(), "Analysis plan derived");
        steps
    }

    /// Facet synthesis; a panic degrades to an error-flavored record.
    async fn analyze_stage(&self, query: &str, results: &[SearchResult]) -> AnalysisRecord {
        let company_name = self.analyzer.topic(query);
        match AssertUnwindSafe(self.analyzer.analyze(query, results))
            .catch_unwind()
            .await
        {
            Ok(record) => record,
            Err(panic) => {
                let reason = panic_message(panic);
                error!(reason = %reason, "Analysis stage panicked");
                AnalysisRecord::failed(company_name, reason)
            }
        }
    }

    /// Report composition; a panic degrades to a literal failure string.
    async fn report_stage(
        &self,
        query: &str,
        record: &AnalysisRecord,
        results: &[SearchResult],
    ) -> String {
        match AssertUnwindSafe(self.composer.compose(query, record, results))
            .catch_unwind()
            .await
        {
            Ok(report) => report,
            Err(panic) => {
                let reason = panic_message(panic);
                error!(reason = %reason, "Report stage panicked");
                format!("报告生成失败: {}", reason)
            }
        }
    }
}

fn push_progress(
    updates: &mut Vec<ProgressUpdate>,
    sender: Option<&mpsc::UnboundedSender<ProgressUpdate>>,
    stage: Stage,
    description: String,
) {
    let update = ProgressUpdate::completed(stage, description);
    if let Some(sender) = sender {
        // A closed receiver only means the caller stopped listening
        let _ = sender.send(update.clone());
    }
    updates.push(update);
}
