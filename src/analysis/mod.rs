//! Six-facet company analysis synthesized from search results.
//!
//! The analyzer derives a topic label from the query, builds a keyword
//! filtered context per facet, and runs six independent chat requests
//! concurrently. Facets fail independently: one bad backend call turns
//! into a `Missing` facet while its siblings proceed untouched.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::extract::extract_record;
use crate::llm::{GenerationOptions, LlmClient, Message};
use crate::prompts;
use crate::search::SearchResult;

/// Sampling temperature for facet analysis calls.
const ANALYSIS_TEMPERATURE: f64 = 0.1;

/// Output cap for facet analysis calls.
const ANALYSIS_MAX_TOKENS: u32 = 2000;

/// Context block used when no search material is available.
const NO_CONTEXT: &str = "暂无相关信息";

/// At most this many search results enter one facet's context.
const CONTEXT_RESULT_LIMIT: usize = 10;

/// Per-result content preview length, in characters.
const CONTEXT_PREVIEW_CHARS: usize = 500;

/// The six analysis dimensions every record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetKind {
    BasicInfo,
    Financial,
    Industry,
    Competition,
    Risk,
    Investment,
}

impl FacetKind {
    /// All facets in report order.
    pub const ALL: [FacetKind; 6] = [
        FacetKind::BasicInfo,
        FacetKind::Financial,
        FacetKind::Industry,
        FacetKind::Competition,
        FacetKind::Risk,
        FacetKind::Investment,
    ];

    /// Stable identifier used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            FacetKind::BasicInfo => "basic_info",
            FacetKind::Financial => "financial_analysis",
            FacetKind::Industry => "industry_analysis",
            FacetKind::Competition => "competition_analysis",
            FacetKind::Risk => "risk_assessment",
            FacetKind::Investment => "investment_advice",
        }
    }

    /// Context keywords for this facet. `None` means the facet sees the
    /// unfiltered result set.
    fn keywords(&self) -> Option<&'static [&'static str]> {
        match self {
            FacetKind::BasicInfo => None,
            FacetKind::Financial => Some(&["财务", "营收", "利润", "资产", "负债"]),
            FacetKind::Industry => Some(&["行业", "市场", "排名", "份额", "地位"]),
            FacetKind::Competition => Some(&["竞争", "对手", "比较", "优势", "劣势"]),
            FacetKind::Risk => Some(&["风险", "挑战", "问题", "监管", "政策"]),
            FacetKind::Investment => Some(&["投资", "价值", "前景", "建议", "评级"]),
        }
    }

    fn persona(&self) -> &'static str {
        match self {
            FacetKind::BasicInfo => prompts::BASIC_INFO_PERSONA,
            FacetKind::Financial => prompts::FINANCIAL_PERSONA,
            FacetKind::Industry => prompts::INDUSTRY_PERSONA,
            FacetKind::Competition => prompts::COMPETITION_PERSONA,
            FacetKind::Risk => prompts::RISK_PERSONA,
            FacetKind::Investment => prompts::INVESTMENT_PERSONA,
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            FacetKind::BasicInfo => prompts::BASIC_INFO_INSTRUCTIONS,
            FacetKind::Financial => prompts::FINANCIAL_INSTRUCTIONS,
            FacetKind::Industry => prompts::INDUSTRY_INSTRUCTIONS,
            FacetKind::Competition => prompts::COMPETITION_INSTRUCTIONS,
            FacetKind::Risk => prompts::RISK_INSTRUCTIONS,
            FacetKind::Investment => prompts::INVESTMENT_INSTRUCTIONS,
        }
    }

    /// Opening line of the facet prompt.
    fn request_line(&self, company_name: &str) -> String {
        match self {
            FacetKind::BasicInfo => format!("基于以下信息，分析{}的基本情况：", company_name),
            FacetKind::Financial => format!("基于以下信息，分析{}的财务状况：", company_name),
            FacetKind::Industry => format!("基于以下信息，分析{}的行业地位：", company_name),
            FacetKind::Competition => format!("基于以下信息，分析{}的竞争态势：", company_name),
            FacetKind::Risk => format!("基于以下信息，评估{}面临的风险：", company_name),
            FacetKind::Investment => format!("基于以下信息，为{}提供投资建议：", company_name),
        }
    }

    /// Placeholder record substituted when a reply holds no structured data.
    fn placeholder(&self, company_name: &str) -> Map<String, Value> {
        let mut record = Map::new();
        if matches!(self, FacetKind::BasicInfo) {
            record.insert(
                "company_name".to_string(),
                Value::String(company_name.to_string()),
            );
        }
        record.insert("status".to_string(), Value::String("信息不足".to_string()));
        let note = match self {
            FacetKind::BasicInfo => "无法获取足够的基本信息",
            FacetKind::Financial => "无法获取足够的财务信息",
            FacetKind::Industry => "无法获取足够的行业信息",
            FacetKind::Competition => "无法获取足够的竞争信息",
            FacetKind::Risk => "无法获取足够的风险信息",
            FacetKind::Investment => "无法获取足够的投资信息",
        };
        record.insert("note".to_string(), Value::String(note.to_string()));
        record
    }
}

/// Outcome of one analysis facet.
///
/// A placeholder record still counts as `Present`; only a failed backend
/// call yields `Missing`.
#[derive(Debug, Clone)]
pub enum Facet {
    Present(Map<String, Value>),
    Missing { reason: String },
}

impl Facet {
    /// Whether this facet carries no usable record
    pub fn is_missing(&self) -> bool {
        matches!(self, Facet::Missing { .. })
    }

    /// The key/value record, when present
    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Facet::Present(map) => Some(map),
            Facet::Missing { .. } => None,
        }
    }
}

/// Complete analysis of one topic across all six facets
#[derive(Debug, Clone)]
pub struct AnalysisRecord {
    pub company_name: String,
    pub basic_info: Facet,
    pub financial_analysis: Facet,
    pub industry_analysis: Facet,
    pub competition_analysis: Facet,
    pub risk_assessment: Facet,
    pub investment_advice: Facet,
    /// Set when the analysis stage failed as a whole. Facet contents are
    /// not meaningful in that case.
    pub error: Option<String>,
    pub analysis_timestamp: DateTime<Utc>,
    pub data_sources: usize,
}

impl AnalysisRecord {
    /// Record representing a wholesale analysis failure
    pub fn failed(company_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let missing = Facet::Missing {
            reason: reason.clone(),
        };
        Self {
            company_name: company_name.into(),
            basic_info: missing.clone(),
            financial_analysis: missing.clone(),
            industry_analysis: missing.clone(),
            competition_analysis: missing.clone(),
            risk_assessment: missing.clone(),
            investment_advice: missing,
            error: Some(reason),
            analysis_timestamp: Utc::now(),
            data_sources: 0,
        }
    }

    /// Access a facet by kind
    pub fn facet(&self, kind: FacetKind) -> &Facet {
        match kind {
            FacetKind::BasicInfo => &self.basic_info,
            FacetKind::Financial => &self.financial_analysis,
            FacetKind::Industry => &self.industry_analysis,
            FacetKind::Competition => &self.competition_analysis,
            FacetKind::Risk => &self.risk_assessment,
            FacetKind::Investment => &self.investment_advice,
        }
    }
}

/// Best-effort topic extraction from free-text queries.
///
/// Patterns are tried in order: Chinese names ending in a corporate
/// suffix, English word runs with an optional corporate suffix, then a
/// short Chinese run directly before an analysis trigger word. When none
/// match, the first three whitespace-separated words stand in for the
/// topic. The heuristic carries no confidence score; oddly phrased
/// queries can produce odd labels, which downstream stages tolerate.
pub struct TopicExtractor {
    patterns: Vec<Regex>,
}

impl TopicExtractor {
    /// Compile the heuristic patterns
    pub fn new() -> AppResult<Self> {
        let patterns = vec![
            compile_pattern(
                r"([\x{4e00}-\x{9fff}]+(?:公司|集团|股份|有限|科技|实业|银行|保险|证券))",
            )?,
            compile_pattern(r"([A-Za-z]+(?:\s+[A-Za-z]+)*(?:\s+(?:Inc|Corp|Ltd|Co|Group|Holdings))?)")?,
            compile_pattern(r"([\x{4e00}-\x{9fff}]{2,10})(?:的|怎么样|如何|分析)")?,
        ];
        Ok(Self { patterns })
    }

    /// The first matching heuristic wins; otherwise the first three words
    /// of the query stand in.
    pub fn extract(&self, query: &str) -> String {
        for pattern in &self.patterns {
            if let Some(captures) = pattern.captures(query) {
                if let Some(matched) = captures.get(1) {
                    return matched.as_str().trim().to_string();
                }
            }
        }

        query
            .split_whitespace()
            .take(3)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub(crate) fn compile_pattern(pattern: &str) -> AppResult<Regex> {
    Regex::new(pattern).map_err(|e| AppError::Internal {
        message: format!("Invalid pattern {}: {}", pattern, e),
    })
}

/// Render search results into a numbered context block for one facet.
///
/// With keywords, results are first narrowed to those mentioning at least
/// one keyword in title or content; when nothing matches the unfiltered
/// set is used instead, so a facet never starves while material exists.
/// At most [`CONTEXT_RESULT_LIMIT`] entries are rendered, each with its
/// content previewed to [`CONTEXT_PREVIEW_CHARS`] characters.
fn build_context(search_results: &[SearchResult], keywords: Option<&[&str]>) -> String {
    if search_results.is_empty() {
        return NO_CONTEXT.to_string();
    }

    let filtered: Vec<&SearchResult> = match keywords {
        Some(keywords) => {
            let matching: Vec<&SearchResult> = search_results
                .iter()
                .filter(|result| {
                    keywords
                        .iter()
                        .any(|k| result.title.contains(k) || result.content.contains(k))
                })
                .collect();
            if matching.is_empty() {
                search_results.iter().collect()
            } else {
                matching
            }
        }
        None => search_results.iter().collect(),
    };

    let parts: Vec<String> = filtered
        .iter()
        .take(CONTEXT_RESULT_LIMIT)
        .enumerate()
        .map(|(i, result)| {
            let preview: String = result.content.chars().take(CONTEXT_PREVIEW_CHARS).collect();
            format!(
                "信息{}：\n标题：{}\n内容：{}...\n来源：{}\n",
                i + 1,
                result.title,
                preview,
                result.source
            )
        })
        .collect();

    parts.join("\n")
}

/// Runs the six facet analyses against the chat backend
pub struct Analyzer {
    llm: LlmClient,
    topics: TopicExtractor,
}

impl Analyzer {
    /// Create an analyzer over a shared backend client
    pub fn new(llm: LlmClient) -> AppResult<Self> {
        Ok(Self {
            llm,
            topics: TopicExtractor::new()?,
        })
    }

    /// Derive the topic label for a query
    pub fn topic(&self, query: &str) -> String {
        self.topics.extract(query)
    }

    /// Analyze a query's topic across all six facets concurrently
    pub async fn analyze(&self, query: &str, search_results: &[SearchResult]) -> AnalysisRecord {
        let company_name = self.topics.extract(query);
        info!(
            company = %company_name,
            results = search_results.len(),
            "Starting facet analysis"
        );

        let (
            basic_info,
            financial_analysis,
            industry_analysis,
            competition_analysis,
            risk_assessment,
            investment_advice,
        ) = tokio::join!(
            self.analyze_facet(FacetKind::BasicInfo, &company_name, search_results),
            self.analyze_facet(FacetKind::Financial, &company_name, search_results),
            self.analyze_facet(FacetKind::Industry, &company_name, search_results),
            self.analyze_facet(FacetKind::Competition, &company_name, search_results),
            self.analyze_facet(FacetKind::Risk, &company_name, search_results),
            self.analyze_facet(FacetKind::Investment, &company_name, search_results),
        );

        info!(company = %company_name, "Facet analysis complete");

        AnalysisRecord {
            company_name,
            basic_info,
            financial_analysis,
            industry_analysis,
            competition_analysis,
            risk_assessment,
            investment_advice,
            error: None,
            analysis_timestamp: Utc::now(),
            data_sources: search_results.len(),
        }
    }

    async fn analyze_facet(
        &self,
        kind: FacetKind,
        company_name: &str,
        search_results: &[SearchResult],
    ) -> Facet {
        let context = build_context(search_results, kind.keywords());
        let prompt = format!(
            "{}\n\n{}\n\n{}\n\n请以JSON格式返回结果。",
            kind.request_line(company_name),
            context,
            kind.instructions()
        );

        let messages = vec![Message::system(kind.persona()), Message::user(prompt)];
        let options = GenerationOptions::new()
            .with_temperature(ANALYSIS_TEMPERATURE)
            .with_max_tokens(ANALYSIS_MAX_TOKENS);

        match self.llm.chat(messages, options).await {
            Ok(reply) => match extract_record(&reply) {
                Some(record) => Facet::Present(record),
                None => {
                    warn!(
                        facet = kind.as_str(),
                        "Reply held no structured record, substituting placeholder"
                    );
                    Facet::Present(kind.placeholder(company_name))
                }
            },
            Err(e) => {
                error!(facet = kind.as_str(), error = %e, "Facet analysis failed");
                Facet::Missing {
                    reason: e.to_string(),
                }
            }
        }
    }
}
