//! Report composition from analysis facets.
//!
//! The composer renders each facet as a labeled section, falling back to
//! canned guidance paragraphs for facets with no usable record, then
//! optionally passes the assembled draft through one narrative rewrite.
//! The rewrite is an enhancement only: when it fails the draft is
//! returned unchanged.

use chrono::Local;
use serde_json::Value;
use tracing::{info, warn};

use crate::analysis::{AnalysisRecord, Facet, FacetKind};
use crate::error::LlmResult;
use crate::llm::{GenerationOptions, LlmClient, Message};
use crate::prompts;
use crate::search::SearchResult;

/// Sampling temperature for the narrative rewrite pass.
const REWRITE_TEMPERATURE: f64 = 0.2;

/// Output cap for the narrative rewrite pass.
const REWRITE_MAX_TOKENS: u32 = 4000;

const OVERVIEW_FALLBACK: &str = r#"## 1. 公司概况

**数据状态：** 信息收集中，建议查阅公司官方网站和最新年报获取详细信息。

---
"#;

const FINANCIAL_FALLBACK: &str = r#"## 2. 财务分析

**数据状态：** 财务数据收集中，建议查阅公司最新财报获取准确的财务信息。

**分析建议：**
- 关注公司最新季报和年报
- 重点分析营收增长趋势
- 评估盈利能力和现金流状况
- 比较同行业财务指标

---
"#;

const INDUSTRY_FALLBACK: &str = r#"## 3. 行业分析

**数据状态：** 行业信息收集中，建议关注行业研究报告和市场分析。

**分析要点：**
- 了解所属行业发展趋势
- 评估市场竞争格局
- 分析行业政策影响
- 关注技术发展动向

---
"#;

const COMPETITION_FALLBACK: &str = r#"## 4. 竞争分析

**数据状态：** 竞争信息收集中，建议关注同行业公司动态和市场报告。

**分析框架：**
- 识别主要竞争对手
- 比较竞争优劣势
- 分析差异化策略
- 评估竞争威胁

---
"#;

const RISK_FALLBACK: &str = r#"## 5. 风险评估

**风险提示：** 投资有风险，以下为一般性风险提示：

- **市场风险：** 股价波动、市场环境变化
- **经营风险：** 业务模式、管理能力、行业周期
- **财务风险：** 资金流动性、债务水平、盈利能力
- **政策风险：** 监管政策变化、行业政策调整
- **其他风险：** 技术变革、竞争加剧、不可抗力

**建议：** 投资前请详细了解相关风险，并根据自身风险承受能力做出投资决策。

---
"#;

const INVESTMENT_FALLBACK: &str = r#"## 6. 投资建议

**重要声明：** 以下建议仅供参考，不构成投资建议。投资决策应基于您自己的研究和风险评估。

**一般性建议：**
- 深入研究公司基本面
- 关注行业发展趋势
- 评估估值水平合理性
- 考虑投资时间周期
- 分散投资降低风险

**建议投资者：**
- 查阅公司最新财报和公告
- 关注行业研究报告
- 咨询专业投资顾问
- 根据自身情况制定投资策略

---
"#;

/// Assembles and optionally rewrites analysis reports
pub struct ReportComposer {
    llm: LlmClient,
}

impl ReportComposer {
    /// Create a composer over a shared backend client
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Produce the final report text for a completed analysis.
    ///
    /// A record carrying a top-level error short-circuits to a fixed
    /// error report; no facet is rendered on that path.
    pub async fn compose(
        &self,
        query: &str,
        record: &AnalysisRecord,
        search_results: &[SearchResult],
    ) -> String {
        info!(
            company = %record.company_name,
            results = search_results.len(),
            "Composing analysis report"
        );

        if let Some(error) = &record.error {
            return error_report(query, error);
        }

        let draft = assemble_draft(record);

        match self.rewrite(&record.company_name, &draft, query).await {
            Ok(report) => {
                info!(company = %record.company_name, "Report rewrite complete");
                report
            }
            Err(e) => {
                warn!(error = %e, "Report rewrite failed, returning assembled draft");
                draft
            }
        }
    }

    async fn rewrite(&self, company_name: &str, draft: &str, query: &str) -> LlmResult<String> {
        let prompt = format!(
            "请优化以下企业分析报告，使其更加专业、连贯和易读。保持所有重要信息，但改善表达方式和结构。\n\n\
             原始查询：{}\n公司名称：{}\n\n原始报告：\n{}\n\n{}",
            query, company_name, draft, prompts::REPORT_SYNTHESIS_REQUIREMENTS
        );

        let messages = vec![
            Message::system(prompts::REPORT_SYNTHESIS_PERSONA),
            Message::user(prompt),
        ];
        let options = GenerationOptions::new()
            .with_temperature(REWRITE_TEMPERATURE)
            .with_max_tokens(REWRITE_MAX_TOKENS);

        self.llm.chat(messages, options).await
    }
}

/// Join the fixed section sequence into the pre-rewrite draft.
fn assemble_draft(record: &AnalysisRecord) -> String {
    let sections = vec![
        executive_summary(&record.company_name),
        facet_section(FacetKind::BasicInfo, &record.basic_info),
        facet_section(FacetKind::Financial, &record.financial_analysis),
        facet_section(FacetKind::Industry, &record.industry_analysis),
        facet_section(FacetKind::Competition, &record.competition_analysis),
        facet_section(FacetKind::Risk, &record.risk_assessment),
        facet_section(FacetKind::Investment, &record.investment_advice),
        disclaimer(),
    ];
    sections.join("\n")
}

fn executive_summary(company_name: &str) -> String {
    let date = Local::now().format("%Y年%m月%d日");
    format!(
        "# {company} 企业分析报告\n\n\
         **报告日期：** {date}\n\
         **分析对象：** {company}\n\
         **报告类型：** 综合企业分析\n\n\
         ## 执行摘要\n\n\
         本报告基于公开信息和AI智能分析，对{company}进行了全面的企业分析。\
         分析涵盖了公司基本情况、财务状况、行业地位、竞争环境、风险评估和投资建议等多个维度。\n\n\
         **关键发现：**\n\
         - 公司基本信息分析完成\n\
         - 财务状况评估完成\n\
         - 行业地位分析完成\n\
         - 竞争环境评估完成\n\
         - 风险因素识别完成\n\
         - 投资建议制定完成\n\n\
         ---\n",
        company = company_name,
        date = date
    )
}

/// Render one facet as a titled section.
///
/// Missing facets, empty records, and records carrying an `error` key all
/// collapse to the facet's canned fallback paragraph. Otherwise the
/// record's key/value pairs become labeled lines; bookkeeping keys
/// (`error`, `status`, `note`) and empty values are skipped, so a pure
/// placeholder record renders as an empty-bodied section.
fn facet_section(kind: FacetKind, facet: &Facet) -> String {
    let record = match facet.as_map() {
        Some(map) if !map.is_empty() && !map.contains_key("error") => map,
        _ => return fallback_section(kind).to_string(),
    };

    let mut section = String::from(section_header(kind));
    if matches!(kind, FacetKind::Investment) {
        section.push_str("**重要声明：** 以下分析仅供参考，不构成投资建议。\n\n");
    }

    for (key, value) in record {
        if matches!(key.as_str(), "error" | "status" | "note") || value_is_empty(value) {
            continue;
        }
        section.push_str(&format!("**{}：** {}\n\n", key, render_value(value)));
    }

    section.push_str("---\n");
    section
}

fn section_header(kind: FacetKind) -> &'static str {
    match kind {
        FacetKind::BasicInfo => "## 1. 公司概况\n\n",
        FacetKind::Financial => "## 2. 财务分析\n\n",
        FacetKind::Industry => "## 3. 行业分析\n\n",
        FacetKind::Competition => "## 4. 竞争分析\n\n",
        FacetKind::Risk => "## 5. 风险评估\n\n",
        FacetKind::Investment => "## 6. 投资建议\n\n",
    }
}

fn fallback_section(kind: FacetKind) -> &'static str {
    match kind {
        FacetKind::BasicInfo => OVERVIEW_FALLBACK,
        FacetKind::Financial => FINANCIAL_FALLBACK,
        FacetKind::Industry => INDUSTRY_FALLBACK,
        FacetKind::Competition => COMPETITION_FALLBACK,
        FacetKind::Risk => RISK_FALLBACK,
        FacetKind::Investment => INVESTMENT_FALLBACK,
    }
}

fn disclaimer() -> String {
    let timestamp = Local::now().format("%Y年%m月%d日 %H:%M:%S");
    format!(
        "## 免责声明\n\n\
         1. **信息来源：** 本报告基于公开信息和AI智能分析生成，信息的准确性和完整性可能受到限制。\n\n\
         2. **投资风险：** 投资有风险，过往业绩不代表未来表现。投资者应根据自身情况谨慎决策。\n\n\
         3. **专业建议：** 本报告不构成投资建议，如需投资决策，请咨询专业的投资顾问。\n\n\
         4. **信息更新：** 市场信息瞬息万变，建议关注公司最新公告和市场动态。\n\n\
         5. **法律责任：** 使用本报告所产生的任何损失，本系统不承担法律责任。\n\n\
         ---\n\n\
         **报告生成时间：** {}\n\
         **技术支持：** NexMind AI 企业分析平台\n",
        timestamp
    )
}

/// Fixed template for a wholesale analysis failure.
fn error_report(query: &str, error_message: &str) -> String {
    let timestamp = Local::now().format("%Y年%m月%d日 %H:%M:%S");
    format!(
        "# 企业分析报告\n\n\
         **查询内容：** {}\n\
         **报告时间：** {}\n\
         **状态：** 分析遇到问题\n\n\
         ## 分析状态\n\n\
         抱歉，在分析过程中遇到了一些问题：{}\n\n\
         ## 建议\n\n\
         1. **检查查询内容：** 请确保公司名称正确且为中国境内公司\n\
         2. **稍后重试：** 系统可能暂时繁忙，请稍后再试\n\
         3. **手动查询：** 建议您直接查阅以下官方渠道：\n\
            - 公司官方网站\n\
            - 证券交易所公告\n\
            - 财经新闻网站\n\
            - 行业研究报告\n\n\
         ## 联系支持\n\n\
         如果问题持续存在，请联系技术支持团队。\n\n\
         ---\n\n\
         **技术支持：** NexMind AI 企业分析平台\n",
        query, timestamp, error_message
    )
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
