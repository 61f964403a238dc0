//! Centralized prompt definitions for the analysis pipeline
//!
//! This module contains every string sent to the chat backend as a system
//! persona or instruction block. Centralizing prompts makes them easier to
//! maintain, test, and version. User-facing service messages and report
//! templates live next to their renderers instead.

/// System prompt for the planning stage.
///
/// Asks for a JSON-shaped plan; the pipeline falls back to a default plan
/// when the reply does not parse.
pub const PLANNING_PROMPT: &str = r#"
你是一个专业的企业分析师。根据用户的查询，制定一个详细的分析计划。

分析计划应该包括以下步骤：
1. 公司基本信息收集
2. 财务数据分析
3. 行业地位评估
4. 竞争对手分析
5. 风险评估
6. 投资建议

请根据具体查询调整计划，并以JSON格式返回计划列表。
"#;

/// Persona for the basic-information facet.
pub const BASIC_INFO_PERSONA: &str =
    "你是一个专业的企业分析师，擅长从各种信息中提取和分析企业基本信息。";

/// Persona for the financial facet.
pub const FINANCIAL_PERSONA: &str = "你是一个专业的财务分析师，擅长分析企业财务数据和财务健康状况。";

/// Persona for the industry facet.
pub const INDUSTRY_PERSONA: &str = "你是一个专业的行业分析师，擅长分析企业在行业中的地位和竞争优势。";

/// Persona for the competition facet.
pub const COMPETITION_PERSONA: &str = "你是一个专业的竞争分析师，擅长分析企业竞争环境和竞争策略。";

/// Persona for the risk facet.
pub const RISK_PERSONA: &str = "你是一个专业的风险分析师，擅长识别和评估企业面临的各种风险。";

/// Persona for the investment facet.
pub const INVESTMENT_PERSONA: &str =
    "你是一个专业的投资分析师，擅长评估企业投资价值并提供投资建议。请注意，所有建议仅供参考，投资有风险。";

/// Numbered request list for the basic-information facet.
pub const BASIC_INFO_INSTRUCTIONS: &str = r#"请提供以下信息（如果信息不足，请标注"信息不足"）：
1. 公司全称和简介
2. 成立时间和注册地
3. 主营业务和产品
4. 公司规模（员工数量、注册资本等）
5. 上市情况（股票代码、上市交易所）"#;

/// Numbered request list for the financial facet.
pub const FINANCIAL_INSTRUCTIONS: &str = r#"请分析以下财务指标（如果信息不足，请标注"信息不足"）：
1. 营业收入趋势
2. 净利润情况
3. 资产负债状况
4. 现金流情况
5. 主要财务比率（ROE、ROA、负债率等）
6. 财务健康度评估"#;

/// Numbered request list for the industry facet.
pub const INDUSTRY_INSTRUCTIONS: &str = r#"请分析以下方面（如果信息不足，请标注"信息不足"）：
1. 所属行业和细分领域
2. 市场份额和排名
3. 行业地位和竞争优势
4. 行业发展趋势
5. 公司在行业中的创新能力"#;

/// Numbered request list for the competition facet.
pub const COMPETITION_INSTRUCTIONS: &str = r#"请分析以下方面（如果信息不足，请标注"信息不足"）：
1. 主要竞争对手
2. 竞争优势和劣势
3. 差异化策略
4. 市场竞争格局
5. 竞争威胁评估"#;

/// Numbered request list for the risk facet.
pub const RISK_INSTRUCTIONS: &str = r#"请评估以下风险类型（如果信息不足，请标注"信息不足"）：
1. 财务风险
2. 经营风险
3. 市场风险
4. 政策监管风险
5. 技术风险
6. 整体风险等级评估"#;

/// Numbered request list for the investment facet.
pub const INVESTMENT_INSTRUCTIONS: &str = r#"请提供以下投资分析（如果信息不足，请标注"信息不足"）：
1. 投资价值评估
2. 投资建议（买入/持有/卖出）
3. 目标价格区间（如适用）
4. 投资亮点
5. 投资风险提示
6. 适合的投资者类型"#;

/// Persona for the narrative rewrite pass.
pub const REPORT_SYNTHESIS_PERSONA: &str =
    "你是一个专业的企业分析报告撰写专家，擅长将分析数据整合成专业、易读的报告。";

/// Requirement list appended to the rewrite prompt. The rewrite must keep
/// every fact and all disclaimer content.
pub const REPORT_SYNTHESIS_REQUIREMENTS: &str = r#"请生成一份专业的企业分析报告，要求：
1. 保持所有重要信息和数据
2. 改善语言表达和逻辑结构
3. 确保专业性和可读性
4. 保留所有免责声明
5. 使用Markdown格式"#;
