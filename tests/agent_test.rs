//! End-to-end pipeline tests through the service layer
//!
//! Both backends are wiremock servers: the chat endpoint is routed by
//! prompt content so each stage can be scripted independently, and the
//! search endpoint speaks the DuckDuckGo instant-answer shape.

use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nexmind_agent::config::{
    AgentConfig, Config, LogFormat, LoggingConfig, ModelConfig, RequestConfig, SearchConfig,
    SearchEngine,
};
use nexmind_agent::conversation::ConversationStore;
use nexmind_agent::llm::LlmClient;
use nexmind_agent::pipeline::AnalysisAgent;
use nexmind_agent::search::SearchClient;
use nexmind_agent::server::{AppState, QueryRequest, QueryStatus};

/// Wire a complete service over mocked chat and search backends
fn create_test_state(llm_url: &str, search_url: &str) -> AppState {
    let config = Config {
        model: ModelConfig {
            api_key: "test-api-key".to_string(),
            base_url: llm_url.to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
        },
        search: SearchConfig {
            engine: SearchEngine::DuckDuckGo,
            tavily_api_key: None,
            brave_api_key: None,
        },
        request: RequestConfig {
            timeout_ms: 5000,
            max_retries: 0,
            retry_delay_ms: 10,
        },
        agent: AgentConfig {
            max_execution_time_secs: 60,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        },
    };

    let llm = LlmClient::new(&config.model, config.request.clone()).expect("llm client");
    let search = SearchClient::new(&config.search)
        .expect("search client")
        .with_endpoint(search_url.to_string());
    let agent = AnalysisAgent::with_clients(llm, search).expect("agent");
    AppState::with_agent(config, agent).expect("state")
}

fn chat_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "model": "gpt-4o-mini"
    })
}

fn request(query: &str) -> QueryRequest {
    QueryRequest {
        query: query.to_string(),
        conversation_id: "it-conv".to_string(),
        user_id: None,
    }
}

/// Mount a search mock that answers every query with three usable hits
async fn mount_search_results(search_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Heading": "腾讯控股",
            "Abstract": "腾讯是一家互联网公司，财务表现稳健",
            "AbstractURL": "https://example.com/tencent",
            "RelatedTopics": [
                {"Text": "腾讯2023年营收同比增长", "FirstURL": "https://example.com/revenue"},
                {"Text": "腾讯游戏行业市场份额领先", "FirstURL": "https://example.com/games"}
            ]
        })))
        .mount(search_server)
        .await;
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_pipeline_produces_rewritten_report() {
        let llm_server = MockServer::start().await;
        let search_server = MockServer::start().await;
        mount_search_results(&search_server).await;

        // Planning call
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("用户查询"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                r#"{"plan": ["收集基本信息", "分析财务数据", "形成结论"]}"#,
            )))
            .expect(1)
            .mount(&llm_server)
            .await;

        // Narrative rewrite call
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("请优化以下企业分析报告"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                "# 优化后的企业分析报告\n\n内容经过润色。",
            )))
            .expect(1)
            .mount(&llm_server)
            .await;

        // The six facet calls
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                r#"{"概述": "经营情况良好", "亮点": "市场份额领先"}"#,
            )))
            .expect(6)
            .mount(&llm_server)
            .await;

        let state = create_test_state(&llm_server.uri(), &search_server.uri());
        let response = state.process_query(request("腾讯控股财务分析")).await;

        assert_eq!(response.content, "# 优化后的企业分析报告\n\n内容经过润色。");
        assert_eq!(response.metadata.status, QueryStatus::Completed);
        assert_eq!(response.metadata.plan_steps, Some(3));
        assert_eq!(response.metadata.search_results_count, Some(3));
        assert_eq!(response.metadata.conversation_id, "it-conv");

        // Both sides of the exchange were recorded
        let (messages, total) = state.store.history("it-conv", 20).await;
        assert_eq!(total, 2);
        assert_eq!(messages[0].content, "腾讯控股财务分析");
        assert_eq!(messages[1].content, response.content);
    }

    #[tokio::test]
    async fn test_degraded_backends_still_produce_a_report() {
        let llm_server = MockServer::start().await;
        let search_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&llm_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&search_server)
            .await;

        let state = create_test_state(&llm_server.uri(), &search_server.uri());
        let response = state.process_query(request("腾讯控股财务分析")).await;

        // Every stage degraded in place: default plan, zero results,
        // canned facet sections, unrewritten draft.
        assert_eq!(response.metadata.status, QueryStatus::Completed);
        assert_eq!(response.metadata.plan_steps, Some(6));
        assert_eq!(response.metadata.search_results_count, Some(0));
        assert!(response.content.contains("企业分析报告"));
        assert!(response.content.contains("财务数据收集中"));
        assert!(response.content.contains("## 免责声明"));
    }

    #[tokio::test]
    async fn test_failed_facet_does_not_poison_siblings() {
        let llm_server = MockServer::start().await;
        let search_server = MockServer::start().await;
        mount_search_results(&search_server).await;

        // The financial facet fails; the rewrite fails so the draft stays
        // inspectable; everything else succeeds.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("的财务状况"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&llm_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("请优化以下企业分析报告"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&llm_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                r#"{"概述": "情况良好"}"#,
            )))
            .mount(&llm_server)
            .await;

        let state = create_test_state(&llm_server.uri(), &search_server.uri());
        let response = state.process_query(request("腾讯控股财务分析")).await;

        assert_eq!(response.metadata.status, QueryStatus::Completed);
        // The failed facet renders its canned fallback
        assert!(response.content.contains("财务数据收集中"));
        // Sibling facets render their structured records
        assert!(response.content.contains("**概述：** 情况良好"));
    }

    #[tokio::test]
    async fn test_conversation_accumulates_across_queries() {
        let llm_server = MockServer::start().await;
        let search_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&llm_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&search_server)
            .await;

        let state = create_test_state(&llm_server.uri(), &search_server.uri());
        state.process_query(request("分析腾讯控股的财务状况")).await;
        state.process_query(request("分析比亚迪股份的竞争优势")).await;

        let (messages, total) = state.store.history("it-conv", 20).await;
        assert_eq!(total, 4);
        assert_eq!(messages[0].content, "分析腾讯控股的财务状况");
        assert_eq!(messages[2].content, "分析比亚迪股份的竞争优势");
    }
}

#[cfg(test)]
mod streaming_tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_updates_arrive_in_stage_order() {
        let llm_server = MockServer::start().await;
        let search_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&llm_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&search_server)
            .await;

        let state = create_test_state(&llm_server.uri(), &search_server.uri());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let response = state
            .process_query_streaming(request("腾讯控股财务分析"), tx)
            .await;
        assert_eq!(response.metadata.status, QueryStatus::Completed);

        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }

        let stages: Vec<&str> = updates.iter().map(|u| u.stage.as_str()).collect();
        assert_eq!(stages, vec!["plan", "search", "analyze", "report"]);
        assert_eq!(updates[0].description, "已制定分析计划，共6个步骤");
        assert_eq!(updates[1].description, "已收集到0条相关信息");
        assert_eq!(updates[2].description, "企业数据分析完成");
        assert_eq!(updates[3].description, "企业分析报告生成完成");
        assert!(updates.iter().all(|u| u.status == "completed"));
    }
}
