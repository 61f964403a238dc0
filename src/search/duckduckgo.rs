use reqwest::Client;
use serde_json::Value;

use super::SearchResult;
use crate::error::{ProviderResult, SearchError};

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// DuckDuckGo instant-answer provider. Keyless, so it doubles as the
/// fallback when no other provider is configured.
pub(super) struct DuckDuckGoProvider {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoProvider {
    pub(super) fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub(super) fn set_endpoint(&mut self, endpoint: String) {
        self.endpoint = endpoint;
    }

    /// Query the instant-answer API.
    ///
    /// Instant answers are sparse for most company queries, so a generated
    /// hint entry pads the list whenever the API yields fewer hits than
    /// requested.
    pub(super) async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> ProviderResult<Vec<SearchResult>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Api {
                provider: "duckduckgo".to_string(),
                status: status.as_u16(),
            });
        }

        // The instant-answer payload mixes shapes (topic groups nest
        // further lists), so it is walked as loose JSON rather than
        // deserialized into structs.
        let data: Value = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse {
                provider: "duckduckgo".to_string(),
                message: format!("Failed to parse response: {}", e),
            })?;

        let mut results = Vec::new();

        if let Some(abstract_text) = data
            .get("Abstract")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            results.push(SearchResult {
                title: text_field(&data, "Heading"),
                content: abstract_text.to_string(),
                url: text_field(&data, "AbstractURL"),
                source: "DuckDuckGo Abstract".to_string(),
            });
        }

        if let Some(topics) = data.get("RelatedTopics").and_then(Value::as_array) {
            let remaining = max_results.saturating_sub(results.len());
            // Topic-group entries without a Text field still consume slots.
            for topic in topics.iter().take(remaining) {
                if let Some(text) = topic.get("Text").and_then(Value::as_str) {
                    results.push(SearchResult {
                        title: text.chars().take(100).collect(),
                        content: text.to_string(),
                        url: text_field(topic, "FirstURL"),
                        source: "DuckDuckGo Related".to_string(),
                    });
                }
            }
        }

        if results.len() < max_results {
            results.push(SearchResult {
                title: format!("关于 \"{}\" 的搜索结果", query),
                content: format!(
                    "正在为您搜索关于 \"{}\" 的相关信息。建议您查看官方网站、财经新闻和行业报告获取最新信息。",
                    query
                ),
                url: String::new(),
                source: "System Generated".to_string(),
            });
        }

        results.truncate(max_results);
        Ok(results)
    }
}

fn text_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
