use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::SearchResult;
use crate::error::{ProviderResult, SearchError};

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    include_answer: bool,
    include_images: bool,
    include_raw_content: bool,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyItem>,
}

#[derive(Debug, Deserialize)]
struct TavilyItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

/// Tavily web-search provider. The API key travels in the request body.
pub(super) struct TavilyProvider {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl TavilyProvider {
    pub(super) fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub(super) fn set_endpoint(&mut self, endpoint: String) {
        self.endpoint = endpoint;
    }

    pub(super) async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> ProviderResult<Vec<SearchResult>> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            search_depth: "basic",
            include_answer: true,
            include_images: false,
            include_raw_content: false,
            max_results,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Api {
                provider: "tavily".to_string(),
                status: status.as_u16(),
            });
        }

        let body: TavilyResponse =
            response
                .json()
                .await
                .map_err(|e| SearchError::InvalidResponse {
                    provider: "tavily".to_string(),
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(body
            .results
            .into_iter()
            .map(|item| SearchResult {
                title: item.title,
                content: item.content,
                url: item.url,
                source: "Tavily".to_string(),
            })
            .collect())
    }
}
