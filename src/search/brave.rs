use reqwest::Client;
use serde::Deserialize;

use super::SearchResult;
use crate::error::{ProviderResult, SearchError};

const DEFAULT_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Debug, Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
}

/// Brave Search provider. Results are requested with Chinese-market
/// language and country hints to match the query domain.
pub(super) struct BraveProvider {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl BraveProvider {
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
        let count = max_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("Accept-Encoding", "gzip")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("search_lang", "zh"),
                ("country", "CN"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Api {
                provider: "brave".to_string(),
                status: status.as_u16(),
            });
        }

        let body: BraveResponse =
            response
                .json()
                .await
                .map_err(|e| SearchError::InvalidResponse {
                    provider: "brave".to_string(),
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(body
            .web
            .results
            .into_iter()
            .map(|item| SearchResult {
                title: item.title,
                content: item.description,
                url: item.url,
                source: "Brave Search".to_string(),
            })
            .collect())
    }
}
