//! Web-search aggregation across interchangeable providers.
//!
//! One provider is active per process, chosen by configuration. The
//! aggregator shields the pipeline from provider trouble: a failed or
//! timed-out query collapses to an empty result list instead of an error,
//! so a bad provider response never aborts an analysis run.

mod brave;
mod duckduckgo;
mod tavily;

use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{SearchConfig, SearchEngine};
use crate::error::{ProviderResult, SearchError};

use brave::BraveProvider;
use duckduckgo::DuckDuckGoProvider;
use tavily::TavilyProvider;

/// Upper bound on queries driven in one search stage.
pub const MAX_SEARCH_QUERIES: usize = 4;

/// Maximum characters of page text returned by [`SearchClient::fetch_page`].
const PAGE_TEXT_LIMIT: usize = 5000;

/// One search hit as the pipeline consumes it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub content: String,
    pub url: String,
    /// Human-readable provenance label, e.g. "Tavily" or "Brave Search"
    pub source: String,
}

enum Provider {
    DuckDuckGo(DuckDuckGoProvider),
    Tavily(TavilyProvider),
    Brave(BraveProvider),
}

/// Dispatches search calls to the configured provider
pub struct SearchClient {
    client: Client,
    engine: SearchEngine,
    provider: Provider,
}

impl SearchClient {
    /// Build a client for the configured provider.
    ///
    /// Keyed providers fail here when their key is missing so the problem
    /// surfaces at startup instead of as silently empty search results.
    pub fn new(config: &SearchConfig) -> ProviderResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let provider = match config.engine {
            SearchEngine::DuckDuckGo => {
                Provider::DuckDuckGo(DuckDuckGoProvider::new(client.clone()))
            }
            SearchEngine::Tavily => {
                let api_key =
                    config
                        .tavily_api_key
                        .clone()
                        .ok_or_else(|| SearchError::MissingApiKey {
                            provider: "tavily".to_string(),
                        })?;
                Provider::Tavily(TavilyProvider::new(client.clone(), api_key))
            }
            SearchEngine::Brave => {
                let api_key =
                    config
                        .brave_api_key
                        .clone()
                        .ok_or_else(|| SearchError::MissingApiKey {
                            provider: "brave".to_string(),
                        })?;
                Provider::Brave(BraveProvider::new(client.clone(), api_key))
            }
        };

        Ok(Self {
            client,
            engine: config.engine,
            provider,
        })
    }

    /// Point the active provider at a different endpoint (for testing)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        match &mut self.provider {
            Provider::DuckDuckGo(p) => p.set_endpoint(endpoint),
            Provider::Tavily(p) => p.set_endpoint(endpoint),
            Provider::Brave(p) => p.set_endpoint(endpoint),
        }
        self
    }

    /// Run one query against the active provider.
    ///
    /// Provider errors are soft: they are logged and collapse to an empty
    /// result list. An empty list with no error is a valid outcome, not a
    /// failure.
    pub async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        info!(query = %query, engine = %self.engine, "Running search");

        let outcome = match &self.provider {
            Provider::DuckDuckGo(p) => p.search(query, max_results).await,
            Provider::Tavily(p) => p.search(query, max_results).await,
            Provider::Brave(p) => p.search(query, max_results).await,
        };

        match outcome {
            Ok(results) => {
                info!(query = %query, results = results.len(), "Search completed");
                results
            }
            Err(e) => {
                error!(query = %query, engine = %self.engine, error = %e, "Search failed");
                Vec::new()
            }
        }
    }

    /// Drive up to [`MAX_SEARCH_QUERIES`] queries concurrently.
    ///
    /// Each query runs under its own timeout; a timed-out query contributes
    /// nothing and never aborts the batch. Results are concatenated in
    /// query order without deduplication or re-ranking.
    pub async fn search_many(
        &self,
        queries: &[String],
        per_query_cap: usize,
        per_query_timeout: Duration,
    ) -> Vec<SearchResult> {
        let bounded = &queries[..queries.len().min(MAX_SEARCH_QUERIES)];

        let searches = bounded.iter().map(|query| async move {
            match tokio::time::timeout(per_query_timeout, self.search(query, per_query_cap)).await
            {
                Ok(results) => results,
                Err(_) => {
                    warn!(
                        query = %query,
                        timeout_secs = per_query_timeout.as_secs(),
                        "Search query timed out"
                    );
                    Vec::new()
                }
            }
        });

        join_all(searches).await.into_iter().flatten().collect()
    }

    /// Fetch one page and return its stripped text, or `None` on any
    /// failure. Uses a shorter timeout than search calls since pages are
    /// supplementary material.
    pub async fn fetch_page(&self, url: &str) -> Option<String> {
        if url.is_empty() {
            return None;
        }

        let response = match self
            .client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(url = %url, error = %e, "Page fetch failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Page fetch returned non-success status");
            return None;
        }

        match response.text().await {
            Ok(html) => Some(page_text(&html)),
            Err(e) => {
                error!(url = %url, error = %e, "Page body read failed");
                None
            }
        }
    }
}

/// Strip markup from an HTML document and collapse the remaining text onto
/// one line, truncated to [`PAGE_TEXT_LIMIT`] characters.
///
/// Kept synchronous: the scraper `Html` type is !Send and must not live
/// across an await.
fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    let mut buf = String::new();
    if let Ok(body) = Selector::parse("body") {
        if let Some(el) = doc.select(&body).next() {
            collect_text(&el, &mut buf);
        }
    }
    if buf.is_empty() {
        buf = doc.root_element().text().collect();
    }

    let collapsed = buf.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(PAGE_TEXT_LIMIT).collect()
}

/// Recursively collect text content, skipping script and style subtrees.
fn collect_text(el: &scraper::ElementRef<'_>, buf: &mut String) {
    use scraper::Node;

    for child in el.children() {
        match child.value() {
            Node::Text(text) => buf.push_str(text),
            Node::Element(child_el) => {
                if matches!(child_el.name(), "script" | "style") {
                    continue;
                }
                buf.push(' ');
                if let Some(child_ref) = scraper::ElementRef::wrap(child) {
                    collect_text(&child_ref, buf);
                }
            }
            _ => {}
        }
    }
}
