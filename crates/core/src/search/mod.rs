use crate::config::Settings;
use crate::resilience::{
    is_transient, no_retry_hook, with_retry, with_timeout, CircuitBreaker, HttpStatusError,
    RetryOptions,
};
use anyhow::{Context, Result};
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RESULT_COUNT: u32 = 5;
const SEARCH_PATH: &str = "/v1/search";

/// Returned instead of failing when every query came back empty-handed;
/// the generation prompt carries this notice so the model knows it has no
/// fresh evidence to lean on.
pub const NO_EVIDENCE_NOTICE: &str =
    "Web search is currently unavailable. Base the analysis on the market snapshot only.";

#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    result_count: u32,
    call_timeout: Duration,
    retry: RetryOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
}

impl SearchClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_search_base_url()?.to_string();
        let api_key = settings.require_search_api_key()?.to_string();

        let timeout_secs = std::env::var("SEARCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let call_timeout_secs = std::env::var("SEARCH_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS);

        let result_count = std::env::var("SEARCH_RESULT_COUNT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RESULT_COUNT);

        let retries = std::env::var("SEARCH_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(2);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build search http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            result_count,
            call_timeout: Duration::from_secs(call_timeout_secs),
            retry: RetryOptions {
                max_retries: retries,
                base_delay: Duration::from_millis(750),
                backoff_multiplier: 2.0,
                max_delay: Duration::from_secs(10),
            },
        })
    }

    async fn search_once(&self, query: &str) -> Result<Vec<SearchResult>> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);

        let url = format!("{}{}", self.base_url.trim_end_matches('/'), SEARCH_PATH);
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&SearchRequest {
                query,
                num_results: self.result_count,
            })
            .send()
            .await
            .context("search request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read search response")?;
        if !status.is_success() {
            return Err(HttpStatusError::new(status, text).into());
        }

        let parsed: SearchResponse = serde_json::from_str(&text)
            .with_context(|| format!("search response is not the expected shape: {text}"))?;
        Ok(parsed.results)
    }

    /// One search per query, concurrently; output blocks are concatenated in
    /// input order so the assembled prompt is reproducible. A failing query
    /// degrades to a placeholder line; evidence gathering never fails the
    /// pipeline.
    pub async fn gather_evidence(&self, breaker: &CircuitBreaker, queries: &[String]) -> String {
        let tasks = queries.iter().map(|query| async move {
            with_retry(
                || {
                    breaker.execute(|| {
                        with_timeout(self.search_once(query), self.call_timeout, "web-search")
                    })
                },
                &self.retry,
                is_transient,
                no_retry_hook,
            )
            .await
        });

        let outcomes = join_all(tasks).await;

        let mut blocks = Vec::with_capacity(queries.len());
        let mut succeeded = 0usize;
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(results) if !results.is_empty() => {
                    succeeded += 1;
                    blocks.push(format_query_block(query, &results));
                }
                Ok(_) => {
                    blocks.push(format!("### {query}\n(no results found)"));
                }
                Err(err) => {
                    tracing::warn!(query = %query, error = %err, "evidence query failed; degrading to placeholder");
                    blocks.push(format!("### {query}\n(search failed; no evidence for this topic)"));
                }
            }
        }

        if succeeded == 0 {
            tracing::warn!("all evidence queries failed; proceeding without search context");
            return NO_EVIDENCE_NOTICE.to_string();
        }

        blocks.join("\n\n")
    }
}

fn format_query_block(query: &str, results: &[SearchResult]) -> String {
    let mut out = format!("### {query}");
    for (i, result) in results.iter().enumerate() {
        let title = result.title.trim();
        let snippet = result.snippet.trim();
        out.push_str(&format!("\n{}. {title}: {snippet}", i + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_prefixed_with_query_and_numbered() {
        let results = vec![
            SearchResult {
                title: "Fed holds rates".to_string(),
                snippet: "Policy unchanged, cuts projected later this year.".to_string(),
            },
            SearchResult {
                title: "Earnings beat".to_string(),
                snippet: " Large caps topped estimates. ".to_string(),
            },
        ];

        let block = format_query_block("미국 금리 전망", &results);
        assert_eq!(
            block,
            "### 미국 금리 전망\n\
             1. Fed holds rates: Policy unchanged, cuts projected later this year.\n\
             2. Earnings beat: Large caps topped estimates."
        );
    }

    #[test]
    fn search_response_tolerates_missing_results_key() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
