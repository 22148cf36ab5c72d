use crate::config::Settings;
use crate::resilience::HttpStatusError;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const QUOTE_PATH: &str = "/v1/quote";
const SENTIMENT_PATH: &str = "/v1/sentiment";
const PUT_CALL_PATH: &str = "/v1/options/put-call";

/// Normalized market-data HTTP client. The provider is expected to expose
/// JSON quote/sentiment endpoints behind one base URL; provider-specific
/// response shapes are normalized here and nowhere else.
#[derive(Debug, Clone)]
pub struct MarketDataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    symbol: String,
    price: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct SentimentResponse {
    /// Gauge in [0, 100].
    value: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct PutCallResponse {
    ratio: f64,
}

impl MarketDataClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_market_data_base_url()?.to_string();
        let api_key = settings.market_data_api_key.clone();

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(query)
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        if !status.is_success() {
            return Err(HttpStatusError::new(status, text).into());
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("market data response is not the expected shape: {text}"))
    }

    pub async fn fetch_quote(&self, symbol: &str) -> Result<f64> {
        let res: QuoteResponse = self.get_json(QUOTE_PATH, &[("symbol", symbol)]).await?;
        anyhow::ensure!(
            res.price.is_finite() && res.price > 0.0,
            "quote for {symbol} is not a positive number: {} (symbol echo: {})",
            res.price,
            res.symbol
        );
        Ok(res.price)
    }

    pub async fn fetch_sentiment(&self) -> Result<f64> {
        let res: SentimentResponse = self.get_json(SENTIMENT_PATH, &[]).await?;
        anyhow::ensure!(
            (0.0..=100.0).contains(&res.value),
            "sentiment gauge out of range: {}",
            res.value
        );
        Ok(res.value)
    }

    pub async fn fetch_put_call_ratio(&self) -> Result<f64> {
        let res: PutCallResponse = self.get_json(PUT_CALL_PATH, &[]).await?;
        anyhow::ensure!(
            res.ratio.is_finite() && res.ratio > 0.0,
            "put/call ratio is not a positive number: {}",
            res.ratio
        );
        Ok(res.ratio)
    }
}
