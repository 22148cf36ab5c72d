pub mod provider;
pub mod types;

pub use provider::MarketDataClient;
pub use types::MarketSnapshot;

use crate::resilience::{
    is_transient, no_retry_hook, with_retry, with_timeout, CircuitBreaker, RetryOptions,
};
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::time::Duration;

const SYMBOL_INDEX: &str = "SPX";
const SYMBOL_INDEX_FUTURES: &str = "ES1!";
const SYMBOL_SECONDARY_INDEX: &str = "NDX";
const SYMBOL_VOLATILITY: &str = "VIX";
const SYMBOL_TREASURY_10Y: &str = "US10Y";

const DEFAULT_FUTURES_CONVERSION_FACTOR: f64 = 0.9975;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub call_timeout: Duration,
    pub retry: RetryOptions,

    /// Front-month futures trade at a basis to spot; the fallback quote is
    /// multiplied by this factor and the path is recorded in `sources`.
    pub futures_conversion_factor: f64,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            retry: RetryOptions {
                max_retries: 2,
                base_delay: Duration::from_millis(500),
                backoff_multiplier: 2.0,
                max_delay: Duration::from_secs(8),
            },
            futures_conversion_factor: DEFAULT_FUTURES_CONVERSION_FACTOR,
        }
    }
}

impl CollectorOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("MARKET_DATA_CALL_TIMEOUT_SECS") {
            if let Ok(n) = s.parse::<u64>() {
                out.call_timeout = Duration::from_secs(n);
            }
        }
        if let Ok(s) = std::env::var("MARKET_DATA_RETRIES") {
            if let Ok(n) = s.parse::<u32>() {
                out.retry.max_retries = n;
            }
        }
        if let Ok(s) = std::env::var("FUTURES_CONVERSION_FACTOR") {
            if let Ok(n) = s.parse::<f64>() {
                out.futures_conversion_factor = n;
            }
        }

        out
    }
}

/// Collect the full pre-analysis snapshot. Sub-fetches run concurrently and
/// are recombined in fixed field order. The index price and sentiment gauge
/// are required: if either is unobtainable after its fallback, the whole
/// collection fails and no partial snapshot is returned.
pub async fn collect_market_snapshot(
    client: &MarketDataClient,
    breaker: &CircuitBreaker,
    as_of_date: NaiveDate,
    options: &CollectorOptions,
) -> anyhow::Result<MarketSnapshot> {
    let quote = |symbol: &'static str, label: &'static str| async move {
        with_retry(
            || {
                breaker.execute(|| {
                    with_timeout(client.fetch_quote(symbol), options.call_timeout, label)
                })
            },
            &options.retry,
            is_transient,
            no_retry_hook,
        )
        .await
    };

    let index_task = async {
        match quote(SYMBOL_INDEX, "index-quote").await {
            Ok(price) => Ok::<(f64, String), anyhow::Error>((price, format!("quote:{SYMBOL_INDEX}"))),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "primary index quote failed; falling back to futures approximation"
                );
                let futures_price = quote(SYMBOL_INDEX_FUTURES, "index-futures-quote")
                    .await
                    .context("index price unavailable from primary source and futures fallback")?;
                let factor = options.futures_conversion_factor;
                Ok((
                    futures_price * factor,
                    format!("quote:{SYMBOL_INDEX_FUTURES} * {factor:.4} (fallback)"),
                ))
            }
        }
    };

    let sentiment_task = async {
        with_retry(
            || {
                breaker.execute(|| {
                    with_timeout(
                        client.fetch_sentiment(),
                        options.call_timeout,
                        "sentiment-gauge",
                    )
                })
            },
            &options.retry,
            is_transient,
            no_retry_hook,
        )
        .await
    };

    let put_call_task = async {
        with_retry(
            || {
                breaker.execute(|| {
                    with_timeout(
                        client.fetch_put_call_ratio(),
                        options.call_timeout,
                        "put-call-ratio",
                    )
                })
            },
            &options.retry,
            is_transient,
            no_retry_hook,
        )
        .await
    };

    let (index_res, sentiment_res, secondary_res, volatility_res, yield_res, put_call_res) = tokio::join!(
        index_task,
        sentiment_task,
        quote(SYMBOL_SECONDARY_INDEX, "secondary-index-quote"),
        quote(SYMBOL_VOLATILITY, "volatility-quote"),
        quote(SYMBOL_TREASURY_10Y, "treasury-yield-quote"),
        put_call_task,
    );

    let (index_price, index_source) = index_res?;

    let optional = |label: &str, res: anyhow::Result<f64>| match res {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(field = label, error = %err, "optional market field unavailable");
            None
        }
    };

    let secondary_index_price = optional("secondaryIndexPrice", secondary_res);
    let volatility_index = optional("volatilityIndex", volatility_res);
    let treasury_yield_10y = optional("treasuryYield10y", yield_res);
    let put_call_ratio = optional("putCallRatio", put_call_res);

    let (sentiment_index, sentiment_source) = match sentiment_res {
        Ok(v) => (v, "sentiment-endpoint".to_string()),
        Err(err) => match volatility_index {
            Some(vix) => {
                tracing::warn!(
                    error = %err,
                    vix,
                    "sentiment gauge failed; deriving from volatility index"
                );
                (
                    derive_sentiment_from_vix(vix),
                    format!("derived from VIX {vix:.2} (fallback)"),
                )
            }
            None => {
                return Err(err)
                    .context("sentiment gauge unavailable and no volatility index to derive from")
            }
        },
    };

    let mut sources = BTreeMap::new();
    sources.insert("indexPrice".to_string(), index_source);
    sources.insert("sentimentIndex".to_string(), sentiment_source);
    if secondary_index_price.is_some() {
        sources.insert(
            "secondaryIndexPrice".to_string(),
            format!("quote:{SYMBOL_SECONDARY_INDEX}"),
        );
    }
    if volatility_index.is_some() {
        sources.insert(
            "volatilityIndex".to_string(),
            format!("quote:{SYMBOL_VOLATILITY}"),
        );
    }
    if treasury_yield_10y.is_some() {
        sources.insert(
            "treasuryYield10y".to_string(),
            format!("quote:{SYMBOL_TREASURY_10Y}"),
        );
    }
    if put_call_ratio.is_some() {
        sources.insert("putCallRatio".to_string(), "put-call-endpoint".to_string());
    }

    tracing::info!(
        %as_of_date,
        index_price,
        sentiment_index,
        optional_fields = sources.len().saturating_sub(2),
        "market snapshot collected"
    );

    Ok(MarketSnapshot {
        as_of_date,
        index_price,
        sentiment_index,
        secondary_index_price,
        volatility_index,
        treasury_yield_10y,
        put_call_ratio,
        sources,
    })
}

/// Linear VIX -> gauge mapping used only when the sentiment endpoint is
/// down: calm (VIX ~10) reads greedy, panic (VIX 40+) reads fearful.
fn derive_sentiment_from_vix(vix: f64) -> f64 {
    (100.0 - 2.5 * vix).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vix_derivation_maps_calm_to_greed_and_panic_to_fear() {
        assert_eq!(derive_sentiment_from_vix(10.0), 75.0);
        assert_eq!(derive_sentiment_from_vix(30.0), 25.0);
    }

    #[test]
    fn vix_derivation_clamps_to_gauge_bounds() {
        assert_eq!(derive_sentiment_from_vix(60.0), 0.0);
        assert_eq!(derive_sentiment_from_vix(-5.0), 100.0);
    }
}
