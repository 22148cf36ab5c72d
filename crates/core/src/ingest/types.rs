use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw market metrics collected before analysis. `index_price` and
/// `sentiment_index` are the two required fields; everything else may be
/// absent when every source for it failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub as_of_date: NaiveDate,
    pub index_price: f64,
    pub sentiment_index: f64,
    pub secondary_index_price: Option<f64>,
    pub volatility_index: Option<f64>,
    pub treasury_yield_10y: Option<f64>,
    pub put_call_ratio: Option<f64>,

    /// Field name -> provenance, including any fallback path taken.
    pub sources: BTreeMap<String, String>,
}

impl MarketSnapshot {
    /// Deterministic one-line-per-field rendering embedded in the model
    /// prompt. Fixed field order so identical inputs produce identical
    /// prompts.
    pub fn prompt_lines(&self) -> String {
        fn opt(v: Option<f64>) -> String {
            v.map(|n| format!("{n:.2}")).unwrap_or_else(|| "n/a".to_string())
        }

        [
            format!("indexPrice: {:.2}", self.index_price),
            format!("sentimentIndex: {:.1}", self.sentiment_index),
            format!("secondaryIndexPrice: {}", opt(self.secondary_index_price)),
            format!("volatilityIndex: {}", opt(self.volatility_index)),
            format!("treasuryYield10y: {}", opt(self.treasury_yield_10y)),
            format!("putCallRatio: {}", opt(self.put_call_ratio)),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lines_are_deterministic_and_mark_missing_fields() {
        let snapshot = MarketSnapshot {
            as_of_date: NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            index_price: 5100.0,
            sentiment_index: 58.0,
            secondary_index_price: None,
            volatility_index: Some(14.25),
            treasury_yield_10y: None,
            put_call_ratio: Some(0.92),
            sources: BTreeMap::new(),
        };

        let lines = snapshot.prompt_lines();
        assert_eq!(
            lines,
            "indexPrice: 5100.00\n\
             sentimentIndex: 58.0\n\
             secondaryIndexPrice: n/a\n\
             volatilityIndex: 14.25\n\
             treasuryYield10y: n/a\n\
             putCallRatio: 0.92"
        );
    }
}
