use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One published analysis document. Field names are camelCase on disk
/// because the artifact feeds the static-site renderer directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisArtifact {
    pub date: NaiveDate,
    pub session: String,
    pub languages: BTreeMap<String, LocalizedReport>,
}

impl AnalysisArtifact {
    pub fn report(&self, lang: &str) -> Option<&LocalizedReport> {
        self.languages.get(lang)
    }

    /// Neutral placeholder served when a run fails and no previous artifact
    /// exists yet. Never validated; it only keeps the site renderable.
    pub fn fallback(date: NaiveDate, session: &str, base_lang: &str) -> Self {
        let korean = base_lang == "ko";
        let text = |ko: &str, en: &str| {
            if korean {
                ko.to_string()
            } else {
                en.to_string()
            }
        };

        let placeholder_chart = ChartSeries {
            labels: vec!["-".to_string()],
            series: vec![NamedSeries {
                name: text("지수", "Index"),
                values: vec![0.0],
            }],
        };

        let unavailable = text(
            "데이터 수집에 실패하여 이번 세션의 분석을 제공할 수 없습니다.",
            "Data collection failed; no analysis is available for this session.",
        );

        let report = LocalizedReport {
            summary: Summary {
                evaluation: Evaluation::Neutral,
                score: 5,
                headline: text("분석 데이터 준비 중", "Analysis data unavailable"),
                text: text(
                    "시장 데이터 수집에 실패하여 임시 리포트를 표시합니다. 다음 정기 실행에서 갱신됩니다.",
                    "Market data collection failed; this placeholder will be replaced by the next scheduled run.",
                ),
            },
            dashboard: Dashboard {
                breadth: Breadth {
                    advancers: 0,
                    decliners: 0,
                    summary: text("데이터 없음", "No data"),
                },
                sentiment_index: SentimentGauge {
                    value: 50.0,
                    summary: text("중립", "Neutral"),
                },
                price_levels: PriceLevels {
                    resistance: PriceLevel {
                        value: 0.0,
                        description: text("데이터 없음", "No data"),
                    },
                    support: PriceLevel {
                        value: 0.0,
                        description: text("데이터 없음", "No data"),
                    },
                },
                put_call_ratio: PutCallRatio {
                    daily_value: 0.0,
                    moving_average: 0.0,
                    status: text("중립", "Neutral"),
                    summary: text("데이터 없음", "No data"),
                },
            },
            details: Details {
                internals: SectionWithChart {
                    headline: text("시장 내부 지표", "Market internals"),
                    text: unavailable.clone(),
                    chart: placeholder_chart.clone(),
                },
                technicals: SectionWithChart {
                    headline: text("기술적 분석", "Technicals"),
                    text: unavailable.clone(),
                    chart: placeholder_chart,
                },
                fundamentals: Fundamentals {
                    headline: text("펀더멘털", "Fundamentals"),
                    text: unavailable.clone(),
                    vix: VixReading {
                        value: 0.0,
                        summary: text("데이터 없음", "No data"),
                    },
                    survey: SurveyReading {
                        bullish: 0.0,
                        bearish: 0.0,
                        summary: text("데이터 없음", "No data"),
                    },
                    bullets: vec![],
                },
                strategy: Section {
                    headline: text("투자 전략", "Strategy"),
                    text: unavailable,
                },
            },
            market_overview: vec![],
            hot_stocks: vec![],
        };

        let mut languages = BTreeMap::new();
        languages.insert(base_lang.to_string(), report);

        Self {
            date,
            session: session.to_string(),
            languages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedReport {
    pub summary: Summary,
    pub dashboard: Dashboard,
    pub details: Details,
    pub market_overview: Vec<MarketOverviewRow>,
    pub hot_stocks: Vec<HotStock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    Buy,
    Sell,
    Neutral,
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Evaluation::Buy => write!(f, "Buy"),
            Evaluation::Sell => write!(f, "Sell"),
            Evaluation::Neutral => write!(f, "Neutral"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub evaluation: Evaluation,
    /// 1..=10, bounds enforced by the validator rather than the type.
    pub score: i64,
    pub headline: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub breadth: Breadth,
    pub sentiment_index: SentimentGauge,
    pub price_levels: PriceLevels,
    pub put_call_ratio: PutCallRatio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadth {
    pub advancers: i64,
    pub decliners: i64,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentGauge {
    pub value: f64,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevels {
    pub resistance: PriceLevel,
    pub support: PriceLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevel {
    pub value: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutCallRatio {
    pub daily_value: f64,
    pub moving_average: f64,
    pub status: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Details {
    pub internals: SectionWithChart,
    pub technicals: SectionWithChart,
    pub fundamentals: Fundamentals,
    pub strategy: Section,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub headline: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionWithChart {
    pub headline: String,
    pub text: String,
    pub chart: ChartSeries,
}

/// Parallel label/value arrays rendered by the client-side chart widgets.
/// Labels and every series must be the same length.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub series: Vec<NamedSeries>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fundamentals {
    pub headline: String,
    pub text: String,
    pub vix: VixReading,
    pub survey: SurveyReading,
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VixReading {
    pub value: f64,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyReading {
    pub bullish: f64,
    pub bearish: f64,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverviewRow {
    pub name: String,
    pub value: String,
    pub change: String,
    pub is_down: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotStock {
    pub name: String,
    pub price: String,
    pub description: String,
    pub is_down: bool,
}

/// One archive index row, newest first in the manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub archive_file: String,
    pub display_date: String,
    pub session: String,
    pub evaluation: Evaluation,
    pub headline: String,
    pub short_summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_serializes_camel_case() {
        let artifact = AnalysisArtifact::fallback(
            NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            "morning",
            "ko",
        );
        let v = serde_json::to_value(&artifact).unwrap();

        assert_eq!(v["date"], "2026-08-07");
        let report = &v["languages"]["ko"];
        assert!(report["marketOverview"].is_array());
        assert!(report["hotStocks"].is_array());
        assert!(report["dashboard"]["putCallRatio"]["dailyValue"].is_number());
        assert!(report["dashboard"]["sentimentIndex"]["value"].is_number());
    }

    #[test]
    fn evaluation_round_trips_as_bare_tag() {
        let v = serde_json::to_value(Evaluation::Sell).unwrap();
        assert_eq!(v, "Sell");
        let parsed: Evaluation = serde_json::from_value(v).unwrap();
        assert_eq!(parsed, Evaluation::Sell);
    }

    #[test]
    fn fallback_contains_base_language_only() {
        let artifact = AnalysisArtifact::fallback(
            NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            "afternoon",
            "en",
        );
        assert_eq!(artifact.languages.len(), 1);
        assert!(artifact.report("en").is_some());
        assert_eq!(
            artifact.report("en").unwrap().summary.evaluation,
            Evaluation::Neutral
        );
    }
}
