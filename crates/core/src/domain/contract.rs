use crate::domain::artifact::{
    AnalysisArtifact, Breadth, ChartSeries, Dashboard, Details, Evaluation, Fundamentals,
    HotStock, LocalizedReport, MarketOverviewRow, NamedSeries, PriceLevel, PriceLevels,
    PutCallRatio, Section, SectionWithChart, SentimentGauge, Summary, SurveyReading, VixReading,
};
use anyhow::{bail, ensure};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Raw mirror of the model output. Top-level sections are optional so the
/// generator can name exactly which required section is absent; fields
/// inside a present section are enforced by deserialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmAnalysisArtifact {
    pub date: Option<String>,
    pub session: Option<String>,
    #[serde(default)]
    pub languages: BTreeMap<String, LlmLocalizedReport>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmLocalizedReport {
    pub summary: Option<LlmSummary>,
    pub dashboard: Option<LlmDashboard>,
    pub details: Option<LlmDetails>,
    #[serde(default)]
    pub market_overview: Vec<LlmMarketOverviewRow>,
    #[serde(default)]
    pub hot_stocks: Vec<LlmHotStock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSummary {
    pub evaluation: Evaluation,
    pub score: i64,
    pub headline: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmDashboard {
    pub breadth: LlmBreadth,
    pub sentiment_index: LlmSentimentGauge,
    pub price_levels: LlmPriceLevels,
    pub put_call_ratio: LlmPutCallRatio,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmBreadth {
    pub advancers: i64,
    pub decliners: i64,
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSentimentGauge {
    pub value: f64,
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmPriceLevels {
    pub resistance: LlmPriceLevel,
    pub support: LlmPriceLevel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmPriceLevel {
    pub value: f64,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmPutCallRatio {
    pub daily_value: f64,
    pub moving_average: f64,
    pub status: String,
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmDetails {
    pub internals: Option<LlmSectionWithChart>,
    pub technicals: Option<LlmSectionWithChart>,
    pub fundamentals: Option<LlmFundamentals>,
    pub strategy: Option<LlmSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSection {
    pub headline: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSectionWithChart {
    pub headline: String,
    pub text: String,
    pub chart: LlmChartSeries,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmChartSeries {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub series: Vec<LlmNamedSeries>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmNamedSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmFundamentals {
    pub headline: String,
    pub text: String,
    pub vix: LlmVixReading,
    pub survey: LlmSurveyReading,
    #[serde(default)]
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmVixReading {
    pub value: f64,
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSurveyReading {
    pub bullish: f64,
    pub bearish: f64,
    pub summary: String,
}

impl LlmAnalysisArtifact {
    pub fn validate_and_into_artifact(
        self,
        expected_date: NaiveDate,
        session: &str,
        base_lang: &str,
    ) -> anyhow::Result<AnalysisArtifact> {
        if let Some(date) = self.date.as_deref() {
            let parsed = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")?;
            ensure!(
                parsed == expected_date,
                "model output date mismatch: expected {expected_date}, got {parsed}"
            );
        }

        ensure!(
            self.languages.contains_key(base_lang),
            "model output is missing the base language '{base_lang}'"
        );

        let mut languages = BTreeMap::new();
        for (lang, report) in self.languages {
            let lang = lang.trim().to_ascii_lowercase();
            ensure!(!lang.is_empty(), "language code must be non-empty");
            languages.insert(lang.clone(), validate_report(&lang, report)?);
        }

        Ok(AnalysisArtifact {
            date: expected_date,
            session: session.to_string(),
            languages,
        })
    }
}

fn validate_report(lang: &str, report: LlmLocalizedReport) -> anyhow::Result<LocalizedReport> {
    let Some(summary) = report.summary else {
        bail!("languages.{lang}.summary is missing");
    };
    let Some(dashboard) = report.dashboard else {
        bail!("languages.{lang}.dashboard is missing");
    };
    let Some(details) = report.details else {
        bail!("languages.{lang}.details is missing");
    };

    let headline = summary.headline.trim().to_string();
    ensure!(!headline.is_empty(), "languages.{lang}.summary.headline must be non-empty");

    Ok(LocalizedReport {
        summary: Summary {
            evaluation: summary.evaluation,
            score: summary.score,
            headline,
            text: summary.text.trim().to_string(),
        },
        dashboard: Dashboard {
            breadth: Breadth {
                advancers: dashboard.breadth.advancers,
                decliners: dashboard.breadth.decliners,
                summary: dashboard.breadth.summary.trim().to_string(),
            },
            sentiment_index: SentimentGauge {
                value: dashboard.sentiment_index.value,
                summary: dashboard.sentiment_index.summary.trim().to_string(),
            },
            price_levels: PriceLevels {
                resistance: price_level(dashboard.price_levels.resistance),
                support: price_level(dashboard.price_levels.support),
            },
            put_call_ratio: PutCallRatio {
                daily_value: dashboard.put_call_ratio.daily_value,
                moving_average: dashboard.put_call_ratio.moving_average,
                status: dashboard.put_call_ratio.status.trim().to_string(),
                summary: dashboard.put_call_ratio.summary.trim().to_string(),
            },
        },
        details: validate_details(lang, details)?,
        market_overview: report
            .market_overview
            .into_iter()
            .map(|row| market_row(lang, row))
            .collect::<anyhow::Result<Vec<_>>>()?,
        hot_stocks: report
            .hot_stocks
            .into_iter()
            .map(|row| hot_stock(lang, row))
            .collect::<anyhow::Result<Vec<_>>>()?,
    })
}

fn validate_details(lang: &str, details: LlmDetails) -> anyhow::Result<Details> {
    let Some(internals) = details.internals else {
        bail!("languages.{lang}.details.internals is missing");
    };
    let Some(technicals) = details.technicals else {
        bail!("languages.{lang}.details.technicals is missing");
    };
    let Some(fundamentals) = details.fundamentals else {
        bail!("languages.{lang}.details.fundamentals is missing");
    };
    let Some(strategy) = details.strategy else {
        bail!("languages.{lang}.details.strategy is missing");
    };

    Ok(Details {
        internals: section_with_chart(internals),
        technicals: section_with_chart(technicals),
        fundamentals: Fundamentals {
            headline: fundamentals.headline.trim().to_string(),
            text: fundamentals.text.trim().to_string(),
            vix: VixReading {
                value: fundamentals.vix.value,
                summary: fundamentals.vix.summary.trim().to_string(),
            },
            survey: SurveyReading {
                bullish: fundamentals.survey.bullish,
                bearish: fundamentals.survey.bearish,
                summary: fundamentals.survey.summary.trim().to_string(),
            },
            bullets: fundamentals
                .bullets
                .into_iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect(),
        },
        strategy: Section {
            headline: strategy.headline.trim().to_string(),
            text: strategy.text.trim().to_string(),
        },
    })
}

fn section_with_chart(section: LlmSectionWithChart) -> SectionWithChart {
    SectionWithChart {
        headline: section.headline.trim().to_string(),
        text: section.text.trim().to_string(),
        chart: ChartSeries {
            labels: section.chart.labels,
            series: section
                .chart
                .series
                .into_iter()
                .map(|s| NamedSeries {
                    name: s.name.trim().to_string(),
                    values: s.values,
                })
                .collect(),
        },
    }
}

fn price_level(level: LlmPriceLevel) -> PriceLevel {
    PriceLevel {
        value: level.value,
        description: level.description.trim().to_string(),
    }
}

fn market_row(lang: &str, row: LlmMarketOverviewRow) -> anyhow::Result<MarketOverviewRow> {
    let name = row.name.trim().to_string();
    ensure!(!name.is_empty(), "languages.{lang}.marketOverview entry has an empty name");
    Ok(MarketOverviewRow {
        name,
        value: row.value.trim().to_string(),
        change: row.change.trim().to_string(),
        is_down: row.is_down,
    })
}

fn hot_stock(lang: &str, row: LlmHotStock) -> anyhow::Result<HotStock> {
    let name = row.name.trim().to_string();
    ensure!(!name.is_empty(), "languages.{lang}.hotStocks entry has an empty name");
    Ok(HotStock {
        name,
        price: row.price.trim().to_string(),
        description: row.description.trim().to_string(),
        is_down: row.is_down,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmMarketOverviewRow {
    pub name: String,
    pub value: String,
    pub change: String,
    pub is_down: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmHotStock {
    pub name: String,
    pub price: String,
    pub description: String,
    pub is_down: bool,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    pub(crate) fn valid_report_json() -> serde_json::Value {
        json!({
            "summary": {
                "evaluation": "Buy",
                "score": 7,
                "headline": "반도체 강세로 지수 사상 최고치 경신",
                "text": "대형 기술주가 실적 기대감에 힘입어 상승을 주도했고, 시장 폭도 함께 개선되며 지수가 최고치를 다시 썼습니다."
            },
            "dashboard": {
                "breadth": {"advancers": 310, "decliners": 182, "summary": "상승 우위"},
                "sentimentIndex": {"value": 62.0, "summary": "탐욕 구간 진입"},
                "priceLevels": {
                    "resistance": {"value": 5180.0, "description": "전고점 부근"},
                    "support": {"value": 5090.0, "description": "20일 이동평균"}
                },
                "putCallRatio": {
                    "dailyValue": 0.84,
                    "movingAverage": 0.91,
                    "status": "중립",
                    "summary": "풋 수요 완화"
                }
            },
            "details": {
                "internals": {
                    "headline": "시장 내부 지표",
                    "text": "상승 종목 수가 이틀 연속 하락 종목 수를 앞섰고, 거래량도 전일 대비 늘며 시장 폭 개선을 뒷받침했습니다.",
                    "chart": {
                        "labels": ["월", "화", "수"],
                        "series": [{"name": "상승종목", "values": [280.0, 295.0, 310.0]}]
                    }
                },
                "technicals": {
                    "headline": "기술적 분석",
                    "text": "지수는 20일 이동평균 위에서 상승 채널을 유지하고 있으며, 모멘텀 지표도 과열 없이 완만한 우상향 흐름을 보입니다.",
                    "chart": {
                        "labels": ["월", "화", "수"],
                        "series": [{"name": "종가", "values": [5080.0, 5110.0, 5150.0]}]
                    }
                },
                "fundamentals": {
                    "headline": "펀더멘털",
                    "text": "변동성 지표는 안정권에 머물렀고 개인 투자 심리 조사에서도 낙관론이 우위를 보이며 수급 여건이 개선되고 있습니다.",
                    "vix": {"value": 13.8, "summary": "안정권"},
                    "survey": {"bullish": 42.0, "bearish": 28.0, "summary": "낙관 우위"},
                    "bullets": ["실적 시즌 기대감", "금리 인하 전망 유지"]
                },
                "strategy": {
                    "headline": "투자 전략",
                    "text": "지지선 부근에서는 분할 매수로 대응하고, 전고점 접근 시에는 일부 차익 실현으로 현금 비중을 확보하는 전략을 권합니다."
                }
            },
            "marketOverview": [
                {"name": "S&P 500", "value": "5,150.21", "change": "+0.8%", "isDown": false},
                {"name": "나스닥 100", "value": "18,210.55", "change": "+1.1%", "isDown": false}
            ],
            "hotStocks": [
                {"name": "엔비디아", "price": "$905.30", "description": "AI 수요 지속", "isDown": false}
            ]
        })
    }

    pub(crate) fn valid_artifact_json(date: &str) -> serde_json::Value {
        json!({
            "date": date,
            "session": "morning",
            "languages": {"ko": valid_report_json()}
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{valid_artifact_json, valid_report_json};
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_valid_output_into_typed_artifact() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let raw: LlmAnalysisArtifact =
            serde_json::from_value(valid_artifact_json("2026-08-07")).unwrap();

        let artifact = raw
            .validate_and_into_artifact(date, "morning", "ko")
            .unwrap();

        let report = artifact.report("ko").unwrap();
        assert_eq!(report.summary.score, 7);
        assert_eq!(report.summary.evaluation, Evaluation::Buy);
        assert_eq!(report.details.technicals.chart.labels.len(), 3);
        assert_eq!(report.market_overview.len(), 2);
    }

    #[test]
    fn rejects_date_mismatch() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let raw: LlmAnalysisArtifact =
            serde_json::from_value(valid_artifact_json("2026-08-06")).unwrap();

        let err = raw
            .validate_and_into_artifact(date, "morning", "ko")
            .unwrap_err();
        assert!(format!("{err}").contains("date mismatch"));
    }

    #[test]
    fn rejects_missing_base_language() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let v = json!({"date": "2026-08-07", "languages": {"en": valid_report_json()}});
        let raw: LlmAnalysisArtifact = serde_json::from_value(v).unwrap();

        let err = raw
            .validate_and_into_artifact(date, "morning", "ko")
            .unwrap_err();
        assert!(format!("{err}").contains("base language"));
    }

    #[test]
    fn rejects_missing_technicals_subsection() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let mut report = valid_report_json();
        report["details"]
            .as_object_mut()
            .unwrap()
            .remove("technicals");
        let v = json!({"date": "2026-08-07", "languages": {"ko": report}});
        let raw: LlmAnalysisArtifact = serde_json::from_value(v).unwrap();

        let err = raw
            .validate_and_into_artifact(date, "morning", "ko")
            .unwrap_err();
        assert!(format!("{err}").contains("details.technicals"));
    }

    #[test]
    fn rejects_unknown_evaluation_tag_at_deserialization() {
        let mut report = valid_report_json();
        report["summary"]["evaluation"] = json!("StrongBuy");
        let v = json!({"languages": {"ko": report}});
        assert!(serde_json::from_value::<LlmAnalysisArtifact>(v).is_err());
    }
}
