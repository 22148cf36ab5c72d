use crate::domain::artifact::{LocalizedReport, Section, SectionWithChart};

/// Localization seam. The pipeline prefers prompt-side generation of every
/// configured language and only calls this to fill languages the model
/// omitted; backends must preserve structure (numbers, charts, list
/// lengths) and translate prose only.
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    async fn translate_report(
        &self,
        target_lang: &str,
        source: &LocalizedReport,
    ) -> anyhow::Result<LocalizedReport>;
}

/// Deterministic phrase-glossary backend for ko -> en gap filling. Known
/// market labels and statuses are mapped; prose the glossary does not cover
/// passes through unchanged rather than being machine-mangled.
#[derive(Debug, Clone)]
pub struct GlossaryTranslator {
    entries: Vec<(&'static str, &'static str)>,
}

impl Default for GlossaryTranslator {
    fn default() -> Self {
        Self {
            entries: vec![
                ("시장 내부 지표", "Market internals"),
                ("기술적 분석", "Technicals"),
                ("펀더멘털", "Fundamentals"),
                ("투자 전략", "Strategy"),
                ("상승 우위", "Advancers lead"),
                ("하락 우위", "Decliners lead"),
                ("탐욕 구간", "Greed zone"),
                ("공포 구간", "Fear zone"),
                ("중립", "Neutral"),
                ("매수", "Buy"),
                ("매도", "Sell"),
                ("전고점 부근", "Near the prior high"),
                ("20일 이동평균", "20-day moving average"),
                ("상승종목", "Advancers"),
                ("하락종목", "Decliners"),
                ("종가", "Close"),
                ("지수", "Index"),
                ("안정권", "Calm range"),
                ("낙관 우위", "Bulls lead"),
                ("데이터 없음", "No data"),
            ],
        }
    }
}

impl GlossaryTranslator {
    fn map_text(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (from, to) in &self.entries {
            out = out.replace(from, to);
        }
        out
    }

    fn map_section(&self, section: &Section) -> Section {
        Section {
            headline: self.map_text(&section.headline),
            text: self.map_text(&section.text),
        }
    }

    fn map_chart_section(&self, section: &SectionWithChart) -> SectionWithChart {
        let mut out = section.clone();
        out.headline = self.map_text(&section.headline);
        out.text = self.map_text(&section.text);
        out.chart.labels = section.chart.labels.iter().map(|l| self.map_text(l)).collect();
        for series in &mut out.chart.series {
            series.name = self.map_text(&series.name);
        }
        out
    }
}

#[async_trait::async_trait]
impl Translator for GlossaryTranslator {
    async fn translate_report(
        &self,
        target_lang: &str,
        source: &LocalizedReport,
    ) -> anyhow::Result<LocalizedReport> {
        tracing::info!(target_lang, "deriving report via glossary translation");

        let mut out = source.clone();
        out.summary.headline = self.map_text(&source.summary.headline);
        out.summary.text = self.map_text(&source.summary.text);

        out.dashboard.breadth.summary = self.map_text(&source.dashboard.breadth.summary);
        out.dashboard.sentiment_index.summary =
            self.map_text(&source.dashboard.sentiment_index.summary);
        out.dashboard.price_levels.resistance.description =
            self.map_text(&source.dashboard.price_levels.resistance.description);
        out.dashboard.price_levels.support.description =
            self.map_text(&source.dashboard.price_levels.support.description);
        out.dashboard.put_call_ratio.status =
            self.map_text(&source.dashboard.put_call_ratio.status);
        out.dashboard.put_call_ratio.summary =
            self.map_text(&source.dashboard.put_call_ratio.summary);

        out.details.internals = self.map_chart_section(&source.details.internals);
        out.details.technicals = self.map_chart_section(&source.details.technicals);
        out.details.strategy = self.map_section(&source.details.strategy);
        out.details.fundamentals.headline = self.map_text(&source.details.fundamentals.headline);
        out.details.fundamentals.text = self.map_text(&source.details.fundamentals.text);
        out.details.fundamentals.vix.summary =
            self.map_text(&source.details.fundamentals.vix.summary);
        out.details.fundamentals.survey.summary =
            self.map_text(&source.details.fundamentals.survey.summary);
        out.details.fundamentals.bullets = source
            .details
            .fundamentals
            .bullets
            .iter()
            .map(|b| self.map_text(b))
            .collect();

        for row in &mut out.market_overview {
            row.name = self.map_text(&row.name);
        }
        for stock in &mut out.hot_stocks {
            stock.description = self.map_text(&stock.description);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::fixtures::valid_artifact_json;
    use crate::domain::contract::LlmAnalysisArtifact;
    use chrono::NaiveDate;

    fn source_report() -> LocalizedReport {
        let raw: LlmAnalysisArtifact =
            serde_json::from_value(valid_artifact_json("2026-08-07")).unwrap();
        let artifact = raw
            .validate_and_into_artifact(
                NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
                "morning",
                "ko",
            )
            .unwrap();
        artifact.report("ko").unwrap().clone()
    }

    #[tokio::test]
    async fn derived_report_is_structurally_isomorphic() {
        let source = source_report();
        let derived = GlossaryTranslator::default()
            .translate_report("en", &source)
            .await
            .unwrap();

        assert_eq!(derived.summary.score, source.summary.score);
        assert_eq!(derived.summary.evaluation, source.summary.evaluation);
        assert_eq!(
            derived.details.technicals.chart.labels.len(),
            source.details.technicals.chart.labels.len()
        );
        assert_eq!(
            derived.details.technicals.chart.series[0].values,
            source.details.technicals.chart.series[0].values
        );
        assert_eq!(derived.market_overview.len(), source.market_overview.len());
        assert_eq!(derived.hot_stocks.len(), source.hot_stocks.len());
        assert_eq!(
            derived.details.fundamentals.bullets.len(),
            source.details.fundamentals.bullets.len()
        );
    }

    #[tokio::test]
    async fn known_phrases_are_mapped_and_unknown_prose_passes_through() {
        let source = source_report();
        let derived = GlossaryTranslator::default()
            .translate_report("en", &source)
            .await
            .unwrap();

        assert_eq!(derived.details.technicals.headline, "Technicals");
        assert_eq!(derived.details.strategy.headline, "Strategy");
        // Values copied untouched.
        assert_eq!(
            derived.dashboard.price_levels.support.value,
            source.dashboard.price_levels.support.value
        );
    }
}
