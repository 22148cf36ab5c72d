use crate::domain::artifact::{AnalysisArtifact, LocalizedReport, SectionWithChart};
use crate::ingest::MarketSnapshot;
use chrono::NaiveDate;
use serde::Serialize;

const DEFAULT_INDEX_TOLERANCE_POINTS: f64 = 80.0;
const DEFAULT_VIX_TOLERANCE_POINTS: f64 = 8.0;
const DEFAULT_SENTIMENT_TOLERANCE_POINTS: f64 = 25.0;
const DEFAULT_FRESHNESS_DAYS: i64 = 5;
const DEFAULT_MIN_BODY_CHARS: usize = 40;
const DEFAULT_MAX_HEADLINE_CHARS: usize = 120;

/// Operator-tunable thresholds for the soft plausibility checks. Nothing in
/// here is hardcoded at a call site; every value can be overridden from the
/// environment.
#[derive(Debug, Clone)]
pub struct PlausibilityConfig {
    pub index_tolerance_points: f64,
    pub vix_tolerance_points: f64,
    pub sentiment_tolerance_points: f64,
    pub freshness_days: i64,
    pub min_body_chars: usize,
    pub max_headline_chars: usize,

    /// Promote warnings to a hard failure.
    pub strict: bool,
}

impl Default for PlausibilityConfig {
    fn default() -> Self {
        Self {
            index_tolerance_points: DEFAULT_INDEX_TOLERANCE_POINTS,
            vix_tolerance_points: DEFAULT_VIX_TOLERANCE_POINTS,
            sentiment_tolerance_points: DEFAULT_SENTIMENT_TOLERANCE_POINTS,
            freshness_days: DEFAULT_FRESHNESS_DAYS,
            min_body_chars: DEFAULT_MIN_BODY_CHARS,
            max_headline_chars: DEFAULT_MAX_HEADLINE_CHARS,
            strict: false,
        }
    }
}

impl PlausibilityConfig {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        fn read<T: std::str::FromStr>(key: &str, into: &mut T) {
            if let Ok(s) = std::env::var(key) {
                if let Ok(v) = s.parse::<T>() {
                    *into = v;
                }
            }
        }

        read("VALIDATION_INDEX_TOLERANCE_POINTS", &mut out.index_tolerance_points);
        read("VALIDATION_VIX_TOLERANCE_POINTS", &mut out.vix_tolerance_points);
        read(
            "VALIDATION_SENTIMENT_TOLERANCE_POINTS",
            &mut out.sentiment_tolerance_points,
        );
        read("VALIDATION_FRESHNESS_DAYS", &mut out.freshness_days);
        read("VALIDATION_MIN_BODY_CHARS", &mut out.min_body_chars);
        read("VALIDATION_MAX_HEADLINE_CHARS", &mut out.max_headline_chars);

        if let Ok(s) = std::env::var("VALIDATION_STRICT") {
            out.strict = matches!(s.trim(), "1" | "true" | "TRUE");
        }

        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Overall {
    Valid,
    Warning,
    Invalid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub overall: Overall,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Gate one artifact before publication. Errors are schema violations and
/// halt publication; warnings are plausibility findings that publish but
/// must stay operator-visible.
pub fn validate_artifact(
    artifact: &AnalysisArtifact,
    base_lang: &str,
    reference: Option<&MarketSnapshot>,
    config: &PlausibilityConfig,
    today: NaiveDate,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !artifact.languages.contains_key(base_lang) {
        errors.push(format!("base language '{base_lang}' is missing"));
    }

    for (lang, report) in &artifact.languages {
        check_schema(lang, report, &mut errors);
        check_text_quality(lang, report, config, &mut warnings);
    }

    if let Some(report) = artifact.report(base_lang) {
        if let Some(reference) = reference {
            check_against_reference(report, reference, config, &mut warnings);
        }
    }

    let age_days = (today - artifact.date).num_days();
    if age_days > config.freshness_days {
        warnings.push(format!(
            "artifact date {} is {age_days} days old (freshness window: {} days)",
            artifact.date, config.freshness_days
        ));
    }

    let overall = if !errors.is_empty() {
        Overall::Invalid
    } else if !warnings.is_empty() {
        if config.strict {
            Overall::Invalid
        } else {
            Overall::Warning
        }
    } else {
        Overall::Valid
    };

    ValidationReport {
        overall,
        errors,
        warnings,
    }
}

fn check_schema(lang: &str, report: &LocalizedReport, errors: &mut Vec<String>) {
    let summary = &report.summary;
    if !(1..=10).contains(&summary.score) {
        errors.push(format!(
            "{lang}: summary.score must be an integer in [1, 10] (got {})",
            summary.score
        ));
    }
    if summary.headline.trim().is_empty() {
        errors.push(format!("{lang}: summary.headline must be non-empty"));
    }

    let breadth = &report.dashboard.breadth;
    if breadth.advancers < 0 {
        errors.push(format!(
            "{lang}: breadth.advancers must be >= 0 (got {})",
            breadth.advancers
        ));
    }
    if breadth.decliners < 0 {
        errors.push(format!(
            "{lang}: breadth.decliners must be >= 0 (got {})",
            breadth.decliners
        ));
    }

    let sentiment = report.dashboard.sentiment_index.value;
    if !(0.0..=100.0).contains(&sentiment) {
        errors.push(format!(
            "{lang}: sentimentIndex.value must be in [0, 100] (got {sentiment})"
        ));
    }

    check_chart(lang, "details.internals", &report.details.internals, errors);
    check_chart(lang, "details.technicals", &report.details.technicals, errors);
}

fn check_chart(lang: &str, path: &str, section: &SectionWithChart, errors: &mut Vec<String>) {
    let chart = &section.chart;
    if chart.labels.is_empty() {
        errors.push(format!("{lang}: {path}.chart.labels must be non-empty"));
    }
    if chart.series.is_empty() {
        errors.push(format!("{lang}: {path}.chart.series must be non-empty"));
    }
    for series in &chart.series {
        if series.values.len() != chart.labels.len() {
            errors.push(format!(
                "{lang}: {path}.chart series '{}' has {} values for {} labels",
                series.name,
                series.values.len(),
                chart.labels.len()
            ));
        }
    }
}

fn check_text_quality(
    lang: &str,
    report: &LocalizedReport,
    config: &PlausibilityConfig,
    warnings: &mut Vec<String>,
) {
    let headline_chars = report.summary.headline.chars().count();
    if headline_chars > config.max_headline_chars {
        warnings.push(format!(
            "{lang}: summary.headline is {headline_chars} chars (max {})",
            config.max_headline_chars
        ));
    }

    // Fixed field set for both the length gate and duplicate detection.
    let text_fields = [
        ("summary.text", &report.summary.text),
        ("details.internals.text", &report.details.internals.text),
        ("details.technicals.text", &report.details.technicals.text),
        (
            "details.fundamentals.text",
            &report.details.fundamentals.text,
        ),
        ("details.strategy.text", &report.details.strategy.text),
    ];

    for (path, text) in &text_fields {
        let chars = text.chars().count();
        if chars < config.min_body_chars {
            warnings.push(format!(
                "{lang}: {path} is {chars} chars (min {})",
                config.min_body_chars
            ));
        }
    }

    for (i, (path_a, text_a)) in text_fields.iter().enumerate() {
        for (path_b, text_b) in text_fields.iter().skip(i + 1) {
            if !text_a.is_empty() && text_a.to_lowercase() == text_b.to_lowercase() {
                warnings.push(format!(
                    "{lang}: {path_a} and {path_b} contain identical text"
                ));
            }
        }
    }
}

fn check_against_reference(
    report: &LocalizedReport,
    reference: &MarketSnapshot,
    config: &PlausibilityConfig,
    warnings: &mut Vec<String>,
) {
    let levels = &report.dashboard.price_levels;
    for (path, value) in [
        ("priceLevels.resistance", levels.resistance.value),
        ("priceLevels.support", levels.support.value),
    ] {
        let diff = (value - reference.index_price).abs();
        if diff > config.index_tolerance_points {
            warnings.push(format!(
                "{path} {value:.2} is {diff:.1} points from reference index {:.2} (tolerance {:.1})",
                reference.index_price, config.index_tolerance_points
            ));
        }
    }

    if let Some(vix) = reference.volatility_index {
        let reported = report.details.fundamentals.vix.value;
        let diff = (reported - vix).abs();
        if diff > config.vix_tolerance_points {
            warnings.push(format!(
                "fundamentals.vix {reported:.2} is {diff:.1} points from reference VIX {vix:.2} (tolerance {:.1})",
                config.vix_tolerance_points
            ));
        }
    }

    let reported_sentiment = report.dashboard.sentiment_index.value;
    let diff = (reported_sentiment - reference.sentiment_index).abs();
    if diff > config.sentiment_tolerance_points {
        warnings.push(format!(
            "sentimentIndex {reported_sentiment:.1} is {diff:.1} points from reference gauge {:.1} (tolerance {:.1})",
            reference.sentiment_index, config.sentiment_tolerance_points
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::fixtures::valid_artifact_json;
    use crate::domain::contract::LlmAnalysisArtifact;
    use std::collections::BTreeMap;

    fn artifact() -> AnalysisArtifact {
        let raw: LlmAnalysisArtifact =
            serde_json::from_value(valid_artifact_json("2026-08-07")).unwrap();
        raw.validate_and_into_artifact(
            NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            "morning",
            "ko",
        )
        .unwrap()
    }

    fn reference() -> MarketSnapshot {
        MarketSnapshot {
            as_of_date: NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            index_price: 5150.0,
            sentiment_index: 62.0,
            secondary_index_price: None,
            volatility_index: Some(14.0),
            treasury_yield_10y: None,
            put_call_ratio: None,
            sources: BTreeMap::new(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
    }

    #[test]
    fn valid_artifact_passes_clean() {
        let report = validate_artifact(
            &artifact(),
            "ko",
            Some(&reference()),
            &PlausibilityConfig::default(),
            today(),
        );
        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
        assert_eq!(report.overall, Overall::Valid);
    }

    #[test]
    fn score_out_of_bounds_is_invalid() {
        let mut artifact = artifact();
        artifact.languages.get_mut("ko").unwrap().summary.score = 11;

        let report = validate_artifact(
            &artifact,
            "ko",
            None,
            &PlausibilityConfig::default(),
            today(),
        );
        assert_eq!(report.overall, Overall::Invalid);
        assert!(report.errors.iter().any(|e| e.contains("summary.score")));
    }

    #[test]
    fn max_score_with_flat_breadth_is_accepted() {
        let mut artifact = artifact();
        {
            let report = artifact.languages.get_mut("ko").unwrap();
            report.summary.score = 10;
            report.dashboard.breadth.advancers = 0;
            report.dashboard.breadth.decliners = 0;
        }

        let report = validate_artifact(
            &artifact,
            "ko",
            None,
            &PlausibilityConfig::default(),
            today(),
        );
        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    }

    #[test]
    fn negative_breadth_is_invalid() {
        let mut artifact = artifact();
        artifact
            .languages
            .get_mut("ko")
            .unwrap()
            .dashboard
            .breadth
            .decliners = -3;

        let report = validate_artifact(
            &artifact,
            "ko",
            None,
            &PlausibilityConfig::default(),
            today(),
        );
        assert_eq!(report.overall, Overall::Invalid);
    }

    #[test]
    fn chart_length_mismatch_is_invalid() {
        let mut artifact = artifact();
        artifact
            .languages
            .get_mut("ko")
            .unwrap()
            .details
            .technicals
            .chart
            .series[0]
            .values
            .pop();

        let report = validate_artifact(
            &artifact,
            "ko",
            None,
            &PlausibilityConfig::default(),
            today(),
        );
        assert_eq!(report.overall, Overall::Invalid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("details.technicals.chart")));
    }

    #[test]
    fn out_of_tolerance_price_level_warns_but_publishes() {
        let mut artifact = artifact();
        artifact
            .languages
            .get_mut("ko")
            .unwrap()
            .dashboard
            .price_levels
            .support
            .value = 4000.0;

        let report = validate_artifact(
            &artifact,
            "ko",
            Some(&reference()),
            &PlausibilityConfig::default(),
            today(),
        );
        assert_eq!(report.overall, Overall::Warning);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("priceLevels.support")));
    }

    #[test]
    fn stale_artifact_warns() {
        let report = validate_artifact(
            &artifact(),
            "ko",
            None,
            &PlausibilityConfig::default(),
            NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(),
        );
        assert_eq!(report.overall, Overall::Warning);
        assert!(report.warnings.iter().any(|w| w.contains("days old")));
    }

    #[test]
    fn duplicate_text_across_sections_warns() {
        let mut artifact = artifact();
        {
            let report = artifact.languages.get_mut("ko").unwrap();
            report.details.strategy.text = report.summary.text.to_uppercase();
        }

        let report = validate_artifact(
            &artifact,
            "ko",
            None,
            &PlausibilityConfig::default(),
            today(),
        );
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("identical text")));
    }

    #[test]
    fn strict_mode_promotes_warnings_to_invalid() {
        let config = PlausibilityConfig {
            strict: true,
            ..PlausibilityConfig::default()
        };
        let report = validate_artifact(
            &artifact(),
            "ko",
            None,
            &config,
            NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(),
        );
        assert_eq!(report.overall, Overall::Invalid);
        assert!(report.errors.is_empty());
    }
}
