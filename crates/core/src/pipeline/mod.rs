use crate::archive::ArchiveStore;
use crate::config::Settings;
use crate::domain::artifact::AnalysisArtifact;
use crate::ingest::{self, CollectorOptions, MarketDataClient, MarketSnapshot};
use crate::llm::anthropic::AnthropicClient;
use crate::llm::{GenerateInput, LlmClient};
use crate::resilience::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use crate::search::SearchClient;
use crate::time::session::Session;
use crate::translate::{GlossaryTranslator, Translator};
use crate::validate::{self, Overall, PlausibilityConfig};
use anyhow::Context;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

const DEFAULT_EVIDENCE_QUERIES: &[&str] = &[
    "US stock market close summary",
    "S&P 500 outlook analyst commentary",
    "Federal Reserve rate expectations",
    "VIX volatility market sentiment",
];

/// One breaker per named external dependency, created once per process and
/// passed around by handle. Nothing else may construct breakers.
pub struct Breakers {
    pub market_data: Arc<CircuitBreaker>,
    pub search: Arc<CircuitBreaker>,
    pub anthropic: Arc<CircuitBreaker>,
}

impl Breakers {
    pub fn new() -> Self {
        Self {
            market_data: Arc::new(CircuitBreaker::new(
                "market_data",
                CircuitBreakerConfig {
                    failure_threshold: 5,
                    recovery_timeout: Duration::from_secs(60),
                },
            )),
            search: Arc::new(CircuitBreaker::new(
                "search",
                CircuitBreakerConfig {
                    failure_threshold: 5,
                    recovery_timeout: Duration::from_secs(60),
                },
            )),
            // The model call is expensive; trip early and give it minutes to
            // recover.
            anthropic: Arc::new(CircuitBreaker::new(
                "anthropic",
                CircuitBreakerConfig {
                    failure_threshold: 2,
                    recovery_timeout: Duration::from_secs(120),
                },
            )),
        }
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        vec![
            self.market_data.snapshot(),
            self.search.snapshot(),
            self.anthropic.snapshot(),
        ]
    }
}

impl Default for Breakers {
    fn default() -> Self {
        Self::new()
    }
}

/// The back half of the pipeline: generate -> fill languages -> validate ->
/// rotate. Split from the collection side so it can run against an already
/// collected snapshot.
pub struct Publisher {
    pub llm: Box<dyn LlmClient>,
    pub translator: Box<dyn Translator>,
    pub archive: ArchiveStore,
    pub plausibility: PlausibilityConfig,
    pub base_lang: String,
    pub target_langs: Vec<String>,
}

impl Publisher {
    pub async fn publish(
        &self,
        snapshot: MarketSnapshot,
        evidence: String,
        as_of_date: NaiveDate,
        session_label: &str,
        dry_run: bool,
    ) -> anyhow::Result<AnalysisArtifact> {
        let mut languages = Vec::with_capacity(1 + self.target_langs.len());
        languages.push(self.base_lang.clone());
        languages.extend(self.target_langs.iter().cloned());

        let input = GenerateInput::try_new(
            as_of_date,
            session_label,
            languages,
            snapshot.clone(),
            evidence,
        )?;
        let mut artifact = self.llm.generate_analysis(input).await?;

        for lang in &self.target_langs {
            if artifact.languages.contains_key(lang) {
                continue;
            }
            tracing::info!(lang, "model omitted a language; filling via translator");
            let base = artifact
                .report(&self.base_lang)
                .context("generated artifact lost its base language")?
                .clone();
            let derived = self.translator.translate_report(lang, &base).await?;
            artifact.languages.insert(lang.clone(), derived);
        }

        let report = validate::validate_artifact(
            &artifact,
            &self.base_lang,
            Some(&snapshot),
            &self.plausibility,
            chrono::Utc::now().date_naive(),
        );
        match report.overall {
            Overall::Invalid => {
                tracing::error!(
                    report = %serde_json::to_string(&report).unwrap_or_default(),
                    "validation failed; publication halted"
                );
                anyhow::bail!("artifact failed validation: {}", report.errors.join("; "));
            }
            Overall::Warning => {
                tracing::warn!(
                    warnings = ?report.warnings,
                    "artifact published with plausibility warnings"
                );
            }
            Overall::Valid => {}
        }

        if dry_run {
            tracing::info!("dry run; skipping rotation");
            return Ok(artifact);
        }

        let staging = self.archive.staging_path();
        if let Some(parent) = staging.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(&artifact).context("failed to encode artifact")?;
        fs::write(&staging, bytes)
            .await
            .with_context(|| format!("failed to write staging artifact {}", staging.display()))?;
        self.archive.rotate(&staging).await?;

        Ok(artifact)
    }
}

/// Full scheduled run: collector and evidence gatherer concurrently, then
/// the publisher. The scheduler guarantees at most one active run; the
/// archive's single-writer assumption leans on that.
pub struct Pipeline {
    market_data: MarketDataClient,
    search: SearchClient,
    collector_options: CollectorOptions,
    evidence_queries: Vec<String>,
    breakers: Breakers,
    publisher: Publisher,
}

impl Pipeline {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let breakers = Breakers::new();
        let market_data = MarketDataClient::from_settings(settings)?;
        let search = SearchClient::from_settings(settings)?;
        let llm = AnthropicClient::from_settings(settings, Arc::clone(&breakers.anthropic))?;

        let evidence_queries = std::env::var("EVIDENCE_QUERIES")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|queries| !queries.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_EVIDENCE_QUERIES
                    .iter()
                    .map(|q| q.to_string())
                    .collect()
            });

        Ok(Self {
            market_data,
            search,
            collector_options: CollectorOptions::from_env(),
            evidence_queries,
            publisher: Publisher {
                llm: Box::new(llm),
                translator: Box::new(GlossaryTranslator::default()),
                archive: ArchiveStore::from_settings(settings),
                plausibility: PlausibilityConfig::from_env(),
                base_lang: settings.base_lang.clone(),
                target_langs: settings.target_langs.clone(),
            },
            breakers,
        })
    }

    pub async fn run(
        &self,
        as_of_date: NaiveDate,
        session: Session,
        dry_run: bool,
    ) -> anyhow::Result<()> {
        let outcome = self.try_run(as_of_date, session, dry_run).await;
        if let Err(err) = &outcome {
            self.report_failure(err, as_of_date, session).await;
        }
        outcome
    }

    async fn try_run(
        &self,
        as_of_date: NaiveDate,
        session: Session,
        dry_run: bool,
    ) -> anyhow::Result<()> {
        tracing::info!(%as_of_date, session = session.label(), dry_run, "pipeline run starting");

        // Evidence degradation is handled inside the gatherer; only the
        // collector can fail the run here.
        let (snapshot, evidence) = tokio::join!(
            ingest::collect_market_snapshot(
                &self.market_data,
                &self.breakers.market_data,
                as_of_date,
                &self.collector_options,
            ),
            self.search
                .gather_evidence(&self.breakers.search, &self.evidence_queries),
        );
        let snapshot = snapshot.context("market data collection failed")?;

        self.publisher
            .publish(snapshot, evidence, as_of_date, session.label(), dry_run)
            .await?;

        tracing::info!("pipeline run complete");
        Ok(())
    }

    async fn report_failure(&self, err: &anyhow::Error, as_of_date: NaiveDate, session: Session) {
        let snapshots = self.breakers.snapshots();
        tracing::error!(
            %as_of_date,
            session = session.label(),
            error = %format!("{err:#}"),
            breakers = %serde_json::to_string(&snapshots).unwrap_or_default(),
            "pipeline run failed; previous latest remains authoritative"
        );

        // First-run failure still has to leave the site serviceable.
        let fallback = AnalysisArtifact::fallback(as_of_date, session.label(), &self.publisher.base_lang);
        if let Err(fallback_err) = self.publisher.archive.write_fallback(&fallback).await {
            tracing::error!(
                error = %format!("{fallback_err:#}"),
                "failed to write fallback artifact"
            );
        }
    }
}
