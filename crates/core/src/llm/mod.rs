pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::artifact::AnalysisArtifact;
use crate::ingest::MarketSnapshot;
use anyhow::ensure;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy)]
pub enum Provider {
    Anthropic,
}

/// Everything the generator embeds in one prompt. `languages` lists the
/// language codes the model must produce, base language first.
#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub as_of_date: NaiveDate,
    pub session: String,
    pub languages: Vec<String>,
    pub snapshot: MarketSnapshot,
    pub evidence: String,
}

impl GenerateInput {
    pub fn try_new(
        as_of_date: NaiveDate,
        session: impl Into<String>,
        languages: Vec<String>,
        snapshot: MarketSnapshot,
        evidence: impl Into<String>,
    ) -> anyhow::Result<Self> {
        ensure!(
            !languages.is_empty(),
            "at least one output language is required"
        );
        Ok(Self {
            as_of_date,
            session: session.into(),
            languages,
            snapshot,
            evidence: evidence.into(),
        })
    }

    pub fn base_lang(&self) -> &str {
        &self.languages[0]
    }
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_analysis(&self, input: GenerateInput) -> anyhow::Result<AnalysisArtifact>;
}
