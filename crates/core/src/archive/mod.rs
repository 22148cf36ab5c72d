use crate::domain::artifact::{AnalysisArtifact, ManifestEntry};
use crate::time::session::slot_code_for;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::fs;

const DEFAULT_MAX_MANIFEST_ENTRIES: usize = 50;
const SHORT_SUMMARY_CHARS: usize = 120;
const LATEST_FILE: &str = "latest.json";
const MANIFEST_FILE: &str = "manifest.json";
const STAGING_FILE: &str = "staging.json";
const ARCHIVE_SUBDIR: &str = "archive";

/// Deterministic archive filename: fixed-width calendar stamp plus the
/// session slot code.
pub fn archive_file_name(date: NaiveDate, session: &str) -> String {
    format!("{}{}.json", date.format("%Y%m%d"), slot_code_for(session))
}

/// Prepend the newest entry and drop the oldest beyond the cap.
pub fn prepend_and_truncate(
    entries: &mut Vec<ManifestEntry>,
    entry: ManifestEntry,
    max_entries: usize,
) {
    entries.insert(0, entry);
    entries.truncate(max_entries);
}

/// Durable ownership boundary of the pipeline: the "latest" artifact, the
/// archive directory and the manifest index. Single writer by scheduling;
/// no locks.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
    latest_path: PathBuf,
    manifest_path: PathBuf,
    archive_dir: PathBuf,
    base_lang: String,
    max_manifest_entries: usize,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>, base_lang: impl Into<String>, max_manifest_entries: usize) -> Self {
        let root = root.into();
        Self {
            latest_path: root.join(LATEST_FILE),
            manifest_path: root.join(MANIFEST_FILE),
            archive_dir: root.join(ARCHIVE_SUBDIR),
            base_lang: base_lang.into(),
            max_manifest_entries,
            root,
        }
    }

    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        let max = std::env::var("MANIFEST_MAX_ENTRIES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_MANIFEST_ENTRIES);
        Self::new(&settings.archive_dir, &settings.base_lang, max)
    }

    pub fn latest_path(&self) -> &Path {
        &self.latest_path
    }

    /// Scratch location for a freshly generated artifact before `rotate`
    /// promotes it.
    pub fn staging_path(&self) -> PathBuf {
        self.root.join(STAGING_FILE)
    }

    pub async fn load_latest(&self) -> Result<Option<AnalysisArtifact>> {
        let bytes = match fs::read(&self.latest_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read latest artifact at {}", self.latest_path.display())
                })
            }
        };
        let artifact = serde_json::from_slice(&bytes)
            .context("latest artifact exists but is not valid JSON")?;
        Ok(Some(artifact))
    }

    pub async fn load_manifest(&self) -> Result<Vec<ManifestEntry>> {
        let bytes = match fs::read(&self.manifest_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read manifest at {}", self.manifest_path.display())
                })
            }
        };
        serde_json::from_slice(&bytes).context("manifest exists but is not valid JSON")
    }

    /// Promote `new_artifact_path` to "latest".
    ///
    /// Ordering is fail-closed: the current latest is snapshotted into the
    /// archive before it is replaced, and the manifest is only touched after
    /// the replacement succeeded. A failure between those two steps leaves
    /// archive and live copies inconsistent and is logged as critical rather
    /// than blindly retried.
    pub async fn rotate(&self, new_artifact_path: &Path) -> Result<()> {
        // The incoming artifact must parse before anything is touched.
        let new_bytes = fs::read(new_artifact_path).await.with_context(|| {
            format!("failed to read new artifact at {}", new_artifact_path.display())
        })?;
        let new_artifact: AnalysisArtifact = serde_json::from_slice(&new_bytes)
            .context("new artifact is not a valid analysis JSON document")?;
        let entry = self.manifest_entry(&new_artifact)?;

        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create archive root {}", self.root.display()))?;

        let had_previous = match self.load_latest().await? {
            Some(current) => {
                let archive_name = archive_file_name(current.date, &current.session);
                fs::create_dir_all(&self.archive_dir).await.with_context(|| {
                    format!("failed to create archive directory {}", self.archive_dir.display())
                })?;
                let archive_path = self.archive_dir.join(&archive_name);
                fs::copy(&self.latest_path, &archive_path)
                    .await
                    .with_context(|| format!("failed to archive current latest as {archive_name}"))?;
                tracing::info!(archive = %archive_path.display(), "archived previous latest");
                true
            }
            None => {
                tracing::info!("no previous latest; skipping archive step");
                false
            }
        };

        if let Err(err) = self.replace_latest(&new_bytes).await {
            if had_previous {
                tracing::error!(
                    critical = true,
                    error = %format!("{err:#}"),
                    "latest replace failed after archive copy; archive and live copies are inconsistent"
                );
            }
            return Err(err);
        }

        if let Err(err) = self.update_manifest(entry).await {
            tracing::error!(
                critical = true,
                error = %format!("{err:#}"),
                "manifest update failed after latest was replaced"
            );
            return Err(err);
        }

        tracing::info!(
            latest = %self.latest_path.display(),
            date = %new_artifact.date,
            session = %new_artifact.session,
            "rotation complete"
        );
        Ok(())
    }

    /// Write a placeholder into the serving location, only if nothing is
    /// being served yet. Failed runs must never clobber a good latest.
    pub async fn write_fallback(&self, artifact: &AnalysisArtifact) -> Result<()> {
        if fs::try_exists(&self.latest_path).await.unwrap_or(false) {
            tracing::info!("latest artifact already present; fallback not written");
            return Ok(());
        }

        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create archive root {}", self.root.display()))?;
        let bytes = serde_json::to_vec_pretty(artifact).context("failed to encode fallback artifact")?;
        self.replace_latest(&bytes).await?;
        tracing::warn!(
            latest = %self.latest_path.display(),
            "wrote fallback artifact into empty serving location"
        );
        Ok(())
    }

    async fn replace_latest(&self, bytes: &[u8]) -> Result<()> {
        let tmp = self.latest_path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.latest_path)
            .await
            .with_context(|| format!("failed to move new artifact into {}", self.latest_path.display()))
    }

    async fn update_manifest(&self, entry: ManifestEntry) -> Result<()> {
        let mut entries = self.load_manifest().await?;
        prepend_and_truncate(&mut entries, entry, self.max_manifest_entries);

        let bytes = serde_json::to_vec_pretty(&entries).context("failed to encode manifest")?;
        let tmp = self.manifest_path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.manifest_path)
            .await
            .with_context(|| format!("failed to move manifest into {}", self.manifest_path.display()))
    }

    fn manifest_entry(&self, artifact: &AnalysisArtifact) -> Result<ManifestEntry> {
        let report = artifact
            .report(&self.base_lang)
            .or_else(|| artifact.languages.values().next())
            .context("artifact has no languages; cannot derive a manifest entry")?;

        let short_summary: String = report
            .summary
            .text
            .chars()
            .take(SHORT_SUMMARY_CHARS)
            .collect();

        Ok(ManifestEntry {
            archive_file: archive_file_name(artifact.date, &artifact.session),
            display_date: artifact.date.format("%Y-%m-%d").to_string(),
            session: artifact.session.clone(),
            evaluation: report.summary.evaluation,
            headline: report.summary.headline.clone(),
            short_summary,
        })
    }
}
