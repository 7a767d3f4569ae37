use super::PipelineError;
use super::destination::DestinationStore;
use super::source::{SourceHost, StagedFile, TimestampConfidence, select_latest};
use super::{listing, retention, source};
use crate::config::RelayConfig;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Stages of one run, strictly linear with no back-edges. `Failed` is
/// reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    ConnectingSource,
    ListingSource,
    Selecting,
    Downloading,
    Verifying,
    Publishing,
    ListingDestination,
    Retaining,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

/// The sole externally visible result of a pipeline run, handed to the
/// notifier and returned by the trigger endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub artifact_name: Option<String>,
    pub size_bytes: Option<u64>,
    pub digest: Option<String>,
    pub remote_name: Option<String>,
    pub deleted: Vec<String>,
    /// Non-fatal problems: degraded timestamps, skipped retention,
    /// per-entry delete failures. "Backup is safe, cleanup needs
    /// attention."
    pub warnings: Vec<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub failed_stage: Option<RunStage>,
}

impl RunOutcome {
    fn pending() -> Self {
        Self {
            status: RunStatus::Failure,
            artifact_name: None,
            size_bytes: None,
            digest: None,
            remote_name: None,
            deleted: Vec::new(),
            warnings: Vec::new(),
            error_kind: None,
            error_message: None,
            failed_stage: None,
        }
    }
}

/// Sequences one fetch-publish-retain cycle. Holds its configuration as
/// an immutable value for the whole run; every collaborator is a trait
/// object so the pipeline can be driven end-to-end in tests.
pub struct Pipeline {
    config: RelayConfig,
    source: Arc<dyn SourceHost>,
    store: Arc<dyn DestinationStore>,
    stage: RunStage,
}

impl Pipeline {
    pub fn new(
        config: RelayConfig,
        source: Arc<dyn SourceHost>,
        store: Arc<dyn DestinationStore>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            stage: RunStage::Idle,
        }
    }

    fn advance(&mut self, next: RunStage) {
        tracing::debug!("run stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    /// Execute one full run. Never returns an error: fatal failures are
    /// encoded in the outcome, and anything after a successful publish
    /// only degrades the outcome with warnings.
    pub async fn run(mut self) -> RunOutcome {
        let mut outcome = RunOutcome::pending();
        match self.execute(&mut outcome).await {
            Ok(()) => {
                self.advance(RunStage::Done);
                outcome.status = RunStatus::Success;
            }
            Err(err) => {
                let failed_at = self.stage;
                self.advance(RunStage::Failed);
                tracing::error!("❌ Run failed during {:?}: {}", failed_at, err);
                outcome.status = RunStatus::Failure;
                outcome.error_kind = Some(err.kind().to_string());
                outcome.error_message = Some(err.to_string());
                outcome.failed_stage = Some(failed_at);
            }
        }
        outcome
    }

    async fn execute(&mut self, outcome: &mut RunOutcome) -> Result<(), PipelineError> {
        let suffix = self.config.artifact_suffix.clone();

        // Source connections are opened per call by the host; the stage
        // is still tracked so failures report where they happened.
        self.advance(RunStage::ConnectingSource);
        self.advance(RunStage::ListingSource);
        let bulk = self.source.list().await?;
        tracing::info!("📄 Source listing: {} objects", bulk.len());

        self.advance(RunStage::Selecting);
        let refreshed =
            source::refresh_timestamps(self.source.as_ref(), bulk, &suffix, &mut outcome.warnings)
                .await;
        let artifact = select_latest(&refreshed, &suffix)?;
        if artifact.confidence == TimestampConfidence::Degraded {
            tracing::warn!(
                "selected {} on a degraded (bulk-listing) timestamp",
                artifact.name
            );
        }
        tracing::info!(
            "🎯 Selected {} ({} bytes, modified {})",
            artifact.name,
            artifact.size_bytes,
            artifact.modified_at
        );
        outcome.artifact_name = Some(artifact.name.clone());

        self.advance(RunStage::Downloading);
        tokio::fs::create_dir_all(&self.config.staging_dir)
            .await
            .map_err(|e| {
                PipelineError::Transfer(format!(
                    "create staging dir {}: {}",
                    self.config.staging_dir.display(),
                    e
                ))
            })?;
        let dest = self.config.staging_dir.join(&artifact.name);
        let written = self.source.download(&artifact.name, &dest).await?;
        let staged = StagedFile {
            path: dest,
            size_bytes: written,
        };
        tracing::info!("⬇️  Downloaded {} bytes to {}", written, staged.path.display());

        self.advance(RunStage::Verifying);
        let digest = super::verify::verify(&staged, artifact.size_bytes).await?;
        outcome.size_bytes = Some(staged.size_bytes);
        outcome.digest = Some(digest);

        self.advance(RunStage::Publishing);
        let remote_name = unique_remote_name(&artifact.name, &suffix);
        self.store.publish(&staged, &remote_name).await?;
        outcome.remote_name = Some(remote_name);

        // From here on the backup already succeeded; listing or cleanup
        // trouble must not mask it.
        self.advance(RunStage::ListingDestination);
        let document = match self.store.fetch_listing().await {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!("⚠️  Destination listing failed, retention skipped: {}", err);
                outcome.warnings.push(err.to_string());
                return Ok(());
            }
        };
        let entries = match listing::parse_listing(&document, &self.store.root_path(), &suffix) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("⚠️  Listing unparseable, retention skipped: {}", err);
                outcome.warnings.push(err.to_string());
                return Ok(());
            }
        };
        tracing::info!("🗂️  Destination holds {} matching entries", entries.len());

        self.advance(RunStage::Retaining);
        let decision = retention::plan(&entries, self.config.keep_count);
        for entry in &decision.delete {
            match self.store.remove(&entry.name).await {
                Ok(()) => {
                    tracing::info!("🧹 Deleted {} (modified {})", entry.name, entry.last_modified);
                    outcome.deleted.push(entry.name.clone());
                }
                Err(err) => {
                    tracing::warn!("⚠️  {}", err);
                    outcome.warnings.push(err.to_string());
                }
            }
        }
        Ok(())
    }
}

/// Remote object name for this run: artifact stem plus the run's UTC
/// timestamp. Unique per run, so repeated runs never overwrite a prior
/// artifact before retention has evaluated it.
fn unique_remote_name(artifact_name: &str, suffix: &str) -> String {
    let stem = artifact_name.strip_suffix(suffix).unwrap_or(artifact_name);
    let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    format!("{stem}_{stamp}{suffix}")
}
