use super::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Where an artifact's timestamp came from. Bulk listings on some source
/// hosts report stale or truncated timestamps, so a per-object stat is
/// the trusted source; `Degraded` marks entries where the stat failed and
/// the bulk value had to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampConfidence {
    Exact,
    Degraded,
}

/// One object as reported by the source host.
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    pub name: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub confidence: TimestampConfidence,
}

/// A downloaded artifact staged on the local filesystem, owned by the
/// current run.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Listing, stat and streaming-read capabilities of the source file host.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Bulk listing of the configured remote directory. Timestamps are
    /// listing-quality (`Degraded`) until confirmed by `stat`.
    async fn list(&self) -> Result<Vec<SourceArtifact>, PipelineError>;

    /// Per-object stat; returns an `Exact`-confidence artifact.
    async fn stat(&self, name: &str) -> Result<SourceArtifact, PipelineError>;

    /// Download one object to `dest`, returning the bytes written.
    async fn download(&self, name: &str, dest: &Path) -> Result<u64, PipelineError>;
}

/// Replace bulk-listing timestamps with per-object stat results for every
/// artifact matching `suffix`. A failed stat keeps the bulk entry with
/// `Degraded` confidence and records a warning; it never fails the run.
pub async fn refresh_timestamps(
    host: &dyn SourceHost,
    listing: Vec<SourceArtifact>,
    suffix: &str,
    warnings: &mut Vec<String>,
) -> Vec<SourceArtifact> {
    let mut refreshed = Vec::with_capacity(listing.len());
    for artifact in listing {
        if !artifact.name.ends_with(suffix) {
            refreshed.push(artifact);
            continue;
        }
        match host.stat(&artifact.name).await {
            Ok(statted) => {
                if statted.modified_at != artifact.modified_at {
                    tracing::debug!(
                        "stat timestamp for {} ({}) overrides listing ({})",
                        artifact.name,
                        statted.modified_at,
                        artifact.modified_at
                    );
                }
                refreshed.push(statted);
            }
            Err(e) => {
                tracing::warn!(
                    "stat failed for {}, falling back to listing timestamp: {}",
                    artifact.name,
                    e
                );
                warnings.push(format!(
                    "timestamp confidence degraded for {}: stat failed ({})",
                    artifact.name, e
                ));
                refreshed.push(artifact);
            }
        }
    }
    refreshed
}

/// Select the artifact to relay: the suffix-matching entry with the most
/// recent `modified_at`, ties broken by lexicographically greatest name.
pub fn select_latest(
    listing: &[SourceArtifact],
    suffix: &str,
) -> Result<SourceArtifact, PipelineError> {
    listing
        .iter()
        .filter(|a| a.name.ends_with(suffix))
        .max_by(|a, b| {
            a.modified_at
                .cmp(&b.modified_at)
                .then_with(|| a.name.cmp(&b.name))
        })
        .cloned()
        .ok_or_else(|| PipelineError::NoArtifactFound {
            suffix: suffix.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn artifact(name: &str, ts: i64) -> SourceArtifact {
        SourceArtifact {
            name: name.to_string(),
            size_bytes: 1024,
            modified_at: Utc.timestamp_opt(ts, 0).unwrap(),
            confidence: TimestampConfidence::Degraded,
        }
    }

    #[test]
    fn test_select_latest_by_mtime() {
        let listing = vec![
            artifact("b1.zpaq", 100),
            artifact("b3.zpaq", 400),
            artifact("b2.zpaq", 200),
        ];
        let latest = select_latest(&listing, ".zpaq").unwrap();
        assert_eq!(latest.name, "b3.zpaq");
    }

    #[test]
    fn test_select_latest_tie_breaks_on_greater_name() {
        let listing = vec![artifact("a.zpaq", 100), artifact("z.zpaq", 100)];
        let latest = select_latest(&listing, ".zpaq").unwrap();
        assert_eq!(latest.name, "z.zpaq");
    }

    #[test]
    fn test_select_latest_applies_suffix_filter() {
        let listing = vec![artifact("notes.txt", 999), artifact("b1.zpaq", 10)];
        let latest = select_latest(&listing, ".zpaq").unwrap();
        assert_eq!(latest.name, "b1.zpaq");
    }

    #[test]
    fn test_select_latest_empty_is_no_artifact_found() {
        let err = select_latest(&[artifact("readme.md", 5)], ".zpaq").unwrap_err();
        assert!(matches!(err, PipelineError::NoArtifactFound { .. }));
    }

    /// Stat host where one object has a fresher stat timestamp than the
    /// bulk listing and another fails to stat entirely.
    struct FlakyStatHost {
        statted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SourceHost for FlakyStatHost {
        async fn list(&self) -> Result<Vec<SourceArtifact>, PipelineError> {
            unimplemented!("not used by refresh tests")
        }

        async fn stat(&self, name: &str) -> Result<SourceArtifact, PipelineError> {
            self.statted.lock().unwrap().push(name.to_string());
            if name == "broken.zpaq" {
                return Err(PipelineError::Transfer("stat refused".into()));
            }
            Ok(SourceArtifact {
                name: name.to_string(),
                size_bytes: 2048,
                // Stat reports a much later mtime than the bulk listing.
                modified_at: Utc.timestamp_opt(5000, 0).unwrap(),
                confidence: TimestampConfidence::Exact,
            })
        }

        async fn download(&self, _name: &str, _dest: &Path) -> Result<u64, PipelineError> {
            unimplemented!("not used by refresh tests")
        }
    }

    #[tokio::test]
    async fn test_refresh_prefers_stat_timestamp() {
        let host = FlakyStatHost {
            statted: Mutex::new(Vec::new()),
        };
        let mut warnings = Vec::new();
        let refreshed = refresh_timestamps(
            &host,
            vec![artifact("old-looking.zpaq", 100), artifact("skip.txt", 900)],
            ".zpaq",
            &mut warnings,
        )
        .await;

        let entry = refreshed.iter().find(|a| a.name == "old-looking.zpaq").unwrap();
        assert_eq!(entry.modified_at, Utc.timestamp_opt(5000, 0).unwrap());
        assert_eq!(entry.confidence, TimestampConfidence::Exact);
        assert!(warnings.is_empty());
        // Non-matching names are never statted.
        assert_eq!(*host.statted.lock().unwrap(), vec!["old-looking.zpaq"]);
    }

    #[tokio::test]
    async fn test_refresh_stat_failure_degrades_not_errors() {
        let host = FlakyStatHost {
            statted: Mutex::new(Vec::new()),
        };
        let mut warnings = Vec::new();
        let refreshed = refresh_timestamps(
            &host,
            vec![artifact("broken.zpaq", 300)],
            ".zpaq",
            &mut warnings,
        )
        .await;

        assert_eq!(refreshed.len(), 1);
        assert_eq!(refreshed[0].confidence, TimestampConfidence::Degraded);
        assert_eq!(refreshed[0].modified_at, Utc.timestamp_opt(300, 0).unwrap());
        assert_eq!(warnings.len(), 1);
    }
}
