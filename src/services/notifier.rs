use super::pipeline::{RunOutcome, RunStatus};
use async_trait::async_trait;

/// Consumes the outcome of a run. Delivery (mail, webhook) lives outside
/// this crate; the shipped implementation renders through the log.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, outcome: &RunOutcome);
}

/// Human-readable run summary, one line per fact.
pub fn summary(outcome: &RunOutcome) -> String {
    match outcome.status {
        RunStatus::Success => {
            let mut text = format!(
                "BACKUP RELAYED\nArtifact: {}\nPublished as: {}\nSize: {} bytes\nDigest: sha256:{}\nDeleted old backups: {}",
                outcome.artifact_name.as_deref().unwrap_or("?"),
                outcome.remote_name.as_deref().unwrap_or("?"),
                outcome.size_bytes.unwrap_or(0),
                outcome.digest.as_deref().unwrap_or("?"),
                outcome.deleted.len(),
            );
            for warning in &outcome.warnings {
                text.push_str("\nWarning: ");
                text.push_str(warning);
            }
            text
        }
        RunStatus::Failure => format!(
            "BACKUP FAILED\nKind: {}\nError: {}",
            outcome.error_kind.as_deref().unwrap_or("unknown"),
            outcome.error_message.as_deref().unwrap_or("unknown"),
        ),
    }
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, outcome: &RunOutcome) {
        match outcome.status {
            RunStatus::Success if outcome.warnings.is_empty() => {
                tracing::info!("✅ {}", summary(outcome).replace('\n', " | "));
            }
            RunStatus::Success => {
                tracing::warn!("✅ {}", summary(outcome).replace('\n', " | "));
            }
            RunStatus::Failure => {
                tracing::error!("❌ {}", summary(outcome).replace('\n', " | "));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pipeline::RunStage;

    #[test]
    fn test_success_summary() {
        let outcome = RunOutcome {
            status: RunStatus::Success,
            artifact_name: Some("site.zpaq".into()),
            size_bytes: Some(42),
            digest: Some("abc123".into()),
            remote_name: Some("site_2025-08-28_06-00-00.zpaq".into()),
            deleted: vec!["old.zpaq".into()],
            warnings: vec!["delete failed for x".into()],
            error_kind: None,
            error_message: None,
            failed_stage: None,
        };
        let text = summary(&outcome);
        assert!(text.contains("BACKUP RELAYED"));
        assert!(text.contains("site_2025-08-28_06-00-00.zpaq"));
        assert!(text.contains("Deleted old backups: 1"));
        assert!(text.contains("Warning: delete failed for x"));
    }

    #[test]
    fn test_failure_summary() {
        let outcome = RunOutcome {
            status: RunStatus::Failure,
            artifact_name: None,
            size_bytes: None,
            digest: None,
            remote_name: None,
            deleted: vec![],
            warnings: vec![],
            error_kind: Some("TransferError".into()),
            error_message: Some("connection reset".into()),
            failed_stage: Some(RunStage::Downloading),
        };
        let text = summary(&outcome);
        assert!(text.contains("BACKUP FAILED"));
        assert!(text.contains("TransferError"));
        assert!(text.contains("connection reset"));
    }
}
