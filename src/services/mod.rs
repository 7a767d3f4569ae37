use thiserror::Error;

pub mod destination;
pub mod listing;
pub mod notifier;
pub mod pipeline;
pub mod retention;
pub mod sftp;
pub mod source;
pub mod verify;

/// Error taxonomy for one pipeline run.
///
/// The first four kinds are fatal: the run aborts and reports `Failure`.
/// `Listing` and `Delete` occur after the artifact has already been
/// published, so they degrade the outcome to Success-with-warnings
/// instead of masking a completed backup.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no artifact matching \"{suffix}\" found on source host")]
    NoArtifactFound { suffix: String },

    #[error("source transfer failed: {0}")]
    Transfer(String),

    #[error("incomplete transfer: expected {expected} bytes, staged file has {actual}")]
    IncompleteTransfer { expected: u64, actual: u64 },

    #[error("destination rejected upload ({}): {message}", status_label(.status))]
    Upload { status: Option<u16>, message: String },

    #[error("destination listing failed: {0}")]
    Listing(String),

    #[error("failed to delete \"{name}\": {message}")]
    Delete { name: String, message: String },
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no response".to_string(),
    }
}

impl PipelineError {
    /// Stable kind tag surfaced in the `RunOutcome` for the notifier.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NoArtifactFound { .. } => "NoArtifactFound",
            PipelineError::Transfer(_) => "TransferError",
            PipelineError::IncompleteTransfer { .. } => "IncompleteTransferError",
            PipelineError::Upload { .. } => "UploadError",
            PipelineError::Listing(_) => "ListingError",
            PipelineError::Delete { .. } => "DeleteError",
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::Listing(_) | PipelineError::Delete { .. }
        )
    }
}
