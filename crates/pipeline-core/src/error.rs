//! Stage error taxonomy.
//!
//! Every stage crate returns this single enum so the orchestrator can map a
//! failure to an exit code (`stage_number * 10 + reason_class`) without
//! knowing the specifics of the stage that raised it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    // --- Input errors ---
    #[error("bad TLE format for {catalog_id}: {reason}")]
    BadTleFormat { catalog_id: String, reason: String },

    #[error("TLE checksum mismatch for {catalog_id}: line {line}, expected {expected}, got {found}")]
    ChecksumMismatch {
        catalog_id: String,
        line: u8,
        expected: u8,
        found: u8,
    },

    #[error("TLE epoch out of range for {catalog_id}: epoch {epoch}, calc epoch {calc_epoch}")]
    EpochOutOfRange {
        catalog_id: String,
        epoch: String,
        calc_epoch: String,
    },

    #[error("no input records found under {0}")]
    EmptyInput(String),

    #[error("IERS data unavailable for epoch {0}")]
    MissingIersData(String),

    #[error("missing required config field: {0}")]
    MissingConfigField(String),

    // --- Upstream errors ---
    #[error("upstream artifact missing: {0}")]
    UpstreamArtifactMissing(String),

    #[error("upstream schema mismatch: expected version {expected}, found {found}")]
    UpstreamSchemaMismatch { expected: u32, found: u32 },

    // --- Computational errors (per-satellite, recovered by the caller) ---
    #[error("propagation diverged for {catalog_id} at {time}: {reason}")]
    PropagationDiverged {
        catalog_id: String,
        time: String,
        reason: String,
    },

    #[error("coordinate transform singular for {catalog_id} at {time}: {reason}")]
    TransformSingular {
        catalog_id: String,
        time: String,
        reason: String,
    },

    // --- Invariant violations (fail-fast, no defaults) ---
    #[error("required field missing on record {record_id}: {field}")]
    FieldMissing { record_id: String, field: String },

    #[error("value out of range on record {record_id}: {field}={value}")]
    ValueOutOfRange {
        record_id: String,
        field: String,
        value: String,
    },

    // --- I/O errors ---
    #[error("failed to write artifact to {path}: {source}")]
    ArtifactWriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache corrupt at {0}")]
    CacheCorrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Coarse reason class used to compute the process exit code
/// (`stage_number * 10 + reason_class`), per spec.md §6.
impl PipelineError {
    pub fn reason_class(&self) -> u32 {
        match self {
            PipelineError::BadTleFormat { .. }
            | PipelineError::ChecksumMismatch { .. }
            | PipelineError::EpochOutOfRange { .. }
            | PipelineError::EmptyInput(_)
            | PipelineError::MissingIersData(_)
            | PipelineError::MissingConfigField(_) => 1,

            PipelineError::UpstreamArtifactMissing(_)
            | PipelineError::UpstreamSchemaMismatch { .. } => 2,

            PipelineError::PropagationDiverged { .. } | PipelineError::TransformSingular { .. } => 3,

            PipelineError::FieldMissing { .. } | PipelineError::ValueOutOfRange { .. } => 4,

            PipelineError::ArtifactWriteFailed { .. }
            | PipelineError::CacheCorrupt(_)
            | PipelineError::Io(_)
            | PipelineError::Json(_) => 5,
        }
    }

    pub fn exit_code(&self, stage_number: u32) -> i32 {
        (stage_number * 10 + self.reason_class()) as i32
    }
}
