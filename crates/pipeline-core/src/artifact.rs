//! Stage artifact envelope: the stable schema spec.md §9 asks for in place
//! of the source system's dynamic dict payloads.

use crate::validation::ValidationResults;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub producer: String,
    pub generated_at: DateTime<Utc>,
    /// Content-hash fingerprint of the upstream artifact this one was built
    /// from, or `None` for Stage 1, which has no pipeline upstream.
    pub upstream_fingerprint: Option<String>,
    pub schema_version: u32,
}

impl ArtifactMetadata {
    pub fn new(producer: impl Into<String>, upstream_fingerprint: Option<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            producer: producer.into(),
            generated_at,
            upstream_fingerprint,
            schema_version: SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageArtifact<T> {
    pub stage: String,
    pub metadata: ArtifactMetadata,
    pub data_summary: serde_json::Value,
    pub data: T,
    pub validation_results: ValidationResults,
}

impl<T> StageArtifact<T> {
    pub fn new(
        stage: impl Into<String>,
        metadata: ArtifactMetadata,
        data_summary: serde_json::Value,
        data: T,
        validation_results: ValidationResults,
    ) -> Self {
        Self {
            stage: stage.into(),
            metadata,
            data_summary,
            data,
            validation_results,
        }
    }
}
