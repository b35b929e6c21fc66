//! The five-check validation framework every stage artifact carries, per
//! spec.md §6.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
}

impl CheckResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResults {
    pub structure: CheckResult,
    pub counts: CheckResult,
    pub ranges: CheckResult,
    pub cross_stage_consistency: CheckResult,
    /// Sentinel check asserting the stage did not take a forbidden shortcut
    /// (e.g. a spherical-Earth prefilter standing in for the full IAU
    /// chain, or a defaulted RF parameter).
    pub academic_compliance: CheckResult,
    pub validation_passed: bool,
}

impl ValidationResults {
    pub fn new(
        structure: CheckResult,
        counts: CheckResult,
        ranges: CheckResult,
        cross_stage_consistency: CheckResult,
        academic_compliance: CheckResult,
    ) -> Self {
        let validation_passed = structure.passed
            && counts.passed
            && ranges.passed
            && cross_stage_consistency.passed
            && academic_compliance.passed;
        Self {
            structure,
            counts,
            ranges,
            cross_stage_consistency,
            academic_compliance,
            validation_passed,
        }
    }
}
