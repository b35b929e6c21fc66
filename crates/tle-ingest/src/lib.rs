//! Stage 1 — TLE Ingest.
//!
//! Loads and validates TLE text files organized by constellation and day,
//! enforces line checksums, establishes the calculation epoch from the TLE
//! epochs, and deduplicates by catalog id. See spec.md §4.1.

pub mod ingest;
pub mod tle;

pub use ingest::{ingest, IngestConfig, IngestedTleSet};
pub use tle::{parse_tle, tle_line_checksum, TleRecord};

use pipeline_core::context::StageContext;
use pipeline_core::error::Result;
use pipeline_core::stage::StageProcessor;
use pipeline_core::validation::{CheckResult, ValidationResults};

pub struct TleIngestStage;

impl StageProcessor for TleIngestStage {
    type Input = IngestConfig;
    type Output = IngestedTleSet;

    fn stage_number(&self) -> u32 {
        1
    }

    fn stage_name(&self) -> &'static str {
        "stage1_tle_ingest"
    }

    fn validate_input(&self, input: &Self::Input) -> Result<()> {
        if input.future_bound_days < 0 {
            return Err(pipeline_core::error::PipelineError::MissingConfigField(
                "future_bound_days must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    fn execute(&self, input: &Self::Input, _ctx: &StageContext) -> Result<Self::Output> {
        ingest(input)
    }

    fn validate_output(&self, output: &Self::Output) -> ValidationResults {
        let structure = if output.records.is_empty() {
            CheckResult::fail("no records survived ingest")
        } else {
            CheckResult::ok("records present")
        };

        let mut sorted_ids: Vec<u32> = output.records.iter().map(|r| r.catalog_id).collect();
        sorted_ids.sort_unstable();
        let unique_ids = sorted_ids.windows(2).all(|w| w[0] != w[1]);
        let counts = if unique_ids {
            CheckResult::ok(format!("{} unique catalog ids", output.records.len()))
        } else {
            CheckResult::fail("duplicate catalog ids survived deduplication")
        };

        let ranges = if output
            .records
            .iter()
            .all(|r| (0.0..=90.0).contains(&r.inclination_deg) && r.eccentricity >= 0.0 && r.eccentricity < 1.0)
        {
            CheckResult::ok("orbital elements within physical bounds")
        } else {
            CheckResult::fail("a record has an out-of-range orbital element")
        };

        let cross_stage_consistency = CheckResult::ok("stage 1 has no upstream artifact to check against");

        let academic_compliance = if output.records.iter().all(|r| {
            let expected = tle::tle_line_checksum(&r.line1);
            r.line1.chars().nth(68).and_then(|c| c.to_digit(10)) == Some(expected as u32)
        }) {
            CheckResult::ok("every retained record carries a verified checksum")
        } else {
            CheckResult::fail("a retained record failed re-verification")
        };

        ValidationResults::new(structure, counts, ranges, cross_stage_consistency, academic_compliance)
    }

    fn data_summary(&self, output: &Self::Output) -> serde_json::Value {
        let mut by_constellation: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for r in &output.records {
            *by_constellation.entry(r.constellation.clone()).or_default() += 1;
        }
        serde_json::json!({
            "calc_epoch": output.calc_epoch,
            "total_records": output.records.len(),
            "by_constellation": by_constellation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn stage_runs_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let tle_dir = tmp.path().join("starlink").join("tle");
        std::fs::create_dir_all(&tle_dir).unwrap();
        let mut f = std::fs::File::create(tle_dir.join("starlink_day_01.tle")).unwrap();
        write!(
            f,
            "ISS (ZARYA)\n1 25544U 98067A   21275.52577766  .00001764  00000-0  40259-4 0  9993\n2 25544  51.6433 309.9740 0004180 108.8132 251.3755 15.48908507304866\n"
        )
        .unwrap();

        let config = IngestConfig {
            tle_root: tmp.path().to_path_buf(),
            future_bound_days: 1,
        };
        let ctx = StageContext::new(1, tmp.path().join("out"), tmp.path().join("cache"));
        let artifact = pipeline_core::stage::run_stage(&TleIngestStage, &config, &ctx, None).unwrap();
        assert!(artifact.validation_results.validation_passed);
        assert_eq!(artifact.data.records.len(), 1);
    }
}
