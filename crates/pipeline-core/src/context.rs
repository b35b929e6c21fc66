//! Per-run stage context: the "logger passed through the stage, not a
//! module global" requirement from spec.md §9, plus the knobs shared by
//! every stage's worker pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct StageContext {
    pub run_id: Uuid,
    pub worker_count: usize,
    pub output_root: PathBuf,
    pub cache_root: PathBuf,
    cancel: Arc<AtomicBool>,
}

impl StageContext {
    pub fn new(worker_count: usize, output_root: impl Into<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            worker_count: worker_count.max(1),
            output_root: output_root.into(),
            cache_root: cache_root.into(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resolve the worker count the way spec.md §6 requires: `MAX_WORKERS`
    /// if set, otherwise the detected core count.
    pub fn worker_count_from_env(output_root: impl Into<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        let worker_count = std::env::var("MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
        Self::new(worker_count, output_root, cache_root)
    }

    /// A span carrying the run id so every log line across every stage can
    /// be correlated back to one pipeline invocation.
    pub fn span(&self, stage: &'static str) -> tracing::Span {
        tracing::info_span!("stage", run_id = %self.run_id, stage)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn sampling_mode() -> bool {
        std::env::var("SAMPLING_MODE").map(|v| v == "1").unwrap_or(false)
    }

    pub fn test_mode() -> bool {
        std::env::var("TEST_MODE").map(|v| v == "1").unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared() {
        let ctx = StageContext::new(2, "/tmp/out", "/tmp/cache");
        let flag = ctx.cancel_flag();
        assert!(!flag.load(Ordering::SeqCst));
        ctx.request_cancel();
        assert!(flag.load(Ordering::SeqCst));
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn worker_count_is_at_least_one() {
        let ctx = StageContext::new(0, "/tmp/out", "/tmp/cache");
        assert_eq!(ctx.worker_count, 1);
    }
}
