//! Deterministic per-satellite parallelism, shared by Stages 2-5.
//!
//! Each item is mapped independently into a pre-sized output slot; there is
//! no cross-item state, so the resulting `Vec` is identical regardless of
//! worker count or scheduling order (spec.md §5, determinism requirement).

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Build a rayon thread pool sized to `worker_count`. Falls back to the
/// global pool if construction fails (e.g. called from within an existing
/// pool during tests).
pub fn build_pool(worker_count: usize) -> Option<ThreadPool> {
    ThreadPoolBuilder::new().num_threads(worker_count.max(1)).build().ok()
}

/// Map `items` to `f` across `pool`'s workers, preserving input order in the
/// output `Vec` and honoring `cancel`: once set, in-flight items still
/// complete (no partial/torn result per item) but no new item starts.
pub fn parallel_map<I, O, F>(pool: &ThreadPool, items: &[I], cancel: &Arc<AtomicBool>, f: F) -> Vec<Option<O>>
where
    I: Sync,
    O: Send,
    F: Fn(&I) -> O + Sync,
{
    pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                if cancel.load(Ordering::SeqCst) {
                    None
                } else {
                    Some(f(item))
                }
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_preserved_and_deterministic_across_pool_sizes() {
        let items: Vec<u32> = (0..200).collect();
        let cancel = Arc::new(AtomicBool::new(false));

        let pool1 = build_pool(1).unwrap();
        let result1 = parallel_map(&pool1, &items, &cancel, |x| x * x);

        let pool8 = build_pool(8).unwrap();
        let result8 = parallel_map(&pool8, &items, &cancel, |x| x * x);

        assert_eq!(result1, result8);
        assert_eq!(result1.len(), 200);
        assert_eq!(result1[10], Some(100));
    }

    #[test]
    fn cancellation_stops_new_work() {
        let items: Vec<u32> = (0..10).collect();
        let cancel = Arc::new(AtomicBool::new(true));
        let pool = build_pool(2).unwrap();
        let result = parallel_map(&pool, &items, &cancel, |x| *x);
        assert!(result.iter().all(|r| r.is_none()));
    }
}
