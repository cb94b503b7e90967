//! Worker pool shared by the parse, index and check phases

use log::warn;
use rayon::ThreadPool;

/// Number of worker threads for a `jobs` setting (0 = one per CPU)
pub fn worker_count(jobs: usize) -> usize {
    if jobs > 0 {
        jobs
    } else {
        num_cpus::get()
    }
}

/// Build a pool, or `None` when the threads cannot be spawned and the caller
/// should fall back to running sequentially
pub(crate) fn build(jobs: usize) -> Option<ThreadPool> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count(jobs))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("Falling back to sequential processing: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(3), 3);
        assert!(worker_count(0) >= 1);
    }

    #[test]
    fn test_build_pool() {
        let pool = build(2).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
