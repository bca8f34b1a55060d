use crate::types::RadiocalResult;
#[cfg(feature = "parallel")]
use crate::types::RadiocalError;

/// Fan-out of independent scenes over a fixed-size worker pool.
///
/// Workers share nothing mutable; anything that has to be combined across
/// scenes is returned and reduced by the caller after `map` returns.
pub struct ScenePool {
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
    threads: usize,
}

impl ScenePool {
    /// Pool with `threads` workers, or one per available core
    pub fn new(threads: Option<usize>) -> RadiocalResult<Self> {
        #[cfg(feature = "parallel")]
        {
            let threads = threads
                .filter(|&n| n > 0)
                .unwrap_or_else(|| {
                    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
                });
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("scene-worker-{}", i))
                .build()
                .map_err(|e| {
                    RadiocalError::Processing(format!("Failed to start worker pool: {}", e))
                })?;
            log::debug!("Scene pool started with {} worker(s)", threads);
            Ok(Self { pool, threads })
        }

        #[cfg(not(feature = "parallel"))]
        {
            log::debug!(
                "Parallel feature disabled; {:?} worker(s) requested, running sequentially",
                threads
            );
            Ok(Self { threads: 1 })
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Apply `f` to every item, preserving input order in the output
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.pool.install(|| items.par_iter().map(&f).collect())
        }

        #[cfg(not(feature = "parallel"))]
        {
            items.iter().map(f).collect()
        }
    }
}
