//! Thread pool used to pack the panels of large matrices concurrently.

use std::sync::OnceLock;

use rayon::prelude::*;

/// Rayon thread pool used by [`PackExecutor`](crate::PackExecutor).
///
/// If the pool cannot be created (eg. on platforms without threads), work
/// runs on the calling thread.
pub struct ThreadPool {
    pool: Option<rayon::ThreadPool>,
}

impl ThreadPool {
    /// Create a thread pool with a given number of threads.
    pub fn with_num_threads(num_threads: usize) -> ThreadPool {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("tilepack-{}", index))
            .build()
            .ok();
        ThreadPool { pool }
    }

    /// Run `op` inside the pool. See [`rayon::ThreadPool::install`].
    pub fn run<R: Send, Op: FnOnce() -> R + Send>(&self, op: Op) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Return the number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(1, |pool| pool.current_num_threads())
    }
}

/// Choose the thread count from the value of `TILEPACK_NUM_THREADS`.
///
/// Packing is bound by memory bandwidth, so by default there is one thread
/// per physical core. A requested count is clamped to `1..=logical_cores`.
fn choose_num_threads(
    requested: Option<&str>,
    physical_cores: usize,
    logical_cores: usize,
) -> usize {
    let default = physical_cores.max(1);
    let Some(requested) = requested else {
        return default;
    };
    match requested.trim().parse::<usize>() {
        Ok(n) => n.clamp(1, logical_cores.max(1)),
        Err(_) => {
            eprintln!("Invalid TILEPACK_NUM_THREADS value \"{}\"", requested);
            default
        }
    }
}

/// Return the thread pool used to pack panels in parallel.
///
/// The pool is created on first use. Its size is the number of physical
/// cores unless overridden by the `TILEPACK_NUM_THREADS` environment variable.
pub fn thread_pool() -> &'static ThreadPool {
    static THREAD_POOL: OnceLock<ThreadPool> = OnceLock::new();
    THREAD_POOL.get_or_init(|| {
        let requested = std::env::var("TILEPACK_NUM_THREADS").ok();
        let num_threads = choose_num_threads(
            requested.as_deref(),
            num_cpus::get_physical(),
            num_cpus::get(),
        );
        ThreadPool::with_num_threads(num_threads)
    })
}

/// Call `op` with each item from `items`.
///
/// If `parallel` is true, items are processed concurrently in the
/// [`thread_pool`]. Otherwise they are processed in order on the current
/// thread.
pub fn for_each_maybe_parallel<I, F>(items: I, parallel: bool, op: F)
where
    I: IntoParallelIterator + IntoIterator<Item = <I as IntoParallelIterator>::Item> + Send,
    F: Fn(<I as IntoParallelIterator>::Item) + Send + Sync,
{
    if parallel {
        thread_pool().run(|| items.into_par_iter().for_each(op))
    } else {
        items.into_iter().for_each(op)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tilepack_testing::TestCases;

    use super::{choose_num_threads, for_each_maybe_parallel, thread_pool, ThreadPool};

    #[test]
    fn test_thread_pool() {
        let pool = thread_pool();
        assert!(pool.num_threads() >= 1);
        assert_eq!(pool.run(|| 2 + 2), 4);

        let pool = ThreadPool::with_num_threads(2);
        assert_eq!(pool.num_threads(), 2);
    }

    #[test]
    fn test_choose_num_threads() {
        #[derive(Debug)]
        struct Case {
            requested: Option<&'static str>,
            expected: usize,
        }

        let cases = [
            Case {
                requested: None,
                expected: 4,
            },
            Case {
                requested: Some("2"),
                expected: 2,
            },
            Case {
                requested: Some("0"),
                expected: 1,
            },
            Case {
                requested: Some("100"),
                expected: 8,
            },
            Case {
                requested: Some("many"),
                expected: 4,
            },
        ];

        cases.test_each(|&Case { requested, expected }| {
            assert_eq!(choose_num_threads(requested, 4, 8), expected);
        })
    }

    #[test]
    fn test_for_each_maybe_parallel() {
        for parallel in [false, true] {
            let count = AtomicU32::new(0);
            for_each_maybe_parallel(0..1000, parallel, |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(count.load(Ordering::SeqCst), 1000);
        }
    }
}
