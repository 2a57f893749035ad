//! Benchmarking utilities for the tilepack crates.

use std::fmt::Display;
use std::time::Instant;

/// Statistics from a benchmark run. All fields are durations in milliseconds.
#[derive(Debug, Default)]
pub struct BenchStats {
    pub max: f32,
    pub mean: f32,
    pub median: f32,
    pub min: f32,

    /// Mean absolute deviation from the mean.
    pub var: f32,
}

impl BenchStats {
    /// Compute statistics from a list of durations.
    pub fn from_times(mut times: Vec<f32>) -> BenchStats {
        if times.is_empty() {
            return BenchStats::default();
        }
        times.sort_by(|a, b| a.total_cmp(b));

        let n = times.len();
        let mid = n / 2;
        let median = if n % 2 == 1 {
            times[mid]
        } else {
            (times[mid - 1] + times[mid]) / 2.
        };
        let mean = times.iter().sum::<f32>() / n as f32;
        let var = times.iter().map(|x| (x - mean).abs()).sum::<f32>() / n as f32;

        BenchStats {
            max: times[n - 1],
            mean,
            median,
            min: times[0],
            var,
        }
    }
}

/// Run `f` for `trials` iterations and print statistics about the run.
pub fn run_bench<F: FnMut(), D: Display>(trials: usize, description: D, mut f: F) -> BenchStats {
    if trials == 0 {
        return BenchStats::default();
    }

    let times = (0..trials)
        .map(|_| {
            let start = Instant::now();
            f();
            (start.elapsed().as_secs_f64() * 1000.0) as f32
        })
        .collect();
    let stats = BenchStats::from_times(times);

    println!(
        "{}. mean {:.3}ms median {:.3} var {:.3} min {:.3} max {:.3}",
        description, stats.mean, stats.median, stats.var, stats.min, stats.max
    );

    stats
}
