//! Progress reporting for registration runs.
//!
//! The engine reports every optimizer iteration to a list of
//! [`ProgressCallback`]s. [`ConsoleProgressCallback`] logs through
//! `tracing`; [`HistoryCallback`] keeps everything in memory.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::optimizer::StopCondition;

/// One optimizer iteration at one pyramid level.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// Pyramid level, 0 = coarsest.
    pub level: usize,
    pub levels: usize,
    pub iteration: usize,
    pub max_iterations: usize,
    pub metric: f64,
    pub gradient_magnitude: f64,
    pub step_length: f64,
    /// Time since the run started.
    pub elapsed: Duration,
}

impl ProgressInfo {
    /// Progress through the current level in percent.
    pub fn level_percent(&self) -> f64 {
        if self.max_iterations == 0 {
            return 100.0;
        }
        (self.iteration as f64 / self.max_iterations as f64) * 100.0
    }
}

/// Observer of a registration run.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);

    fn on_level_start(&self, _level: usize, _shrink_factor: usize, _samples: usize) {}

    fn on_level_complete(&self, _level: usize, _stop: StopCondition, _metric: f64) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log every `log_interval` iterations.
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 50 }
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration % self.log_interval == 0 {
            tracing::debug!(
                "Level {}/{} iter {}/{} ({:.0}%) | metric {:.6} | |g| {:.3e} | step {:.3e} | {:.2}s",
                info.level + 1,
                info.levels,
                info.iteration,
                info.max_iterations,
                info.level_percent(),
                info.metric,
                info.gradient_magnitude,
                info.step_length,
                info.elapsed.as_secs_f64()
            );
        }
    }

    fn on_level_start(&self, level: usize, shrink_factor: usize, samples: usize) {
        tracing::info!(level, shrink_factor, samples, "starting registration level");
    }

    fn on_level_complete(&self, level: usize, stop: StopCondition, metric: f64) {
        tracing::info!(level, %stop, metric, "registration level finished");
    }
}

/// Records every progress report.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ProgressInfo> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Metric values reported at `level`, in order.
    pub fn metric_trace(&self, level: usize) -> Vec<f64> {
        self.history()
            .into_iter()
            .filter(|i| i.level == level)
            .map(|i| i.metric)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut h) = self.history.lock() {
            h.clear();
        }
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Ok(mut h) = self.history.lock() {
            h.push(info.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(level: usize, iteration: usize, metric: f64) -> ProgressInfo {
        ProgressInfo {
            level,
            levels: 2,
            iteration,
            max_iterations: 10,
            metric,
            gradient_magnitude: 1.0,
            step_length: 1.0,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_history_records_per_level() {
        let history = HistoryCallback::new();
        history.on_progress(&info(0, 0, -0.1));
        history.on_progress(&info(0, 1, -0.2));
        history.on_progress(&info(1, 0, -0.5));
        assert_eq!(history.history().len(), 3);
        assert_eq!(history.metric_trace(0), vec![-0.1, -0.2]);
        history.clear();
        assert!(history.history().is_empty());
    }

    #[test]
    fn test_level_percent() {
        assert_eq!(info(0, 5, 0.0).level_percent(), 50.0);
    }
}
