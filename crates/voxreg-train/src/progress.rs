//! Progress tracking and callbacks for training sessions.
//!
//! Callbacks observe every optimizer step; the session owns a
//! [`ProgressTracker`] that fans each report out to them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lock a mutex, recovering the data if a callback panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Progress information for one training step.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Global step number, starting at 1.
    pub step: usize,
    /// Epoch the step belongs to, starting at 1.
    pub epoch: usize,
    /// Total loss of the step.
    pub loss: f64,
    /// Time elapsed since the session started.
    pub elapsed: Duration,
    pub learning_rate: f64,
    /// Named loss terms and metrics.
    pub metrics: Vec<(String, f64)>,
}

impl ProgressInfo {
    pub fn new(step: usize, epoch: usize, loss: f64, elapsed: Duration, learning_rate: f64) -> Self {
        Self {
            step,
            epoch,
            loss,
            elapsed,
            learning_rate,
            metrics: Vec::new(),
        }
    }

    /// Add a named value.
    pub fn add_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.push((name.into(), value));
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|(n, _)| n == name).map(|&(_, v)| v)
    }
}

/// Progress callback trait for monitoring training.
pub trait ProgressCallback: Send + Sync {
    /// Called after every optimizer step.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called when the session starts its first epoch.
    fn on_start(&self) {}

    /// Called when an epoch finishes.
    fn on_epoch_end(&self, _epoch: usize, _mean_loss: f64) {}

    /// Called when a step fails.
    fn on_error(&self, _error: &str) {}
}

/// Logs progress through `tracing` every `log_interval` steps.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 10 }
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
        if info.step % self.log_interval != 0 {
            return;
        }
        tracing::info!(
            "Epoch {} | Step {} | Loss: {:.6} | LR: {:.2e} | Elapsed: {:.2}s",
            info.epoch,
            info.step,
            info.loss,
            info.learning_rate,
            info.elapsed.as_secs_f64()
        );
        for (name, value) in &info.metrics {
            tracing::debug!("  {}: {:.6}", name, value);
        }
    }

    fn on_start(&self) {
        tracing::info!("Training started");
    }

    fn on_epoch_end(&self, epoch: usize, mean_loss: f64) {
        tracing::info!("Epoch {} finished with mean loss {:.6}", epoch, mean_loss);
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Training step failed: {}", error);
    }
}

/// Records every step report.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_history(&self) -> Vec<ProgressInfo> {
        lock(&self.history).clone()
    }

    pub fn clear(&self) {
        lock(&self.history).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.history).push(info.clone());
    }
}

#[derive(Debug)]
struct EarlyStoppingState {
    counter: usize,
    best_loss: f64,
    should_stop: bool,
}

impl Default for EarlyStoppingState {
    fn default() -> Self {
        Self {
            counter: 0,
            best_loss: f64::INFINITY,
            should_stop: false,
        }
    }
}

/// Flags the session to stop when the epoch loss stops improving.
///
/// Observes epoch means rather than individual steps, which are noisy under
/// random batches.
#[derive(Debug, Clone)]
pub struct EarlyStoppingCallback {
    /// Minimum decrease of the epoch loss that counts as improvement.
    pub min_improvement: f64,
    /// Epochs to wait for improvement.
    pub patience: usize,
    /// Stop as soon as the epoch loss reaches this value.
    pub min_loss: Option<f64>,
    state: Arc<Mutex<EarlyStoppingState>>,
}

impl EarlyStoppingCallback {
    pub fn new(min_improvement: f64, patience: usize) -> Self {
        Self {
            min_improvement,
            patience,
            min_loss: None,
            state: Arc::default(),
        }
    }

    pub fn with_min_loss(mut self, min_loss: f64) -> Self {
        self.min_loss = Some(min_loss);
        self
    }

    pub fn should_stop(&self) -> bool {
        lock(&self.state).should_stop
    }

    pub fn reset(&self) {
        *lock(&self.state) = EarlyStoppingState::default();
    }
}

impl ProgressCallback for EarlyStoppingCallback {
    fn on_progress(&self, _info: &ProgressInfo) {}

    fn on_epoch_end(&self, epoch: usize, mean_loss: f64) {
        let mut state = lock(&self.state);

        if let Some(min_loss) = self.min_loss {
            if mean_loss <= min_loss {
                state.should_stop = true;
                tracing::info!("Early stopping: loss {} reached minimum threshold {}", mean_loss, min_loss);
                return;
            }
        }

        if state.best_loss - mean_loss > self.min_improvement {
            state.best_loss = mean_loss;
            state.counter = 0;
        } else {
            state.counter += 1;
        }

        if state.counter >= self.patience {
            state.should_stop = true;
            tracing::info!(
                "Early stopping after epoch {}: no improvement for {} epochs (best loss: {:.6})",
                epoch,
                self.patience,
                state.best_loss
            );
        }
    }
}

/// Fans progress reports out to registered callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Option<Instant>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Start the clock on first use.
    pub fn start(&mut self) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
            for callback in &self.callbacks {
                callback.on_start();
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    pub fn update(&self, info: &ProgressInfo) {
        for callback in &self.callbacks {
            callback.on_progress(info);
        }
    }

    pub fn epoch_end(&self, epoch: usize, mean_loss: f64) {
        for callback in &self.callbacks {
            callback.on_epoch_end(epoch, mean_loss);
        }
    }

    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_info_metrics() {
        let mut info = ProgressInfo::new(10, 1, 0.5, Duration::from_secs(10), 1e-4);
        info.add_metric("loss/label", 0.25);
        assert_eq!(info.metric("loss/label"), Some(0.25));
        assert_eq!(info.metric("metric/dice"), None);
    }

    #[test]
    fn test_history_records_steps() {
        let history = HistoryCallback::new();
        let mut tracker = ProgressTracker::new();
        tracker.add_callback(Arc::new(history.clone()));
        tracker.start();

        for step in 1..=3 {
            tracker.update(&ProgressInfo::new(step, 1, 1.0 / step as f64, tracker.elapsed(), 1e-4));
        }
        let steps: Vec<usize> = history.get_history().iter().map(|i| i.step).collect();
        assert_eq!(steps, vec![1, 2, 3]);

        history.clear();
        assert!(history.get_history().is_empty());
    }

    #[test]
    fn test_early_stopping_patience() {
        let callback = EarlyStoppingCallback::new(0.01, 2);

        callback.on_epoch_end(1, 1.0);
        callback.on_epoch_end(2, 0.9);
        assert!(!callback.should_stop());

        callback.on_epoch_end(3, 0.895);
        assert!(!callback.should_stop());
        callback.on_epoch_end(4, 0.91);
        assert!(callback.should_stop());

        callback.reset();
        assert!(!callback.should_stop());
    }

    #[test]
    fn test_early_stopping_min_loss() {
        let callback = EarlyStoppingCallback::new(0.0, 100).with_min_loss(0.1);
        callback.on_epoch_end(1, 0.5);
        assert!(!callback.should_stop());
        callback.on_epoch_end(2, 0.05);
        assert!(callback.should_stop());
    }
}
