//! Running metrics for the fit / act loop

use std::time::Instant;

/// Fixed-size ring of recent samples.
///
/// Keeps the lowest value ever pushed, so a loss curve's best point survives
/// after it leaves the window.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    ring: Vec<f32>,
    capacity: usize,
    next: usize,
    best: Option<f32>,
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        let capacity = window.max(1);
        Self {
            ring: Vec::with_capacity(capacity),
            capacity,
            next: 0,
            best: None,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.ring.len() < self.capacity {
            self.ring.push(value);
        } else {
            self.ring[self.next] = value;
        }
        self.next = (self.next + 1) % self.capacity;
        if !value.is_nan() && self.best.is_none_or(|b| value < b) {
            self.best = Some(value);
        }
    }

    /// Mean of the samples in the window, or NaN before the first push
    pub fn average(&self) -> f32 {
        if self.ring.is_empty() {
            return f32::NAN;
        }
        self.ring.iter().sum::<f32>() / self.ring.len() as f32
    }

    pub fn last(&self) -> Option<f32> {
        let idx = (self.next + self.capacity - 1) % self.capacity;
        self.ring.get(idx).copied()
    }

    /// Lowest non-NaN value seen since construction
    pub fn best(&self) -> Option<f32> {
        self.best
    }
}

/// Dynamics-fit losses and real-environment episode results
#[derive(Debug)]
pub struct TrainingMetrics {
    /// Dynamics model training loss
    pub loss: MovingAverage,
    /// Accumulated cost of each controlled episode
    pub episode_cost: MovingAverage,
    /// Length of each controlled episode
    pub episode_length: MovingAverage,
    /// Current outer iteration
    pub iteration: usize,
    /// Environment steps taken under the controller
    pub total_timesteps: usize,
    /// Optimizer steps applied to the dynamics model
    pub total_train_steps: usize,
    start_time: Instant,
}

impl TrainingMetrics {
    pub fn new(window: usize) -> Self {
        Self {
            loss: MovingAverage::new(window),
            episode_cost: MovingAverage::new(window),
            episode_length: MovingAverage::new(window),
            iteration: 0,
            total_timesteps: 0,
            total_train_steps: 0,
            start_time: Instant::now(),
        }
    }

    pub fn record_loss(&mut self, loss: f32) {
        self.loss.push(loss);
        self.total_train_steps += 1;
    }

    pub fn record_episode(&mut self, cost: f32, length: usize) {
        self.episode_cost.push(cost);
        self.episode_length.push(length as f32);
        self.total_timesteps += length;
    }

    pub fn training_duration_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn log_to_console(&self) {
        tracing::info!(
            "Iteration {} | Timesteps {} | Train steps {} | {:.1}s",
            self.iteration,
            self.total_timesteps,
            self.total_train_steps,
            self.training_duration_secs()
        );
        tracing::info!(
            "  Dynamics: loss={:.5} (last {:.5}, best {:.5})",
            self.loss.average(),
            self.loss.last().unwrap_or(f32::NAN),
            self.loss.best().unwrap_or(f32::NAN)
        );
        tracing::info!(
            "  Episode: cost={:.3}, length={:.1}",
            self.episode_cost.average(),
            self.episode_length.average()
        );
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average_window() {
        let mut avg = MovingAverage::new(3);
        assert!(avg.average().is_nan());
        assert_eq!(avg.last(), None);

        avg.push(1.0);
        assert!((avg.average() - 1.0).abs() < 1e-6);
        assert_eq!(avg.last(), Some(1.0));

        avg.push(2.0);
        avg.push(3.0);
        assert!((avg.average() - 2.0).abs() < 1e-6);

        avg.push(4.0); // overwrites 1.0
        assert!((avg.average() - 3.0).abs() < 1e-6);
        assert_eq!(avg.last(), Some(4.0));
        assert_eq!(avg.best(), Some(1.0));
    }

    #[test]
    fn test_best_ignores_nan() {
        let mut avg = MovingAverage::new(2);
        avg.push(f32::NAN);
        assert_eq!(avg.best(), None);
        avg.push(0.5);
        avg.push(0.75);
        assert_eq!(avg.best(), Some(0.5));
    }

    #[test]
    fn test_training_metrics_counts() {
        let mut metrics = TrainingMetrics::new(10);
        metrics.record_loss(0.5);
        metrics.record_loss(0.25);
        metrics.record_episode(12.0, 50);
        metrics.record_episode(8.0, 30);

        assert_eq!(metrics.total_train_steps, 2);
        assert_eq!(metrics.total_timesteps, 80);
        assert!((metrics.loss.average() - 0.375).abs() < 1e-6);
        assert!((metrics.episode_cost.average() - 10.0).abs() < 1e-6);
        assert!((metrics.episode_length.average() - 40.0).abs() < 1e-6);
    }
}
