//! Supervised fitting of the dynamics model

use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::dataset::{StatisticsTensors, tensor_to_vec};
use crate::dynamics::DynamicsModel;
use crate::error::PolicyResult;
use crate::normalize::normalize;

/// Adam's denominator epsilon
pub const ADAM_EPSILON: f32 = 1e-8;

/// Adam state for one dynamics model
pub type DynamicsOptimizer<B> = OptimizerAdaptor<Adam, DynamicsModel<B>, B>;

/// Runs single Adam steps on the mean squared error between predicted and
/// observed state deltas, both normalized with the state statistics.
pub struct DynamicsTrainer<B: AutodiffBackend> {
    optimizer: DynamicsOptimizer<B>,
    learning_rate: f64,
    steps: usize,
}

impl<B: AutodiffBackend> DynamicsTrainer<B> {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            optimizer: Self::adam_config().init::<B, DynamicsModel<B>>(),
            learning_rate,
            steps: 0,
        }
    }

    /// Adam with burn's default betas and [`ADAM_EPSILON`]
    pub fn adam_config() -> AdamConfig {
        AdamConfig::new().with_epsilon(ADAM_EPSILON)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Number of updates applied so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Loss of `model` on one batch, without touching the parameters
    pub fn loss(
        model: &DynamicsModel<B>,
        stats: &StatisticsTensors<B>,
        states: Tensor<B, 2>,
        actions: Tensor<B, 2>,
        next_states: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        // Built from observed data only; no gradient reaches the label
        let target = normalize(
            next_states - states.clone(),
            stats.state_mean.clone(),
            stats.state_std.clone(),
        )
        .detach();

        let predicted_next = model.predict_next_state(stats, states.clone(), actions);
        let prediction = normalize(
            predicted_next - states,
            stats.state_mean.clone(),
            stats.state_std.clone(),
        );

        (prediction - target).powf_scalar(2.0).mean()
    }

    /// One optimizer step. Returns the loss measured before the update.
    pub fn train_step(
        &mut self,
        model: &mut DynamicsModel<B>,
        stats: &StatisticsTensors<B>,
        states: Tensor<B, 2>,
        actions: Tensor<B, 2>,
        next_states: Tensor<B, 2>,
    ) -> PolicyResult<f32> {
        let loss = Self::loss(model, stats, states, actions, next_states);
        let loss_value = tensor_to_vec(loss.clone())?[0];

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &*model);
        *model = self
            .optimizer
            .step(self.learning_rate, model.clone(), grads);
        self.steps += 1;

        if loss_value.is_finite() {
            tracing::debug!(step = self.steps, loss = loss_value, "dynamics train step");
        } else {
            tracing::warn!(step = self.steps, loss = loss_value, "non-finite dynamics loss");
        }

        Ok(loss_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetStatistics;
    use crate::policy::PolicyConfig;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    /// next_state = state + [action, action]
    fn linear_batch(device: &<TestBackend as Backend>::Device) -> (Tensor<TestBackend, 2>, Tensor<TestBackend, 2>, Tensor<TestBackend, 2>) {
        let n = 16;
        let mut states = Vec::new();
        let mut actions = Vec::new();
        let mut next_states = Vec::new();
        for i in 0..n {
            let s0 = (i as f32 / n as f32) - 0.5;
            let s1 = ((i * 7) % n) as f32 / n as f32 - 0.5;
            let a = ((i * 5) % n) as f32 / n as f32 * 2.0 - 1.0;
            states.extend([s0, s1]);
            actions.push(a);
            next_states.extend([s0 + a, s1 + a]);
        }
        (
            Tensor::<TestBackend, 1>::from_floats(states.as_slice(), device).reshape([n, 2]),
            Tensor::<TestBackend, 1>::from_floats(actions.as_slice(), device).reshape([n, 1]),
            Tensor::<TestBackend, 1>::from_floats(next_states.as_slice(), device).reshape([n, 2]),
        )
    }

    fn run(learning_rate: f64, steps: usize) -> Vec<f32> {
        let device = Default::default();
        let config = PolicyConfig::new().with_hidden_size(64);
        let mut model = DynamicsModel::<TestBackend>::new(&device, 2, 1, &config);
        let stats = StatisticsTensors::new(&DatasetStatistics::identity(2, 1), &device);
        let mut trainer = DynamicsTrainer::new(learning_rate);
        let (states, actions, next_states) = linear_batch(&device);

        (0..steps)
            .map(|_| {
                trainer
                    .train_step(
                        &mut model,
                        &stats,
                        states.clone(),
                        actions.clone(),
                        next_states.clone(),
                    )
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_loss_is_reported_before_update() {
        let device = Default::default();
        let config = PolicyConfig::new().with_hidden_size(16);
        let mut model = DynamicsModel::<TestBackend>::new(&device, 2, 1, &config);
        let stats = StatisticsTensors::new(&DatasetStatistics::identity(2, 1), &device);
        let (states, actions, next_states) = linear_batch(&device);

        let before = tensor_to_vec(DynamicsTrainer::loss(
            &model,
            &stats,
            states.clone(),
            actions.clone(),
            next_states.clone(),
        ))
        .unwrap()[0];

        let mut trainer = DynamicsTrainer::new(1e-3);
        let reported = trainer
            .train_step(&mut model, &stats, states, actions, next_states)
            .unwrap();

        assert!((before - reported).abs() < 1e-6);
        assert_eq!(trainer.steps(), 1);
    }

    #[test]
    fn test_adam_uses_small_epsilon() {
        let config = DynamicsTrainer::<TestBackend>::adam_config().to_string();
        assert!(config.contains("1e-8"), "{}", config);
        assert!(!config.contains("1e-5"), "{}", config);
    }

    #[test]
    fn test_loss_decreases_with_default_learning_rate() {
        let losses = run(1e-3, 200);
        let head: f32 = losses[..10].iter().sum::<f32>() / 10.0;
        let tail: f32 = losses[losses.len() - 10..].iter().sum::<f32>() / 10.0;
        assert!(tail < head, "loss went from {} to {}", head, tail);
    }

    #[test]
    fn test_converges_on_linear_dynamics() {
        let losses = run(1e-2, 600);
        let last = *losses.last().unwrap();
        assert!(last < 0.01, "final loss {}", last);
        assert!(last < losses[0] * 0.1);
    }
}
