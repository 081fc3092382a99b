//! Learned forward dynamics model using Burn

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::dataset::StatisticsTensors;
use crate::normalize::{normalize, unnormalize};
use crate::policy::PolicyConfig;

/// Feed-forward network from normalized `(state, action)` to a normalized state delta.
///
/// All predictions made by one policy go through a single instance, so training
/// and planning always see the same parameters.
#[derive(Module, Debug)]
pub struct DynamicsModel<B: Backend> {
    /// Input layer
    input: Linear<B>,
    /// Additional hidden layers
    hidden: Vec<Linear<B>>,
    /// Output layer (normalized delta, one value per state dimension)
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> DynamicsModel<B> {
    pub fn new(device: &B::Device, state_dim: usize, action_dim: usize, config: &PolicyConfig) -> Self {
        let input = LinearConfig::new(state_dim + action_dim, config.hidden_size).init(device);

        let mut hidden = Vec::new();
        for _ in 0..config.nn_layers.saturating_sub(1) {
            hidden.push(LinearConfig::new(config.hidden_size, config.hidden_size).init(device));
        }

        let output = LinearConfig::new(config.hidden_size, state_dim).init(device);

        Self {
            input,
            hidden,
            output,
            activation: Relu::new(),
        }
    }

    /// Raw network pass over an already normalized `[batch, state_dim + action_dim]` input
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = self.activation.forward(self.input.forward(input));

        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }

        self.output.forward(x)
    }

    /// Normalized state-delta prediction for `[batch, state_dim]` states and `[batch, action_dim]` actions
    pub fn predict_delta(
        &self,
        stats: &StatisticsTensors<B>,
        states: Tensor<B, 2>,
        actions: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let states = normalize(states, stats.state_mean.clone(), stats.state_std.clone());
        let actions = normalize(actions, stats.action_mean.clone(), stats.action_std.clone());

        self.forward(Tensor::cat(vec![states, actions], 1))
    }

    /// `state + unnormalize(predict_delta(state, action))`
    pub fn predict_next_state(
        &self,
        stats: &StatisticsTensors<B>,
        states: Tensor<B, 2>,
        actions: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let delta = self.predict_delta(stats, states.clone(), actions);
        let delta = unnormalize(
            delta,
            stats.delta_state_mean.clone(),
            stats.delta_state_std.clone(),
        );

        states + delta
    }

    pub fn num_hidden_layers(&self) -> usize {
        1 + self.hidden.len()
    }
}
