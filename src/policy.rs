//! The controller facade: training, one-step prediction and action selection

use std::path::Path;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::dataset::{DatasetStatistics, StatisticsTensors, rows_to_tensor, tensor_to_vec};
use crate::dynamics::DynamicsModel;
use crate::env::{ActionBounds, Environment};
use crate::error::{PolicyError, PolicyResult};
use crate::planner::RandomShootingPlanner;
use crate::train::DynamicsTrainer;

/// Hyperparameters of the model-based policy
#[derive(Debug, Config)]
pub struct PolicyConfig {
    /// Number of simulated steps per candidate sequence
    #[config(default = 15)]
    pub horizon: usize,
    /// Number of random action sequences scored per decision
    #[config(default = 4096)]
    pub num_candidates: usize,
    /// Number of hidden layers in the dynamics network
    #[config(default = 1)]
    pub nn_layers: usize,
    /// Width of every hidden layer
    #[config(default = 500)]
    pub hidden_size: usize,
    /// Adam learning rate
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Seed for action sampling; drawn from the OS when unset
    pub seed: Option<u64>,
}

impl PolicyConfig {
    pub fn validate(&self) -> PolicyResult<()> {
        if self.nn_layers == 0 {
            return Err(PolicyError::InvalidConfig("nn_layers must be at least 1".into()));
        }
        if self.hidden_size == 0 {
            return Err(PolicyError::InvalidConfig("hidden_size must be at least 1".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PolicyError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        // horizon and num_candidates are checked by the planner
        RandomShootingPlanner::new(self.horizon, self.num_candidates).map(|_| ())
    }
}

/// Model-based controller.
///
/// Owns the single dynamics parameter set, its optimizer state, the device and
/// the sampling RNG. Every operation runs to completion on the caller's thread;
/// `&mut self` on [`train_step`](Self::train_step) and
/// [`get_action`](Self::get_action) keeps parameter updates and planning from
/// interleaving.
pub struct ModelBasedPolicy<B: AutodiffBackend, E> {
    env: E,
    config: PolicyConfig,
    state_dim: usize,
    action_dim: usize,
    bounds: ActionBounds,
    statistics: DatasetStatistics,
    stats: StatisticsTensors<B>,
    model: DynamicsModel<B>,
    trainer: DynamicsTrainer<B>,
    planner: RandomShootingPlanner,
    rng: StdRng,
    device: B::Device,
}

impl<B, E> ModelBasedPolicy<B, E>
where
    B: AutodiffBackend,
    E: Environment<B::InnerBackend>,
{
    pub fn new(
        env: E,
        statistics: DatasetStatistics,
        config: PolicyConfig,
        device: B::Device,
    ) -> PolicyResult<Self> {
        config.validate()?;

        let state_dim = env.state_dim();
        let action_dim = env.action_dim();
        let bounds = env.action_bounds();
        PolicyError::check_len("action bounds", action_dim, bounds.dim())?;
        statistics.validate(state_dim, action_dim)?;

        let planner = RandomShootingPlanner::new(config.horizon, config.num_candidates)?;
        let model = DynamicsModel::new(&device, state_dim, action_dim, &config);
        let stats = StatisticsTensors::new(&statistics, &device);
        let trainer = DynamicsTrainer::new(config.learning_rate);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        tracing::info!(
            state_dim,
            action_dim,
            horizon = config.horizon,
            num_candidates = config.num_candidates,
            nn_layers = config.nn_layers,
            "model-based policy ready"
        );

        Ok(Self {
            env,
            config,
            state_dim,
            action_dim,
            bounds,
            statistics,
            stats,
            model,
            trainer,
            planner,
            rng,
            device,
        })
    }

    /// One gradient step on a batch of transitions; returns the pre-update loss
    pub fn train_step(
        &mut self,
        states: &[Vec<f32>],
        actions: &[Vec<f32>],
        next_states: &[Vec<f32>],
    ) -> PolicyResult<f32> {
        PolicyError::check_len("actions batch", states.len(), actions.len())?;
        PolicyError::check_len("next_states batch", states.len(), next_states.len())?;

        let states = rows_to_tensor::<B>(states, self.state_dim, "state", &self.device)?;
        let actions = rows_to_tensor::<B>(actions, self.action_dim, "action", &self.device)?;
        let next_states =
            rows_to_tensor::<B>(next_states, self.state_dim, "next_state", &self.device)?;

        self.trainer
            .train_step(&mut self.model, &self.stats, states, actions, next_states)
    }

    /// Predicted next state for a single, unbatched state and action
    pub fn predict(&self, state: &[f32], action: &[f32]) -> PolicyResult<Vec<f32>> {
        PolicyError::check_len("state", self.state_dim, state.len())?;
        PolicyError::check_len("action", self.action_dim, action.len())?;

        let model = self.model.valid();
        let stats = self.stats.inner();
        let device = stats.state_mean.device();

        let state = Tensor::<B::InnerBackend, 1>::from_floats(state, &device).reshape([1, self.state_dim]);
        let action =
            Tensor::<B::InnerBackend, 1>::from_floats(action, &device).reshape([1, self.action_dim]);

        let next_state = tensor_to_vec(model.predict_next_state(&stats, state, action))?;
        PolicyError::check_len("predicted state", self.state_dim, next_state.len())?;
        Ok(next_state)
    }

    /// Best first action for a single, unbatched state
    pub fn get_action(&mut self, state: &[f32]) -> PolicyResult<Vec<f32>> {
        PolicyError::check_len("state", self.state_dim, state.len())?;

        let model = self.model.valid();
        let stats = self.stats.inner();
        let action = self.planner.select_action(
            &model,
            &stats,
            &self.env,
            &self.bounds,
            state,
            &mut self.rng,
        )?;

        PolicyError::check_len("selected action", self.action_dim, action.len())?;
        Ok(action)
    }

    /// Save the dynamics model parameters
    pub fn save_model(&self, path: impl AsRef<Path>) -> PolicyResult<()> {
        let path = path.as_ref();
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(path, &recorder)
            .map_err(|e| PolicyError::Checkpoint(format!("{:?}", e)))?;
        tracing::info!("Saved dynamics model to {}", path.display());
        Ok(())
    }

    /// Load dynamics model parameters saved by [`save_model`](Self::save_model)
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> PolicyResult<()> {
        let path = path.as_ref();
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model = self
            .model
            .clone()
            .load_file(path, &recorder, &self.device)
            .map_err(|e| PolicyError::Checkpoint(format!("{:?}", e)))?;
        tracing::info!("Loaded dynamics model from {}", path.display());
        Ok(())
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn statistics(&self) -> &DatasetStatistics {
        &self.statistics
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Number of optimizer steps applied so far
    pub fn train_steps(&self) -> usize {
        self.trainer.steps()
    }
}
