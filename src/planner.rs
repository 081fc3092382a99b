//! Random-shooting model-predictive control over the learned dynamics model
//!
//! ```text
//! state ──repeat──▶ [N, state_dim]
//!                        │
//!         ┌──────────────┴───────────────┐
//!         │  for t in 0..horizon         │
//!         │   actions ~ U[low, high]     │
//!         │   next = model(s, a)         │
//!         │   cost += cost_fn(s, a, next)│
//!         │   s = next                   │
//!         └──────────────┬───────────────┘
//!                        ▼
//!      first actions of argmin(cost)  ──▶ action
//! ```

use burn::prelude::*;
use rand::Rng;

use crate::dataset::{StatisticsTensors, tensor_to_vec};
use crate::dynamics::DynamicsModel;
use crate::env::{ActionBounds, Environment};
use crate::error::{PolicyError, PolicyResult};

/// Rollout state carried from one horizon step to the next
struct Rollout<B: Backend> {
    states: Tensor<B, 2>,
    costs: Tensor<B, 1>,
}

#[derive(Debug, Clone)]
pub struct RandomShootingPlanner {
    horizon: usize,
    num_candidates: usize,
}

impl RandomShootingPlanner {
    pub fn new(horizon: usize, num_candidates: usize) -> PolicyResult<Self> {
        if horizon == 0 {
            return Err(PolicyError::InvalidConfig("horizon must be at least 1".into()));
        }
        if num_candidates == 0 {
            return Err(PolicyError::InvalidConfig(
                "num_candidates must be at least 1".into(),
            ));
        }
        Ok(Self {
            horizon,
            num_candidates,
        })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn num_candidates(&self) -> usize {
        self.num_candidates
    }

    /// First action of the cheapest of `num_candidates` random action sequences.
    ///
    /// Ties go to the lowest candidate index. Each call only depends on the
    /// model parameters and the state of `rng`.
    pub fn select_action<B, E, R>(
        &self,
        model: &DynamicsModel<B>,
        stats: &StatisticsTensors<B>,
        env: &E,
        bounds: &ActionBounds,
        state: &[f32],
        rng: &mut R,
    ) -> PolicyResult<Vec<f32>>
    where
        B: Backend,
        E: Environment<B>,
        R: Rng,
    {
        let state_dim = stats.state_mean.dims()[0];
        let action_dim = stats.action_mean.dims()[0];
        PolicyError::check_len("state", state_dim, state.len())?;
        PolicyError::check_len("action bounds", action_dim, bounds.dim())?;

        let device = stats.state_mean.device();
        let n = self.num_candidates;

        let states = Tensor::<B, 1>::from_floats(state, &device)
            .reshape([1, state_dim])
            .repeat_dim(0, n);
        let costs = Tensor::<B, 1>::zeros([n], &device);

        let (first_actions, first_tensor) = self.sample_actions::<B, R>(bounds, rng, &device);
        let start = self.advance(
            model,
            stats,
            env,
            Rollout { states, costs },
            first_tensor,
        )?;

        let rollout = (1..self.horizon).try_fold(start, |rollout, _| {
            let (_, actions) = self.sample_actions::<B, R>(bounds, rng, &device);
            self.advance(model, stats, env, rollout, actions)
        })?;

        let costs = tensor_to_vec(rollout.costs)?;
        let Some(best) = first_argmin(&costs) else {
            tracing::warn!(candidates = n, "every candidate cost is NaN");
            return Err(PolicyError::NonFiniteCost { candidates: n });
        };
        tracing::trace!(best, cost = costs[best], "selected candidate");

        Ok(first_actions[best * action_dim..(best + 1) * action_dim].to_vec())
    }

    /// One model step for every candidate, accumulating the environment cost
    fn advance<B: Backend, E: Environment<B>>(
        &self,
        model: &DynamicsModel<B>,
        stats: &StatisticsTensors<B>,
        env: &E,
        rollout: Rollout<B>,
        actions: Tensor<B, 2>,
    ) -> PolicyResult<Rollout<B>> {
        let next_states = model.predict_next_state(stats, rollout.states.clone(), actions.clone());
        let step_cost = env.cost_fn(rollout.states, actions, next_states.clone());
        PolicyError::check_len("cost batch", self.num_candidates, step_cost.dims()[0])?;

        Ok(Rollout {
            states: next_states,
            costs: rollout.costs + step_cost,
        })
    }

    /// Uniform `[num_candidates, action_dim]` sample, returned both on the host and as a tensor
    fn sample_actions<B: Backend, R: Rng>(
        &self,
        bounds: &ActionBounds,
        rng: &mut R,
        device: &B::Device,
    ) -> (Vec<f32>, Tensor<B, 2>) {
        let action_dim = bounds.dim();
        let mut actions = Vec::with_capacity(self.num_candidates * action_dim);

        for _ in 0..self.num_candidates {
            for (&lo, &hi) in bounds.low().iter().zip(bounds.high()) {
                let u: f32 = rng.random();
                actions.push((lo + (hi - lo) * u).clamp(lo, hi));
            }
        }

        let tensor = Tensor::<B, 1>::from_floats(actions.as_slice(), device)
            .reshape([self.num_candidates, action_dim]);
        (actions, tensor)
    }
}

/// Index of the first smallest cost, skipping NaN. `None` when no cost is comparable.
pub fn first_argmin(costs: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &c) in costs.iter().enumerate() {
        if c.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if c >= b => {}
            _ => best = Some((i, c)),
        }
    }
    best.map(|(i, _)| i)
}
