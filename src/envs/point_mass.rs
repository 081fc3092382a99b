//! Planar point mass pushed by a bounded force toward the origin
//!
//! State is `[x, y, vx, vy]`, action is a force `[fx, fy]` in `[-1, 1]`.

use burn::prelude::*;
use rand::Rng;

use crate::env::{ActionBounds, Environment};

pub const STATE_DIM: usize = 4;
pub const ACTION_DIM: usize = 2;

#[derive(Debug, Clone)]
pub struct PointMass {
    /// Integration step
    pub dt: f32,
    /// Weight of the squared force in the cost
    pub action_penalty: f32,
    /// Initial positions are drawn from `[-start_range, start_range]`
    pub start_range: f32,
    /// Maximum steps per episode
    pub max_steps: usize,
}

impl Default for PointMass {
    fn default() -> Self {
        Self {
            dt: 0.1,
            action_penalty: 0.01,
            start_range: 1.0,
            max_steps: 100,
        }
    }
}

impl PointMass {
    pub fn reset<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f32> {
        let r = self.start_range;
        vec![
            rng.random_range(-r..=r),
            rng.random_range(-r..=r),
            0.0,
            0.0,
        ]
    }

    /// Semi-implicit Euler step with the action clamped to the bounds
    pub fn step(&self, state: &[f32], action: &[f32]) -> Vec<f32> {
        let fx = action[0].clamp(-1.0, 1.0);
        let fy = action[1].clamp(-1.0, 1.0);
        let vx = state[2] + fx * self.dt;
        let vy = state[3] + fy * self.dt;
        vec![state[0] + vx * self.dt, state[1] + vy * self.dt, vx, vy]
    }

    /// Host-side cost of one transition, matching [`Environment::cost_fn`]
    pub fn cost(&self, _state: &[f32], action: &[f32], next_state: &[f32]) -> f32 {
        let position = next_state[0].powi(2) + next_state[1].powi(2);
        let effort: f32 = action.iter().map(|a| a * a).sum();
        position + self.action_penalty * effort
    }

    pub fn random_action<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f32> {
        (0..ACTION_DIM).map(|_| rng.random_range(-1.0..=1.0)).collect()
    }
}

impl<B: Backend> Environment<B> for PointMass {
    fn state_dim(&self) -> usize {
        STATE_DIM
    }

    fn action_dim(&self) -> usize {
        ACTION_DIM
    }

    fn action_bounds(&self) -> ActionBounds {
        ActionBounds::unit(ACTION_DIM)
    }

    fn cost_fn(
        &self,
        _states: Tensor<B, 2>,
        actions: Tensor<B, 2>,
        next_states: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let [n, _] = next_states.dims();
        let position = next_states
            .slice([0..n, 0..2])
            .powf_scalar(2.0)
            .sum_dim(1);
        let effort = actions.powf_scalar(2.0).sum_dim(1).mul_scalar(self.action_penalty);

        (position + effort).squeeze(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tensor_to_vec;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type TestBackend = NdArray;

    #[test]
    fn test_step_integrates_force() {
        let env = PointMass::default();
        let next = env.step(&[1.0, -1.0, 0.0, 0.5], &[1.0, -2.0]);
        // force clamped to -1 on the second axis
        let expected = [1.0 + 0.01, -1.0 + 0.04, 0.1, 0.4];
        for (a, b) in next.iter().zip(expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_reset_in_range() {
        let env = PointMass::default();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..50 {
            let s = env.reset(&mut rng);
            assert_eq!(s.len(), STATE_DIM);
            assert!(s[0].abs() <= 1.0 && s[1].abs() <= 1.0);
            assert_eq!(&s[2..], &[0.0, 0.0]);
        }
    }

    #[test]
    fn test_tensor_cost_matches_host_cost() {
        let env = PointMass::default();
        let device = Default::default();
        let states = [0.0f32, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let actions = [0.5f32, -0.5, 1.0, 0.0];
        let next = [0.3f32, 0.4, 0.1, 0.1, -1.0, 2.0, 0.0, 0.0];

        let cost = <PointMass as Environment<TestBackend>>::cost_fn(
            &env,
            Tensor::<TestBackend, 1>::from_floats(states.as_slice(), &device).reshape([2, 4]),
            Tensor::<TestBackend, 1>::from_floats(actions.as_slice(), &device).reshape([2, 2]),
            Tensor::<TestBackend, 1>::from_floats(next.as_slice(), &device).reshape([2, 4]),
        );
        assert_eq!(cost.dims(), [2]);

        let cost = tensor_to_vec(cost).unwrap();
        for i in 0..2 {
            let host = env.cost(&states[i * 4..], &actions[i * 2..i * 2 + 2], &next[i * 4..i * 4 + 4]);
            assert!((cost[i] - host).abs() < 1e-5, "{} vs {}", cost[i], host);
        }
    }
}
