//! Interface to the environment the controller plans against

use burn::prelude::*;

use crate::error::{PolicyError, PolicyResult};

/// Per-dimension action limits; every sampled action lies within `[low, high]`
#[derive(Debug, Clone, PartialEq)]
pub struct ActionBounds {
    low: Vec<f32>,
    high: Vec<f32>,
}

impl ActionBounds {
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> PolicyResult<Self> {
        if low.len() != high.len() {
            return Err(PolicyError::InvalidBounds(format!(
                "low has {} dimensions but high has {}",
                low.len(),
                high.len()
            )));
        }
        for (i, (&lo, &hi)) in low.iter().zip(&high).enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(PolicyError::InvalidBounds(format!(
                    "dimension {} is not finite ({}, {})",
                    i, lo, hi
                )));
            }
            if lo > hi {
                return Err(PolicyError::InvalidBounds(format!(
                    "dimension {} has low {} above high {}",
                    i, lo, hi
                )));
            }
        }
        Ok(Self { low, high })
    }

    /// Same `[low, high]` interval on every dimension
    pub fn uniform(dim: usize, low: f32, high: f32) -> PolicyResult<Self> {
        Self::new(vec![low; dim], vec![high; dim])
    }

    /// `[-1, 1]` on every dimension
    pub fn unit(dim: usize) -> Self {
        Self {
            low: vec![-1.0; dim],
            high: vec![1.0; dim],
        }
    }

    pub fn low(&self) -> &[f32] {
        &self.low
    }

    pub fn high(&self) -> &[f32] {
        &self.high
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn contains(&self, action: &[f32]) -> bool {
        action.len() == self.dim()
            && action
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(&a, (&lo, &hi))| a >= lo && a <= hi)
    }
}

/// What the controller needs to know about the task: dimensionality, action
/// limits and a batched cost function.
pub trait Environment<B: Backend> {
    fn state_dim(&self) -> usize;

    fn action_dim(&self) -> usize;

    fn action_bounds(&self) -> ActionBounds;

    /// One cost per row of `[batch, state_dim]` / `[batch, action_dim]` inputs
    fn cost_fn(
        &self,
        states: Tensor<B, 2>,
        actions: Tensor<B, 2>,
        next_states: Tensor<B, 2>,
    ) -> Tensor<B, 1>;
}
