//! Transitions, the reference statistics derived from them, and host-to-tensor batching

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::error::{PolicyError, PolicyResult};

/// A single observed `(state, action, next_state)` triple
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: Vec<f32>,
    pub next_state: Vec<f32>,
}

/// Growing pool of transitions collected from the real environment
#[derive(Debug, Clone, Default)]
pub struct TransitionDataset {
    transitions: Vec<Transition>,
}

impl TransitionDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn extend(&mut self, transitions: impl IntoIterator<Item = Transition>) {
        self.transitions.extend(transitions);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Random batch without replacement, capped at the dataset size
    pub fn sample_batch<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<&Transition> {
        let batch_size = batch_size.min(self.transitions.len());
        self.transitions.choose_multiple(rng, batch_size).collect()
    }
}

/// Splits transitions into the `(states, actions, next_states)` columns the policy trains on
pub fn unzip_transitions<'a>(
    batch: impl IntoIterator<Item = &'a Transition>,
) -> (Vec<Vec<f32>>, Vec<Vec<f32>>, Vec<Vec<f32>>) {
    let mut states = Vec::new();
    let mut actions = Vec::new();
    let mut next_states = Vec::new();
    for t in batch {
        states.push(t.state.clone());
        actions.push(t.action.clone());
        next_states.push(t.next_state.clone());
    }
    (states, actions, next_states)
}

/// Per-dimension mean/std of states, actions and state deltas.
///
/// Computed once from the initial dataset and never updated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStatistics {
    pub state_mean: Vec<f32>,
    pub state_std: Vec<f32>,
    pub action_mean: Vec<f32>,
    pub action_std: Vec<f32>,
    pub delta_state_mean: Vec<f32>,
    pub delta_state_std: Vec<f32>,
}

impl DatasetStatistics {
    /// Mean 0 / std 1 everywhere, so normalization is the identity
    pub fn identity(state_dim: usize, action_dim: usize) -> Self {
        Self {
            state_mean: vec![0.0; state_dim],
            state_std: vec![1.0; state_dim],
            action_mean: vec![0.0; action_dim],
            action_std: vec![1.0; action_dim],
            delta_state_mean: vec![0.0; state_dim],
            delta_state_std: vec![1.0; state_dim],
        }
    }

    /// Population mean and standard deviation of every column
    pub fn from_transitions(transitions: &[Transition]) -> PolicyResult<Self> {
        let first = transitions.first().ok_or(PolicyError::EmptyBatch)?;
        let state_dim = first.state.len();
        let action_dim = first.action.len();
        if state_dim == 0 || action_dim == 0 {
            return Err(PolicyError::InvalidStatistics(format!(
                "transitions need non-empty states and actions, got state_dim {} and action_dim {}",
                state_dim, action_dim
            )));
        }

        let mut states = Vec::with_capacity(transitions.len() * state_dim);
        let mut actions = Vec::with_capacity(transitions.len() * action_dim);
        let mut deltas = Vec::with_capacity(transitions.len() * state_dim);

        for t in transitions {
            PolicyError::check_len("state", state_dim, t.state.len())?;
            PolicyError::check_len("action", action_dim, t.action.len())?;
            PolicyError::check_len("next_state", state_dim, t.next_state.len())?;

            states.extend_from_slice(&t.state);
            actions.extend_from_slice(&t.action);
            deltas.extend(t.next_state.iter().zip(&t.state).map(|(n, s)| n - s));
        }

        let (state_mean, state_std) = column_mean_std(&states, state_dim);
        let (action_mean, action_std) = column_mean_std(&actions, action_dim);
        let (delta_state_mean, delta_state_std) = column_mean_std(&deltas, state_dim);

        Ok(Self {
            state_mean,
            state_std,
            action_mean,
            action_std,
            delta_state_mean,
            delta_state_std,
        })
    }

    pub fn state_dim(&self) -> usize {
        self.state_mean.len()
    }

    pub fn action_dim(&self) -> usize {
        self.action_mean.len()
    }

    /// Checks every vector against the controller's dimensionality and
    /// requires every std to be finite and non-negative
    pub fn validate(&self, state_dim: usize, action_dim: usize) -> PolicyResult<()> {
        if state_dim == 0 || action_dim == 0 {
            return Err(PolicyError::InvalidStatistics(format!(
                "state_dim {} and action_dim {} must both be at least 1",
                state_dim, action_dim
            )));
        }
        let checks = [
            ("state_mean", self.state_mean.len(), state_dim),
            ("state_std", self.state_std.len(), state_dim),
            ("action_mean", self.action_mean.len(), action_dim),
            ("action_std", self.action_std.len(), action_dim),
            ("delta_state_mean", self.delta_state_mean.len(), state_dim),
            ("delta_state_std", self.delta_state_std.len(), state_dim),
        ];
        for (name, actual, expected) in checks {
            if actual != expected {
                return Err(PolicyError::InvalidStatistics(format!(
                    "{} has length {}, expected {}",
                    name, actual, expected
                )));
            }
        }

        let stds = [
            ("state_std", &self.state_std),
            ("action_std", &self.action_std),
            ("delta_state_std", &self.delta_state_std),
        ];
        for (name, std) in stds {
            if let Some(bad) = std.iter().find(|s| !(s.is_finite() && **s >= 0.0)) {
                return Err(PolicyError::InvalidStatistics(format!(
                    "{} contains {}, expected a finite value >= 0",
                    name, bad
                )));
            }
        }
        Ok(())
    }
}

fn column_mean_std(flat: &[f32], dim: usize) -> (Vec<f32>, Vec<f32>) {
    let rows = (flat.len() / dim.max(1)) as f64;
    let mut mean = vec![0.0f64; dim];
    let mut var = vec![0.0f64; dim];

    for row in flat.chunks_exact(dim) {
        for (m, &v) in mean.iter_mut().zip(row) {
            *m += v as f64;
        }
    }
    mean.iter_mut().for_each(|m| *m /= rows);

    for row in flat.chunks_exact(dim) {
        for ((acc, &m), &v) in var.iter_mut().zip(&mean).zip(row) {
            *acc += (v as f64 - m).powi(2);
        }
    }

    (
        mean.iter().map(|&m| m as f32).collect(),
        var.iter().map(|&v| (v / rows).sqrt() as f32).collect(),
    )
}

/// The six statistic vectors uploaded once to a device
#[derive(Debug, Clone)]
pub struct StatisticsTensors<B: Backend> {
    pub state_mean: Tensor<B, 1>,
    pub state_std: Tensor<B, 1>,
    pub action_mean: Tensor<B, 1>,
    pub action_std: Tensor<B, 1>,
    pub delta_state_mean: Tensor<B, 1>,
    pub delta_state_std: Tensor<B, 1>,
}

impl<B: Backend> StatisticsTensors<B> {
    pub fn new(stats: &DatasetStatistics, device: &B::Device) -> Self {
        let upload = |v: &[f32]| Tensor::<B, 1>::from_floats(v, device);
        Self {
            state_mean: upload(&stats.state_mean),
            state_std: upload(&stats.state_std),
            action_mean: upload(&stats.action_mean),
            action_std: upload(&stats.action_std),
            delta_state_mean: upload(&stats.delta_state_mean),
            delta_state_std: upload(&stats.delta_state_std),
        }
    }
}

impl<B: AutodiffBackend> StatisticsTensors<B> {
    /// Same statistics on the non-differentiable inner backend
    pub fn inner(&self) -> StatisticsTensors<B::InnerBackend> {
        StatisticsTensors {
            state_mean: self.state_mean.clone().inner(),
            state_std: self.state_std.clone().inner(),
            action_mean: self.action_mean.clone().inner(),
            action_std: self.action_std.clone().inner(),
            delta_state_mean: self.delta_state_mean.clone().inner(),
            delta_state_std: self.delta_state_std.clone().inner(),
        }
    }
}

/// Stacks equal-length rows into a `[rows, dim]` tensor, rejecting ragged input
pub fn rows_to_tensor<B: Backend>(
    rows: &[Vec<f32>],
    dim: usize,
    what: &'static str,
    device: &B::Device,
) -> PolicyResult<Tensor<B, 2>> {
    if rows.is_empty() {
        return Err(PolicyError::EmptyBatch);
    }
    for row in rows {
        PolicyError::check_len(what, dim, row.len())?;
    }

    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Ok(Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows.len(), dim]))
}

/// Reads a tensor back into host memory
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> PolicyResult<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| PolicyError::TensorData(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn transition(state: [f32; 2], action: f32, next_state: [f32; 2]) -> Transition {
        Transition {
            state: state.to_vec(),
            action: vec![action],
            next_state: next_state.to_vec(),
        }
    }

    #[test]
    fn test_statistics_from_transitions() {
        let transitions = vec![
            transition([0.0, 1.0], -1.0, [1.0, 1.0]),
            transition([2.0, 3.0], 1.0, [5.0, 3.0]),
        ];

        let stats = DatasetStatistics::from_transitions(&transitions).unwrap();
        assert_eq!(stats.state_mean, vec![1.0, 2.0]);
        assert_eq!(stats.state_std, vec![1.0, 1.0]);
        assert_eq!(stats.action_mean, vec![0.0]);
        assert_eq!(stats.action_std, vec![1.0]);
        // deltas: [1, 0] and [3, 0]
        assert_eq!(stats.delta_state_mean, vec![2.0, 0.0]);
        assert_eq!(stats.delta_state_std, vec![1.0, 0.0]);
    }

    #[test]
    fn test_statistics_reject_empty_and_ragged() {
        assert!(matches!(
            DatasetStatistics::from_transitions(&[]),
            Err(PolicyError::EmptyBatch)
        ));

        let ragged = vec![
            transition([0.0, 1.0], 0.0, [0.0, 1.0]),
            Transition {
                state: vec![0.0],
                action: vec![0.0],
                next_state: vec![0.0, 0.0],
            },
        ];
        assert!(matches!(
            DatasetStatistics::from_transitions(&ragged),
            Err(PolicyError::ShapeMismatch { what: "state", .. })
        ));
    }

    #[test]
    fn test_validate_lengths() {
        let stats = DatasetStatistics::identity(3, 2);
        assert!(stats.validate(3, 2).is_ok());
        assert!(matches!(
            stats.validate(3, 1),
            Err(PolicyError::InvalidStatistics(_))
        ));
        assert!(matches!(
            DatasetStatistics::identity(0, 0).validate(0, 0),
            Err(PolicyError::InvalidStatistics(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_std() {
        let mut stats = DatasetStatistics::identity(2, 1);
        stats.state_std[1] = -0.5;
        assert!(matches!(
            stats.validate(2, 1),
            Err(PolicyError::InvalidStatistics(_))
        ));

        let mut stats = DatasetStatistics::identity(2, 1);
        stats.action_std[0] = f32::INFINITY;
        assert!(stats.validate(2, 1).is_err());

        let mut stats = DatasetStatistics::identity(2, 1);
        stats.delta_state_std[0] = f32::NAN;
        assert!(stats.validate(2, 1).is_err());

        let mut stats = DatasetStatistics::identity(2, 1);
        stats.delta_state_std[0] = 0.0;
        assert!(stats.validate(2, 1).is_ok());
    }

    #[test]
    fn test_statistics_reject_zero_width() {
        let empty_action = vec![Transition {
            state: vec![1.0, 2.0],
            action: vec![],
            next_state: vec![1.0, 2.0],
        }];
        assert!(matches!(
            DatasetStatistics::from_transitions(&empty_action),
            Err(PolicyError::InvalidStatistics(_))
        ));
    }

    #[test]
    fn test_sample_batch_is_capped() {
        let mut dataset = TransitionDataset::new();
        assert!(dataset.is_empty());
        for i in 0..5 {
            dataset.add(transition([i as f32, 0.0], 0.0, [i as f32, 1.0]));
        }

        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(dataset.sample_batch(3, &mut rng).len(), 3);
        assert_eq!(dataset.sample_batch(50, &mut rng).len(), 5);

        let (states, actions, next_states) = unzip_transitions(dataset.sample_batch(2, &mut rng));
        assert_eq!(states.len(), 2);
        assert_eq!(actions.len(), 2);
        assert_eq!(next_states.len(), 2);
    }

    #[test]
    fn test_rows_to_tensor() {
        let device = Default::default();
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let tensor = rows_to_tensor::<NdArray>(&rows, 2, "state", &device).unwrap();
        assert_eq!(tensor.dims(), [3, 2]);
        assert_eq!(tensor_to_vec(tensor).unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            rows_to_tensor::<NdArray>(&ragged, 2, "state", &device),
            Err(PolicyError::ShapeMismatch { actual: 1, .. })
        ));
        assert!(matches!(
            rows_to_tensor::<NdArray>(&[], 2, "state", &device),
            Err(PolicyError::EmptyBatch)
        ));
    }
}
