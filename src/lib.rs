//! Model-based reinforcement learning controller
//!
//! A learned dynamics model (Burn MLP over normalized states and actions) is
//! combined with random-shooting model-predictive control:
//!
//! ```text
//! transitions ──▶ DatasetStatistics ──▶ normalize
//!                                          │
//!                                          ▼
//!                                   DynamicsModel ◀── DynamicsTrainer (Adam, MSE)
//!                                          │
//!                 state ──▶ RandomShootingPlanner ──▶ action
//!                                          │
//!                                  ModelBasedPolicy
//! ```

pub mod dataset;
pub mod dynamics;
pub mod env;
pub mod envs;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod planner;
pub mod policy;
pub mod train;

// Re-export commonly used types
pub use dataset::{DatasetStatistics, Transition, TransitionDataset};
pub use dynamics::DynamicsModel;
pub use env::{ActionBounds, Environment};
pub use error::{PolicyError, PolicyResult};
pub use metrics::{MovingAverage, TrainingMetrics};
pub use planner::RandomShootingPlanner;
pub use policy::{ModelBasedPolicy, PolicyConfig};
pub use train::DynamicsTrainer;
