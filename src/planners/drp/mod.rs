//! Deep Reactive Policy planner
//!
//! Optimizes a feed-forward policy offline by simulating batches of
//! trajectories through a compiled model and backpropagating the total
//! reward (or a score-function surrogate of it) into the policy weights.
//!
//! # Architecture
//!
//! ```text
//! CompiledModel + PolicyConfig
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PolicyOptimizationPlanner::build()                         │
//! │  - Validates horizon and batch size                         │
//! │  - Selects optimizer, loss and estimator                    │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PolicyOptimizer (per epoch)                                │
//! │  - Rollout: policy → action bounds → transition             │
//! │  - Surrogate loss + regularization, backward, step          │
//! │  - TensorBoard summaries, checkpoint on improvement         │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! PlanningResult { rewards, losses, policy, logdir }
//! ```

pub mod activation;
pub mod adadelta;
pub mod estimator;
pub mod optimizer;
pub mod planner;
pub mod policy;

pub use activation::Activation;
pub use adadelta::{Adadelta, AdadeltaConfig};
pub use estimator::{LossKind, Reparameterization, surrogate_loss};
pub use optimizer::{
    BuildConfig, OptimizerKind, PolicyOptimizer, TrainingOutcome, TrainingProgress,
};
pub use planner::{PlanningResult, PolicyOptimizationPlanner};
pub use policy::{DeepReactivePolicy, PolicyConfig, Regularization, VariableNorm};
