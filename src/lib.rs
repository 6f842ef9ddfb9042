//! Deep Reactive Policy planning for continuous MDPs
//!
//! A policy network is optimized offline by backpropagating through batched,
//! stochastic simulations of a compiled domain model.

pub mod app;
pub mod cli;
pub mod error;
pub mod infra;
pub mod model;
pub mod planners;

pub use app::{ModelLoader, PlanOutcome, Planner, PlannerFactory, run_experiment};
pub use error::{Error, Result};
