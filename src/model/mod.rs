//! Compiled MDP models
//!
//! This module turns a domain specifier into a [`CompiledModel`]: a batched,
//! differentiable simulator of a continuous state-action MDP.
//!
//! # Architecture
//!
//! ```text
//! "Reservoir-8" / instance.json
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  registry::make()                                           │
//! │  - Resolves registry ids and JSON instance files            │
//! │  - Validates domain parameters                              │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CompiledModel                                              │
//! │  - Fluent orderings and sizes                               │
//! │  - Initial state, action bounds, transition + reward        │
//! │  - Sampler per step (reparameterized or scored)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod hvac;
pub mod navigation;
pub mod registry;
pub mod reservoir;
pub mod sampling;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use hvac::Hvac;
pub use navigation::Navigation;
pub use registry::{from_instance_file, from_registry, make};
pub use reservoir::Reservoir;
pub use sampling::{Sample, Sampler, merge_log_probs};

/// A named state or action fluent and its flattened width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fluent {
    pub name: String,
    pub size: usize,
}

impl Fluent {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Optional lower and upper bounds `[batch_size, size]` for one action fluent.
#[derive(Debug, Clone)]
pub struct ActionBounds<B: Backend> {
    pub lower: Option<Tensor<B, 2>>,
    pub upper: Option<Tensor<B, 2>>,
}

impl<B: Backend> ActionBounds<B> {
    pub fn unbounded() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    pub fn between(lower: Tensor<B, 2>, upper: Tensor<B, 2>) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }
}

/// Result of one batched simulation step.
#[derive(Debug, Clone)]
pub struct Transition<B: Backend> {
    /// Next state, one tensor `[batch_size, size]` per state fluent
    pub next_state: Vec<Tensor<B, 2>>,
    /// Immediate reward `[batch_size]`
    pub reward: Tensor<B, 1>,
    /// Log-density of the scored samples, if any were drawn without reparameterization
    pub log_prob: Option<Tensor<B, 1>>,
}

/// Dynamics of a continuous MDP, batched over the first tensor dimension.
pub trait Dynamics {
    fn name(&self) -> String;

    fn state_fluents(&self) -> Vec<Fluent>;

    fn action_fluents(&self) -> Vec<Fluent>;

    /// Validate domain parameters
    fn validate(&self) -> Result<()>;

    fn initial_state<B: Backend>(&self, batch_size: usize, device: &B::Device)
    -> Vec<Tensor<B, 2>>;

    fn action_bounds<B: Backend>(&self, state: &[Tensor<B, 2>]) -> Vec<ActionBounds<B>>;

    fn transition<B: Backend>(
        &self,
        state: &[Tensor<B, 2>],
        action: &[Tensor<B, 2>],
        sampler: &Sampler,
    ) -> Transition<B>;
}

/// All domains the model factory knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "lowercase")]
pub enum Domain {
    Navigation(Navigation),
    Reservoir(Reservoir),
    Hvac(Hvac),
}

impl Dynamics for Domain {
    fn name(&self) -> String {
        match self {
            Domain::Navigation(d) => d.name(),
            Domain::Reservoir(d) => d.name(),
            Domain::Hvac(d) => d.name(),
        }
    }

    fn state_fluents(&self) -> Vec<Fluent> {
        match self {
            Domain::Navigation(d) => d.state_fluents(),
            Domain::Reservoir(d) => d.state_fluents(),
            Domain::Hvac(d) => d.state_fluents(),
        }
    }

    fn action_fluents(&self) -> Vec<Fluent> {
        match self {
            Domain::Navigation(d) => d.action_fluents(),
            Domain::Reservoir(d) => d.action_fluents(),
            Domain::Hvac(d) => d.action_fluents(),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Domain::Navigation(d) => d.validate(),
            Domain::Reservoir(d) => d.validate(),
            Domain::Hvac(d) => d.validate(),
        }
    }

    fn initial_state<B: Backend>(
        &self,
        batch_size: usize,
        device: &B::Device,
    ) -> Vec<Tensor<B, 2>> {
        match self {
            Domain::Navigation(d) => d.initial_state(batch_size, device),
            Domain::Reservoir(d) => d.initial_state(batch_size, device),
            Domain::Hvac(d) => d.initial_state(batch_size, device),
        }
    }

    fn action_bounds<B: Backend>(&self, state: &[Tensor<B, 2>]) -> Vec<ActionBounds<B>> {
        match self {
            Domain::Navigation(d) => d.action_bounds(state),
            Domain::Reservoir(d) => d.action_bounds(state),
            Domain::Hvac(d) => d.action_bounds(state),
        }
    }

    fn transition<B: Backend>(
        &self,
        state: &[Tensor<B, 2>],
        action: &[Tensor<B, 2>],
        sampler: &Sampler,
    ) -> Transition<B> {
        match self {
            Domain::Navigation(d) => d.transition(state, action, sampler),
            Domain::Reservoir(d) => d.transition(state, action, sampler),
            Domain::Hvac(d) => d.transition(state, action, sampler),
        }
    }
}

/// How transitions are compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationMode {
    /// Stochastic computation graph: transitions draw noise
    Scg,
    /// Mean dynamics without noise
    Deterministic,
}

/// A domain compiled for simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModel {
    domain: Domain,
    mode: CompilationMode,
    batch_mode: bool,
}

impl CompiledModel {
    pub fn new(domain: Domain, mode: CompilationMode) -> Self {
        Self {
            domain,
            mode,
            batch_mode: false,
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn mode(&self) -> CompilationMode {
        self.mode
    }

    pub fn name(&self) -> String {
        self.domain.name()
    }

    /// Simulate whole batches of trajectories instead of a single one.
    pub fn batch_mode_on(&mut self) {
        self.batch_mode = true;
    }

    pub fn batch_mode_off(&mut self) {
        self.batch_mode = false;
    }

    pub fn is_batch_mode(&self) -> bool {
        self.batch_mode
    }

    /// Number of trajectories actually simulated for a requested batch size.
    pub fn effective_batch_size(&self, requested: usize) -> usize {
        if self.batch_mode { requested } else { 1 }
    }

    pub fn state_fluents(&self) -> Vec<Fluent> {
        self.domain.state_fluents()
    }

    pub fn action_fluents(&self) -> Vec<Fluent> {
        self.domain.action_fluents()
    }

    /// Width of the concatenated state vector
    pub fn state_size(&self) -> usize {
        self.state_fluents().iter().map(|f| f.size).sum()
    }

    pub fn initial_state<B: Backend>(
        &self,
        batch_size: usize,
        device: &B::Device,
    ) -> Vec<Tensor<B, 2>> {
        self.domain
            .initial_state(self.effective_batch_size(batch_size), device)
    }

    pub fn action_bounds<B: Backend>(&self, state: &[Tensor<B, 2>]) -> Vec<ActionBounds<B>> {
        self.domain.action_bounds(state)
    }

    /// Simulate one step. `reparameterized` selects the gradient path for the
    /// noise drawn in this step.
    pub fn transition<B: Backend>(
        &self,
        state: &[Tensor<B, 2>],
        action: &[Tensor<B, 2>],
        reparameterized: bool,
    ) -> Transition<B> {
        let sampler = match self.mode {
            CompilationMode::Scg => Sampler::new(true, reparameterized),
            CompilationMode::Deterministic => Sampler::deterministic(),
        };
        self.domain.transition(state, action, &sampler)
    }
}

/// Repeat `row` for every batch entry, giving a `[batch_size, row.len()]` tensor.
pub(crate) fn broadcast_row<B: Backend>(
    row: &[f32],
    batch_size: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let data: Vec<f32> = (0..batch_size).flat_map(|_| row.iter().copied()).collect();
    Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([batch_size, row.len()])
}
