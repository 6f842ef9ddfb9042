use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use super::optimizer::{BuildConfig, PolicyOptimizer, TrainingProgress};
use super::policy::{DeepReactivePolicy, PolicyConfig};
use crate::error::{Error, Result};
use crate::infra::{DefaultObserver, TrainingObserver};
use crate::model::CompiledModel;

/// Result of a planning run
#[derive(Debug)]
pub struct PlanningResult<B: AutodiffBackend> {
    /// `(epoch, average total reward)` for every epoch that improved on the best
    /// so far, over all runs of the planner
    pub rewards: Vec<(usize, f32)>,
    pub losses: Vec<f32>,
    pub policy: DeepReactivePolicy<B>,
    pub logdir: PathBuf,
}

/// Offline planner that optimizes a Deep Reactive Policy for a compiled model.
///
/// Lifecycle is `new` -> `build` -> `run`; `run` may be called again to keep
/// training the same policy, with epochs numbered on from the previous run.
pub struct PolicyOptimizationPlanner<B: AutodiffBackend> {
    model: CompiledModel,
    policy: DeepReactivePolicy<B>,
    logdir: PathBuf,
    device: B::Device,
    optimizer: Option<PolicyOptimizer<B>>,
    observer: Box<dyn TrainingObserver>,
    progress: TrainingProgress,
    rewards: Vec<(usize, f32)>,
    losses: Vec<f32>,
}

impl<B: AutodiffBackend> PolicyOptimizationPlanner<B> {
    pub fn new(
        model: CompiledModel,
        config: &PolicyConfig,
        logdir: impl Into<PathBuf>,
        device: B::Device,
    ) -> Self {
        let policy = config.init(&model.state_fluents(), &model.action_fluents(), &device);
        Self {
            model,
            policy,
            logdir: logdir.into(),
            device,
            optimizer: None,
            observer: Box::new(DefaultObserver),
            progress: TrainingProgress::default(),
            rewards: Vec::new(),
            losses: Vec::new(),
        }
    }

    /// Replace the default logging observer.
    pub fn with_observer(mut self, observer: Box<dyn TrainingObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &DeepReactivePolicy<B> {
        &self.policy
    }

    pub fn logdir(&self) -> &Path {
        &self.logdir
    }

    pub fn is_built(&self) -> bool {
        self.optimizer.is_some()
    }

    pub fn build(&mut self, config: BuildConfig) -> Result<()> {
        let optimizer = PolicyOptimizer::new(
            self.model.clone(),
            config,
            self.logdir.clone(),
            self.device.clone(),
        )?;
        info!(
            "Built planner for {}: {} with {} parameters",
            self.model.name(),
            self.policy.name(),
            self.policy.size()
        );
        self.optimizer = Some(optimizer);
        Ok(())
    }

    pub fn run(&mut self, epochs: usize) -> Result<PlanningResult<B>> {
        let optimizer = self.optimizer.as_ref().ok_or(Error::NotBuilt)?;
        let outcome = optimizer.run(
            self.policy.clone(),
            self.progress,
            epochs,
            self.observer.as_mut(),
        )?;
        self.policy = outcome.policy.clone();
        self.progress = outcome.progress;
        self.rewards.extend(outcome.rewards);
        self.losses.extend(outcome.losses);

        Ok(PlanningResult {
            rewards: self.rewards.clone(),
            losses: self.losses.clone(),
            policy: outcome.policy,
            logdir: self.logdir.clone(),
        })
    }
}
