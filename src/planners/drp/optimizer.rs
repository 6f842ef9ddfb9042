//! Policy optimization loop

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use burn::optim::{AdaGradConfig, AdamConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::adadelta::AdadeltaConfig;
use super::estimator::{LossKind, Reparameterization, surrogate_loss};
use super::policy::{DeepReactivePolicy, Regularization, VariableNorm};
use crate::error::{Error, Result};
use crate::infra::{EpochReport, SummaryWriter, TrainingObserver};
use crate::model::{CompiledModel, merge_log_probs};

/// First-order optimizer applied to the policy parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OptimizerKind {
    #[value(name = "Adadelta")]
    Adadelta,
    #[value(name = "Adagrad")]
    Adagrad,
    #[value(name = "Adam")]
    Adam,
    #[value(name = "GradientDescent")]
    GradientDescent,
    /// Plain gradient descent: proximal steps are the identity without L1/L2 terms
    #[value(name = "ProximalGradientDescent")]
    ProximalGradientDescent,
    /// Adagrad: proximal steps are the identity without L1/L2 terms
    #[value(name = "ProximalAdagrad")]
    ProximalAdagrad,
    #[default]
    #[value(name = "RMSProp")]
    RmsProp,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Training hyperparameters passed to the planner's build step.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub horizon: usize,
    pub optimizer: OptimizerKind,
    pub loss: LossKind,
    pub regularization: Regularization,
    pub reparameterization: Reparameterization,
    pub baseline: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            batch_size: 256,
            horizon: 40,
            optimizer: OptimizerKind::RmsProp,
            loss: LossKind::Linear,
            regularization: Regularization::default(),
            reparameterization: Reparameterization::Full,
            baseline: false,
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(Error::ZeroHorizon);
        }
        if self.batch_size == 0 {
            return Err(Error::ZeroBatchSize);
        }
        Ok(())
    }
}

/// Where a run starts: epochs are numbered on from earlier runs and only
/// rewards above the best so far count as improvements.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrainingProgress {
    pub next_epoch: usize,
    pub best: Option<(usize, f32)>,
}

/// Outcome of [`PolicyOptimizer::run`]
#[derive(Debug)]
pub struct TrainingOutcome<B: Backend> {
    /// `(epoch, average total reward)` for every improving epoch
    pub rewards: Vec<(usize, f32)>,
    /// Loss of every improving epoch
    pub losses: Vec<f32>,
    pub policy: DeepReactivePolicy<B>,
    /// Progress to resume from in the next run
    pub progress: TrainingProgress,
}

/// Total reward and accumulated log-density of a batch of trajectories
struct Rollout<B: Backend> {
    total_reward: Tensor<B, 1>,
    log_prob: Option<Tensor<B, 1>>,
}

/// Batch statistics of the total reward
#[derive(Debug, Clone, Copy, PartialEq)]
struct RewardStats {
    mean: f32,
    stddev: f32,
    max: f32,
    min: f32,
}

impl RewardStats {
    fn from_samples(samples: &[f32]) -> Self {
        let n = samples.len().max(1) as f32;
        let mean = samples.iter().sum::<f32>() / n;
        let variance = samples.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / n;
        Self {
            mean,
            stddev: variance.sqrt(),
            max: samples.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            min: samples.iter().copied().fold(f32::INFINITY, f32::min),
        }
    }
}

/// Optimizes a Deep Reactive Policy by backpropagating through batched rollouts.
pub struct PolicyOptimizer<B: AutodiffBackend> {
    model: CompiledModel,
    config: BuildConfig,
    logdir: PathBuf,
    device: B::Device,
}

impl<B: AutodiffBackend> PolicyOptimizer<B> {
    pub fn new(
        model: CompiledModel,
        config: BuildConfig,
        logdir: impl Into<PathBuf>,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            logdir: logdir.into(),
            device,
        })
    }

    /// Directory holding policy checkpoints
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.logdir.join("checkpoints")
    }

    /// Train `policy` for `epochs` optimization steps with the configured optimizer,
    /// continuing from `progress`.
    pub fn run(
        &self,
        policy: DeepReactivePolicy<B>,
        progress: TrainingProgress,
        epochs: usize,
        observer: &mut dyn TrainingObserver,
    ) -> Result<TrainingOutcome<B>> {
        match self.config.optimizer {
            OptimizerKind::Adadelta => {
                let optimizer = AdadeltaConfig::new().init();
                self.train(policy, optimizer, progress, epochs, observer)
            }
            OptimizerKind::Adagrad | OptimizerKind::ProximalAdagrad => {
                let optimizer = AdaGradConfig::new().init();
                self.train(policy, optimizer, progress, epochs, observer)
            }
            OptimizerKind::Adam => {
                let optimizer = AdamConfig::new().init();
                self.train(policy, optimizer, progress, epochs, observer)
            }
            OptimizerKind::GradientDescent | OptimizerKind::ProximalGradientDescent => {
                let optimizer = SgdConfig::new().init();
                self.train(policy, optimizer, progress, epochs, observer)
            }
            OptimizerKind::RmsProp => {
                let optimizer = RmsPropConfig::new().with_alpha(0.9).init();
                self.train(policy, optimizer, progress, epochs, observer)
            }
        }
    }

    fn train<O>(
        &self,
        mut policy: DeepReactivePolicy<B>,
        mut optimizer: O,
        progress: TrainingProgress,
        epochs: usize,
        observer: &mut dyn TrainingObserver,
    ) -> Result<TrainingOutcome<B>>
    where
        O: Optimizer<DeepReactivePolicy<B>, B>,
    {
        let mut train_writer = SummaryWriter::create(self.logdir.join("train"))?;
        let mut test_writer = SummaryWriter::create(self.logdir.join("test"))?;
        debug!(
            "Writing summaries to {} and {}",
            train_writer.path().display(),
            test_writer.path().display()
        );
        let checkpoint = self.checkpoint_dir().join(policy.name());

        info!(
            "Optimizing {} ({} parameters) with {} on {}: batch = {}, horizon = {}, estimator = {}",
            policy.name(),
            policy.size(),
            self.config.optimizer,
            self.model.name(),
            self.model.effective_batch_size(self.config.batch_size),
            self.config.horizon,
            self.config.reparameterization
        );
        observer.on_train_start(&policy.name(), epochs)?;

        let mut rewards = Vec::new();
        let mut losses = Vec::new();
        let mut best = progress.best;
        let first_epoch = progress.next_epoch;

        for epoch in first_epoch..first_epoch + epochs {
            let rollout = self.rollout(&policy);
            let stats = RewardStats::from_samples(&tensor_values(rollout.total_reward.clone())?);

            let mut loss = surrogate_loss(
                rollout.total_reward,
                rollout.log_prob,
                self.config.loss,
                self.config.baseline,
            );
            if let Some(penalty) = policy.regularization(&self.config.regularization) {
                loss = loss + penalty;
            }
            let loss_value = loss.clone().into_scalar().elem::<f32>();

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &policy);
            let norms = norm_scalars(&policy.variable_norms(&grads));
            policy = optimizer.step(self.config.learning_rate, policy, grads);

            let scalars = [
                ("loss", loss_value),
                ("avg_total_reward", stats.mean),
                ("stddev_total_reward", stats.stddev),
                ("max_total_reward", stats.max),
                ("min_total_reward", stats.min),
            ];
            let train_scalars: Vec<(&str, f32)> = scalars
                .iter()
                .copied()
                .chain(norms.iter().map(|(tag, value)| (tag.as_str(), *value)))
                .collect();
            train_writer.add_scalars(&train_scalars, epoch)?;

            let improved = best.is_none_or(|(_, reward)| stats.mean > reward);
            if improved {
                best = Some((epoch, stats.mean));
                rewards.push((epoch, stats.mean));
                losses.push(loss_value);
                test_writer.add_scalars(&scalars, epoch)?;
                self.save_checkpoint(&policy, &checkpoint)?;
            }

            observer.on_epoch(&EpochReport {
                epoch,
                loss: loss_value,
                avg_total_reward: stats.mean,
                improved,
            })?;
        }

        train_writer.flush()?;
        test_writer.flush()?;
        observer.on_train_end(best)?;

        Ok(TrainingOutcome {
            rewards,
            losses,
            policy,
            progress: TrainingProgress {
                next_epoch: first_epoch + epochs,
                best,
            },
        })
    }

    /// Simulate a batch of trajectories over the horizon with the current policy.
    fn rollout(&self, policy: &DeepReactivePolicy<B>) -> Rollout<B> {
        let batch_size = self.model.effective_batch_size(self.config.batch_size);
        let mut state = self.model.initial_state::<B>(batch_size, &self.device);
        let mut total_reward = Tensor::<B, 1>::zeros([batch_size], &self.device);
        let mut log_prob = None;

        for t in 0..self.config.horizon {
            let bounds = self.model.action_bounds(&state);
            let action = policy.forward(&state, &bounds);
            let reparameterized = self.config.reparameterization.reparameterized_at(t);
            let transition = self.model.transition(&state, &action, reparameterized);

            total_reward = total_reward + transition.reward;
            log_prob = merge_log_probs(log_prob, transition.log_prob);
            state = transition.next_state;
        }

        Rollout {
            total_reward,
            log_prob,
        }
    }

    fn save_checkpoint(&self, policy: &DeepReactivePolicy<B>, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("create checkpoint directory {}", parent.display()), e)
            })?;
        }
        let saved = policy.save(path)?;
        debug!("Saved checkpoint to {}", saved.display());
        Ok(())
    }
}

/// `norm/<variable>` and `grad_norm/<variable>` summary scalars
fn norm_scalars(norms: &[VariableNorm]) -> Vec<(String, f32)> {
    let mut scalars = Vec::with_capacity(2 * norms.len());
    for variable in norms {
        scalars.push((format!("norm/{}", variable.name), variable.norm));
        if let Some(grad_norm) = variable.grad_norm {
            scalars.push((format!("grad_norm/{}", variable.name), grad_norm));
        }
    }
    scalars
}

fn tensor_values<B: Backend>(tensor: Tensor<B, 1>) -> Result<Vec<f32>> {
    tensor
        .detach()
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| Error::TensorData {
            message: format!("{e:?}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::DefaultObserver;
    use crate::model::{CompilationMode, Domain, Navigation};
    use crate::planners::drp::PolicyConfig;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn navigation(batch_mode: bool) -> CompiledModel {
        let mut model = CompiledModel::new(
            Domain::Navigation(Navigation::default()),
            CompilationMode::Scg,
        );
        if batch_mode {
            model.batch_mode_on();
        }
        model
    }

    fn short_config() -> BuildConfig {
        BuildConfig {
            batch_size: 8,
            horizon: 5,
            learning_rate: 0.01,
            ..BuildConfig::default()
        }
    }

    #[test]
    fn test_rejects_zero_horizon_and_batch() {
        let zero_horizon = BuildConfig {
            horizon: 0,
            ..short_config()
        };
        assert!(matches!(
            PolicyOptimizer::<TestBackend>::new(
                navigation(true),
                zero_horizon,
                "/tmp",
                Default::default()
            ),
            Err(Error::ZeroHorizon)
        ));

        let zero_batch = BuildConfig {
            batch_size: 0,
            ..short_config()
        };
        assert!(matches!(
            PolicyOptimizer::<TestBackend>::new(
                navigation(true),
                zero_batch,
                "/tmp",
                Default::default()
            ),
            Err(Error::ZeroBatchSize)
        ));
    }

    #[test]
    fn test_reward_stats() {
        let stats = RewardStats::from_samples(&[1.0, 3.0]);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.stddev, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.min, 1.0);
    }

    #[test]
    fn test_rollout_uses_effective_batch_size() {
        let device = Default::default();
        let model = navigation(false);
        let policy = PolicyConfig::new(vec![4]).init::<TestBackend>(
            &model.state_fluents(),
            &model.action_fluents(),
            &device,
        );
        let optimizer =
            PolicyOptimizer::<TestBackend>::new(model, short_config(), "/tmp", device).unwrap();

        let rollout = optimizer.rollout(&policy);
        assert_eq!(rollout.total_reward.dims(), [1]);
        assert!(rollout.log_prob.is_none());
    }

    #[test]
    fn test_score_function_rollout_has_log_prob() {
        let device = Default::default();
        let model = navigation(true);
        let policy = PolicyConfig::new(vec![]).init::<TestBackend>(
            &model.state_fluents(),
            &model.action_fluents(),
            &device,
        );
        let config = BuildConfig {
            reparameterization: Reparameterization::None,
            ..short_config()
        };
        let optimizer = PolicyOptimizer::<TestBackend>::new(model, config, "/tmp", device).unwrap();

        let rollout = optimizer.rollout(&policy);
        assert_eq!(rollout.total_reward.dims(), [8]);
        assert_eq!(rollout.log_prob.map(|lp| lp.dims()), Some([8]));
    }

    #[test]
    fn test_run_records_improvements_and_checkpoints() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let model = navigation(true);
        let policy = PolicyConfig::new(vec![8]).init::<TestBackend>(
            &model.state_fluents(),
            &model.action_fluents(),
            &device,
        );
        let name = policy.name();
        let optimizer =
            PolicyOptimizer::<TestBackend>::new(model, short_config(), dir.path(), device).unwrap();

        let outcome = optimizer
            .run(policy, TrainingProgress::default(), 3, &mut DefaultObserver)
            .unwrap();

        assert!(!outcome.rewards.is_empty());
        assert_eq!(outcome.rewards.len(), outcome.losses.len());
        assert_eq!(outcome.rewards[0].0, 0);
        assert!(outcome.rewards.windows(2).all(|w| w[1].1 > w[0].1));
        assert!(
            optimizer
                .checkpoint_dir()
                .join(format!("{name}.mpk"))
                .exists()
        );
        assert!(dir.path().join("train").is_dir());
        assert!(dir.path().join("test").is_dir());
        assert_eq!(
            outcome.progress,
            TrainingProgress {
                next_epoch: 3,
                best: outcome.rewards.last().copied(),
            }
        );
    }

    fn actions(policy: &DeepReactivePolicy<TestBackend>, model: &CompiledModel) -> Vec<f32> {
        let state = model.initial_state::<TestBackend>(1, &Default::default());
        let bounds = model.action_bounds(&state);
        policy
            .forward(&state, &bounds)
            .into_iter()
            .flat_map(|action| tensor_values(action.flatten::<1>(0, 1)).unwrap())
            .collect()
    }

    #[test]
    fn test_one_epoch_updates_weights_for_every_estimator() {
        for reparameterization in [
            Reparameterization::Full,
            Reparameterization::None,
            Reparameterization::Partial {
                n_step: std::num::NonZeroUsize::new(2).unwrap(),
            },
        ] {
            let dir = tempfile::tempdir().unwrap();
            let model = navigation(true);
            let policy = PolicyConfig::new(vec![4]).init::<TestBackend>(
                &model.state_fluents(),
                &model.action_fluents(),
                &Default::default(),
            );
            let before = actions(&policy, &model);
            let config = BuildConfig {
                reparameterization,
                optimizer: OptimizerKind::Adam,
                ..short_config()
            };
            let optimizer = PolicyOptimizer::<TestBackend>::new(
                model.clone(),
                config,
                dir.path(),
                Default::default(),
            )
            .unwrap();

            let outcome = optimizer
                .run(policy, TrainingProgress::default(), 1, &mut DefaultObserver)
                .unwrap();

            let after = actions(&outcome.policy, &model);
            assert_eq!(before.len(), after.len());
            assert!(
                before.iter().zip(&after).any(|(b, a)| b != a),
                "{reparameterization}: policy unchanged after one step"
            );
        }
    }

    #[test]
    fn test_run_continues_from_progress() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let model = navigation(true);
        let policy = PolicyConfig::new(vec![]).init::<TestBackend>(
            &model.state_fluents(),
            &model.action_fluents(),
            &device,
        );
        let optimizer =
            PolicyOptimizer::<TestBackend>::new(model, short_config(), dir.path(), device).unwrap();

        // a best reward nothing can beat
        let progress = TrainingProgress {
            next_epoch: 5,
            best: Some((4, f32::INFINITY)),
        };
        let outcome = optimizer.run(policy, progress, 2, &mut DefaultObserver).unwrap();

        assert!(outcome.rewards.is_empty());
        assert_eq!(outcome.progress.next_epoch, 7);
        assert_eq!(outcome.progress.best, Some((4, f32::INFINITY)));
    }

    #[test]
    fn test_norm_scalars_tags() {
        let norms = [
            VariableNorm {
                name: "hidden_0/kernel".to_string(),
                norm: 2.0,
                grad_norm: Some(0.5),
            },
            VariableNorm {
                name: "output_0/bias".to_string(),
                norm: 1.0,
                grad_norm: None,
            },
        ];
        assert_eq!(
            norm_scalars(&norms),
            vec![
                ("norm/hidden_0/kernel".to_string(), 2.0),
                ("grad_norm/hidden_0/kernel".to_string(), 0.5),
                ("norm/output_0/bias".to_string(), 1.0),
            ]
        );
    }
}
