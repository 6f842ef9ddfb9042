//! Command-line interface of the `tfmdp` planner
//!
//! [`PlannerArgs`] is the flat configuration produced by parsing; it is split
//! into a [`PolicyConfig`] and a [`BuildConfig`] for the planner.

pub mod report;

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::error::{Error, Result};
use crate::planners::drp::{
    Activation, BuildConfig, LossKind, OptimizerKind, PolicyConfig, Regularization,
    Reparameterization,
};

pub use report::{print_parameters, print_performance};

pub const DEFAULT_LOGDIR: &str = "/tmp/tfmdp";

/// Gradient estimator selected on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum EstimatorKind {
    /// Pathwise derivative
    #[default]
    Pd,
    /// Score function
    Sf,
    /// Pathwise within n-step blocks, score function across them
    Hybrid,
}

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "tfmdp")]
#[command(
    version,
    about = "Probabilistic planner for continuous MDPs based on Deep Reactive Policies",
    long_about = None
)]
pub struct PlannerArgs {
    /// Domain: registry id (e.g. Navigation-v2, Reservoir-8, HVAC-3) or JSON instance file
    pub rddl: String,

    /// Number of units in each hidden layer
    #[arg(short = 'l', long, num_args = 0.., value_name = "UNITS")]
    pub layers: Vec<usize>,

    /// Activation function of the hidden layers
    #[arg(short = 'a', long, value_enum, default_value_t = Activation::Elu)]
    pub activation: Activation,

    /// Layer-normalize the state fluents
    #[arg(long)]
    pub input_layer_norm: bool,

    /// Layer-normalize the hidden layers
    #[arg(long)]
    pub hidden_layer_norm: bool,

    /// L1 regularization of the dense kernels
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub kernel_l1_regularizer: f64,

    /// L2 regularization of the dense kernels
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub kernel_l2_regularizer: f64,

    /// L1 regularization of the dense biases
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub bias_l1_regularizer: f64,

    /// L2 regularization of the dense biases
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub bias_l2_regularizer: f64,

    /// Gradient estimator
    #[arg(long, value_enum, default_value_t = EstimatorKind::Pd)]
    pub estimator: EstimatorKind,

    /// Block length of the hybrid estimator
    #[arg(long, required_if_eq("estimator", "hybrid"))]
    pub n_step: Option<NonZeroUsize>,

    /// Subtract the batch-mean loss from score-function weights
    #[arg(long)]
    pub baseline: bool,

    /// Number of trajectories per batch
    #[arg(short = 'b', long, default_value_t = 256, value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: u64,

    /// Number of timesteps per trajectory
    #[arg(long, default_value_t = 40, value_parser = clap::value_parser!(u64).range(1..))]
    pub horizon: u64,

    /// Number of training epochs
    #[arg(short = 'e', long, default_value_t = 200)]
    pub epochs: usize,

    /// Optimizer learning rate
    #[arg(long = "learning-rate", default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Loss optimizer
    #[arg(long, value_enum, default_value_t = OptimizerKind::RmsProp)]
    pub optimizer: OptimizerKind,

    /// Loss function applied to the trajectory cost
    #[arg(long = "loss-fn", value_enum, default_value_t = LossKind::Linear)]
    pub loss_fn: LossKind,

    /// Log directory for summaries and checkpoints
    #[arg(long, env = "TFMDP_LOGDIR", default_value = DEFAULT_LOGDIR)]
    pub logdir: PathBuf,

    /// Print the resolved parameters
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Seed for the backend random number generator
    #[arg(long)]
    pub seed: Option<u64>,
}

impl PlannerArgs {
    pub fn reparameterization(&self) -> Result<Reparameterization> {
        select_estimator(self.estimator, self.n_step)
    }

    pub fn regularization(&self) -> Regularization {
        Regularization {
            kernel_l1: self.kernel_l1_regularizer,
            kernel_l2: self.kernel_l2_regularizer,
            bias_l1: self.bias_l1_regularizer,
            bias_l2: self.bias_l2_regularizer,
        }
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig::new(self.layers.clone())
            .with_activation(self.activation)
            .with_input_layer_norm(self.input_layer_norm)
            .with_hidden_layer_norm(self.hidden_layer_norm)
    }

    pub fn build_config(&self) -> Result<BuildConfig> {
        Ok(BuildConfig {
            learning_rate: self.learning_rate,
            batch_size: self.batch_size as usize,
            horizon: self.horizon as usize,
            optimizer: self.optimizer,
            loss: self.loss_fn,
            regularization: self.regularization(),
            reparameterization: self.reparameterization()?,
            baseline: self.baseline,
        })
    }
}

/// Map the estimator flag to the reparameterization of the sampled transitions.
///
/// `n_step` is ignored by `pd` and `sf`; `hybrid` without it is an error.
pub fn select_estimator(
    estimator: EstimatorKind,
    n_step: Option<NonZeroUsize>,
) -> Result<Reparameterization> {
    match estimator {
        EstimatorKind::Pd => Ok(Reparameterization::Full),
        EstimatorKind::Sf => Ok(Reparameterization::None),
        EstimatorKind::Hybrid => n_step
            .map(|n_step| Reparameterization::Partial { n_step })
            .ok_or(Error::MissingNStep),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_estimator() {
        assert_eq!(
            select_estimator(EstimatorKind::Pd, None).unwrap(),
            Reparameterization::Full
        );
        assert_eq!(
            select_estimator(EstimatorKind::Sf, NonZeroUsize::new(3)).unwrap(),
            Reparameterization::None
        );
        assert_eq!(
            select_estimator(EstimatorKind::Hybrid, NonZeroUsize::new(3)).unwrap(),
            Reparameterization::Partial {
                n_step: NonZeroUsize::new(3).unwrap()
            }
        );
    }

    #[test]
    fn test_hybrid_without_n_step_is_an_error() {
        assert!(matches!(
            select_estimator(EstimatorKind::Hybrid, None),
            Err(Error::MissingNStep)
        ));

        // arguments built without the parser skip its required_if check
        let args = PlannerArgs {
            estimator: EstimatorKind::Hybrid,
            n_step: None,
            ..PlannerArgs::try_parse_from(["tfmdp", "Reservoir-8"]).unwrap()
        };
        assert!(matches!(args.build_config(), Err(Error::MissingNStep)));
    }

    #[test]
    fn test_policy_config_from_args() {
        let args = PlannerArgs::try_parse_from([
            "tfmdp",
            "Navigation-v2",
            "-l",
            "64",
            "32",
            "-a",
            "relu",
            "--input-layer-norm",
        ])
        .unwrap();

        let config = args.policy_config();
        assert_eq!(config.layers, vec![64, 32]);
        assert_eq!(config.activation, Activation::Relu);
        assert!(config.input_layer_norm);
        assert!(!config.hidden_layer_norm);
    }

    #[test]
    fn test_build_config_from_args() {
        let args = PlannerArgs::try_parse_from([
            "tfmdp",
            "Reservoir-8",
            "--estimator",
            "hybrid",
            "--n-step",
            "5",
            "--baseline",
            "--kernel-l2-regularizer",
            "0.01",
            "--optimizer",
            "Adam",
            "--loss-fn",
            "huber",
        ])
        .unwrap();

        let config = args.build_config().unwrap();
        assert_eq!(
            config.reparameterization,
            Reparameterization::Partial {
                n_step: NonZeroUsize::new(5).unwrap()
            }
        );
        assert!(config.baseline);
        assert_eq!(config.regularization.kernel_l2, 0.01);
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert_eq!(config.loss, LossKind::Huber);
    }
}
