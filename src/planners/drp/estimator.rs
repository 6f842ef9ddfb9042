//! Gradient estimators for stochastic rollouts
//!
//! Pathwise derivatives flow through reparameterized samples. Samples drawn
//! without reparameterization are constants whose log-density is weighted by
//! the (detached) trajectory cost, giving a score-function surrogate whose
//! gradient matches the REINFORCE estimator.

use std::fmt;
use std::num::NonZeroUsize;

use burn::prelude::*;
use burn::tensor::ElementConversion;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Gradient path of the sampled transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reparameterization {
    /// Pathwise derivative through every transition
    Full,
    /// Score-function estimator on every transition
    None,
    /// Pathwise within blocks of `n_step` transitions, scored at each block end
    Partial { n_step: NonZeroUsize },
}

impl Reparameterization {
    /// Whether the transition taken at timestep `t` is reparameterized.
    pub fn reparameterized_at(&self, t: usize) -> bool {
        match *self {
            Reparameterization::Full => true,
            Reparameterization::None => false,
            Reparameterization::Partial { n_step } => (t + 1) % n_step.get() != 0,
        }
    }
}

impl fmt::Display for Reparameterization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reparameterization::Full => write!(f, "pathwise derivative"),
            Reparameterization::None => write!(f, "score function"),
            Reparameterization::Partial { n_step } => write!(f, "hybrid ({n_step}-step)"),
        }
    }
}

/// Loss applied to the trajectory cost `C = -total reward`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    #[default]
    Linear,
    Mse,
    Huber,
}

impl LossKind {
    pub fn apply<B: Backend>(&self, cost: Tensor<B, 1>) -> Tensor<B, 1> {
        match self {
            LossKind::Linear => cost,
            LossKind::Mse => cost.powf_scalar(2.0),
            LossKind::Huber => {
                // delta = 1: 0.5 * q^2 + (|x| - q) with q = min(|x|, 1)
                let abs = cost.abs();
                let quadratic = abs.clone().clamp_max(1.0);
                quadratic.clone().powf_scalar(2.0).mul_scalar(0.5) + (abs - quadratic)
            }
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Batch-mean surrogate loss for trajectories with `total_reward` `[batch]`.
///
/// When `log_prob` is present each trajectory adds
/// `log_prob * stopgrad(L(C) - baseline)`; the baseline is the batch mean of
/// `L(C)` when `baseline` is set.
pub fn surrogate_loss<B: Backend>(
    total_reward: Tensor<B, 1>,
    log_prob: Option<Tensor<B, 1>>,
    loss: LossKind,
    baseline: bool,
) -> Tensor<B, 1> {
    let objective = loss.apply(total_reward.neg());

    let per_trajectory = match log_prob {
        Some(log_prob) => {
            let mut weight = objective.clone().detach();
            if baseline {
                let mean = weight.clone().mean().into_scalar().elem::<f64>();
                weight = weight.sub_scalar(mean);
            }
            objective + log_prob * weight
        }
        None => objective,
    };

    per_trajectory.mean()
}
