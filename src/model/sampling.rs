//! Noise sampling for stochastic transitions
//!
//! A [`Sampler`] decides, per simulation step, whether a stochastic fluent is
//! reparameterized (the sample stays a differentiable function of its mean) or
//! sampled as a constant whose log-density feeds a score-function surrogate.

use burn::prelude::*;
use burn::tensor::Distribution;

/// ln(sqrt(2 * pi))
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    stochastic: bool,
    reparameterized: bool,
}

/// A batched sample `[batch_size, size]` with its log-density when the sample
/// was drawn without reparameterization.
#[derive(Debug, Clone)]
pub struct Sample<B: Backend> {
    pub value: Tensor<B, 2>,
    pub log_prob: Option<Tensor<B, 1>>,
}

impl Sampler {
    pub fn new(stochastic: bool, reparameterized: bool) -> Self {
        Self {
            stochastic,
            reparameterized,
        }
    }

    /// Noise-free sampler: every sample is the distribution mean.
    pub fn deterministic() -> Self {
        Self::new(false, true)
    }

    /// Sample `N(mean, stddev^2)` elementwise.
    pub fn normal<B: Backend>(&self, mean: Tensor<B, 2>, stddev: Tensor<B, 2>) -> Sample<B> {
        if !self.stochastic {
            return Sample {
                value: mean,
                log_prob: None,
            };
        }

        let noise = Tensor::<B, 2>::random(
            mean.shape(),
            Distribution::Normal(0.0, 1.0),
            &mean.device(),
        );
        let value = mean.clone() + stddev.clone() * noise;

        if self.reparameterized {
            return Sample {
                value,
                log_prob: None,
            };
        }

        let value = value.detach();
        let log_prob = normal_log_prob(value.clone(), mean, stddev);
        Sample {
            value,
            log_prob: Some(log_prob),
        }
    }
}

/// Log-density of `value` under `N(mean, stddev^2)`, summed over the fluent
/// dimension. Returns one entry per batch row.
pub fn normal_log_prob<B: Backend>(
    value: Tensor<B, 2>,
    mean: Tensor<B, 2>,
    stddev: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let z = (value - mean) / stddev.clone();
    let log_density = z.powf_scalar(2.0).mul_scalar(-0.5) - stddev.log();
    log_density.sub_scalar(LN_SQRT_2PI).sum_dim(1).squeeze::<1>(1)
}

/// Add two optional per-trajectory log-densities.
pub fn merge_log_probs<B: Backend>(
    lhs: Option<Tensor<B, 1>>,
    rhs: Option<Tensor<B, 1>>,
) -> Option<Tensor<B, 1>> {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => Some(lhs + rhs),
        (Some(lp), None) | (None, Some(lp)) => Some(lp),
        (None, None) => None,
    }
}
