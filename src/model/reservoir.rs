//! Reservoir domain: release water along a chain of reservoirs to keep their
//! levels inside a safe band under stochastic rain

use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use super::{ActionBounds, Dynamics, Fluent, Sampler, Transition};
use crate::error::{Error, Result};

/// Weight of the distance-to-target shaping term
const TARGET_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reservoir {
    /// Number of reservoirs in the chain
    pub reservoirs: usize,
    /// Capacity of every reservoir
    pub max_capacity: f32,
    /// Lower bound of the safe band
    pub lower_bound: f32,
    /// Upper bound of the safe band
    pub upper_bound: f32,
    /// Level of every reservoir at the start of an episode
    pub initial_level: f32,
    /// Mean rain per timestep
    pub rain_mean: f32,
    /// Standard deviation of the rain
    pub rain_stddev: f32,
    /// Penalty per unit below the lower bound
    pub low_penalty: f32,
    /// Penalty per unit above the upper bound
    pub high_penalty: f32,
}

impl Default for Reservoir {
    fn default() -> Self {
        Self::with_reservoirs(8)
    }
}

impl Reservoir {
    pub fn with_reservoirs(reservoirs: usize) -> Self {
        Self {
            reservoirs,
            max_capacity: 100.0,
            lower_bound: 20.0,
            upper_bound: 80.0,
            initial_level: 75.0,
            rain_mean: 5.0,
            rain_stddev: 1.5,
            low_penalty: 5.0,
            high_penalty: 100.0,
        }
    }

    /// Midpoint of the safe band
    pub fn target_level(&self) -> f32 {
        (self.lower_bound + self.upper_bound) / 2.0
    }

    /// Outflow received by each reservoir from its upstream neighbour.
    fn inflow<B: Backend>(&self, outflow: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, n] = outflow.dims();
        let source = Tensor::zeros([batch_size, 1], &outflow.device());
        if n == 1 {
            return source;
        }
        let upstream = outflow.slice([0..batch_size, 0..n - 1]);
        Tensor::cat(vec![source, upstream], 1)
    }

    /// Negative violation cost per trajectory.
    fn reward<B: Backend>(&self, level: Tensor<B, 2>) -> Tensor<B, 1> {
        let below =
            relu(level.clone().neg().add_scalar(self.lower_bound)).mul_scalar(self.low_penalty);
        let above =
            relu(level.clone().sub_scalar(self.upper_bound)).mul_scalar(self.high_penalty);
        let shaping = level
            .sub_scalar(self.target_level())
            .abs()
            .mul_scalar(TARGET_WEIGHT);
        (below + above + shaping).sum_dim(1).neg().squeeze::<1>(1)
    }
}

impl Dynamics for Reservoir {
    fn name(&self) -> String {
        format!("reservoir-{}", self.reservoirs)
    }

    fn state_fluents(&self) -> Vec<Fluent> {
        vec![Fluent::new("rlevel/1", self.reservoirs)]
    }

    fn action_fluents(&self) -> Vec<Fluent> {
        vec![Fluent::new("outflow/1", self.reservoirs)]
    }

    fn validate(&self) -> Result<()> {
        if self.reservoirs == 0 {
            return Err(Error::InvalidDomain {
                message: "reservoir chain must contain at least one reservoir".to_string(),
            });
        }
        if !(0.0 <= self.lower_bound
            && self.lower_bound < self.upper_bound
            && self.upper_bound <= self.max_capacity)
        {
            return Err(Error::InvalidDomain {
                message: format!(
                    "expected 0 <= lower_bound < upper_bound <= max_capacity, got {} / {} / {}",
                    self.lower_bound, self.upper_bound, self.max_capacity
                ),
            });
        }
        if !(0.0..=self.max_capacity).contains(&self.initial_level) {
            return Err(Error::InvalidDomain {
                message: format!(
                    "initial_level {} outside [0, {}]",
                    self.initial_level, self.max_capacity
                ),
            });
        }
        if self.rain_stddev <= 0.0 || !self.rain_stddev.is_finite() {
            return Err(Error::InvalidDomain {
                message: format!("rain_stddev must be positive, got {}", self.rain_stddev),
            });
        }
        Ok(())
    }

    fn initial_state<B: Backend>(
        &self,
        batch_size: usize,
        device: &B::Device,
    ) -> Vec<Tensor<B, 2>> {
        vec![Tensor::full(
            [batch_size, self.reservoirs],
            self.initial_level,
            device,
        )]
    }

    fn action_bounds<B: Backend>(&self, state: &[Tensor<B, 2>]) -> Vec<ActionBounds<B>> {
        let level = state[0].clone();
        vec![ActionBounds::between(level.zeros_like(), level)]
    }

    fn transition<B: Backend>(
        &self,
        state: &[Tensor<B, 2>],
        action: &[Tensor<B, 2>],
        sampler: &Sampler,
    ) -> Transition<B> {
        let level = state[0].clone();
        let outflow = action[0].clone();

        let inflow = self.inflow(outflow.clone());
        let mean = (level + inflow - outflow).add_scalar(self.rain_mean);
        let stddev = mean.ones_like().mul_scalar(self.rain_stddev);
        let sample = sampler.normal(mean, stddev);

        let next_level = sample.value.clamp(0.0, self.max_capacity);
        let reward = self.reward(next_level.clone());

        Transition {
            next_state: vec![next_level],
            reward,
            log_prob: sample.log_prob,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_default_is_valid() {
        let reservoir = Reservoir::default();
        assert!(reservoir.validate().is_ok());
        assert!((reservoir.target_level() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_inverted_band() {
        let reservoir = Reservoir {
            lower_bound: 90.0,
            ..Reservoir::default()
        };
        assert!(reservoir.validate().is_err());
    }

    #[test]
    fn test_inflow_shifts_outflow_downstream() {
        let reservoir = Reservoir::with_reservoirs(3);
        let device = Default::default();
        let outflow = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0]], &device);

        let inflow: Vec<f32> = reservoir.inflow(outflow).into_data().to_vec().unwrap();

        assert_eq!(inflow, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_single_reservoir_has_no_inflow() {
        let reservoir = Reservoir::with_reservoirs(1);
        let device = Default::default();
        let outflow = Tensor::<TestBackend, 2>::from_floats([[4.0]], &device);
        let inflow: f32 = reservoir.inflow(outflow).sum().into_scalar();
        assert_eq!(inflow, 0.0);
    }

    #[test]
    fn test_reward_inside_band_only_shaping() {
        let reservoir = Reservoir::with_reservoirs(2);
        let device = Default::default();
        let level = Tensor::<TestBackend, 2>::from_floats([[50.0, 60.0]], &device);
        let reward: f32 = reservoir.reward(level).sum().into_scalar();
        assert!((reward + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_reward_penalizes_overflow() {
        let reservoir = Reservoir::with_reservoirs(1);
        let device = Default::default();
        let level = Tensor::<TestBackend, 2>::from_floats([[90.0]], &device);
        let reward: f32 = reservoir.reward(level).sum().into_scalar();
        // 10 units above the band at 100 each, plus 40 units from target at 0.1
        assert!((reward + 1004.0).abs() < 1e-3);
    }

    #[test]
    fn test_level_stays_within_capacity() {
        let reservoir = Reservoir::with_reservoirs(4);
        let device = Default::default();
        let state = reservoir.initial_state::<TestBackend>(16, &device);
        let action = vec![Tensor::<TestBackend, 2>::zeros([16, 4], &device)];

        let transition = reservoir.transition(&state, &action, &Sampler::new(true, true));

        let level: Vec<f32> = transition.next_state[0].clone().into_data().to_vec().unwrap();
        assert!(level.iter().all(|&l| (0.0..=100.0).contains(&l)));
    }
}
