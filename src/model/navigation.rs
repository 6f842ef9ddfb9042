//! Navigation domain: steer an agent towards a goal through a deceleration zone

use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use serde::{Deserialize, Serialize};

use super::{ActionBounds, Dynamics, Fluent, Sampler, Transition, broadcast_row};
use crate::error::{Error, Result};

/// Keeps the euclidean norm differentiable at the origin
const NORM_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Navigation {
    /// Start location of the agent
    pub initial: [f32; 2],
    /// Goal location
    pub goal: [f32; 2],
    /// Center of the deceleration zone
    pub zone_center: [f32; 2],
    /// How quickly movement recovers away from the zone center
    pub zone_decay: f32,
    /// Bound on each movement component
    pub max_move: f32,
    /// Standard deviation of the location noise
    pub noise_stddev: f32,
}

impl Default for Navigation {
    fn default() -> Self {
        Self::v2()
    }
}

impl Navigation {
    pub fn v1() -> Self {
        Self {
            initial: [1.0, 1.0],
            goal: [8.0, 8.0],
            zone_center: [4.5, 4.5],
            zone_decay: 2.0,
            max_move: 1.0,
            noise_stddev: 0.05,
        }
    }

    pub fn v2() -> Self {
        Self {
            initial: [0.0, 0.0],
            goal: [8.0, 8.0],
            zone_center: [5.0, 5.0],
            zone_decay: 2.0,
            max_move: 1.0,
            noise_stddev: 0.1,
        }
    }

    pub fn v3() -> Self {
        Self {
            initial: [0.0, 0.0],
            goal: [15.0, 15.0],
            zone_center: [8.0, 8.0],
            zone_decay: 1.5,
            max_move: 1.0,
            noise_stddev: 0.1,
        }
    }

    /// Deceleration factor `2 / (1 + exp(-decay * d)) - 1` for the distance
    /// `d` to the zone center, shaped `[batch_size, 1]`.
    fn deceleration<B: Backend>(&self, location: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, _] = location.dims();
        let center = broadcast_row(&self.zone_center, batch_size, &location.device());
        let distance = (location - center)
            .powf_scalar(2.0)
            .sum_dim(1)
            .add_scalar(NORM_EPSILON)
            .sqrt();
        sigmoid(distance.mul_scalar(self.zone_decay))
            .mul_scalar(2.0)
            .sub_scalar(1.0)
    }
}

impl Dynamics for Navigation {
    fn name(&self) -> String {
        "navigation".to_string()
    }

    fn state_fluents(&self) -> Vec<Fluent> {
        vec![Fluent::new("location/1", 2)]
    }

    fn action_fluents(&self) -> Vec<Fluent> {
        vec![Fluent::new("move/1", 2)]
    }

    fn validate(&self) -> Result<()> {
        let scalars = [self.zone_decay, self.max_move, self.noise_stddev];
        let mut values = self
            .initial
            .iter()
            .chain(self.goal.iter())
            .chain(self.zone_center.iter())
            .chain(scalars.iter());
        if values.any(|v| !v.is_finite()) {
            return Err(Error::InvalidDomain {
                message: "navigation parameters must be finite".to_string(),
            });
        }
        if self.max_move <= 0.0 {
            return Err(Error::InvalidDomain {
                message: format!("max_move must be positive, got {}", self.max_move),
            });
        }
        if self.noise_stddev <= 0.0 {
            return Err(Error::InvalidDomain {
                message: format!("noise_stddev must be positive, got {}", self.noise_stddev),
            });
        }
        if self.zone_decay < 0.0 {
            return Err(Error::InvalidDomain {
                message: format!("zone_decay must be non-negative, got {}", self.zone_decay),
            });
        }
        Ok(())
    }

    fn initial_state<B: Backend>(
        &self,
        batch_size: usize,
        device: &B::Device,
    ) -> Vec<Tensor<B, 2>> {
        vec![broadcast_row(&self.initial, batch_size, device)]
    }

    fn action_bounds<B: Backend>(&self, state: &[Tensor<B, 2>]) -> Vec<ActionBounds<B>> {
        let [batch_size, _] = state[0].dims();
        let device = state[0].device();
        let lower = Tensor::full([batch_size, 2], -self.max_move, &device);
        let upper = Tensor::full([batch_size, 2], self.max_move, &device);
        vec![ActionBounds::between(lower, upper)]
    }

    fn transition<B: Backend>(
        &self,
        state: &[Tensor<B, 2>],
        action: &[Tensor<B, 2>],
        sampler: &Sampler,
    ) -> Transition<B> {
        let location = state[0].clone();
        let movement = action[0].clone();
        let [batch_size, _] = location.dims();
        let device = location.device();

        let deceleration = self.deceleration(location.clone());
        let deceleration = Tensor::cat(vec![deceleration.clone(), deceleration], 1);

        let mean = location + deceleration * movement;
        let stddev = mean.ones_like().mul_scalar(self.noise_stddev);
        let sample = sampler.normal(mean, stddev);

        let goal = broadcast_row(&self.goal, batch_size, &device);
        let reward = (sample.value.clone() - goal)
            .powf_scalar(2.0)
            .sum_dim(1)
            .add_scalar(NORM_EPSILON)
            .sqrt()
            .neg()
            .squeeze::<1>(1);

        Transition {
            next_state: vec![sample.value],
            reward,
            log_prob: sample.log_prob,
        }
    }
}
