//! HVAC domain: heat a row of rooms with supply air while keeping every room
//! inside a comfort band

use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use super::{ActionBounds, Dynamics, Fluent, Sampler, Transition};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hvac {
    /// Number of rooms, laid out in a row between two hallways
    pub rooms: usize,
    pub initial_temp: f32,
    /// Temperature of the supply air
    pub air_temp: f32,
    pub outside_temp: f32,
    pub hallway_temp: f32,
    /// Maximum supply air per room and timestep
    pub air_max: f32,
    /// Heat capacity of a room
    pub room_capacity: f32,
    /// Heat capacity of the supply air
    pub air_capacity: f32,
    /// Thermal resistance to the outside
    pub outside_resistance: f32,
    /// Thermal resistance of the walls between neighbours
    pub wall_resistance: f32,
    pub time_delta: f32,
    pub comfort_low: f32,
    pub comfort_high: f32,
    /// Cost per unit of supply air
    pub air_cost: f32,
    /// Penalty per degree outside the comfort band
    pub comfort_penalty: f32,
    pub noise_stddev: f32,
}

impl Default for Hvac {
    fn default() -> Self {
        Self::with_rooms(3)
    }
}

impl Hvac {
    pub fn with_rooms(rooms: usize) -> Self {
        Self {
            rooms,
            initial_temp: 10.0,
            air_temp: 40.0,
            outside_temp: 6.0,
            hallway_temp: 10.0,
            air_max: 10.0,
            room_capacity: 80.0,
            air_capacity: 1.006,
            outside_resistance: 4.0,
            wall_resistance: 1.5,
            time_delta: 1.0,
            comfort_low: 20.0,
            comfort_high: 23.5,
            air_cost: 1.0,
            comfort_penalty: 200.0,
            noise_stddev: 0.1,
        }
    }

    /// Temperatures of the left and right neighbours of every room.
    fn neighbours<B: Backend>(&self, temp: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch_size, n] = temp.dims();
        let hallway = Tensor::full([batch_size, 1], self.hallway_temp, &temp.device());
        if n == 1 {
            return (hallway.clone(), hallway);
        }
        let left = Tensor::cat(
            vec![hallway.clone(), temp.clone().slice([0..batch_size, 0..n - 1])],
            1,
        );
        let right = Tensor::cat(vec![temp.slice([0..batch_size, 1..n]), hallway], 1);
        (left, right)
    }

    fn reward<B: Backend>(&self, temp: Tensor<B, 2>, air: Tensor<B, 2>) -> Tensor<B, 1> {
        let cost = air.mul_scalar(self.air_cost);
        let too_cold = relu(temp.clone().neg().add_scalar(self.comfort_low));
        let too_hot = relu(temp.sub_scalar(self.comfort_high));
        let discomfort = (too_cold + too_hot).mul_scalar(self.comfort_penalty);
        (cost + discomfort).sum_dim(1).neg().squeeze::<1>(1)
    }
}

impl Dynamics for Hvac {
    fn name(&self) -> String {
        format!("hvac-{}", self.rooms)
    }

    fn state_fluents(&self) -> Vec<Fluent> {
        vec![Fluent::new("temp/1", self.rooms)]
    }

    fn action_fluents(&self) -> Vec<Fluent> {
        vec![Fluent::new("air/1", self.rooms)]
    }

    fn validate(&self) -> Result<()> {
        if self.rooms == 0 {
            return Err(Error::InvalidDomain {
                message: "building must contain at least one room".to_string(),
            });
        }
        if self.comfort_low >= self.comfort_high {
            return Err(Error::InvalidDomain {
                message: format!(
                    "comfort_low {} must be below comfort_high {}",
                    self.comfort_low, self.comfort_high
                ),
            });
        }
        let positive = [
            ("air_max", self.air_max),
            ("room_capacity", self.room_capacity),
            ("outside_resistance", self.outside_resistance),
            ("wall_resistance", self.wall_resistance),
            ("time_delta", self.time_delta),
            ("noise_stddev", self.noise_stddev),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| !(*v > 0.0 && v.is_finite())) {
            return Err(Error::InvalidDomain {
                message: format!("{name} must be positive, got {value}"),
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
            [batch_size, self.rooms],
            self.initial_temp,
            device,
        )]
    }

    fn action_bounds<B: Backend>(&self, state: &[Tensor<B, 2>]) -> Vec<ActionBounds<B>> {
        let lower = state[0].zeros_like();
        let upper = lower.ones_like().mul_scalar(self.air_max);
        vec![ActionBounds::between(lower, upper)]
    }

    fn transition<B: Backend>(
        &self,
        state: &[Tensor<B, 2>],
        action: &[Tensor<B, 2>],
        sampler: &Sampler,
    ) -> Transition<B> {
        let temp = state[0].clone();
        let air = action[0].clone();

        let (left, right) = self.neighbours(temp.clone());
        let heating = air
            .clone()
            .mul(temp.clone().neg().add_scalar(self.air_temp))
            .mul_scalar(self.air_capacity);
        let walls = (temp.clone() - left + temp.clone() - right).div_scalar(self.wall_resistance);
        let outside = temp
            .clone()
            .sub_scalar(self.outside_temp)
            .div_scalar(self.outside_resistance);
        let delta = (heating - walls - outside).mul_scalar(self.time_delta / self.room_capacity);

        let mean = temp + delta;
        let stddev = mean.ones_like().mul_scalar(self.noise_stddev);
        let sample = sampler.normal(mean, stddev);

        let reward = self.reward(sample.value.clone(), air);

        Transition {
            next_state: vec![sample.value],
            reward,
            log_prob: sample.log_prob,
        }
    }
}
