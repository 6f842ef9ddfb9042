use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid, tanh};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

const SELU_ALPHA: f64 = 1.673_263_242_354_377_3;
const SELU_SCALE: f64 = 1.050_700_987_355_480_5;

/// Non-linearity applied after each hidden layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    None,
    Sigmoid,
    Tanh,
    Relu,
    Relu6,
    /// Concatenated relu, doubles the layer width
    Crelu,
    #[default]
    Elu,
    Selu,
    Softplus,
    Softsign,
}

impl Activation {
    /// Output width of the activation for an input of `units` features.
    pub fn output_width(&self, units: usize) -> usize {
        match self {
            Self::Crelu => 2 * units,
            _ => units,
        }
    }

    pub fn forward<B: Backend>(&self, xs: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::None => xs,
            Self::Sigmoid => sigmoid(xs),
            Self::Tanh => tanh(xs),
            Self::Relu => relu(xs),
            Self::Relu6 => xs.clamp(0.0, 6.0),
            Self::Crelu => Tensor::cat(vec![relu(xs.clone()), relu(xs.neg())], 1),
            Self::Elu => relu(xs.clone()) + xs.clamp_max(0.0).exp().sub_scalar(1.0),
            Self::Selu => {
                let negative = xs.clone().clamp_max(0.0).exp().sub_scalar(1.0);
                (relu(xs) + negative.mul_scalar(SELU_ALPHA)).mul_scalar(SELU_SCALE)
            }
            // relu(x) + ln(1 + exp(-|x|)) avoids overflowing exp for large inputs
            Self::Softplus => relu(xs.clone()) + xs.abs().neg().exp().add_scalar(1.0).log(),
            Self::Softsign => xs.clone() / xs.abs().add_scalar(1.0),
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default();
        write!(f, "{name}")
    }
}
