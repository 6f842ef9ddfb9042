//! Adadelta optimizer
//!
//! Burn ships no Adadelta, so it is provided here as a [`SimpleOptimizer`]
//! and wrapped in an [`OptimizerAdaptor`] like Burn's own optimizers.
//!
//! Per parameter, with running averages `v` of squared gradients and `u` of
//! squared updates:
//!
//! ```text
//! v     = rho * v + (1 - rho) * g^2
//! delta = sqrt(u + eps) / sqrt(v + eps) * g
//! u     = rho * u + (1 - rho) * delta^2
//! theta = theta - lr * delta
//! ```

use burn::LearningRate;
use burn::module::AutodiffModule;
use burn::optim::SimpleOptimizer;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::prelude::*;
use burn::record::Record;
use burn::tensor::backend::AutodiffBackend;

/// Configuration of the [`Adadelta`] optimizer
#[derive(Config, Debug)]
pub struct AdadeltaConfig {
    /// Decay of the running averages
    #[config(default = 0.9)]
    pub rho: f32,
    /// Added inside both square roots
    #[config(default = 1e-6)]
    pub epsilon: f32,
    /// L2 penalty folded into the gradient
    #[config(default = 0.0)]
    pub weight_decay: f32,
}

impl AdadeltaConfig {
    /// Initialize an Adadelta optimizer for module `M`.
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(
        &self,
    ) -> OptimizerAdaptor<Adadelta, M, B> {
        OptimizerAdaptor::from(Adadelta {
            rho: self.rho,
            epsilon: self.epsilon,
            weight_decay: self.weight_decay,
        })
    }
}

#[derive(Clone)]
pub struct Adadelta {
    rho: f32,
    epsilon: f32,
    weight_decay: f32,
}

/// Running averages kept per parameter tensor
#[derive(Record, Clone)]
pub struct AdadeltaState<B: Backend, const D: usize> {
    /// Average of squared gradients
    pub square_avg: Tensor<B, D>,
    /// Average of squared updates
    pub acc_delta: Tensor<B, D>,
}

impl<B: Backend> SimpleOptimizer<B> for Adadelta {
    type State<const D: usize> = AdadeltaState<B, D>;

    fn step<const D: usize>(
        &self,
        lr: LearningRate,
        tensor: Tensor<B, D>,
        mut grad: Tensor<B, D>,
        state: Option<Self::State<D>>,
    ) -> (Tensor<B, D>, Option<Self::State<D>>) {
        if self.weight_decay != 0.0 {
            grad = grad + tensor.clone().mul_scalar(self.weight_decay);
        }

        let (square_avg, acc_delta) = match state {
            Some(state) => (state.square_avg, state.acc_delta),
            None => (grad.zeros_like(), grad.zeros_like()),
        };

        let square_avg = square_avg.mul_scalar(self.rho)
            + grad.clone().powf_scalar(2.0).mul_scalar(1.0 - self.rho);
        let delta = acc_delta.clone().add_scalar(self.epsilon).sqrt()
            / square_avg.clone().add_scalar(self.epsilon).sqrt()
            * grad;
        let acc_delta = acc_delta.mul_scalar(self.rho)
            + delta.clone().powf_scalar(2.0).mul_scalar(1.0 - self.rho);

        let tensor = tensor - delta.mul_scalar(lr);
        (
            tensor,
            Some(AdadeltaState {
                square_avg,
                acc_delta,
            }),
        )
    }

    fn to_device<const D: usize>(mut state: Self::State<D>, device: &B::Device) -> Self::State<D> {
        state.square_avg = state.square_avg.to_device(device);
        state.acc_delta = state.acc_delta.to_device(device);
        state
    }
}
