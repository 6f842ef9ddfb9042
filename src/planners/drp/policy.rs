//! Deep Reactive Policy network using Burn framework

use std::path::{Path, PathBuf};

use burn::module::{Ignored, Module, Param};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::ElementConversion;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;

use super::activation::Activation;
use crate::error::Error;
use crate::model::{ActionBounds, Fluent};

/// Architecture of a Deep Reactive Policy
#[derive(Debug, PartialEq, Config)]
pub struct PolicyConfig {
    /// Units of each hidden layer, empty for a linear policy
    pub layers: Vec<usize>,
    /// Non-linearity applied after each hidden layer
    #[config(default = "Activation::Elu")]
    pub activation: Activation,
    /// Layer-normalize each state fluent before concatenation
    #[config(default = false)]
    pub input_layer_norm: bool,
    /// Layer-normalize each hidden layer before its activation
    #[config(default = false)]
    pub hidden_layer_norm: bool,
}

impl PolicyConfig {
    /// Name used for checkpoints, e.g. `drp-fc-layers=256+128`
    pub fn policy_name(&self) -> String {
        let layers: Vec<String> = self.layers.iter().map(|units| units.to_string()).collect();
        format!("drp-fc-layers={}", layers.join("+"))
    }

    /// Build a policy mapping `state_fluents` to `action_fluents`.
    pub fn init<B: Backend>(
        &self,
        state_fluents: &[Fluent],
        action_fluents: &[Fluent],
        device: &B::Device,
    ) -> DeepReactivePolicy<B> {
        let input_norms = if self.input_layer_norm {
            state_fluents
                .iter()
                .map(|fluent| LayerNormConfig::new(fluent.size).init(device))
                .collect()
        } else {
            Vec::new()
        };

        let mut width: usize = state_fluents.iter().map(|fluent| fluent.size).sum();
        let mut hidden = Vec::with_capacity(self.layers.len());
        let mut hidden_norms = Vec::new();
        for &units in &self.layers {
            hidden.push(LinearConfig::new(width, units).init(device));
            if self.hidden_layer_norm {
                hidden_norms.push(LayerNormConfig::new(units).init(device));
            }
            width = self.activation.output_width(units);
        }

        let outputs = action_fluents
            .iter()
            .map(|fluent| LinearConfig::new(width, fluent.size).init(device))
            .collect();

        DeepReactivePolicy {
            input_norms,
            hidden,
            hidden_norms,
            outputs,
            config: Ignored(self.clone()),
        }
    }
}

/// Scales of the L1/L2 penalties on dense-layer kernels and biases
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Regularization {
    pub kernel_l1: f64,
    pub kernel_l2: f64,
    pub bias_l1: f64,
    pub bias_l2: f64,
}

impl Regularization {
    pub fn is_zero(&self) -> bool {
        [self.kernel_l1, self.kernel_l2, self.bias_l1, self.bias_l2]
            .iter()
            .all(|&scale| scale == 0.0)
    }
}

/// L2 norm of one trainable tensor and of its gradient
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNorm {
    /// e.g. `hidden_0/kernel`, `output_1/bias`, `input_norm_0/gamma`
    pub name: String,
    pub norm: f32,
    /// `None` when the variable received no gradient
    pub grad_norm: Option<f32>,
}

/// Feed-forward policy mapping the current state to a bounded action
#[derive(Module, Debug)]
pub struct DeepReactivePolicy<B: Backend> {
    /// One layer norm per state fluent, empty when disabled
    input_norms: Vec<LayerNorm<B>>,
    /// Fully connected hidden layers
    hidden: Vec<Linear<B>>,
    /// One layer norm per hidden layer, empty when disabled
    hidden_norms: Vec<LayerNorm<B>>,
    /// One output head per action fluent
    outputs: Vec<Linear<B>>,
    config: Ignored<PolicyConfig>,
}

impl<B: Backend> DeepReactivePolicy<B> {
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn name(&self) -> String {
        self.config.policy_name()
    }

    /// Number of trainable parameters
    pub fn size(&self) -> usize {
        self.num_params()
    }

    /// Compute one action tensor `[batch_size, size]` per action fluent.
    pub fn forward(
        &self,
        state: &[Tensor<B, 2>],
        bounds: &[ActionBounds<B>],
    ) -> Vec<Tensor<B, 2>> {
        let inputs: Vec<Tensor<B, 2>> = if self.input_norms.is_empty() {
            state.to_vec()
        } else {
            state
                .iter()
                .zip(&self.input_norms)
                .map(|(fluent, norm)| norm.forward(fluent.clone()))
                .collect()
        };

        let mut x = Tensor::cat(inputs, 1);
        for (i, layer) in self.hidden.iter().enumerate() {
            x = layer.forward(x);
            if let Some(norm) = self.hidden_norms.get(i) {
                x = norm.forward(x);
            }
            x = self.config.activation.forward(x);
        }

        self.outputs
            .iter()
            .zip(bounds)
            .map(|(head, bounds)| bound_output(head.forward(x.clone()), bounds))
            .collect()
    }

    /// Penalty over the kernels and biases of every dense layer: L1 is
    /// `scale * sum|w|`, L2 is `scale * sum(w^2) / 2`.
    pub fn regularization(&self, scales: &Regularization) -> Option<Tensor<B, 1>> {
        if scales.is_zero() {
            return None;
        }

        let mut penalty: Option<Tensor<B, 1>> = None;
        let mut add = |term: Tensor<B, 1>| {
            penalty = Some(match penalty.take() {
                Some(total) => total + term,
                None => term,
            });
        };

        for layer in self.hidden.iter().chain(&self.outputs) {
            let kernel = layer.weight.val();
            if scales.kernel_l1 != 0.0 {
                add(kernel.clone().abs().sum().mul_scalar(scales.kernel_l1));
            }
            if scales.kernel_l2 != 0.0 {
                add(kernel.powf_scalar(2.0).sum().mul_scalar(scales.kernel_l2 / 2.0));
            }
            if let Some(bias) = &layer.bias {
                let bias = bias.val();
                if scales.bias_l1 != 0.0 {
                    add(bias.clone().abs().sum().mul_scalar(scales.bias_l1));
                }
                if scales.bias_l2 != 0.0 {
                    add(bias.powf_scalar(2.0).sum().mul_scalar(scales.bias_l2 / 2.0));
                }
            }
        }

        penalty
    }

    /// Save weights to `<path>.mpk` and the architecture to `<path>.json`.
    pub fn save(&self, path: &Path) -> crate::error::Result<PathBuf> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.config
            .save(path.with_extension("json"))
            .map_err(|err| Error::Checkpoint {
                operation: "save".to_string(),
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        self.clone()
            .save_file(path.to_path_buf(), &recorder)
            .map_err(|err| Error::Checkpoint {
                operation: "save".to_string(),
                path: path.to_path_buf(),
                message: format!("{err:?}"),
            })?;
        Ok(path.with_extension("mpk"))
    }

    /// Rebuild a policy saved with [`DeepReactivePolicy::save`].
    pub fn restore(
        path: &Path,
        state_fluents: &[Fluent],
        action_fluents: &[Fluent],
        device: &B::Device,
    ) -> crate::error::Result<Self> {
        let config =
            PolicyConfig::load(path.with_extension("json")).map_err(|err| Error::Checkpoint {
                operation: "restore".to_string(),
                path: path.to_path_buf(),
                message: format!("{err:?}"),
            })?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        config
            .init(state_fluents, action_fluents, device)
            .load_file(path.to_path_buf(), &recorder, device)
            .map_err(|err| Error::Checkpoint {
                operation: "restore".to_string(),
                path: path.to_path_buf(),
                message: format!("{err:?}"),
            })
    }
}

impl<B: AutodiffBackend> DeepReactivePolicy<B> {
    /// Parameter and gradient norms of every trainable tensor, in layer order.
    pub fn variable_norms(&self, grads: &GradientsParams) -> Vec<VariableNorm> {
        let mut norms = Vec::new();
        for (i, norm) in self.input_norms.iter().enumerate() {
            push_layer_norm(&mut norms, &format!("input_norm_{i}"), norm, grads);
        }
        for (i, layer) in self.hidden.iter().enumerate() {
            push_linear(&mut norms, &format!("hidden_{i}"), layer, grads);
            if let Some(norm) = self.hidden_norms.get(i) {
                push_layer_norm(&mut norms, &format!("hidden_norm_{i}"), norm, grads);
            }
        }
        for (i, layer) in self.outputs.iter().enumerate() {
            push_linear(&mut norms, &format!("output_{i}"), layer, grads);
        }
        norms
    }
}

fn push_linear<B: AutodiffBackend>(
    norms: &mut Vec<VariableNorm>,
    prefix: &str,
    layer: &Linear<B>,
    grads: &GradientsParams,
) {
    norms.push(variable_norm(format!("{prefix}/kernel"), &layer.weight, grads));
    if let Some(bias) = &layer.bias {
        norms.push(variable_norm(format!("{prefix}/bias"), bias, grads));
    }
}

fn push_layer_norm<B: AutodiffBackend>(
    norms: &mut Vec<VariableNorm>,
    prefix: &str,
    layer: &LayerNorm<B>,
    grads: &GradientsParams,
) {
    norms.push(variable_norm(format!("{prefix}/gamma"), &layer.gamma, grads));
    norms.push(variable_norm(format!("{prefix}/beta"), &layer.beta, grads));
}

fn variable_norm<B: AutodiffBackend, const D: usize>(
    name: String,
    param: &Param<Tensor<B, D>>,
    grads: &GradientsParams,
) -> VariableNorm {
    VariableNorm {
        name,
        norm: l2_norm(param.val().inner()),
        grad_norm: grads.get::<B::InnerBackend, D>(param.id).map(l2_norm),
    }
}

fn l2_norm<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f32 {
    tensor.powf_scalar(2.0).sum().sqrt().into_scalar().elem::<f32>()
}

/// Squash an unbounded head output into its action bounds. The bounds carry
/// no gradient.
fn bound_output<B: Backend>(output: Tensor<B, 2>, bounds: &ActionBounds<B>) -> Tensor<B, 2> {
    let lower = bounds.lower.clone().map(|t| t.detach());
    let upper = bounds.upper.clone().map(|t| t.detach());
    match (lower, upper) {
        (Some(lower), Some(upper)) => lower.clone() + (upper - lower) * sigmoid(output),
        (Some(lower), None) => lower + output.exp(),
        (None, Some(upper)) => upper - output.exp(),
        (None, None) => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn fluents() -> (Vec<Fluent>, Vec<Fluent>) {
        (
            vec![Fluent::new("pos/1", 2), Fluent::new("vel/1", 3)],
            vec![Fluent::new("push/1", 2), Fluent::new("brake/1", 1)],
        )
    }

    #[test]
    fn test_policy_name() {
        assert_eq!(
            PolicyConfig::new(vec![256, 128, 64]).policy_name(),
            "drp-fc-layers=256+128+64"
        );
        assert_eq!(PolicyConfig::new(vec![]).policy_name(), "drp-fc-layers=");
    }

    #[test]
    fn test_forward_shapes_per_action_fluent() {
        let device = Default::default();
        let (states, actions) = fluents();
        let policy = PolicyConfig::new(vec![8, 4])
            .with_activation(Activation::Crelu)
            .with_input_layer_norm(true)
            .with_hidden_layer_norm(true)
            .init::<TestBackend>(&states, &actions, &device);

        let state = vec![
            Tensor::<TestBackend, 2>::ones([5, 2], &device),
            Tensor::<TestBackend, 2>::zeros([5, 3], &device),
        ];
        let bounds = vec![ActionBounds::unbounded(), ActionBounds::unbounded()];
        let action = policy.forward(&state, &bounds);

        assert_eq!(action.len(), 2);
        assert_eq!(action[0].dims(), [5, 2]);
        assert_eq!(action[1].dims(), [5, 1]);
    }

    #[test]
    fn test_outputs_respect_bounds() {
        let device = Default::default();
        let (states, actions) = fluents();
        let policy = PolicyConfig::new(vec![6]).init::<TestBackend>(&states, &actions, &device);

        let state = vec![
            Tensor::<TestBackend, 2>::random([16, 2], burn::tensor::Distribution::Default, &device),
            Tensor::<TestBackend, 2>::random([16, 3], burn::tensor::Distribution::Default, &device),
        ];
        let bounds = vec![
            ActionBounds::between(
                Tensor::full([16, 2], -1.0, &device),
                Tensor::full([16, 2], 1.0, &device),
            ),
            ActionBounds {
                lower: Some(Tensor::full([16, 1], 2.0, &device)),
                upper: None,
            },
        ];

        let action = policy.forward(&state, &bounds);

        let bounded: Vec<f32> = action[0].clone().into_data().to_vec().unwrap();
        assert!(bounded.iter().all(|&a| (-1.0..=1.0).contains(&a)));
        let lower_only: Vec<f32> = action[1].clone().into_data().to_vec().unwrap();
        assert!(lower_only.iter().all(|&a| a > 2.0));
    }

    #[test]
    fn test_regularization() {
        let device = Default::default();
        let (states, actions) = fluents();
        let policy = PolicyConfig::new(vec![4]).init::<TestBackend>(&states, &actions, &device);

        assert!(policy.regularization(&Regularization::default()).is_none());

        let penalty = policy
            .regularization(&Regularization {
                kernel_l2: 0.5,
                ..Regularization::default()
            })
            .unwrap();
        let penalty: f32 = penalty.into_scalar();
        assert!(penalty > 0.0);
    }

    #[test]
    fn test_size_counts_parameters() {
        let device = Default::default();
        let states = vec![Fluent::new("x/1", 2)];
        let actions = vec![Fluent::new("u/1", 1)];
        let policy = PolicyConfig::new(vec![3]).init::<TestBackend>(&states, &actions, &device);
        // (2 * 3 + 3) + (3 * 1 + 1)
        assert_eq!(policy.size(), 13);
    }

    #[test]
    fn test_variable_norms_cover_every_dense_and_norm_layer() {
        type TrainBackend = burn::backend::Autodiff<NdArray>;

        let device = Default::default();
        let (states, actions) = fluents();
        let policy = PolicyConfig::new(vec![4])
            .with_hidden_layer_norm(true)
            .init::<TrainBackend>(&states, &actions, &device);

        let state = vec![
            Tensor::<TrainBackend, 2>::ones([3, 2], &device),
            Tensor::<TrainBackend, 2>::ones([3, 3], &device),
        ];
        let bounds = vec![ActionBounds::unbounded(), ActionBounds::unbounded()];
        let action = policy.forward(&state, &bounds);
        let loss = action[0].clone().sum() + action[1].clone().sum();
        let grads = GradientsParams::from_grads(loss.backward(), &policy);

        let norms = policy.variable_norms(&grads);
        let names: Vec<&str> = norms.iter().map(|norm| norm.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "hidden_0/kernel",
                "hidden_0/bias",
                "hidden_norm_0/gamma",
                "hidden_norm_0/beta",
                "output_0/kernel",
                "output_0/bias",
                "output_1/kernel",
                "output_1/bias",
            ]
        );
        assert!(norms.iter().all(|norm| norm.norm.is_finite()));
        // the gamma of a fresh layer norm is all ones
        assert!((norms[2].norm - 2.0).abs() < 1e-6);
        // d(sum of outputs)/d(bias) is the batch size for every unit
        let bias_grad = norms[5].grad_norm.unwrap();
        assert!((bias_grad - (2.0f32 * 9.0).sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_save_and_restore() {
        let device = Default::default();
        let (states, actions) = fluents();
        let config = PolicyConfig::new(vec![4]).with_activation(Activation::Tanh);
        let policy = config.init::<TestBackend>(&states, &actions, &device);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(policy.name());
        let saved = policy.save(&path).unwrap();
        assert!(saved.exists());

        let restored =
            DeepReactivePolicy::<TestBackend>::restore(&path, &states, &actions, &device).unwrap();
        assert_eq!(restored.config().activation, Activation::Tanh);
        assert_eq!(restored.size(), policy.size());
    }
}
