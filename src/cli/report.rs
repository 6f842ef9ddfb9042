//! Console output of the planner

use std::io::Write;
use std::path::Path;

use super::PlannerArgs;
use crate::error::{Error, Result};

/// Print the resolved configuration when `args.verbose` is set; print nothing otherwise.
pub fn print_parameters<W: Write>(out: &mut W, args: &PlannerArgs) -> Result<()> {
    if !args.verbose {
        return Ok(());
    }

    let layers: Vec<String> = args.layers.iter().map(|units| units.to_string()).collect();
    let n_step = args
        .n_step
        .map_or_else(|| "-".to_string(), |n| n.to_string());

    let rows: [(&str, String); 20] = [
        ("rddl", args.rddl.clone()),
        ("layers", format!("[{}]", layers.join(", "))),
        ("activation", args.activation.to_string()),
        ("input layer norm", args.input_layer_norm.to_string()),
        ("hidden layer norm", args.hidden_layer_norm.to_string()),
        ("kernel l1", args.kernel_l1_regularizer.to_string()),
        ("kernel l2", args.kernel_l2_regularizer.to_string()),
        ("bias l1", args.bias_l1_regularizer.to_string()),
        ("bias l2", args.bias_l2_regularizer.to_string()),
        ("estimator", args.reparameterization()?.to_string()),
        ("n-step", n_step),
        ("baseline", args.baseline.to_string()),
        ("batch size", args.batch_size.to_string()),
        ("horizon", args.horizon.to_string()),
        ("epochs", args.epochs.to_string()),
        ("learning rate", args.learning_rate.to_string()),
        ("optimizer", args.optimizer.to_string()),
        ("loss fn", args.loss_fn.to_string()),
        ("logdir", args.logdir.display().to_string()),
        (
            "seed",
            args.seed.map_or_else(|| "-".to_string(), |s| s.to_string()),
        ),
    ];

    let write = |out: &mut W| -> std::io::Result<()> {
        writeln!(out)?;
        writeln!(out, "Parameters:")?;
        for (key, value) in &rows {
            writeln!(out, "  {:20} {}", format!("{key}:"), value)?;
        }
        writeln!(out)
    };
    write(out).map_err(|e| Error::io("print parameters", e))
}

/// Print the final total reward `R` and the per-timestep reward `R/H`.
///
/// `rewards` holds `(epoch, reward)` pairs; the last one is reported.
pub fn print_performance<W: Write>(
    out: &mut W,
    rewards: &[(usize, f32)],
    horizon: usize,
    logdir: &Path,
) -> Result<()> {
    let &(_, total) = rewards.last().ok_or(Error::EmptyRewards)?;
    if horizon == 0 {
        return Err(Error::ZeroHorizon);
    }
    let per_step = total / horizon as f32;

    let write = |out: &mut W| -> std::io::Result<()> {
        writeln!(out, ">> Performance:")?;
        writeln!(out, "total reward = {total:.4}, reward per timestep = {per_step:.4}")?;
        writeln!(out)?;
        writeln!(out, ">> Run: tensorboard --logdir {}", logdir.display())
    };
    write(out).map_err(|e| Error::io("print performance", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn output(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buffer = Vec::new();
        f(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_performance_per_timestep() {
        let text = output(|out| {
            print_performance(out, &[(3, 10.0), (7, 80.0)], 40, Path::new("/tmp/tfmdp"))
        });
        assert!(text.contains("total reward = 80.0000"));
        assert!(text.contains("reward per timestep = 2.0000"));
        assert!(text.contains("tensorboard --logdir /tmp/tfmdp"));
    }

    #[test]
    fn test_performance_without_rewards() {
        let mut buffer = Vec::new();
        let result = print_performance(&mut buffer, &[], 40, Path::new("/tmp"));
        assert!(matches!(result, Err(Error::EmptyRewards)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parameters_only_when_verbose() {
        let quiet = PlannerArgs::try_parse_from(["tfmdp", "HVAC-3"]).unwrap();
        assert!(output(|out| print_parameters(out, &quiet)).is_empty());

        let verbose = PlannerArgs::try_parse_from(["tfmdp", "HVAC-3", "-v", "-l", "32"]).unwrap();
        let text = output(|out| print_parameters(out, &verbose));
        assert!(text.contains("Parameters:"));
        assert!(text.contains("HVAC-3"));
        assert!(text.contains("[32]"));
        assert!(text.contains("RMSProp"));
    }
}
