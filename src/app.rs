//! Planner orchestration: load model, build planner, run, report.
//!
//! The model loader and the planner are reached through the [`ModelLoader`]
//! and [`PlannerFactory`] traits so the sequence can be driven with any
//! implementation. [`RegistryLoader`] and [`DrpPlannerFactory`] are the
//! production adapters.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;

use crate::cli::{PlannerArgs, print_parameters, print_performance};
use crate::error::Result;
use crate::infra::{
    CompositeObserver, DefaultObserver, ProgressObserver, TrainingObserver, timed,
};
use crate::model::{CompilationMode, CompiledModel, registry};
use crate::planners::drp::{BuildConfig, PolicyConfig, PolicyOptimizationPlanner};

/// Resolves a domain specifier into a compiled model.
pub trait ModelLoader {
    fn load(&self, spec: &str, mode: CompilationMode) -> Result<CompiledModel>;
}

/// A planner after construction: `build` once, then `run`.
pub trait Planner {
    fn build(&mut self, config: BuildConfig) -> Result<()>;

    fn run(&mut self, epochs: usize) -> Result<PlanOutcome>;
}

/// Creates planners for a compiled model.
pub trait PlannerFactory {
    fn create(
        &self,
        model: CompiledModel,
        policy: &PolicyConfig,
        logdir: &Path,
    ) -> Result<Box<dyn Planner>>;
}

/// Backend-independent summary of a planning run
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    /// `(epoch, average total reward)` for every improving epoch
    pub rewards: Vec<(usize, f32)>,
    pub policy_name: String,
    pub logdir: PathBuf,
}

/// Loads domains from the built-in registry or from JSON instance files.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryLoader;

impl ModelLoader for RegistryLoader {
    fn load(&self, spec: &str, mode: CompilationMode) -> Result<CompiledModel> {
        registry::make(spec, mode)
    }
}

/// Creates [`PolicyOptimizationPlanner`]s on the autodiff backend `B`.
pub struct DrpPlannerFactory<B: AutodiffBackend> {
    device: B::Device,
    show_progress: bool,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> DrpPlannerFactory<B> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            show_progress: true,
            _backend: PhantomData,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

impl<B: AutodiffBackend> PlannerFactory for DrpPlannerFactory<B> {
    fn create(
        &self,
        model: CompiledModel,
        policy: &PolicyConfig,
        logdir: &Path,
    ) -> Result<Box<dyn Planner>> {
        let planner =
            PolicyOptimizationPlanner::<B>::new(model, policy, logdir, self.device.clone());
        let planner = if self.show_progress {
            let observers: Vec<Box<dyn TrainingObserver>> =
                vec![Box::new(DefaultObserver), Box::new(ProgressObserver::new())];
            planner.with_observer(Box::new(CompositeObserver::new(observers)))
        } else {
            planner
        };
        Ok(Box::new(planner))
    }
}

impl<B: AutodiffBackend> Planner for PolicyOptimizationPlanner<B> {
    fn build(&mut self, config: BuildConfig) -> Result<()> {
        PolicyOptimizationPlanner::build(self, config)
    }

    fn run(&mut self, epochs: usize) -> Result<PlanOutcome> {
        let result = PolicyOptimizationPlanner::run(self, epochs)?;
        Ok(PlanOutcome {
            rewards: result.rewards,
            policy_name: result.policy.name(),
            logdir: self.logdir().to_path_buf(),
        })
    }
}

/// Run one planning experiment end to end and write the report to `out`.
pub fn run_experiment<W: Write>(
    args: &PlannerArgs,
    loader: &dyn ModelLoader,
    factory: &dyn PlannerFactory,
    out: &mut W,
) -> Result<PlanOutcome> {
    print_parameters(out, args)?;

    let (model, _) = timed("Model loading", || -> Result<CompiledModel> {
        let mut model = loader.load(&args.rddl, CompilationMode::Scg)?;
        model.batch_mode_on();
        Ok(model)
    });
    let model = model?;

    let (outcome, _) = timed("Policy optimization", || -> Result<PlanOutcome> {
        let mut planner = factory.create(model, &args.policy_config(), &args.logdir)?;
        planner.build(args.build_config()?)?;
        planner.run(args.epochs)
    });
    let outcome = outcome?;

    print_performance(out, &outcome.rewards, args.horizon as usize, &outcome.logdir)?;
    Ok(outcome)
}
