use anyhow::Result;
use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tfmdp::app::{DrpPlannerFactory, RegistryLoader, run_experiment};
use tfmdp::cli::PlannerArgs;

#[cfg(not(feature = "metal"))]
type PlannerBackend = Autodiff<burn::backend::NdArray>;
#[cfg(feature = "metal")]
type PlannerBackend = Autodiff<burn::backend::Metal>;

fn init_logging() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tfmdp=info,warn"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> Result<()> {
    dotenv().ok();
    let args = PlannerArgs::parse();
    init_logging()?;

    tracing::info!("tfmdp v{}", env!("CARGO_PKG_VERSION"));

    let seed = args.seed.unwrap_or_else(rand::random);
    PlannerBackend::seed(seed);
    tracing::debug!("Backend seed: {}", seed);

    let device = <PlannerBackend as Backend>::Device::default();
    let factory = DrpPlannerFactory::<PlannerBackend>::new(device);

    let mut stdout = std::io::stdout().lock();
    run_experiment(&args, &RegistryLoader, &factory, &mut stdout)?;
    Ok(())
}
