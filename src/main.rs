//! Headless runner: load a scene, run the step loop, report counts.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sdf_particles::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "sdf-particles", version, about = "Run the SDF particle simulation headless")]
struct Cli {
    /// TOML run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serialized spatial index (overrides the config file)
    #[arg(short, long)]
    tree: Option<PathBuf>,

    /// Number of steps to run
    #[arg(long)]
    steps: Option<u32>,

    /// Particles requested before every step
    #[arg(long)]
    spawn: Option<u32>,

    /// Number of particle slots
    #[arg(long)]
    capacity: Option<u32>,

    /// Run on the GPU instead of the CPU
    #[arg(long)]
    gpu: bool,

    /// Fixed step length in seconds (defaults to the configured delta_time)
    #[arg(long, conflicts_with = "wall_clock")]
    fixed_dt: Option<f32>,

    /// Use measured wall-clock time between steps
    #[arg(long)]
    wall_clock: bool,

    /// Print the positions of live particles after the last step
    #[arg(long)]
    dump: bool,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match cli.verbose {
        0 => {}
        1 => {
            logger.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            logger.filter_level(log::LevelFilter::Trace);
        }
    }
    logger.init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> sdf_particles::Result<()> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(tree) = cli.tree {
        config.tree = Some(tree);
    }
    if let Some(steps) = cli.steps {
        config.steps = steps;
    }
    if let Some(spawn) = cli.spawn {
        config.spawn_per_step = spawn;
    }
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }
    if let Some(dt) = cli.fixed_dt {
        config.params.delta_time = dt;
    }
    config.validate()?;

    let tree = match &config.tree {
        Some(path) => SdfTree::load(path)?,
        None => {
            log::info!("No spatial index given, running without collision");
            SdfTree::empty()
        }
    };

    let mut backend: Box<dyn Backend> = if cli.gpu {
        Box::new(GpuSimulation::new_blocking(config.capacity, tree)?)
    } else {
        Box::new(CpuSimulation::new(config.capacity, tree)?)
    };
    backend.initialize(&config.params)?;

    let fixed_delta = (!cli.wall_clock).then_some(config.params.delta_time);
    let mut clock = StepClock::new().with_fixed_delta(fixed_delta);
    let mut totals = StepStats::default();

    for _ in 0..config.steps {
        let params = clock.advance(config.params);
        let stats = backend.step(config.spawn_per_step, &params)?;
        totals.requested += stats.requested;
        totals.emitted += stats.emitted;
        totals.expired += stats.expired;
    }

    let particles = backend.particles()?;
    let active: Vec<&Particle> = particles.iter().filter(|p| p.is_active()).collect();
    log::info!(
        "Ran {} steps in {:.2?} ({:.0} steps/s): {} requested, {} emitted, {} expired, {} live",
        clock.step(),
        clock.elapsed(),
        clock.rate(),
        totals.requested,
        totals.emitted,
        totals.expired,
        active.len()
    );

    if cli.dump {
        for p in active {
            println!("{} {} {}", p.position.x, p.position.y, p.position.z);
        }
    }
    Ok(())
}
