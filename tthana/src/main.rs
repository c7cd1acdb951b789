use std::path::PathBuf;

use clap::Parser;
use log::info;

use tthana::analysis::config::AnalysisConfig;
use tthana::analysis::pipeline::{interpret_batch, EventOutcome};
use tthana::error::Result;
use tthana::mem::integrator::{evaluate, ConstantIntegrator};
use tthana::sim::generator::EventGenerator;

/// Runs the event interpretation chain over synthetic events and prints the
/// run statistics.
#[derive(Parser, Debug)]
#[command(name = "tthana", about = "Reconstruction-level event interpretation demo")]
struct Args {
    /// Number of synthetic events to generate.
    #[arg(long, default_value_t = 1000)]
    events: usize,

    /// Seed of the event factory.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Optional JSON analysis configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker threads for the batch driver.
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };

    info!("generating {} events with seed {}", args.events, args.seed);
    let mut generator = EventGenerator::new(args.seed);
    let events = generator.generate_batch(args.events);

    let (outcomes, statistics) = interpret_batch(&events, &config, args.threads)?;

    // stand-in integration service for the demo
    let integrator = ConstantIntegrator { p_tth: 1e-3, p_ttbb: 5e-4 };
    let mut n_integrated = 0usize;
    for outcome in &outcomes {
        if let EventOutcome::Proceed(interpretation) = outcome {
            if let Some(request) = &interpretation.mem_request {
                if evaluate(&integrator, request, &config).is_some() {
                    n_integrated += 1;
                }
            }
        }
    }

    println!("{}", statistics);
    println!("  integrated           = {}", n_integrated);
    Ok(())
}
