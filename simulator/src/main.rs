mod args;
mod driver;
mod generation;
mod logging;
mod model;
mod oracle;

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::Level;

use crate::args::{Args, SimConfig};
use crate::driver::run;
use crate::logging::{RunLog, TAIL_LINES};

fn main() {
    let args = Args::parse();
    let config = SimConfig::from_args(args);
    let log = RunLog::new(config.log.as_deref(), TAIL_LINES).unwrap_or_else(|err| {
        eprintln!("failed to open log file: {err}");
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_writer(log.clone())
        .with_target(false)
        .with_max_level(if config.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config_json = serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string());
    tracing::info!("config: {}", config_json);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    if let Err(reason) = run(&config, &mut rng) {
        tracing::error!(seed = config.seed, "simulation failed: {reason}");
        log.report_failure(config.seed);
        std::process::exit(1);
    }
    log.finish();
}
