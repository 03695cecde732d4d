use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic sql-txqueue workload simulator")]
pub(crate) struct Args {
    /// Number of submissions (transactions or standalone queries) to run
    #[arg(long)]
    pub(crate) iterations: Option<u64>,
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    #[arg(long, default_value_t = 4)]
    pub(crate) workers: usize,
    #[arg(long, default_value_t = 6)]
    pub(crate) max_statements: usize,
    /// Submissions started before the driver waits for them
    #[arg(long, default_value_t = 16)]
    pub(crate) window: usize,
    #[arg(long, default_value_t = 0.03)]
    pub(crate) fail_rate: f64,
    #[arg(long, default_value_t = 0.03)]
    pub(crate) lose_rate: f64,
    #[arg(long, default_value_t = 0.01)]
    pub(crate) lose_twice_rate: f64,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) abort_rate: f64,
    #[arg(long, default_value_t = 0.02)]
    pub(crate) clear_rate: f64,
    #[arg(long, default_value_t = 0.2)]
    pub(crate) standalone_rate: f64,
    /// Every reconnect ping fails, so no batch can be retried
    #[arg(long)]
    pub(crate) ping_fails: bool,
    /// Turn off the engine's reconnect retry
    #[arg(long)]
    pub(crate) no_retry: bool,
    /// Simulated per-statement latency
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) latency: Option<Duration>,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(long)]
    pub(crate) verbose: bool,
    #[arg(long)]
    pub(crate) quick: bool,
    #[arg(long)]
    pub(crate) stress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimConfig {
    pub(crate) iterations: u64,
    pub(crate) seed: u64,
    pub(crate) workers: usize,
    pub(crate) max_statements: usize,
    pub(crate) window: usize,
    pub(crate) fail_rate: f64,
    pub(crate) lose_rate: f64,
    pub(crate) lose_twice_rate: f64,
    pub(crate) abort_rate: f64,
    pub(crate) clear_rate: f64,
    pub(crate) standalone_rate: f64,
    pub(crate) ping_fails: bool,
    pub(crate) retry: bool,
    pub(crate) latency_us: Option<u64>,
    pub(crate) log: Option<PathBuf>,
    pub(crate) verbose: bool,
    pub(crate) preset: Option<String>,
}

impl SimConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let mut config = SimConfig {
            iterations: args.iterations.unwrap_or(2_000),
            seed: args.seed.unwrap_or_else(random_seed),
            workers: args.workers.max(1),
            max_statements: args.max_statements.max(1),
            window: args.window.max(1),
            fail_rate: clamp_rate(args.fail_rate),
            lose_rate: clamp_rate(args.lose_rate),
            lose_twice_rate: clamp_rate(args.lose_twice_rate),
            abort_rate: clamp_rate(args.abort_rate),
            clear_rate: clamp_rate(args.clear_rate),
            standalone_rate: clamp_rate(args.standalone_rate),
            ping_fails: args.ping_fails,
            retry: !args.no_retry,
            latency_us: args.latency.map(|d| d.as_micros() as u64),
            log: args.log,
            verbose: args.verbose,
            preset: None,
        };

        if args.quick {
            config.apply_quick();
        }
        if args.stress {
            config.apply_stress();
        }

        config
    }

    fn apply_quick(&mut self) {
        self.preset = Some("quick".to_string());
        self.iterations = 500;
        self.workers = 2;
        self.max_statements = 4;
        self.window = 8;
    }

    fn apply_stress(&mut self) {
        self.preset = Some("stress".to_string());
        self.iterations = 50_000;
        self.workers = 16;
        self.max_statements = 12;
        self.window = 64;
        self.fail_rate = 0.05;
        self.lose_rate = 0.05;
        self.lose_twice_rate = 0.02;
        self.abort_rate = 0.1;
    }

    pub(crate) fn latency(&self) -> Option<Duration> {
        self.latency_us.map(Duration::from_micros)
    }
}

fn clamp_rate(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_secs() ^ u64::from(now.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_rate_limits_bounds() {
        assert_eq!(clamp_rate(-1.0), 0.0);
        assert_eq!(clamp_rate(2.0), 1.0);
        assert_eq!(clamp_rate(0.5), 0.5);
        assert_eq!(clamp_rate(f64::NAN), 0.0);
    }

    #[test]
    fn quick_preset_shrinks_run() {
        let args = Args::parse_from(["txqueue-sim", "--quick", "--seed", "7"]);
        let config = SimConfig::from_args(args);
        assert_eq!(config.seed, 7);
        assert_eq!(config.iterations, 500);
        assert_eq!(config.preset.as_deref(), Some("quick"));
        assert!(config.retry);
    }
}
