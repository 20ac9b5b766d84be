use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use latency_space::Config;

/// Interplanetary-latency simulation proxy: forwards TCP traffic toward
/// arbitrary Internet destinations while injecting a synthetic one-way
/// delay and bandwidth ceiling derived from the real-time light-travel
/// time between Earth and a client-selected Solar System body.
#[derive(Debug, Parser)]
#[command(name = "latency-space", version, about)]
struct Cli {
    /// Directory of per-body TOML catalog files.
    #[arg(long, env = "LATENCY_SPACE_CATALOG_DIR", default_value = "configs/bodies")]
    catalog_dir: PathBuf,

    /// Base DNS zone clients route through, e.g. `latency.space`.
    #[arg(long, env = "LATENCY_SPACE_ZONE", default_value = "latency.space")]
    zone: String,

    /// Port the HTTP forward-proxy and debug surface listen on.
    #[arg(long, env = "LATENCY_SPACE_HTTP_PORT", default_value_t = 80)]
    http_port: u16,

    /// Port the SOCKS5 frontend listens on.
    #[arg(long, env = "LATENCY_SPACE_SOCKS_PORT", default_value_t = 1080)]
    socks_port: u16,

    /// Per-client-IP request allowance per rolling minute.
    #[arg(long, env = "LATENCY_SPACE_RATE_PER_MINUTE", default_value_t = 100)]
    rate_per_minute: u32,

    /// Baseline bandwidth ceiling (bits/sec) at 1 AU; scales with
    /// `(1 AU / distance)^2` for bodies without their own override.
    #[arg(long, env = "LATENCY_SPACE_BANDWIDTH_BASELINE_BPS", default_value_t = 1_000_000.0)]
    bandwidth_baseline_bps: f64,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config {
        catalog_dir: cli.catalog_dir,
        zone: cli.zone,
        http_port: cli.http_port,
        socks_port: cli.socks_port,
        rate_per_minute: cli.rate_per_minute,
        bandwidth_baseline_bps: cli.bandwidth_baseline_bps,
    };

    let catalog = match latency_space::load_catalog(&config) {
        Ok(catalog) => catalog,
        Err(err) => {
            tracing::error!(error = %err, "bad configuration");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "failed to start tokio runtime");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(latency_space::run(config, catalog)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "listener bind failure");
            ExitCode::from(2)
        }
    }
}
