//! Interplanetary-latency simulation proxy.
//!
//! This crate wires together the workspace's component crates: catalog
//! loading, orbital mechanics, hostname routing, admission control and
//! shaping, and the HTTP/SOCKS5 proxy frontends. `main.rs` is a thin
//! `clap`-driven front door; the wiring logic lives here so it's testable
//! without spawning a process.

use std::sync::Arc;

use anyhow::{Context, Result};

pub use space_catalog::Catalog;
use space_proxy::{DistanceCache, HttpFrontend, Socks5Frontend};
use space_shaping::RateLimiter;

/// Runtime configuration for a single proxy instance, independent of how
/// it was parsed (CLI flags in `main.rs`, or constructed directly by
/// tests).
#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_dir: std::path::PathBuf,
    pub zone: String,
    pub http_port: u16,
    pub socks_port: u16,
    pub rate_per_minute: u32,
    pub bandwidth_baseline_bps: f64,
}

/// Loads and validates the catalog, per spec §4.1's "fail fast, readable
/// `thiserror` message" posture: config mistakes surface as exit code 1
/// before any listener binds.
pub fn load_catalog(config: &Config) -> Result<Catalog> {
    Catalog::load_dir(&config.catalog_dir)
        .with_context(|| format!("loading celestial catalog from {}", config.catalog_dir.display()))
}

/// Builds every shared service and runs the proxy until a shutdown
/// signal arrives. Returns once all listeners and the admin loop have
/// stopped.
pub async fn run(config: Config, catalog: Catalog) -> Result<()> {
    let catalog = Arc::new(catalog);
    let distance_cache = Arc::new(DistanceCache::new());
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_per_minute));

    let now_unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    distance_cache
        .refresh(&catalog, now_unix)
        .context("initial distance cache warm-up")?;

    let http = Arc::new(HttpFrontend {
        catalog: Arc::clone(&catalog),
        distance_cache: Arc::clone(&distance_cache),
        rate_limiter: Arc::clone(&rate_limiter),
        zone: config.zone.clone(),
        bandwidth_baseline_bps: config.bandwidth_baseline_bps,
        listen_port: config.http_port,
    });

    let default_chain = catalog
        .planets()
        .next()
        .map(|p| vec![p.name.clone()])
        .unwrap_or_default();
    let socks5 = Arc::new(Socks5Frontend {
        catalog: Arc::clone(&catalog),
        distance_cache: Arc::clone(&distance_cache),
        rate_limiter: Arc::clone(&rate_limiter),
        zone: config.zone.clone(),
        bandwidth_baseline_bps: config.bandwidth_baseline_bps,
        listen_port: config.socks_port,
        default_chain,
    });

    let admin_handle = tokio::spawn(space_proxy::run_admin_loop(
        Arc::clone(&catalog),
        Arc::clone(&distance_cache),
        Arc::clone(&rate_limiter),
    ));

    let http_handle = tokio::spawn(async move { http.serve().await });
    let socks5_handle = tokio::spawn(async move { socks5.serve().await });

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining in-flight flows");
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        }
        res = http_handle => {
            res.context("http frontend task panicked")?.context("http frontend exited")?;
        }
        res = socks5_handle => {
            res.context("socks5 frontend task panicked")?.context("socks5 frontend exited")?;
        }
    }

    admin_handle.abort();
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}
