use anyhow::Result;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use tidings_server::app;
use tidings_server::config::ServerConfig;
use tidings_server::scheduler::AlertCheckScheduler;
use tidings_server::seed;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  tidings-server [config.toml]                        Start the alert check scheduler");
    eprintln!("  tidings-server check-once <config.toml>             Run a single check cycle and exit");
    eprintln!("  tidings-server init-alerts <config.toml> <seed.json> Create roles and alerts from seed file");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    tidings_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tidings=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("check-once") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("check-once requires <config.toml> argument")
            })?;
            run_check_once(config_path).await
        }
        Some("init-alerts") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-alerts requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-alerts requires <seed.json> argument")
            })?;
            run_init_alerts(config_path, seed_path).await
        }
        other => {
            let config_path = other.unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    tracing::info!(
        config = config_path,
        database = %config.database.redacted_url(),
        "Starting tidings server"
    );

    let store = app::connect_store(&config).await?;
    let search = app::build_search(&config)?;
    let mailer = app::build_mailer(&config)?;
    let checker = app::build_checker(&config, store, search, mailer);

    if !config.check.enabled {
        tracing::warn!("Alert checks disabled ([check] enabled = false), waiting for shutdown");
        signal::ctrl_c().await?;
        return Ok(());
    }

    let scheduler = AlertCheckScheduler::new(checker, config.check.tick_secs);
    tokio::select! {
        _ = scheduler.run() => {}
        res = signal::ctrl_c() => {
            res?;
            tracing::info!("Shutdown signal received");
        }
    }
    Ok(())
}

async fn run_check_once(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = app::connect_store(&config).await?;
    let search = app::build_search(&config)?;
    let mailer = app::build_mailer(&config)?;
    let checker = app::build_checker(&config, store, search, mailer);

    let summary = AlertCheckScheduler::new(checker, config.check.tick_secs)
        .run_once()
        .await?;
    tracing::info!(summary = %serde_json::to_string(&summary)?, "Check cycle complete");
    Ok(())
}

async fn run_init_alerts(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = app::connect_store(&config).await?;
    let seed_file = seed::load(seed_path)?;

    let report = seed::apply(&store, seed_file).await?;
    tracing::info!(
        roles_created = report.roles_created,
        roles_skipped = report.roles_skipped,
        alerts_created = report.alerts_created,
        "Seed applied"
    );
    Ok(())
}
