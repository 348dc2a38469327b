//! webtail - main entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use webtail::config::Config;
use webtail::discovery::{ContainerPlatform, DockerPlatform, DockerWatcher};
use webtail::proxy::{HttpProxyFactory, ProxyFactory, ProxyHandle};

/// How long shutdown may take before the process exits anyway.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(
    name = "webtail",
    about = "Label-driven reverse proxies for Docker containers",
    version
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json", env = "WEBTAIL_CONFIG")]
    config: String,

    /// Enable Docker container discovery.
    #[arg(long, env = "WEBTAIL_DOCKER")]
    docker: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webtail=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config, cli.docker)?;

    let factory = Arc::new(HttpProxyFactory::new(config.listen.host.clone()));

    // Static services from the config file. A service that fails to start is
    // logged and skipped; the rest keep running.
    let mut static_proxies: Vec<Arc<dyn ProxyHandle>> = Vec::new();
    for service in config.services.clone() {
        let handle = factory.create(service);
        match handle.start().await {
            Ok(()) => {
                info!(
                    "Started proxy '{}' -> {}",
                    handle.node_name(),
                    handle.target()
                );
                static_proxies.push(handle);
            }
            Err(e) => error!("Failed to start proxy '{}': {}", handle.node_name(), e),
        }
    }

    let watcher = if cli.docker {
        start_docker_watcher(&config, factory.clone()).await
    } else {
        None
    };

    if static_proxies.is_empty() && watcher.is_none() {
        anyhow::bail!("no static proxies started and Docker discovery is unavailable");
    }

    info!(
        "webtail running: {} static proxies, Docker discovery {}",
        static_proxies.len(),
        if watcher.is_some() { "on" } else { "off" }
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let shutdown = async {
        if let Some(watcher) = &watcher {
            watcher.stop().await;
        }
        for handle in &static_proxies {
            if let Err(e) = handle.stop().await {
                error!("Error stopping proxy '{}': {}", handle.node_name(), e);
            }
        }
    };
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown).await {
        Ok(()) => info!("Shutdown complete"),
        Err(_) => warn!(
            "Shutdown timed out after {}s, exiting anyway",
            SHUTDOWN_TIMEOUT.as_secs()
        ),
    }

    Ok(())
}

/// Connect to Docker and start the watcher.
///
/// An unreachable daemon or a failed watcher start is logged, not fatal;
/// static proxies keep the process useful without discovery.
async fn start_docker_watcher(
    config: &Config,
    factory: Arc<HttpProxyFactory>,
) -> Option<DockerWatcher> {
    let platform = match DockerPlatform::connect(&config.docker).await {
        Ok(platform) => platform,
        Err(e) => {
            error!("Docker discovery unavailable: {}", e);
            return None;
        }
    };

    let watcher = DockerWatcher::new(
        Arc::new(platform) as Arc<dyn ContainerPlatform>,
        factory as Arc<dyn ProxyFactory>,
        config.docker.network.clone(),
    );
    match watcher.start().await {
        Ok(()) => Some(watcher),
        Err(e) => {
            error!("Failed to start Docker watcher: {}", e);
            None
        }
    }
}
