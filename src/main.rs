use anyhow::Result;
use slipstream::scheduler::Scheduler;
use slipstream::{approvals, config, credentials, metrics, provider, registry, scheduler, watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "slipstream=info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Slipstream - image update decision engine");

    let config = config::Config::from_env();
    metrics::register_metrics();

    let providers = provider::Providers::new();

    let mut credentials = credentials::CredentialsRegistry::new();
    credentials.register(Arc::new(credentials::DockerConfigHelper::new(
        config.docker_config_path.clone(),
    )));
    let credentials = Arc::new(credentials);

    let registry_client = Arc::new(registry::OciRegistryClient::new());
    let scheduler = Arc::new(scheduler::CronScheduler::new());

    let approvals_store = Arc::new(approvals::MemoryStore::new());
    let approvals_manager = Arc::new(approvals::ApprovalsManager::new(approvals_store));

    let repository_watcher = Arc::new(watcher::RepositoryWatcher::new(
        providers.clone(),
        registry_client,
        credentials,
        scheduler.clone(),
        config.default_schedule.clone(),
    ));
    let poll_manager = watcher::PollManager::new(
        providers.clone(),
        repository_watcher,
        Duration::from_secs(config.scan_interval),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let expiry_manager = approvals_manager.clone();
    let expiry_shutdown = shutdown_rx.clone();
    let expiry_handle = tokio::spawn(async move {
        expiry_manager.run_expiry_service(expiry_shutdown).await;
    });

    let poll_handle = tokio::spawn(async move {
        poll_manager.run(shutdown_rx).await;
    });

    info!("Slipstream is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown_tx.send(true)?;
    scheduler.stop().await;
    providers.stop().await;

    let _ = poll_handle.await;
    let _ = expiry_handle.await;

    if let Ok(snapshot) = metrics::gather() {
        debug!(%snapshot, "final metrics");
    }

    info!("Slipstream stopped");
    Ok(())
}
