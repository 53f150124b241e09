//! Swap Bridge - cross-chain swap engine
//!
//! Scans the configured foreign chains for deposits, settles swaps against the
//! native platform and serves the swap API.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use swap_bridge::api;
use swap_bridge::chain::ethereum::erc20::{format_address, parse_address};
use swap_bridge::chain::ethereum::{ChainProvider, EthereumAdapter, EthereumClient};
use swap_bridge::chain::neo::{NeoAdapter, NeoRpcClient};
use swap_bridge::chain::{AdapterRegistry, BlockScanner, ChainAdapter, ScanSettings, VerifyPolicy};
use swap_bridge::clock::SystemClock;
use swap_bridge::config::{PlatformConfig, PlatformKind, Settings};
use swap_bridge::metrics::{self, MetricsServer};
use swap_bridge::native::NativeRpcClient;
use swap_bridge::oracle::{BlockSource, CachedOracle, EthereumBlockSource, NeoBlockSource, Oracle};
use swap_bridge::retry::RetryPolicy;
use swap_bridge::signer::{RemoteSigner, TransactionSigner};
use swap_bridge::state::{MemoryStore, OracleStore, PgStore, SwapRepository};
use swap_bridge::swap::SwapOrchestrator;

/// Chain clients created before the shared oracle exists
enum PlatformClient {
    Neo(Arc<NeoRpcClient>),
    Ethereum(Arc<ChainProvider>),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Swap Bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} foreign platforms ({})",
        settings.platforms.len(),
        settings.platform_names().join(", ")
    );

    // Initialize persistent state
    let (repository, oracle_store) = open_store(&settings).await?;

    // Initialize metrics server
    let metrics_server = if settings.metrics.enabled {
        Some(MetricsServer::new(settings.metrics.port))
    } else {
        None
    };

    // Native platform access through the signing service
    let signer: Arc<dyn TransactionSigner> = Arc::new(RemoteSigner::new(&settings.signer)?);
    let native = NativeRpcClient::new(settings.native.clone(), signer.clone())?;
    native
        .verify_operator()
        .await
        .context("Native operator address does not match the signing key")?;
    let native = Arc::new(native);
    info!("Native platform {} ready", settings.native.name);

    // Chain clients and the oracle over all of them
    let retry = RetryPolicy::from(&settings.bridge.retry);
    let mut clients = Vec::new();
    let mut oracle = CachedOracle::new(oracle_store);
    for platform in &settings.platforms {
        let (client, source): (PlatformClient, Arc<dyn BlockSource>) = match platform.kind {
            PlatformKind::Neo => {
                let rpc = Arc::new(NeoRpcClient::new(platform)?);
                let source: Arc<dyn BlockSource> =
                    Arc::new(NeoBlockSource::new(platform, rpc.clone())?);
                (PlatformClient::Neo(rpc), source)
            }
            PlatformKind::Ethereum => {
                let provider = Arc::new(ChainProvider::new(platform.clone())?);
                let source: Arc<dyn BlockSource> =
                    Arc::new(EthereumBlockSource::new(platform, provider.clone())?);
                (PlatformClient::Ethereum(provider), source)
            }
        };
        oracle = oracle.with_source(platform.name.clone(), source, platform.interop_height);
        clients.push((platform.clone(), client));
    }
    let oracle: Arc<dyn Oracle> = Arc::new(oracle);

    // Foreign adapters
    let verify = VerifyPolicy {
        attempts: settings.bridge.verify_attempts,
        delay: settings.bridge.verify_delay(),
    };
    let mut registry = AdapterRegistry::new(settings.native.name.clone());
    for (platform, client) in clients {
        let adapter = build_adapter(
            platform,
            client,
            oracle.clone(),
            signer.clone(),
            repository.clone(),
            retry.clone(),
            verify.clone(),
        )
        .await?;
        registry.register(adapter)?;
    }
    info!("Chain adapters initialized");

    let orchestrator = Arc::new(SwapOrchestrator::new(
        registry,
        native,
        repository,
        Arc::new(SystemClock),
        chrono::Duration::seconds(settings.bridge.fee_cooldown_secs),
    ));

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let orchestrator = orchestrator.clone();
        async move {
            if let Err(e) = api::run_server(config, orchestrator).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = metrics_server.map(|server| {
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    // Periodic driver
    let tick_handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        let period = settings.bridge.tick_interval();
        async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                orchestrator.tick().await;
            }
        }
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        let interval = settings.bridge.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

                match orchestrator.health_check().await {
                    Ok(()) => metrics::record_health_check(),
                    Err(e) => {
                        warn!("Database health check failed: {}", e);
                        metrics::record_health_check_failure();
                    }
                }
            }
        }
    });

    info!("Swap Bridge {} is running", settings.bridge.instance_id);
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Abort background tasks
    tick_handle.abort();
    api_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Swap Bridge stopped");
    Ok(())
}

async fn open_store(settings: &Settings) -> Result<(Arc<dyn SwapRepository>, Arc<dyn OracleStore>)> {
    if settings.database.in_memory {
        warn!("Using in-memory state; nothing survives a restart");
        let store = Arc::new(MemoryStore::new());
        let repository: Arc<dyn SwapRepository> = store.clone();
        let oracle_store: Arc<dyn OracleStore> = store;
        return Ok((repository, oracle_store));
    }

    let store = Arc::new(PgStore::new(&settings.database).await?);
    info!("Database connection established");

    store.run_migrations().await?;
    info!("Database migrations complete");

    let repository: Arc<dyn SwapRepository> = store.clone();
    let oracle_store: Arc<dyn OracleStore> = store;
    Ok((repository, oracle_store))
}

async fn build_adapter(
    platform: PlatformConfig,
    client: PlatformClient,
    oracle: Arc<dyn Oracle>,
    signer: Arc<dyn TransactionSigner>,
    repository: Arc<dyn SwapRepository>,
    retry: RetryPolicy,
    verify: VerifyPolicy,
) -> Result<Arc<dyn ChainAdapter>> {
    let scan = ScanSettings {
        batch_size: platform.batch_size(),
        confirmations: platform.confirmations,
        retry: retry.clone(),
    };

    let adapter: Arc<dyn ChainAdapter> = match client {
        PlatformClient::Neo(rpc) => {
            let scanner = BlockScanner::new(platform.name.clone(), platform.address.clone(), oracle, scan);
            Arc::new(NeoAdapter::new(platform, rpc, signer, repository, scanner, verify).await?)
        }
        PlatformClient::Ethereum(provider) => {
            let local_address = format_address(&parse_address(&platform.address)?);
            let scanner = BlockScanner::new(platform.name.clone(), local_address, oracle, scan);
            let node = Arc::new(EthereumClient::new(provider, &platform.key, retry).await?);
            Arc::new(EthereumAdapter::new(platform, node, repository, scanner, verify).await?)
        }
    };
    Ok(adapter)
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,swap_bridge=debug,sqlx=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
