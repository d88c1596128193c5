//! Main entry point for the pickup-queue service
//!
//! This is the production entry point that initializes the queue registry,
//! restores configured queues, serves health and metrics endpoints, and
//! shuts everything down gracefully on a signal.

use anyhow::Result;
use clap::Parser;
use pickup_queue::config::AppConfig;
use pickup_queue::metrics::{HealthServer, HealthServerConfig, MetricsService};
use pickup_queue::service::{AppState, HealthCheck, HealthStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Pickup Queue - capacity queues, captains, cooldowns and threshold alerts
#[derive(Parser)]
#[command(
    name = "pickup-queue",
    version,
    about = "A pickup game matchmaking engine for community chat servers",
    long_about = "Pickup Queue keeps per-server capacity queues, pops a game with optional \
                 random captains when a queue fills, redirects recently finished players to \
                 a waitlist until their cooldown expires, and alerts subscribers when a queue \
                 reaches their threshold."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Health port override
    #[arg(long, value_name = "PORT", help = "Override health and metrics server port")]
    health_port: Option<u16>,

    /// Cooldown override
    #[arg(
        long,
        value_name = "SECONDS",
        help = "Override how long finished players wait before rejoining directly"
    )]
    finish_cooldown: Option<u64>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Perform health check and return appropriate exit code
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = Arc::new(AppState::new(config).await?);
    app_state.start().await?;

    let outcome = HealthCheck::check(app_state.clone()).await;
    app_state.shutdown().await?;

    match outcome {
        Ok(health) => {
            println!("Health Check: {}", health.status);
            println!("  Servers: {}", health.stats.servers);
            println!("  Queues: {}", health.stats.queues);
            println!("  Players Waiting: {}", health.stats.players_waiting);
            println!("  Active Games: {}", health.stats.active_games);

            if health.status == HealthStatus::Healthy {
                std::process::exit(0);
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
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
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Run periodic health checks
async fn health_check_task(app_state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));

    while app_state.is_running().await {
        interval.tick().await;

        match HealthCheck::check(app_state.clone()).await {
            Ok(health) => {
                info!(
                    "Health check: {} - {} queues, {} players waiting, {} active games",
                    health.status,
                    health.stats.queues,
                    health.stats.players_waiting,
                    health.stats.active_games
                );
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
            }
        }
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Pickup Queue Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!(
        "   Finish cooldown: {}s",
        config.matchmaking.finish_cooldown_seconds
    );
    info!(
        "   Announce delay: {}s",
        config.matchmaking.announce_delay_seconds
    );
    info!("   Configured servers: {}", config.servers.len());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(health_port) = args.health_port {
        config.service.health_port = health_port;
    }

    if let Some(cooldown) = args.finish_cooldown {
        config.matchmaking.finish_cooldown_seconds = cooldown;
    }

    pickup_queue::config::validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone()).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    // Health and metrics endpoints
    let health_server = HealthServer::new(
        HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        },
        app_state.metrics(),
    )
    .with_app_state(app_state.clone());
    let metrics_service = MetricsService::new(app_state.metrics(), Arc::new(health_server));

    let server_task = {
        let metrics_service = metrics_service.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            }
        })
    };

    let health_task = {
        let app_state = app_state.clone();
        tokio::spawn(async move {
            health_check_task(app_state).await;
        })
    };

    info!("✅ Pickup Queue Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");
    health_task.abort();

    let shutdown = async {
        if let Err(e) = metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }
        if let Err(e) = app_state.shutdown().await {
            error!("Service shutdown failed: {}", e);
        }
        let _ = server_task.await;
    };

    match tokio::time::timeout(config.shutdown_timeout(), shutdown).await {
        Ok(()) => {
            info!("✅ Graceful shutdown completed successfully");
        }
        Err(_) => {
            warn!("⚠️  Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("🛑 Pickup Queue Service stopped");
    Ok(())
}
