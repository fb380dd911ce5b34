mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use hardcopy::artifact::TempArtifactManager;
use hardcopy::config::{Config, LogFormat, LoggingConfig};
use hardcopy::engine::{EngineHandle, EngineOptions};
use hardcopy::gate::ConcurrencyGate;
use hardcopy::logo::LogoRegistry;
use hardcopy::render::RenderPipeline;
use hardcopy::server::{build_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load config {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    args.apply(&mut config);

    init_logging(&config.logging);

    let logos = match &config.logo_manifest {
        Some(path) => match LogoRegistry::load(path) {
            Ok(registry) => registry,
            Err(err) => {
                error!(manifest = %path.display(), error = %err, "failed to load logo manifest");
                return ExitCode::FAILURE;
            }
        },
        None => LogoRegistry::empty(),
    };

    let engine = Arc::new(EngineHandle::new(EngineOptions {
        chrome_executable: config.chrome_executable.clone(),
        remote_endpoint: config.chrome_endpoint.clone(),
    }));
    let pipeline = Arc::new(RenderPipeline::new(
        Arc::clone(&engine),
        ConcurrencyGate::new(config.max_concurrent_renders),
        TempArtifactManager::new(&config.tmp_dir),
        config.navigation_timeout(),
        config.selector_timeout(),
    ));
    let router = build_router(AppState {
        pipeline,
        logos: Arc::new(logos),
    });

    let listener = match TcpListener::bind(config.listen).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr = %config.listen, error = %err, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(
        addr = %config.listen,
        max_renders = config.max_concurrent_renders,
        "hardcopy listening"
    );

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // The engine outlives individual jobs; take it down with the server.
    engine.shutdown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "server error");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
    }
}
