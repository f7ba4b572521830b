use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use remotty::library::metadata::CatalogFileProvider;
use remotty::library::MediaTools;
use remotty::server::{self, Server};
use remotty::{cli, config};

/// Set to true once the first Ctrl+C is received. Second Ctrl+C force-exits.
static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Wait for the first Ctrl+C. A second one during shutdown exits at once.
async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    SHUTTING_DOWN.store(true, Ordering::SeqCst);
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() && SHUTTING_DOWN.load(Ordering::SeqCst) {
            eprintln!("\nremotty: forced exit");
            std::process::exit(1);
        }
    });
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();

    let args = cli::Args::parse();

    let file_config = config::load_or_generate(args.config.as_deref(), &config::default_config_path());
    let config = config::Config::resolve(file_config, &args);

    if !config.library_root.is_dir() {
        eprintln!("error: library root is not a directory: {}", config.library_root.display());
        std::process::exit(1);
    }

    tracing::info!(
        "remotty {} serving {} on port {}",
        env!("CARGO_PKG_VERSION"),
        config.library_root.display(),
        config.port
    );

    let provider = CatalogFileProvider::load(
        &config.metadata_cache,
        &config.metadata_url,
        config.cover_cache_dir.clone(),
        config.tool_timeout,
    )
    .await
    .with_tools(MediaTools {
        timeout: config.tool_timeout,
        ..MediaTools::default()
    });

    let listeners = server::bind(config.port, config.localhost)
        .await
        .unwrap_or_else(|e| {
            eprintln!("error: failed to bind port {}: {}", config.port, e);
            std::process::exit(1);
        });

    Server::new(&config, Arc::new(provider))
        .serve(listeners, wait_for_shutdown())
        .await;
}
