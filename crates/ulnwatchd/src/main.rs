//! ulnwatchd - security-configuration indexing daemon
//!
//! Loads the chain & DVN catalog, opens the entity store, and ingests the
//! event journal chain by chain, maintaining the derived security
//! configuration of every application route.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ulnwatchd::catalog::ChainCatalog;
use ulnwatchd::config::Config;
use ulnwatchd::context::HandlerContext;
use ulnwatchd::ingest;
use ulnwatchd::storage::Storage;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    let default_level = if config.verbose { "ulnwatchd=debug" } else { "ulnwatchd=info" };
    let filter = EnvFilter::from_default_env().add_directive(
        default_level
            .parse()
            .expect("static directive always parses"),
    );
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!(
        "ulnwatchd v{} - security-configuration indexer",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    let registry = match config.registry() {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to build library registry: {e}");
            return ExitCode::FAILURE;
        }
    };

    let catalog = match &config.catalog {
        Some(path) => match ChainCatalog::load(path) {
            Ok(catalog) => {
                info!(
                    dvns = catalog.dvn_count(),
                    eids = catalog.eid_count(),
                    "catalog loaded"
                );
                catalog
            }
            Err(e) => {
                error!("Failed to load catalog: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ChainCatalog::empty(),
    };

    let storage = match Storage::open(&config.data_dir) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to open storage: {e}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = Arc::new(
        HandlerContext::new(storage.clone(), registry, Arc::new(catalog))
            .with_preload(config.preload),
    );

    match ingest::run_journal(ctx, &config.journal).await {
        Ok(stats) if stats.failed_chains == 0 => {
            if let Err(e) = storage.flush() {
                error!("Failed to flush storage: {e}");
                return ExitCode::FAILURE;
            }
            info!(applied = stats.applied, "done");
            ExitCode::SUCCESS
        }
        Ok(stats) => {
            let _ = storage.flush();
            error!(failed_chains = stats.failed_chains, "ingestion finished with failed chains");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Ingestion failed: {e}");
            ExitCode::FAILURE
        }
    }
}
