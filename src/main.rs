// src/main.rs

//! # GA4GH Passport Issuer - Main Entry Point
//!
//! Loads the configuration, builds the passport assembler and starts the API
//! server.
//!
//! ## Environment Variables
//! - `PASSPORT_CONFIG`: (Optional) configuration file (default: passport.yaml)
//! - `PASSPORT__*`: overrides of individual configuration values
//! - `RUST_LOG`: (Optional) log filter, e.g. `info` or `ga4gh_passport=debug`

use anyhow::Context;
use dotenv::dotenv;
use ga4gh_passport::attributes::{AttributeSource, InMemoryAttributeSource};
use ga4gh_passport::config::PassportConfig;
use ga4gh_passport::services::api_server::ApiServer;
use ga4gh_passport::services::passport_assembler::PassportAssembler;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

const DEFAULT_CONFIG_PATH: &str = "passport.yaml";

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment and configuration
/// 2. Load the attribute store
/// 3. Load keys and trust anchors
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let config_path = std::env::var("PASSPORT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = PassportConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let attributes: Arc<dyn AttributeSource> = match &config.attribute_store {
        Some(path) => {
            let source = InMemoryAttributeSource::load(path)
                .with_context(|| format!("Failed to load attribute store {}", path))?;
            info!("loaded {} users from {}", source.user_count(), path);
            Arc::new(source)
        }
        None => {
            warn!("no attribute_store configured, every passport request will return 404");
            Arc::new(InMemoryAttributeSource::new())
        }
    };

    let assembler = PassportAssembler::from_config(&config, attributes)
        .await
        .context("Failed to initialize PassportAssembler - check keystore and signing configuration")?;

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen))?;

    info!("Available endpoints:");
    info!("- GET  /jwk");
    info!("- GET  /ga4gh/:user_id");

    ApiServer::new(Arc::new(assembler)).run(addr).await?;
    Ok(())
}
