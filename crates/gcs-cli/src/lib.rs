//! Shared plumbing for the command-line tools.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gcs_core::CommandCatalog;
use gcs_link::{LinkConfig, Session};

/// Connection flags. Anything not given falls back to the `GCS_*`
/// environment variables.
#[derive(Args, Debug, Clone, Default)]
pub struct LinkArgs {
    /// Connection string: udpin:HOST:PORT, udpout:HOST:PORT, tcp:HOST:PORT or
    /// serial:PORT:BAUD
    #[arg(long)]
    pub link: Option<String>,

    /// Target system id
    #[arg(long)]
    pub target_system: Option<u8>,

    /// Target component id
    #[arg(long)]
    pub target_component: Option<u8>,

    /// Our system id
    #[arg(long)]
    pub source_system: Option<u8>,

    /// Milliseconds to wait for each acknowledgement
    #[arg(long)]
    pub ack_timeout_ms: Option<u64>,

    /// Transmissions per command, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Command catalog JSON replacing the built-in one
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

impl LinkArgs {
    pub fn config(&self) -> LinkConfig {
        let mut config = LinkConfig::from_env();
        if let Some(link) = &self.link {
            config.link = link.clone();
        }
        if let Some(system) = self.target_system {
            config.target_system = system;
        }
        if let Some(component) = self.target_component {
            config.target_component = component;
        }
        if let Some(system) = self.source_system {
            config.source_system = system;
        }
        if let Some(ms) = self.ack_timeout_ms {
            config.ack_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(path) = &self.catalog {
            config.catalog_path = Some(path.clone());
        }
        config
    }

    pub async fn connect(&self) -> Result<Session> {
        let config = self.config();
        tracing::info!(
            "Connecting to {} (target {}/{})",
            config.link,
            config.target_system,
            config.target_component
        );
        Ok(Session::connect(&config).await?)
    }

    pub fn catalog(&self) -> Result<CommandCatalog> {
        Ok(self.config().load_catalog()?)
    }
}

pub fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gcs_link=info".parse()?)
                .add_directive("gcs_cli=info".parse()?),
        )
        .init();
    Ok(())
}
