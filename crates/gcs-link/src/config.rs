//! Link configuration from environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gcs_core::{CatalogError, CommandCatalog, Target};

use crate::connection::SourceId;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Connection string, e.g. `udpin:0.0.0.0:14550`
    pub link: String,
    pub source_system: u8,
    pub source_component: u8,
    pub target_system: u8,
    pub target_component: u8,
    pub ack_timeout: Duration,
    pub max_attempts: u32,
    /// External catalog replacing the built-in one
    pub catalog_path: Option<PathBuf>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            link: "udpin:0.0.0.0:14550".to_string(),
            source_system: 255,
            source_component: 190,
            target_system: 1,
            target_component: 1,
            ack_timeout: Duration::from_millis(1500),
            max_attempts: 3,
            catalog_path: None,
        }
    }
}

impl LinkConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            link: env::var("GCS_LINK").unwrap_or(defaults.link),
            source_system: parse_var("GCS_SOURCE_SYSTEM").unwrap_or(defaults.source_system),
            source_component: parse_var("GCS_SOURCE_COMPONENT")
                .unwrap_or(defaults.source_component),
            target_system: parse_var("GCS_TARGET_SYSTEM").unwrap_or(defaults.target_system),
            target_component: parse_var("GCS_TARGET_COMPONENT")
                .unwrap_or(defaults.target_component),
            ack_timeout: parse_var("GCS_ACK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ack_timeout),
            max_attempts: parse_var("GCS_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            catalog_path: env::var("GCS_CATALOG")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn source(&self) -> SourceId {
        SourceId {
            system_id: self.source_system,
            component_id: self.source_component,
        }
    }

    pub fn target(&self) -> Target {
        Target::new(self.target_system, self.target_component)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            ack_timeout: self.ack_timeout,
            ..RetryPolicy::default()
        }
    }

    /// The configured catalog file, or the built-in catalog.
    pub fn load_catalog(&self) -> Result<CommandCatalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => CommandCatalog::from_path(path),
            None => CommandCatalog::builtin(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
