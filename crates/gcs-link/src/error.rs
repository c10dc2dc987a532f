//! Link-level errors.

use std::time::Duration;

use gcs_core::{CatalogError, CommandError, FrameError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Transport unavailable or failing
    #[error("connection error: {0}")]
    Connection(String),
    #[error("no acknowledgement for command {command} within {timeout:?}")]
    AckTimeout { command: u16, timeout: Duration },
    #[error("acknowledgement resolver closed")]
    ResolverClosed,
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Connection(err.to_string())
    }
}
