//! Error types for command encoding and catalog loading.

use thiserror::Error;

/// Caller errors raised while turning a command request into an invocation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("{command} takes {expected} argument(s), got {actual}")]
    InvalidArgumentCount {
        command: String,
        expected: usize,
        actual: usize,
    },
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("unknown command code {0}")]
    UnknownCommandCode(u16),
}

/// Errors raised while loading a command catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("command '{name}' declares {slots} parameter slots (max 7)")]
    TooManySlots { name: String, slots: usize },
    #[error("duplicate command name '{0}'")]
    DuplicateName(String),
    #[error("duplicate command code {code} ('{first}' and '{second}')")]
    DuplicateCode {
        code: u16,
        first: String,
        second: String,
    },
}
