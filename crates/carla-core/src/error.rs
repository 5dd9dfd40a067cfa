//! Error kinds returned by engine, registry and plugin operations.
//!
//! One enum covers every public call in the workspace (§7): callers get a
//! `Result`, and the engine additionally keeps the `Display` of the last
//! error around for `last_error()`.

use std::path::PathBuf;

use thiserror::Error;

/// Stage a plugin load failed at, carried by [`Error::PluginLoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Scanning,
    Opening,
    SymbolLookup,
    Instantiation,
    Initialization,
    Activation,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Scanning => write!(f, "scanning"),
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::SymbolLookup => write!(f, "looking up symbol"),
            LoadStage::Instantiation => write!(f, "instantiating"),
            LoadStage::Initialization => write!(f, "initializing"),
            LoadStage::Activation => write!(f, "activating"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("driver error: {0}")]
    DriverError(String),

    #[error("plugin load failed at {stage} stage ({path}): {reason}")]
    PluginLoadError {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("timed out waiting {duration_ms}ms for the RT thread to drain: {operation}")]
    RtDrainTimeout { operation: String, duration_ms: u64 },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
