use thiserror::Error;

/// Core error taxonomy (spec §7).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transient write failure for {path}: {source}")]
    TransientWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("provider transport error: {0}")]
    ProviderTransport(String),

    #[error("provider protocol error: {0}")]
    ProviderProtocol(String),

    #[error("tracker parse error on {line:?}: {reason}")]
    TrackerParse { line: String, reason: String },

    #[error("cadence stall: segment {seq} not yet on disk")]
    CadenceStall { seq: u64 },

    #[error("gate not yet open")]
    GateNotOpen,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, CoreError>;
