//! Error types for driftmeasure.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriftError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Graph construction errors
    #[error("Could not create {role} node: element factory \"{factory}\" is unavailable")]
    NodeUnavailable { factory: String, role: String },

    #[error("Unknown node: {node}")]
    UnknownNode { node: String },

    #[error("Failed to link {from} -> {to}: {message}")]
    Link {
        from: String,
        to: String,
        message: String,
    },

    #[error("Failed to set property {property} on {node}: {message}")]
    Property {
        node: String,
        property: String,
        message: String,
    },

    // Runtime control errors
    #[error("State change to {target} failed: {message}")]
    StateChange { target: String, message: String },

    #[error("Signal handling error: {message}")]
    Signal { message: String },

    #[error("Graph engine error: {message}")]
    Engine { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DriftError>;
