//! Error types for the REST client.
//!
//! # Design
//! HTTP error statuses are not errors at this level: they are normalized into
//! an Error envelope by `ResponseHandler`. `ApiError` covers what happens
//! before or instead of a response: the transport failing, a body that cannot
//! be (de)serialized, or a configuration that cannot be loaded.

use thiserror::Error;

/// Errors raised while building, sending or decoding a request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (connection refused, DNS, TLS, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The request payload or filter object could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while loading or validating a `ClientConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
