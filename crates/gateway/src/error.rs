//! Error types for the mock gateway

use thiserror::Error;

use crate::wire::Method;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// A request hit no registered rule while the policy is `fail`
    #[error("Unhandled route: {method} {url}")]
    UnhandledRoute { method: Method, url: String },

    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid request URL '{0}'")]
    InvalidUrl(String),

    #[error("Invalid method '{0}'")]
    InvalidMethod(String),

    #[error("Request body error: {0}")]
    Body(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Common(#[from] slicemock_common::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
