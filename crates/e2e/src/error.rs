//! Error types for scenario runs

use thiserror::Error;

use slicemock_gateway::GatewayError;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Gateway failed to start: {0}")]
    GatewayStartup(String),

    #[error("Gateway health check failed after {0} attempts")]
    GatewayHealthCheck(usize),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    /// The observed page diverged from what the scenario expected
    #[error("Assertion failed: {predicate}\n  expected: {expected}\n  actual:   {actual}")]
    AssertionFailed {
        predicate: String,
        expected: String,
        actual: String,
    },

    #[error("Timeout after {timeout_ms} ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    /// No match, or several matches for a locator without `nth`
    #[error("Locator {locator}: {reason}")]
    Locator { locator: String, reason: String },

    #[error("Unhandled route: {0}")]
    UnhandledRoute(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether this failure came from the scenario's own expectations
    /// rather than the harness
    pub fn is_assertion(&self) -> bool {
        matches!(self, E2eError::AssertionFailed { .. } | E2eError::Timeout { .. })
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
