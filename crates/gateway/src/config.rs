//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;
use url::Url;

use crate::error::{GatewayError, GatewayResult};

/// What to do with a request no rule matches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Surface an unhandled-route error to the scenario
    #[default]
    Fail,
    /// Let the request continue to the real network
    PassThrough,
}

impl FromStr for UnmatchedPolicy {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fail" => Ok(Self::Fail),
            "pass_through" | "pass-through" | "passthrough" => Ok(Self::PassThrough),
            other => Err(GatewayError::Body(format!("unknown unmatched policy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Opaque token returned on login/register; never validated
    #[serde(default = "default_token")]
    pub token: String,

    /// Opaque `jwt` returned with placed orders
    #[serde(default = "default_order_jwt")]
    pub order_jwt: String,

    #[serde(default)]
    pub unmatched: UnmatchedPolicy,

    /// Origin that relative request URLs resolve against
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_token() -> String {
    "abcdef".to_string()
}

fn default_order_jwt() -> String {
    "eyJpYXQ".to_string()
}

fn default_base_url() -> String {
    "http://localhost:5173".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token: default_token(),
            order_jwt: default_order_jwt(),
            unmatched: UnmatchedPolicy::default(),
            base_url: default_base_url(),
        }
    }
}

impl GatewayConfig {
    /// Defaults overridden by `SLICEMOCK_*` environment variables
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(token) = env_non_empty("SLICEMOCK_TOKEN") {
            cfg.token = token;
        }
        if let Some(jwt) = env_non_empty("SLICEMOCK_ORDER_JWT") {
            cfg.order_jwt = jwt;
        }
        if let Some(base) = env_non_empty("SLICEMOCK_BASE_URL") {
            cfg.base_url = base;
        }
        if let Some(policy) = env_non_empty("SLICEMOCK_UNMATCHED") {
            match policy.parse() {
                Ok(p) => cfg.unmatched = p,
                Err(e) => warn!("ignoring SLICEMOCK_UNMATCHED: {}", e),
            }
        }

        cfg
    }

    pub fn base_url(&self) -> GatewayResult<Url> {
        Url::parse(&self.base_url).map_err(|_| GatewayError::InvalidUrl(self.base_url.clone()))
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|v| {
        let v = v.trim();
        if v.is_empty() { None } else { Some(v.to_string()) }
    })
}
