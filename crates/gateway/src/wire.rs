//! Intercepted requests and mock responses

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use url::Url;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(GatewayError::InvalidMethod(other.to_string())),
        }
    }
}

/// An outbound call captured from the application under test.
///
/// Lives only for the duration of one dispatch.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

impl InterceptedRequest {
    /// Build a request; relative URLs are resolved against `base`
    pub fn new(method: Method, url: &str, base: &Url) -> GatewayResult<Self> {
        let url = base
            .join(url)
            .map_err(|_| GatewayError::InvalidUrl(url.to_string()))?;
        Ok(Self { method, url, body: None })
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Parse a numeric query parameter, falling back to `default` when absent or malformed
    pub fn query_usize(&self, name: &str, default: usize) -> usize {
        self.query_param(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Decode the JSON body into `T`
    pub fn json<T: DeserializeOwned>(&self) -> GatewayResult<T> {
        let body = self
            .body
            .clone()
            .ok_or_else(|| GatewayError::Body("request has no body".to_string()))?;
        serde_json::from_value(body).map_err(|e| GatewayError::Body(e.to_string()))
    }
}

/// Status code plus JSON body returned to the application under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    pub status: u16,
    pub body: Value,
}

impl MockResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Human-readable error text from an `error` or `message` field
    pub fn error_message(&self) -> Option<String> {
        self.body
            .get("error")
            .or_else(|| self.body.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
