//! Static route overrides declared by scenarios

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::matcher::{MethodFilter, RoutePattern};
use crate::wire::MockResponse;

/// A fixed response for every request matching one pattern.
///
/// Exactly one of `path`, `glob`, or `regex` must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStub {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub method: MethodFilter,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub body: Value,
}

fn default_status() -> u16 {
    200
}

impl RouteStub {
    pub fn pattern(&self) -> GatewayResult<RoutePattern> {
        match (&self.path, &self.glob, &self.regex) {
            (Some(p), None, None) => Ok(RoutePattern::exact(p.clone())),
            (None, Some(g), None) => Ok(RoutePattern::glob(g.clone())),
            (None, None, Some(r)) => Ok(RoutePattern::regex(r.clone())),
            _ => Err(GatewayError::InvalidPattern {
                pattern: self.display_name(),
                reason: "route stub needs exactly one of path, glob, regex".to_string(),
            }),
        }
    }

    pub fn response(&self) -> MockResponse {
        MockResponse::with_status(self.status, self.body.clone())
    }

    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let target = self
            .path
            .as_deref()
            .or(self.glob.as_deref())
            .or(self.regex.as_deref())
            .unwrap_or("?");
        format!("stub {} {}", self.method, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Method;

    #[test]
    fn test_parse_stub() {
        let yaml = r#"
method: PUT
glob: '*/**/api/auth'
status: 401
body:
  error: Unauthorized
"#;
        let stub: RouteStub = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(stub.method, MethodFilter::Only(Method::Put));
        assert_eq!(stub.pattern().unwrap(), RoutePattern::glob("*/**/api/auth"));
        assert_eq!(stub.response().status, 401);
        assert_eq!(stub.display_name(), "stub PUT */**/api/auth");
    }

    #[test]
    fn test_stub_needs_one_pattern() {
        let stub: RouteStub = serde_yaml::from_str("path: /a\nglob: '**/b'\n").unwrap();
        assert!(stub.pattern().is_err());

        let none: RouteStub = serde_yaml::from_str("status: 204\n").unwrap();
        assert!(none.pattern().is_err());
    }
}
