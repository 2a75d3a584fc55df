//! Response synthesis
//!
//! Handlers decide an [`Outcome`]; the synthesizer turns it into the status
//! code and JSON body the application under test receives.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use slicemock_common::Identity;

use crate::wire::MockResponse;

/// A handler's decision
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 200 with the given body
    Json(Value),
    /// Arbitrary status and body
    Status { status: u16, body: Value },
    /// 401 with `{ "error": .. }`
    Unauthorized(String),
    /// 403 with `{ "message": .. }`
    Forbidden(String),
    /// 404 with `{ "message": .. }`
    NotFound(String),
    /// 400 with `{ "message": .. }`
    BadRequest(String),
    /// 409 with `{ "message": .. }`
    Conflict(String),
    /// Decline; the next earlier-registered matching rule decides
    Fallthrough,
}

impl Outcome {
    /// 200 with `value` serialized as the body
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Outcome::Json(body),
            Err(e) => {
                error!("failed to serialize mock body: {}", e);
                Outcome::Status {
                    status: 500,
                    body: json!({ "message": e.to_string() }),
                }
            }
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Outcome::Json(json!({ "message": text.into() }))
    }

    pub fn is_fallthrough(&self) -> bool {
        matches!(self, Outcome::Fallthrough)
    }
}

/// Serializes outcomes into wire responses
#[derive(Debug, Clone, Default)]
pub struct ResponseSynthesizer;

impl ResponseSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// `None` for [`Outcome::Fallthrough`]
    pub fn synthesize(&self, outcome: Outcome) -> Option<MockResponse> {
        let response = match outcome {
            Outcome::Json(body) => MockResponse::ok(body),
            Outcome::Status { status, body } => MockResponse::with_status(status, body),
            Outcome::Unauthorized(msg) => MockResponse::with_status(401, json!({ "error": msg })),
            Outcome::Forbidden(msg) => MockResponse::with_status(403, json!({ "message": msg })),
            Outcome::NotFound(msg) => MockResponse::with_status(404, json!({ "message": msg })),
            Outcome::BadRequest(msg) => MockResponse::with_status(400, json!({ "message": msg })),
            Outcome::Conflict(msg) => MockResponse::with_status(409, json!({ "message": msg })),
            Outcome::Fallthrough => return None,
        };
        Some(response)
    }
}

/// `{ user, token }` body returned by login, register, and profile update
pub fn auth_payload(identity: &Identity, token: &str) -> Outcome {
    Outcome::Json(json!({
        "user": identity,
        "token": token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicemock_common::{Role, RoleAssignment};

    #[test]
    fn test_unauthorized_shape() {
        let resp = ResponseSynthesizer::new()
            .synthesize(Outcome::Unauthorized("Unauthorized".into()))
            .unwrap();
        assert_eq!(resp.status, 401);
        assert_eq!(resp.body, json!({ "error": "Unauthorized" }));
    }

    #[test]
    fn test_fallthrough_yields_nothing() {
        assert!(ResponseSynthesizer::new().synthesize(Outcome::Fallthrough).is_none());
    }

    #[test]
    fn test_auth_payload() {
        let identity = Identity {
            id: "3".into(),
            name: "Kai Chen".into(),
            email: "d@jwt.com".into(),
            roles: vec![RoleAssignment::new(Role::Diner)],
        };
        let resp = ResponseSynthesizer::new()
            .synthesize(auth_payload(&identity, "abcdef"))
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["token"], "abcdef");
        assert_eq!(resp.body["user"]["name"], "Kai Chen");
        assert_eq!(resp.body["user"]["roles"][0]["role"], "diner");
    }
}
