//! The mock gateway: route table, scenario state, and intercept log

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use slicemock_common::Seed;

use crate::config::{GatewayConfig, UnmatchedPolicy};
use crate::error::{GatewayError, GatewayResult};
use crate::handler::{Call, Handler};
use crate::matcher::{MethodFilter, RouteId, RoutePattern, RouteTable};
use crate::state::ScenarioState;
use crate::stub::RouteStub;
use crate::synth::{Outcome, ResponseSynthesizer};
use crate::wire::{InterceptedRequest, Method, MockResponse};

/// Result of dispatching one request
#[derive(Debug, Clone, PartialEq)]
pub enum Fulfillment {
    Respond(MockResponse),
    /// No rule matched and the policy lets the request through
    PassThrough,
}

/// One line of the intercept log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptRecord {
    pub method: Method,
    pub url: String,
    /// Name of the rule that answered, `None` when unhandled
    pub rule: Option<String>,
    pub status: Option<u16>,
}

impl InterceptRecord {
    pub fn is_unhandled(&self) -> bool {
        self.rule.is_none()
    }
}

/// Route Matcher + Scenario State Store + Response Synthesizer for one scenario.
///
/// Cloning yields another handle to the same gateway.
#[derive(Clone)]
pub struct Gateway {
    routes: Arc<RwLock<RouteTable>>,
    state: ScenarioState,
    log: Arc<Mutex<Vec<InterceptRecord>>>,
    config: Arc<GatewayConfig>,
    synth: ResponseSynthesizer,
}

impl Gateway {
    /// Empty route table over a fresh store
    pub fn new(config: GatewayConfig, seed: Seed) -> Self {
        Self {
            routes: Arc::new(RwLock::new(RouteTable::new())),
            state: ScenarioState::new(seed),
            log: Arc::new(Mutex::new(Vec::new())),
            config: Arc::new(config),
            synth: ResponseSynthesizer::new(),
        }
    }

    /// Gateway preloaded with the storefront endpoint handlers
    pub fn storefront(config: GatewayConfig, seed: Seed) -> GatewayResult<Self> {
        let gateway = Self::new(config, seed);
        crate::storefront::install(&gateway)?;
        Ok(gateway)
    }

    pub fn state(&self) -> &ScenarioState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register a rule; later rules override earlier ones
    pub fn register<F>(
        &self,
        name: &str,
        method: impl Into<MethodFilter>,
        pattern: RoutePattern,
        f: F,
    ) -> GatewayResult<RouteId>
    where
        F: Fn(&Call<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.register_handler(name, method.into(), pattern, Arc::new(f))
    }

    pub fn register_handler(
        &self,
        name: &str,
        method: MethodFilter,
        pattern: RoutePattern,
        handler: Handler,
    ) -> GatewayResult<RouteId> {
        debug!("route {} {} {}", name, method, pattern);
        self.routes.write().register(name, method, pattern, handler)
    }

    /// Register a static response override
    pub fn register_stub(&self, stub: &RouteStub) -> GatewayResult<RouteId> {
        let pattern = stub.pattern()?;
        let response = stub.response();
        let name = stub.display_name();
        self.register(&name, stub.method, pattern, move |_| Outcome::Status {
            status: response.status,
            body: response.body.clone(),
        })
    }

    pub fn unroute(&self, id: RouteId) -> bool {
        self.routes.write().unroute(id)
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Answer one intercepted request.
    ///
    /// Matching rules are tried newest first; a handler returning
    /// [`Outcome::Fallthrough`] defers to the next one. Exactly one handler
    /// produces the response.
    pub fn dispatch(&self, request: &InterceptedRequest) -> GatewayResult<Fulfillment> {
        // Snapshot candidates so handlers run without holding the table lock
        let candidates = self.routes.read().candidates(request.method, &request.url);

        for candidate in &candidates {
            let call = Call {
                request,
                params: &candidate.params,
                state: &self.state,
                config: &self.config,
            };
            let outcome = (candidate.rule.handler)(&call);
            if let Some(response) = self.synth.synthesize(outcome) {
                debug!(
                    "{} {} -> {} [{}]",
                    request.method, request.url, response.status, candidate.rule.name
                );
                self.record(InterceptRecord {
                    method: request.method,
                    url: request.url.to_string(),
                    rule: Some(candidate.rule.name.clone()),
                    status: Some(response.status),
                });
                return Ok(Fulfillment::Respond(response));
            }
        }

        self.record(InterceptRecord {
            method: request.method,
            url: request.url.to_string(),
            rule: None,
            status: None,
        });

        match self.config.unmatched {
            UnmatchedPolicy::PassThrough => {
                warn!("{} {} unhandled, passing through", request.method, request.url);
                Ok(Fulfillment::PassThrough)
            }
            UnmatchedPolicy::Fail => {
                error!("{} {} unhandled", request.method, request.url);
                Err(GatewayError::UnhandledRoute {
                    method: request.method,
                    url: request.url.to_string(),
                })
            }
        }
    }

    /// Build a request against the configured origin and dispatch it
    pub fn call(&self, method: Method, url: &str, body: Option<serde_json::Value>) -> GatewayResult<Fulfillment> {
        let mut request = InterceptedRequest::new(method, url, &self.config.base_url()?)?;
        request.body = body;
        self.dispatch(&request)
    }

    fn record(&self, record: InterceptRecord) {
        self.log.lock().push(record);
    }

    pub fn intercepts(&self) -> Vec<InterceptRecord> {
        self.log.lock().clone()
    }

    pub fn unhandled(&self) -> Vec<InterceptRecord> {
        self.log
            .lock()
            .iter()
            .filter(|r| r.is_unhandled())
            .cloned()
            .collect()
    }

    /// How many logged requests satisfy `predicate`
    pub fn count_intercepts<P>(&self, predicate: P) -> usize
    where
        P: Fn(&InterceptRecord) -> bool,
    {
        self.log.lock().iter().filter(|r| predicate(r)).count()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("routes", &self.route_count())
            .field("state", &self.state)
            .field("intercepts", &self.log.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>, body: serde_json::Value) -> impl Fn(&Call<'_>) -> Outcome + Send + Sync + 'static {
        let counter = counter.clone();
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Outcome::Json(body.clone())
        }
    }

    #[test]
    fn test_single_match_invokes_once() {
        let gateway = Gateway::new(GatewayConfig::default(), Seed::empty());
        let menu = Arc::new(AtomicUsize::new(0));
        let auth = Arc::new(AtomicUsize::new(0));
        gateway
            .register("menu", Method::Get, RoutePattern::glob("*/**/api/order/menu"), counting(&menu, json!([])))
            .unwrap();
        gateway
            .register("auth", MethodFilter::Any, RoutePattern::glob("*/**/api/auth"), counting(&auth, json!({})))
            .unwrap();

        gateway.call(Method::Get, "/api/order/menu", None).unwrap();
        assert_eq!(menu.load(Ordering::SeqCst), 1);
        assert_eq!(auth.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_override_wins_and_default_untouched() {
        let gateway = Gateway::new(GatewayConfig::default(), Seed::empty());
        let default = Arc::new(AtomicUsize::new(0));
        let scenario = Arc::new(AtomicUsize::new(0));
        gateway
            .register("default", MethodFilter::Any, RoutePattern::glob("*/**/api/auth"), counting(&default, json!({ "who": "default" })))
            .unwrap();
        gateway
            .register("override", MethodFilter::Any, RoutePattern::glob("*/**/api/auth"), counting(&scenario, json!({ "who": "override" })))
            .unwrap();

        let out = gateway.call(Method::Put, "/api/auth", None).unwrap();
        assert_eq!(out, Fulfillment::Respond(MockResponse::ok(json!({ "who": "override" }))));
        assert_eq!(default.load(Ordering::SeqCst), 0);
        assert_eq!(scenario.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fallthrough_reaches_earlier_rule() {
        let gateway = Gateway::new(GatewayConfig::default(), Seed::empty());
        gateway
            .register("base", MethodFilter::Any, RoutePattern::glob("**/api/franchise"), |_| Outcome::message("base"))
            .unwrap();
        gateway
            .register("get-only", MethodFilter::Any, RoutePattern::glob("**/api/franchise"), |call| {
                if call.request.method == Method::Get {
                    Outcome::message("override")
                } else {
                    Outcome::Fallthrough
                }
            })
            .unwrap();

        let get = gateway.call(Method::Get, "/api/franchise", None).unwrap();
        let post = gateway.call(Method::Post, "/api/franchise", None).unwrap();
        assert_eq!(get, Fulfillment::Respond(MockResponse::ok(json!({ "message": "override" }))));
        assert_eq!(post, Fulfillment::Respond(MockResponse::ok(json!({ "message": "base" }))));
    }

    #[test]
    fn test_unhandled_route_surfaces() {
        let gateway = Gateway::new(GatewayConfig::default(), Seed::empty());
        let err = gateway.call(Method::Get, "/api/nothing", None).unwrap_err();
        assert!(matches!(err, GatewayError::UnhandledRoute { method: Method::Get, .. }));
        assert_eq!(gateway.unhandled().len(), 1);
    }

    #[test]
    fn test_pass_through_policy() {
        let config = GatewayConfig {
            unmatched: UnmatchedPolicy::PassThrough,
            ..Default::default()
        };
        let gateway = Gateway::new(config, Seed::empty());
        assert_eq!(gateway.call(Method::Get, "/logo.png", None).unwrap(), Fulfillment::PassThrough);
    }

    #[test]
    fn test_unroute_restores_default() {
        let gateway = Gateway::new(GatewayConfig::default(), Seed::empty());
        gateway
            .register("default", MethodFilter::Any, RoutePattern::exact("/api/docs"), |_| Outcome::message("default"))
            .unwrap();
        let id = gateway
            .register("override", MethodFilter::Any, RoutePattern::exact("/api/docs"), |_| Outcome::message("override"))
            .unwrap();
        assert!(gateway.unroute(id));

        let out = gateway.call(Method::Get, "/api/docs", None).unwrap();
        assert_eq!(out, Fulfillment::Respond(MockResponse::ok(json!({ "message": "default" }))));
    }

    #[test]
    fn test_handlers_share_state() {
        let gateway = Gateway::new(GatewayConfig::default(), Seed::storefront());
        gateway
            .register("login", Method::Put, RoutePattern::exact("/api/auth"), |call| {
                call.state.login("d@jwt.com", "a");
                Outcome::message("ok")
            })
            .unwrap();
        gateway
            .register("me", Method::Get, RoutePattern::exact("/api/user/me"), |call| match call.state.identity() {
                Some(identity) => Outcome::json(&identity),
                None => Outcome::Unauthorized("Not authenticated".into()),
            })
            .unwrap();

        gateway.call(Method::Put, "/api/auth", None).unwrap();
        match gateway.call(Method::Get, "/api/user/me", None).unwrap() {
            Fulfillment::Respond(resp) => assert_eq!(resp.body["name"], "Kai Chen"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
