//! Handler callbacks bound to route rules

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::matcher::RouteParams;
use crate::state::ScenarioState;
use crate::synth::Outcome;
use crate::wire::InterceptedRequest;

/// Everything a handler may consult while deciding a response.
///
/// `state` is the scenario's shared store, never a copy.
pub struct Call<'a> {
    pub request: &'a InterceptedRequest,
    pub params: &'a RouteParams,
    pub state: &'a ScenarioState,
    pub config: &'a GatewayConfig,
}

impl<'a> Call<'a> {
    /// Route param, or the empty string when the rule captured none
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).unwrap_or_default()
    }
}

pub type Handler = Arc<dyn Fn(&Call<'_>) -> Outcome + Send + Sync>;

/// Box a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Call<'_>) -> Outcome + Send + Sync + 'static,
{
    Arc::new(f)
}
