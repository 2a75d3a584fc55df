//! Slicemock Gateway
//!
//! Intercepted storefront API calls are matched against an ordered route
//! table and answered from a per-scenario in-memory store. Scenarios can
//! override any default rule; the most recently registered match wins.

pub mod config;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod matcher;
pub mod server;
pub mod state;
pub mod storefront;
pub mod stub;
pub mod synth;
pub mod wire;

pub use config::{GatewayConfig, UnmatchedPolicy};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Fulfillment, Gateway, InterceptRecord};
pub use handler::{handler, Call, Handler};
pub use matcher::{MethodFilter, RouteId, RouteParams, RoutePattern, RouteTable};
pub use state::{AuthState, ScenarioState, StateSnapshot, UserUpdate};
pub use stub::RouteStub;
pub use synth::{auth_payload, Outcome, ResponseSynthesizer};
pub use wire::{InterceptedRequest, Method, MockResponse};
