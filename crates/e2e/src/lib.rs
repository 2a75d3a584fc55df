//! Slicemock scenario harness
//!
//! Runs declarative YAML scenarios against the pizza storefront with every
//! API call answered by a per-scenario mock gateway:
//! - Scenarios name controls by ARIA role and label, never by markup
//! - Each step auto-waits; expectations poll until they hold or time out
//! - The default driver is an in-process storefront model; the Playwright
//!   driver compiles scenarios into browser scripts instead
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TestRunner (suite, N workers)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  per scenario:                                              │
//! │    Gateway::storefront(seed) + route stubs                  │
//! │    ├── simulated: ScriptRunner<SimulatedStorefront>         │
//! │    │     step -> locate/wait -> act -> check unhandled      │
//! │    └── playwright: GatewayHandle (HTTP) + compiled script   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioSpec (YAML)                                        │
//! │    ├── name, tags, seed?, routes: [RouteStub]               │
//! │    └── steps: navigate | click | fill | select | wait_for   │
//! │               | sleep | expect | log                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assert;
pub mod config;
pub mod driver;
pub mod error;
pub mod locator;
pub mod playwright;
pub mod runner;
pub mod script;
pub mod server;
pub mod simulated;
pub mod spec;

pub use config::{DriverKind, HarnessConfig};
pub use driver::{AppDriver, AriaRole, Control, PageView, Region};
pub use error::{E2eError, E2eResult};
pub use locator::Locator;
pub use runner::{SuiteResult, TestRunner};
pub use script::{FailureKind, ScenarioResult, ScriptRunner, StepResult};
pub use simulated::SimulatedStorefront;
pub use spec::{Expectation, ScenarioSpec, ScenarioStep, WaitState};
