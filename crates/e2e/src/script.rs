//! Scenario script runner
//!
//! Steps run strictly in order. Actions wait for their locator to become
//! actionable and expectations poll the page until they hold, both bounded
//! by the step timeout. The first failing step ends the scenario.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use slicemock_gateway::Gateway;

use crate::assert::{check, state_holds, Mismatch};
use crate::driver::{AppDriver, AriaRole, Control, PageView};
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::spec::{Expectation, ScenarioSpec, ScenarioStep};

/// Result of executing one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// How a scenario ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An expectation or wait did not hold in time
    Assertion,
    /// The app issued a request no rule answered
    UnhandledRoute,
    /// Anything else: bad locator, disabled control, driver or gateway error
    Harness,
}

impl FailureKind {
    pub fn of(err: &E2eError) -> Self {
        match err {
            e if e.is_assertion() => FailureKind::Assertion,
            E2eError::UnhandledRoute(_) => FailureKind::UnhandledRoute,
            _ => FailureKind::Harness,
        }
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    #[serde(default)]
    pub skipped: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    /// Requests no rule answered, as `METHOD url`
    #[serde(default)]
    pub unhandled: Vec<String>,
}

impl ScenarioResult {
    /// A scenario that never got to run its steps
    pub fn aborted(name: &str, err: &E2eError) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            skipped: false,
            duration_ms: 0,
            steps: Vec::new(),
            error: Some(err.to_string()),
            failure: Some(FailureKind::of(err)),
            unhandled: Vec::new(),
        }
    }

    pub fn skipped(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            skipped: true,
            duration_ms: 0,
            steps: Vec::new(),
            error: Some(reason.to_string()),
            failure: None,
            unhandled: Vec::new(),
        }
    }

    /// The step that ended the scenario, if any
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success)
    }
}

/// Runs one scenario's steps against a driver and the scenario's gateway
pub struct ScriptRunner<D: AppDriver> {
    driver: D,
    gateway: Gateway,
    step_timeout: Duration,
    poll_interval: Duration,
    unhandled_seen: usize,
}

impl<D: AppDriver> ScriptRunner<D> {
    pub fn new(driver: D, gateway: Gateway) -> Self {
        Self {
            driver,
            gateway,
            step_timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(50),
            unhandled_seen: 0,
        }
    }

    pub fn with_timing(mut self, step_timeout: Duration, poll_interval: Duration) -> Self {
        self.step_timeout = step_timeout;
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Run every step of `spec`, stopping at the first failure
    pub async fn run(&mut self, spec: &ScenarioSpec) -> ScenarioResult {
        let start = Instant::now();
        let default_timeout = spec
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.step_timeout);

        let mut steps = Vec::new();
        let mut failure: Option<E2eError> = None;

        let opening = spec.start_url.as_ref().map(|url| ScenarioStep::Navigate { url: url.clone() });
        for step in opening.iter().chain(spec.steps.iter()) {
            let step_start = Instant::now();
            let step_name = step.name();
            debug!("[{}] {}", spec.name, step_name);

            let outcome = match self.execute(step, default_timeout).await {
                Ok(()) => self.check_unhandled(),
                Err(e) => Err(e),
            };
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => steps.push(StepResult {
                    success: true,
                    step_name,
                    duration_ms,
                    error: None,
                }),
                Err(e) => {
                    warn!("[{}] step {} failed: {}", spec.name, step_name, e);
                    steps.push(StepResult {
                        success: false,
                        step_name,
                        duration_ms,
                        error: Some(e.to_string()),
                    });
                    failure = Some(e);
                    break;
                }
            }
        }

        let unhandled = self
            .gateway
            .unhandled()
            .iter()
            .map(|r| format!("{} {}", r.method, r.url))
            .collect();

        ScenarioResult {
            name: spec.name.clone(),
            success: failure.is_none(),
            skipped: false,
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            error: failure.as_ref().map(E2eError::to_string),
            failure: failure.as_ref().map(FailureKind::of),
            unhandled,
        }
    }

    /// New unhandled requests since the last step fail the scenario
    fn check_unhandled(&mut self) -> E2eResult<()> {
        let unhandled = self.gateway.unhandled();
        let fresh = &unhandled[self.unhandled_seen.min(unhandled.len())..];
        self.unhandled_seen = unhandled.len();
        if fresh.is_empty() {
            return Ok(());
        }
        let listed: Vec<String> = fresh.iter().map(|r| format!("{} {}", r.method, r.url)).collect();
        Err(E2eError::UnhandledRoute(listed.join(", ")))
    }

    async fn execute(&mut self, step: &ScenarioStep, default_timeout: Duration) -> E2eResult<()> {
        match step {
            ScenarioStep::Navigate { url } => self.driver.navigate(url).await,
            ScenarioStep::Click { target } => {
                let control = self
                    .actionable(target, default_timeout, "visible and enabled", |c| c.enabled)
                    .await?;
                self.driver.click(&control).await
            }
            ScenarioStep::Fill { target, value } => {
                let control = self.actionable(target, default_timeout, "editable", |c| c.enabled).await?;
                if !control.role.is_editable() {
                    return Err(target.error(&format!("cannot fill a {}", control.role)));
                }
                self.driver.fill(&control, value).await
            }
            ScenarioStep::Select { target, value } => {
                let control = self.actionable(target, default_timeout, "selectable", |c| c.enabled).await?;
                if control.role != AriaRole::Combobox {
                    return Err(target.error(&format!("cannot select on a {}", control.role)));
                }
                self.driver.select(&control, value).await
            }
            ScenarioStep::WaitFor {
                target,
                state,
                timeout_ms,
            } => {
                let timeout = timeout_ms.map(Duration::from_millis).unwrap_or(default_timeout);
                let what = format!("{} to be {}", target, state);
                self.poll(&what, timeout, |view| Ok(state_holds(target, *state, view).then_some(())))
                    .await
            }
            ScenarioStep::Sleep { ms } => {
                sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            ScenarioStep::Expect { that, timeout_ms } => {
                let timeout = timeout_ms.map(Duration::from_millis).unwrap_or(default_timeout);
                self.expect(that, timeout).await
            }
            ScenarioStep::Log { message } => {
                info!("[scenario] {}", message);
                Ok(())
            }
        }
    }

    /// Wait until `target` resolves to exactly one visible control passing `ready`
    async fn actionable<F>(&mut self, target: &Locator, timeout: Duration, wanted: &str, ready: F) -> E2eResult<Control>
    where
        F: Fn(&Control) -> bool,
    {
        let what = format!("{} to be {}", target, wanted);
        self.poll(&what, timeout, |view| {
            Ok(target.resolve(view)?.filter(|c| ready(*c)).cloned())
        })
        .await
    }

    /// Re-read the page until `probe` yields a value or the bound expires
    async fn poll<T, F>(&mut self, what: &str, timeout: Duration, probe: F) -> E2eResult<T>
    where
        F: Fn(&PageView) -> E2eResult<Option<T>>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let view = self.driver.snapshot().await?;
            if let Some(found) = probe(&view)? {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                return Err(E2eError::Timeout {
                    what: format!("{} (last seen {})", what, view.describe()),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Poll an expectation; on timeout report the last observed mismatch
    async fn expect(&mut self, that: &Expectation, timeout: Duration) -> E2eResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let view = self.driver.snapshot().await?;
            let intercepts = self.gateway.intercepts();
            let last: Mismatch = match check(that, &view, &intercepts) {
                Ok(()) => return Ok(()),
                Err(m) => m,
            };
            if Instant::now() >= deadline {
                return Err(last.into());
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedStorefront;
    use slicemock_common::Seed;
    use slicemock_gateway::GatewayConfig;

    fn runner(spec: &ScenarioSpec) -> ScriptRunner<SimulatedStorefront> {
        let seed = spec.seed.clone().unwrap_or_else(Seed::storefront);
        let gateway = Gateway::storefront(GatewayConfig::default(), seed).unwrap();
        for stub in &spec.routes {
            gateway.register_stub(stub).unwrap();
        }
        let app = SimulatedStorefront::new(gateway.clone()).unwrap();
        ScriptRunner::new(app, gateway).with_timing(Duration::from_millis(200), Duration::from_millis(5))
    }

    async fn run(yaml: &str) -> ScenarioResult {
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        runner(&spec).run(&spec).await
    }

    #[tokio::test]
    async fn test_login_scenario_passes() {
        let result = run(r#"
name: login
steps:
  - action: click
    target: { role: link, name: Login }
  - action: fill
    target: { placeholder: Email address }
    value: d@jwt.com
  - action: fill
    target: { placeholder: Password }
    value: a
  - action: click
    target: { role: button, name: Login }
  - action: expect
    that:
      visible: { role: link, name: KC }
  - action: expect
    that:
      requested: { method: PUT, url: '/api/auth$' }
"#)
        .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.steps.len(), 7);
        assert!(result.steps[0].step_name.starts_with("navigate:/"));
    }

    #[tokio::test]
    async fn test_failed_expectation_reports_actual() {
        let result = run(r#"
name: wrong-title
steps:
  - action: expect
    that:
      title_is: Not Pizza
  - action: log
    message: never reached
"#)
        .await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Assertion));
        assert_eq!(result.steps.len(), 2);
        let error = result.error.unwrap();
        assert!(error.contains("expected: Not Pizza"));
        assert!(error.contains("actual:   JWT Pizza"));
    }

    #[tokio::test]
    async fn test_missing_control_times_out() {
        let result = run(r#"
name: no-such-button
timeout_ms: 50
steps:
  - action: click
    target: { role: button, name: Teleport }
"#)
        .await;
        assert_eq!(result.failure, Some(FailureKind::Assertion));
        assert!(result.error.unwrap().contains("Timeout after 50 ms"));
    }

    #[tokio::test]
    async fn test_stub_override_keeps_login_visible() {
        let result = run(r#"
name: invalid-login
routes:
  - method: PUT
    glob: '*/**/api/auth'
    status: 401
    body: { error: Unauthorized }
steps:
  - action: navigate
    url: /login
  - action: fill
    target: { placeholder: Email address }
    value: d@jwt.com
  - action: fill
    target: { placeholder: Password }
    value: a
  - action: click
    target: { role: button, name: Login }
  - action: expect
    that:
      visible: { role: button, name: Login }
  - action: expect
    that:
      text_contains: { text: Unauthorized }
"#)
        .await;
        assert!(result.success, "{:?}", result.error);
    }

    #[tokio::test]
    async fn test_unhandled_route_fails_step() {
        let spec = ScenarioSpec::from_yaml(
            r#"
name: unhandled
steps:
  - action: navigate
    url: /menu
"#,
        )
        .unwrap();
        // A bare gateway has no storefront rules at all
        let gateway = Gateway::new(GatewayConfig::default(), Seed::storefront());
        let app = SimulatedStorefront::new(gateway.clone()).unwrap();
        let mut runner = ScriptRunner::new(app, gateway).with_timing(Duration::from_millis(50), Duration::from_millis(5));
        let result = runner.run(&spec).await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::UnhandledRoute));
        assert!(result.unhandled.iter().any(|u| u.contains("/api/order/menu")));
        // Nothing was unhandled on the home page
        assert!(result.steps[0].success);
    }

    #[tokio::test]
    async fn test_strict_mode_fails_fast() {
        let result = run(r#"
name: ambiguous
steps:
  - action: click
    target: { role: link }
"#)
        .await;
        assert_eq!(result.failure, Some(FailureKind::Harness));
        assert!(result.error.unwrap().contains("resolved to"));
    }

    #[tokio::test]
    async fn test_wait_for_hidden_dialog() {
        let result = run(r#"
name: dialog
start_url: /login
steps:
  - action: fill
    target: { placeholder: Email address }
    value: d@jwt.com
  - action: fill
    target: { placeholder: Password }
    value: a
  - action: click
    target: { role: button, name: Login }
  - action: click
    target: { role: link, name: KC }
  - action: click
    target: { role: button, name: Edit }
  - action: wait_for
    target: { role: dialog }
  - action: click
    target: { role: button, name: Cancel }
  - action: wait_for
    target: { text: Edit user }
    state: hidden
  - action: wait_for
    target: { text: Edit user }
    state: attached
"#)
        .await;
        assert!(result.success, "{:?}", result.error);
    }
}
