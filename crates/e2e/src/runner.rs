//! Suite runner: loads scenarios and runs each against its own gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

use slicemock_common::Seed;
use slicemock_gateway::{Gateway, GatewayConfig};

use crate::config::{DriverKind, HarnessConfig};
use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightHandle;
use crate::script::{ScenarioResult, ScriptRunner};
use crate::server::{GatewayHandle, ServerConfig};
use crate::simulated::SimulatedStorefront;
use crate::spec::ScenarioSpec;

/// Scenarios carrying this tag are reported as skipped
pub const SKIP_TAG: &str = "skip";

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub driver: DriverKind,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn result(&self, name: &str) -> Option<&ScenarioResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// Main scenario runner
pub struct TestRunner {
    config: Arc<HarnessConfig>,
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRunner {
    /// Create a runner with default configuration
    pub fn new() -> Self {
        Self::with_config(HarnessConfig::default())
    }

    pub fn with_config(config: HarnessConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn load_scenarios(&self) -> E2eResult<Vec<ScenarioSpec>> {
        ScenarioSpec::load_all(&self.config.scenario_dir)
    }

    /// Run every scenario in the scenario directory
    pub async fn run_all(&self) -> E2eResult<SuiteResult> {
        let specs = self.load_scenarios()?;
        self.run_specs(specs).await
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<SuiteResult> {
        let specs = self.load_scenarios()?;
        let filtered = ScenarioSpec::filter_by_tag(&specs, tag).into_iter().cloned().collect();
        self.run_specs(filtered).await
    }

    /// Run a single scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<SuiteResult> {
        let spec = self
            .load_scenarios()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;
        self.run_specs(vec![spec]).await
    }

    /// Run scenarios concurrently, at most `workers` at a time.
    ///
    /// Each scenario gets a fresh gateway and driver; results come back in
    /// the order the scenarios were given.
    pub async fn run_specs(&self, specs: Vec<ScenarioSpec>) -> E2eResult<SuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        if self.config.driver == DriverKind::Playwright && specs.iter().any(|s| !is_skipped(s)) {
            // Probe once instead of per scenario
            PlaywrightHandle::new(self.config.playwright.clone(), self.config.step_timeout())?;
        }

        info!(
            "Running {} scenario(s) with the {:?} driver, {} worker(s)...",
            specs.len(),
            self.config.driver,
            self.config.workers
        );

        let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
        let mut slots: Vec<Option<ScenarioResult>> = vec![None; specs.len()];
        let mut join_set = JoinSet::new();
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));

        for (index, spec) in specs.into_iter().enumerate() {
            if is_skipped(&spec) {
                slots[index] = Some(ScenarioResult::skipped(&spec.name, "tagged skip"));
                continue;
            }

            let config = self.config.clone();
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| E2eError::StepFailed {
                    step: spec.name.clone(),
                    reason: e.to_string(),
                })?;

            join_set.spawn(async move {
                let result = Self::run_spec(&config, &spec).await;
                drop(permit);
                (index, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    report(&result);
                    slots[index] = Some(result);
                }
                Err(e) => error!("scenario task failed: {}", e),
            }
        }

        let results: Vec<ScenarioResult> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| {
                    ScenarioResult::aborted(
                        &name,
                        &E2eError::StepFailed {
                            step: name.clone(),
                            reason: "scenario task panicked".to_string(),
                        },
                    )
                })
            })
            .collect();

        let skipped = results.iter().filter(|r| r.skipped).count();
        let passed = results.iter().filter(|r| r.success && !r.skipped).count();
        let failed = results.iter().filter(|r| !r.success).count();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Scenario results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(SuiteResult {
            run_id: Uuid::new_v4(),
            started_at,
            driver: self.config.driver,
            total: results.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Run one scenario in isolation: its own state, routes and driver
    pub async fn run_spec(config: &HarnessConfig, spec: &ScenarioSpec) -> ScenarioResult {
        debug!("Running scenario: {}", spec.name);

        let gateway = match scenario_gateway(config, spec) {
            Ok(gateway) => gateway,
            Err(e) => return ScenarioResult::aborted(&spec.name, &e),
        };

        match config.driver {
            DriverKind::Simulated => {
                let app = match SimulatedStorefront::new(gateway.clone()) {
                    Ok(app) => app,
                    Err(e) => return ScenarioResult::aborted(&spec.name, &e),
                };
                let mut runner =
                    ScriptRunner::new(app, gateway).with_timing(config.step_timeout(), config.poll_interval());
                runner.run(spec).await
            }
            DriverKind::Playwright => {
                let served = match GatewayHandle::spawn(gateway, ServerConfig::default()).await {
                    Ok(served) => served,
                    Err(e) => return ScenarioResult::aborted(&spec.name, &e),
                };
                let browser = PlaywrightHandle::unchecked(config.playwright.clone(), config.step_timeout());
                let result = browser.run_scenario(spec, &served).await;
                if let Err(e) = served.stop().await {
                    error!("[{}] gateway shutdown: {}", spec.name, e);
                }
                result
            }
        }
    }

    /// Write suite results to `scenario-results.json` in the output dir
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.results_path();
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

fn is_skipped(spec: &ScenarioSpec) -> bool {
    spec.tags.iter().any(|t| t == SKIP_TAG)
}

fn report(result: &ScenarioResult) {
    if result.success {
        info!("✓ {} ({} ms)", result.name, result.duration_ms);
    } else {
        error!(
            "✗ {} - {}",
            result.name,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

/// Fresh gateway for one scenario: seed, default rules, then its stubs
fn scenario_gateway(config: &HarnessConfig, spec: &ScenarioSpec) -> E2eResult<Gateway> {
    let mut gateway_config = GatewayConfig::from_env();
    if config.driver == DriverKind::Playwright {
        gateway_config.base_url = config.playwright.base_url.clone();
    }
    let seed = spec.seed.clone().unwrap_or_else(Seed::storefront);
    let gateway = Gateway::storefront(gateway_config, seed)?;
    for stub in &spec.routes {
        let id = gateway.register_stub(stub)?;
        debug!("[{}] stub {} registered as {:?}", spec.name, stub.display_name(), id);
    }
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSING: &str = r#"
name: home-title
tags: [smoke]
steps:
  - action: expect
    that:
      title_is: JWT Pizza
"#;

    const FAILING: &str = r#"
name: about-wrong
tags: [smoke]
steps:
  - action: navigate
    url: /about
  - action: expect
    timeout_ms: 20
    that:
      text_contains: { text: Not on this page }
"#;

    const SKIPPED: &str = r#"
name: later
tags: [skip]
steps:
  - action: log
    message: not yet
"#;

    fn runner_in(dir: &std::path::Path) -> TestRunner {
        TestRunner::with_config(HarnessConfig {
            scenario_dir: dir.join("scenarios"),
            output_dir: dir.join("out"),
            step_timeout_ms: 200,
            poll_interval_ms: 5,
            workers: 2,
            ..Default::default()
        })
    }

    fn write_scenarios(dir: &std::path::Path) {
        let scenarios = dir.join("scenarios");
        std::fs::create_dir_all(&scenarios).unwrap();
        std::fs::write(scenarios.join("home.yaml"), PASSING).unwrap();
        std::fs::write(scenarios.join("about.yaml"), FAILING).unwrap();
        std::fs::write(scenarios.join("later.yml"), SKIPPED).unwrap();
    }

    #[tokio::test]
    async fn test_run_all_counts() {
        let dir = tempfile::tempdir().unwrap();
        write_scenarios(dir.path());
        let runner = runner_in(dir.path());

        let suite = runner.run_all().await.unwrap();
        assert_eq!(suite.total, 3);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.skipped, 1);
        assert!(!suite.success());

        // sorted by name
        let names: Vec<&str> = suite.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["about-wrong", "home-title", "later"]);

        let failed = suite.result("about-wrong").unwrap();
        assert_eq!(failed.failed_step().unwrap().step_name, "expect:main contains \"Not on this page\"");
    }

    #[tokio::test]
    async fn test_run_tagged_and_named() {
        let dir = tempfile::tempdir().unwrap();
        write_scenarios(dir.path());
        let runner = runner_in(dir.path());

        let smoke = runner.run_tagged("smoke").await.unwrap();
        assert_eq!(smoke.total, 2);

        let one = runner.run_named("home-title").await.unwrap();
        assert_eq!(one.total, 1);
        assert!(one.success());

        assert!(matches!(runner.run_named("missing").await, Err(E2eError::SpecParse(_))));
    }

    #[tokio::test]
    async fn test_scenarios_do_not_share_state() {
        let delete = r#"
name: delete-buddy
steps:
  - action: navigate
    url: /login
  - action: fill
    target: { placeholder: Email address }
    value: admin@test.com
  - action: fill
    target: { placeholder: Password }
    value: a
  - action: click
    target: { role: button, name: Login }
  - action: navigate
    url: /admin-dashboard
  - action: click
    target: { role: button, name: Next page }
  - action: click
    target: { role: button, name: Delete Buddy }
  - action: expect
    that:
      text_absent: { text: Buddy }
"#;
        let check = r#"
name: buddy-still-there
steps:
  - action: navigate
    url: /login
  - action: fill
    target: { placeholder: Email address }
    value: buddy@jwt.com
  - action: fill
    target: { placeholder: Password }
    value: a
  - action: click
    target: { role: button, name: Login }
  - action: expect
    that:
      visible: { role: link, name: B, exact: true }
"#;
        let runner = TestRunner::with_config(HarnessConfig {
            step_timeout_ms: 500,
            poll_interval_ms: 5,
            workers: 2,
            ..Default::default()
        });
        let specs = vec![
            ScenarioSpec::from_yaml(delete).unwrap(),
            ScenarioSpec::from_yaml(check).unwrap(),
        ];
        let suite = runner.run_specs(specs).await.unwrap();
        for result in &suite.results {
            assert!(result.success, "{}: {:?}", result.name, result.error);
        }
    }

    #[tokio::test]
    async fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        write_scenarios(dir.path());
        let runner = runner_in(dir.path());
        let suite = runner.run_tagged("smoke").await.unwrap();

        let path = runner.write_results(&suite).unwrap();
        assert!(path.ends_with("scenario-results.json"));
        let back: SuiteResult = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back.run_id, suite.run_id);
        assert_eq!(back.results.len(), 2);
    }
}
