//! Playwright browser automation
//!
//! A scenario compiles into one Node script. The script routes every
//! `/api/` request the storefront makes to the scenario's gateway served
//! over HTTP, runs the steps with role and label locators, and prints one
//! JSON line per step on stdout.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use slicemock_gateway::server::{FULFILLMENT_HEADER, PASS_THROUGH, REQUESTS_PATH};
use slicemock_gateway::MethodFilter;

use crate::config::PlaywrightSettings;
use crate::driver::Region;
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::script::{FailureKind, ScenarioResult, StepResult};
use crate::server::GatewayHandle;
use crate::spec::{Expectation, ScenarioSpec, ScenarioStep};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// One step report printed by the compiled script
#[derive(Debug, Deserialize)]
struct StepReport {
    step: usize,
    ok: bool,
    ms: u64,
    #[serde(default)]
    error: Option<String>,
}

/// JS string literal
fn js(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn js_regex(pattern: &str) -> String {
    format!("new RegExp({})", js(pattern))
}

/// Playwright browser handle
pub struct PlaywrightHandle {
    settings: PlaywrightSettings,
    step_timeout: Duration,
}

impl PlaywrightHandle {
    pub fn new(settings: PlaywrightSettings, step_timeout: Duration) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        Ok(Self::unchecked(settings, step_timeout))
    }

    /// Handle that skips the installation probe, for compiling only
    pub fn unchecked(settings: PlaywrightSettings, step_timeout: Duration) -> Self {
        Self { settings, step_timeout }
    }

    fn check_playwright_installed() -> E2eResult<()> {
        let status = std::process::Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Steps as they run, the start page first when the scenario has one
    fn steps(spec: &ScenarioSpec) -> Vec<ScenarioStep> {
        spec.start_url
            .iter()
            .map(|url| ScenarioStep::Navigate { url: url.clone() })
            .chain(spec.steps.iter().cloned())
            .collect()
    }

    /// Build the Node script for a scenario whose gateway listens on `gateway_url`
    pub fn build_script(&self, spec: &ScenarioSpec, gateway_url: &str) -> String {
        let timeout = spec
            .timeout_ms
            .unwrap_or(self.step_timeout.as_millis() as u64);
        let mut script = String::new();

        script.push_str(&format!(
            r#"
const {{ chromium, firefox, webkit, expect }} = require('@playwright/test');

const baseUrl = {base_url};
const gatewayUrl = {gateway_url};

async function intercepted() {{
  const res = await fetch(gatewayUrl + {requests_path});
  return res.json();
}}

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext();
  const page = await context.newPage();
  await page.route(/\/api\//, async (route) => {{
    const req = route.request();
    const url = new URL(req.url());
    const method = req.method();
    const res = await fetch(gatewayUrl + url.pathname + url.search, {{
      method,
      headers: {{ 'content-type': 'application/json' }},
      body: ['GET', 'HEAD'].includes(method) ? undefined : (req.postData() ?? undefined),
    }});
    if (res.headers.get({header}) === {pass_through}) {{
      return route.continue();
    }}
    await route.fulfill({{ status: res.status, contentType: 'application/json', body: await res.text() }});
  }});

  let step = 0;
  let started = Date.now();
  const done = () => {{
    console.log(JSON.stringify({{ step, ok: true, ms: Date.now() - started }}));
    step += 1;
    started = Date.now();
  }};

  try {{
"#,
            base_url = js(&self.settings.base_url),
            gateway_url = js(gateway_url.trim_end_matches('/')),
            requests_path = js(REQUESTS_PATH),
            browser = self.settings.browser.as_str(),
            headless = self.settings.headless,
            header = js(FULFILLMENT_HEADER),
            pass_through = js(PASS_THROUGH),
        ));

        for (i, step) in Self::steps(spec).iter().enumerate() {
            script.push_str(&format!("\n    // Step {}: {}\n", i, step.name()));
            script.push_str(&self.step_to_js(step, timeout));
            script.push_str("\n    done();\n");
        }

        script.push_str(
            r#"
  } catch (error) {
    console.log(JSON.stringify({ step, ok: false, ms: Date.now() - started, error: error.message }));
    process.exitCode = 1;
  } finally {
    await browser.close();
  }
})();
"#,
        );

        script
    }

    fn locator_to_js(locator: &Locator) -> String {
        let exact = if locator.exact { ", exact: true" } else { "" };
        let mut parts: Vec<String> = Vec::new();

        if let Some(role) = locator.role {
            match &locator.name {
                Some(name) => parts.push(format!(
                    "page.getByRole({}, {{ name: {}{} }})",
                    js(role.as_str()),
                    js(name),
                    exact
                )),
                None => parts.push(format!("page.getByRole({})", js(role.as_str()))),
            }
        }
        if let Some(p) = &locator.placeholder {
            parts.push(format!("page.getByPlaceholder({}, {{ exact: {} }})", js(p), locator.exact));
        }
        if let Some(l) = &locator.label {
            parts.push(format!("page.getByLabel({}, {{ exact: {} }})", js(l), locator.exact));
        }
        if let Some(t) = &locator.text {
            parts.push(format!("page.getByText({}, {{ exact: {} }})", js(t), locator.exact));
        }

        let mut out = parts
            .into_iter()
            .reduce(|acc, next| format!("{}.and({})", acc, next))
            .unwrap_or_else(|| "page.locator(':root')".to_string());
        if let Some(re) = &locator.has_text {
            out.push_str(&format!(".filter({{ hasText: {} }})", js_regex(re)));
        }
        if let Some(n) = locator.nth {
            out.push_str(&format!(".nth({})", n));
        }
        out
    }

    fn region_to_js(region: Region) -> &'static str {
        match region {
            Region::Main => "page.getByRole('main')",
            Region::Header => "page.getByRole('banner')",
            Region::Dialog => "page.getByRole('dialog')",
            Region::Page => "page.locator('body')",
        }
    }

    /// Convert a step to JavaScript code
    fn step_to_js(&self, step: &ScenarioStep, timeout: u64) -> String {
        match step {
            ScenarioStep::Navigate { url } => {
                format!("    await page.goto(new URL({}, baseUrl).toString());", js(url))
            }
            ScenarioStep::Click { target } => {
                format!("    await {}.click({{ timeout: {} }});", Self::locator_to_js(target), timeout)
            }
            ScenarioStep::Fill { target, value } => format!(
                "    await {}.fill({}, {{ timeout: {} }});",
                Self::locator_to_js(target),
                js(value),
                timeout
            ),
            ScenarioStep::Select { target, value } => format!(
                "    await {}.selectOption({}, {{ timeout: {} }});",
                Self::locator_to_js(target),
                js(value),
                timeout
            ),
            ScenarioStep::WaitFor {
                target,
                state,
                timeout_ms,
            } => format!(
                "    await {}.waitFor({{ state: {}, timeout: {} }});",
                Self::locator_to_js(target),
                js(state.as_str()),
                timeout_ms.unwrap_or(timeout)
            ),
            ScenarioStep::Sleep { ms } => format!("    await page.waitForTimeout({});", ms),
            ScenarioStep::Expect { that, timeout_ms } => {
                Self::expectation_to_js(that, timeout_ms.unwrap_or(timeout))
            }
            ScenarioStep::Log { message } => format!("    console.error('[scenario] ' + {});", js(message)),
        }
    }

    fn expectation_to_js(that: &Expectation, timeout: u64) -> String {
        match that {
            Expectation::TextContains { region, text } => format!(
                "    await expect({}).toContainText({}, {{ timeout: {} }});",
                Self::region_to_js(*region),
                js(text),
                timeout
            ),
            Expectation::TextAbsent { region, text } => format!(
                "    await expect({}).not.toContainText({}, {{ timeout: {} }});",
                Self::region_to_js(*region),
                js(text),
                timeout
            ),
            Expectation::UrlMatches(re) => format!(
                "    await expect(page).toHaveURL({}, {{ timeout: {} }});",
                js_regex(re),
                timeout
            ),
            Expectation::TitleIs(title) => format!(
                "    await expect(page).toHaveTitle({}, {{ timeout: {} }});",
                js(title),
                timeout
            ),
            Expectation::Visible(target) => format!(
                "    await expect({}).toBeVisible({{ timeout: {} }});",
                Self::locator_to_js(target),
                timeout
            ),
            Expectation::Hidden(target) => format!(
                "    await expect({}).toBeHidden({{ timeout: {} }});",
                Self::locator_to_js(target),
                timeout
            ),
            Expectation::Count { target, count } => format!(
                "    await expect({}).toHaveCount({}, {{ timeout: {} }});",
                Self::locator_to_js(target),
                count,
                timeout
            ),
            Expectation::Requested { method, url, times } => {
                let method = match method {
                    MethodFilter::Any => "null".to_string(),
                    MethodFilter::Only(m) => js(m.as_str()),
                };
                format!(
                    "    await expect.poll(async () => (await intercepted()).filter((r) => ({method} === null || r.method === {method}) && {re}.test(r.url)).length, {{ timeout: {timeout} }}).toBe({times});",
                    method = method,
                    re = js_regex(url),
                    timeout = timeout,
                    times = times
                )
            }
        }
    }

    /// Run a compiled script, returning its stdout
    pub async fn run_script(&self, script: &str, bound: Duration) -> E2eResult<(bool, String)> {
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("scenario.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let mut cmd = Command::new(&self.settings.node);
        cmd.arg(&script_path).kill_on_drop(true);
        // Resolve @playwright/test from the invoking project, not the temp dir
        if let Ok(cwd) = std::env::current_dir() {
            cmd.env("NODE_PATH", cwd.join("node_modules"));
        }

        let output = tokio::time::timeout(bound, cmd.output())
            .await
            .map_err(|_| E2eError::Timeout {
                what: format!("playwright script {}", script_path.display()),
                timeout_ms: bound.as_millis() as u64,
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("playwright stderr:\n{}", stderr);
        }
        Ok((output.status.success(), stdout))
    }

    /// Run a scenario in a real browser against its served gateway
    pub async fn run_scenario(&self, spec: &ScenarioSpec, gateway: &GatewayHandle) -> ScenarioResult {
        let start = Instant::now();
        let steps = Self::steps(spec);
        let script = self.build_script(spec, gateway.base_url());

        let per_step = spec.timeout_ms.map(Duration::from_millis).unwrap_or(self.step_timeout);
        let bound = per_step * (steps.len() as u32 + 1) + Duration::from_secs(30);

        let mut result = ScenarioResult {
            name: spec.name.clone(),
            success: false,
            skipped: false,
            duration_ms: 0,
            steps: Vec::new(),
            error: None,
            failure: None,
            unhandled: Vec::new(),
        };

        match self.run_script(&script, bound).await {
            Ok((exited_ok, stdout)) => {
                let reports: Vec<StepReport> = stdout
                    .lines()
                    .filter_map(|line| serde_json::from_str(line).ok())
                    .collect();
                for report in &reports {
                    result.steps.push(StepResult {
                        success: report.ok,
                        step_name: steps
                            .get(report.step)
                            .map(ScenarioStep::name)
                            .unwrap_or_else(|| format!("step {}", report.step)),
                        duration_ms: report.ms,
                        error: report.error.clone(),
                    });
                }
                let failed = reports.iter().find(|r| !r.ok);
                result.success = exited_ok && failed.is_none() && reports.len() == steps.len();
                if let Some(report) = failed {
                    result.error = report.error.clone();
                    result.failure = Some(FailureKind::Assertion);
                } else if !result.success {
                    let err = E2eError::Playwright(format!(
                        "script ended after {} of {} steps",
                        reports.len(),
                        steps.len()
                    ));
                    result.error = Some(err.to_string());
                    result.failure = Some(FailureKind::Harness);
                }
            }
            Err(e) => {
                warn!("[{}] playwright run failed: {}", spec.name, e);
                result.error = Some(e.to_string());
                result.failure = Some(FailureKind::of(&e));
            }
        }

        result.unhandled = gateway
            .gateway()
            .unhandled()
            .iter()
            .map(|r| format!("{} {}", r.method, r.url))
            .collect();
        if result.success && !result.unhandled.is_empty() {
            result.success = false;
            result.failure = Some(FailureKind::UnhandledRoute);
            result.error = Some(E2eError::UnhandledRoute(result.unhandled.join(", ")).to_string());
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "[{}] playwright {} in {} ms",
            spec.name,
            if result.success { "passed" } else { "failed" },
            result.duration_ms
        );
        result
    }
}
