//! Declarative YAML scenarios

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use slicemock_common::Seed;
use slicemock_gateway::{MethodFilter, RouteStub};

use crate::driver::Region;
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;

/// One scenario, parsed from a YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Initial state; the storefront fixtures when absent
    #[serde(default)]
    pub seed: Option<Seed>,

    /// Overrides registered after the default handlers
    #[serde(default)]
    pub routes: Vec<RouteStub>,

    /// Page loaded before the first step; `None` starts on a blank page
    #[serde(default = "default_start_url")]
    pub start_url: Option<String>,

    /// Bound for each step's auto-wait, overriding the harness default
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    pub steps: Vec<ScenarioStep>,
}

fn default_start_url() -> Option<String> {
    Some("/".to_string())
}

/// A single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Full page load of a URL relative to the storefront origin
    Navigate { url: String },

    Click { target: Locator },

    Fill { target: Locator, value: String },

    /// Pick a combobox option by value or label
    Select { target: Locator, value: String },

    /// Wait for a control to reach a state
    WaitFor {
        target: Locator,
        #[serde(default)]
        state: WaitState,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fixed pause (use sparingly)
    Sleep { ms: u64 },

    /// Poll until the expectation holds
    Expect {
        that: Expectation,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    Log { message: String },
}

impl ScenarioStep {
    /// Short name used in reports
    pub fn name(&self) -> String {
        match self {
            ScenarioStep::Navigate { url } => format!("navigate:{}", url),
            ScenarioStep::Click { target } => format!("click:{}", target),
            ScenarioStep::Fill { target, .. } => format!("fill:{}", target),
            ScenarioStep::Select { target, value } => format!("select:{}={}", target, value),
            ScenarioStep::WaitFor { target, state, .. } => format!("wait_for:{}:{}", target, state),
            ScenarioStep::Sleep { ms } => format!("sleep:{}ms", ms),
            ScenarioStep::Expect { that, .. } => format!("expect:{}", that),
            ScenarioStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }

    fn locator(&self) -> Option<&Locator> {
        match self {
            ScenarioStep::Click { target }
            | ScenarioStep::Fill { target, .. }
            | ScenarioStep::Select { target, .. }
            | ScenarioStep::WaitFor { target, .. } => Some(target),
            ScenarioStep::Expect { that, .. } => that.locator(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

impl std::fmt::Display for WaitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate over the observable page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    TextContains {
        #[serde(default)]
        region: Region,
        text: String,
    },
    TextAbsent {
        #[serde(default)]
        region: Region,
        text: String,
    },
    /// Regex search over the current URL
    UrlMatches(String),
    TitleIs(String),
    Visible(Locator),
    Hidden(Locator),
    Count { target: Locator, count: usize },
    /// The intercept log holds exactly `times` requests matching
    Requested {
        #[serde(default)]
        method: MethodFilter,
        url: String,
        #[serde(default = "default_times")]
        times: usize,
    },
}

fn default_times() -> usize {
    1
}

impl Expectation {
    fn locator(&self) -> Option<&Locator> {
        match self {
            Expectation::Visible(l) | Expectation::Hidden(l) => Some(l),
            Expectation::Count { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl std::fmt::Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expectation::TextContains { region, text } => write!(f, "{} contains {:?}", region, text),
            Expectation::TextAbsent { region, text } => write!(f, "{} lacks {:?}", region, text),
            Expectation::UrlMatches(re) => write!(f, "url matches /{}/", re),
            Expectation::TitleIs(t) => write!(f, "title is {:?}", t),
            Expectation::Visible(l) => write!(f, "{} is visible", l),
            Expectation::Hidden(l) => write!(f, "{} is hidden", l),
            Expectation::Count { target, count } => write!(f, "{} count is {}", target, count),
            Expectation::Requested { method, url, times } => {
                write!(f, "{} /{}/ requested {} time(s)", method, url, times)
            }
        }
    }
}

impl ScenarioSpec {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Reject scenarios that could never run: bad locators, bad regexes,
    /// route stubs without exactly one pattern
    pub fn validate(&self) -> E2eResult<()> {
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("{}: no steps", self.name)));
        }
        for stub in &self.routes {
            stub.pattern()?;
        }
        for step in &self.steps {
            if let Some(locator) = step.locator() {
                locator.validate()?;
            }
            if let ScenarioStep::Expect { that, .. } = step {
                match that {
                    Expectation::UrlMatches(re) | Expectation::Requested { url: re, .. } => {
                        regex::Regex::new(re).map_err(|e| {
                            E2eError::SpecParse(format!("{}: bad regex {:?}: {}", self.name, re, e))
                        })?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Load all scenarios under a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            debug!("Loaded scenario {} from {}", spec.name, entry.path().display());
            specs.push(spec);
        }

        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}
