//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::playwright::Browser;

/// Harness configuration, read from a TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory holding the YAML scenarios
    pub scenario_dir: PathBuf,

    /// Where `scenario-results.json` is written
    pub output_dir: PathBuf,

    /// Auto-wait bound for each step unless the scenario overrides it
    pub step_timeout_ms: u64,

    /// How often a waiting step re-reads the page
    pub poll_interval_ms: u64,

    /// Scenarios allowed to run at once
    pub workers: usize,

    pub driver: DriverKind,

    pub playwright: PlaywrightSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            scenario_dir: PathBuf::from("tests/scenarios"),
            output_dir: PathBuf::from("target/scenario-results"),
            step_timeout_ms: 5000,
            poll_interval_ms: 50,
            workers: 4,
            driver: DriverKind::default(),
            playwright: PlaywrightSettings::default(),
        }
    }
}

/// Which Application-Under-Test driver runs the scenarios
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// In-process storefront model
    #[default]
    Simulated,
    /// Real browser against a running storefront
    Playwright,
}

impl FromStr for DriverKind {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(DriverKind::Simulated),
            "playwright" | "browser" => Ok(DriverKind::Playwright),
            other => Err(E2eError::SpecParse(format!("unknown driver: {}", other))),
        }
    }
}

/// Playwright settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightSettings {
    pub browser: Browser,

    pub headless: bool,

    /// Origin of the storefront dev server the browser loads
    pub base_url: String,

    /// Node binary used to run compiled scripts
    pub node: PathBuf,
}

impl Default for PlaywrightSettings {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            base_url: "http://localhost:5173".to_string(),
            node: PathBuf::from("node"),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join("scenario-results.json")
    }
}
