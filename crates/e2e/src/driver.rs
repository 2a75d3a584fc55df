//! The Application-Under-Test seam
//!
//! A driver exposes the storefront the way an accessibility tree does:
//! controls carry a role and an accessible name, and page text is grouped
//! into a few landmark regions. Scenario steps never see markup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::E2eResult;

/// ARIA roles the storefront exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AriaRole {
    Link,
    Button,
    Textbox,
    Combobox,
    Dialog,
    Heading,
    Main,
    Row,
}

impl AriaRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AriaRole::Link => "link",
            AriaRole::Button => "button",
            AriaRole::Textbox => "textbox",
            AriaRole::Combobox => "combobox",
            AriaRole::Dialog => "dialog",
            AriaRole::Heading => "heading",
            AriaRole::Main => "main",
            AriaRole::Row => "row",
        }
    }

    /// Roles that accept `fill`
    pub fn is_editable(&self) -> bool {
        matches!(self, AriaRole::Textbox)
    }
}

impl std::fmt::Display for AriaRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text regions an expectation can inspect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Main,
    Header,
    Dialog,
    /// Every region concatenated
    Page,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Region::Main => "main",
            Region::Header => "header",
            Region::Dialog => "dialog",
            Region::Page => "page",
        };
        f.write_str(s)
    }
}

/// One option of a combobox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// An element reachable by role or label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Stable key within one view, used by the driver to act on it
    pub key: String,
    pub role: AriaRole,
    /// Accessible name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub visible: bool,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

impl Control {
    pub fn new(key: impl Into<String>, role: AriaRole, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            role,
            name: name.into(),
            placeholder: None,
            label: None,
            visible: true,
            enabled: true,
            value: None,
            options: Vec::new(),
        }
    }

    pub fn link(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(key, AriaRole::Link, name)
    }

    pub fn button(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(key, AriaRole::Button, name)
    }

    /// Text input; the placeholder doubles as the accessible name when no
    /// label is given
    pub fn textbox(key: impl Into<String>, placeholder: impl Into<String>, value: &str) -> Self {
        let placeholder = placeholder.into();
        let mut control = Self::new(key, AriaRole::Textbox, placeholder.clone());
        control.placeholder = Some(placeholder);
        control.value = Some(value.to_string());
        control
    }

    pub fn heading(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(key, AriaRole::Heading, text)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.name = label.clone();
        self.label = Some(label);
        self
    }

    pub fn with_options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Everything a scenario can observe at one moment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    pub url: String,
    pub title: String,
    pub regions: BTreeMap<Region, String>,
    pub controls: Vec<Control>,
}

impl PageView {
    /// Text of `region`; `Page` joins all regions
    pub fn text(&self, region: Region) -> String {
        match region {
            Region::Page => self
                .regions
                .values()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
            other => self.regions.get(&other).cloned().unwrap_or_default(),
        }
    }

    pub fn control(&self, key: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.key == key)
    }

    /// Short human description used in failure reports
    pub fn describe(&self) -> String {
        let visible: Vec<String> = self
            .controls
            .iter()
            .filter(|c| c.visible)
            .map(|c| format!("{} \"{}\"", c.role, c.name))
            .collect();
        format!("{} [{}]", self.url, visible.join(", "))
    }
}

/// Drives the Application Under Test.
///
/// Actions address controls already resolved from a [`PageView`]; locating
/// and waiting belong to the script runner.
#[async_trait]
pub trait AppDriver: Send {
    /// Full page load of `url`, relative to the storefront origin
    async fn navigate(&mut self, url: &str) -> E2eResult<()>;

    async fn click(&mut self, control: &Control) -> E2eResult<()>;

    async fn fill(&mut self, control: &Control, value: &str) -> E2eResult<()>;

    /// Choose an option by value or label
    async fn select(&mut self, control: &Control, value: &str) -> E2eResult<()>;

    async fn snapshot(&mut self) -> E2eResult<PageView>;
}
