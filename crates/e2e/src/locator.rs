//! Role and label locators
//!
//! Name, placeholder, label, and text filters match as case-insensitive
//! substrings unless `exact` is set. `has_text` is a regex over the name.
//! Role locators see only visible controls, like an accessibility tree.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::driver::{AriaRole, Control, PageView};
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AriaRole>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exact: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<usize>,
}

impl Locator {
    pub fn role(role: AriaRole) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }

    pub fn role_named(role: AriaRole, name: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Self {
            placeholder: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    pub fn has_text(mut self, pattern: impl Into<String>) -> Self {
        self.has_text = Some(pattern.into());
        self
    }

    /// A locator with no criteria matches everything; reject it early
    pub fn validate(&self) -> E2eResult<()> {
        if self.role.is_none() && self.placeholder.is_none() && self.label.is_none() && self.text.is_none() {
            return Err(self.error("needs one of role, placeholder, label, text"));
        }
        if let Some(pattern) = &self.has_text {
            Regex::new(pattern).map_err(|e| self.error(&format!("bad has_text regex: {}", e)))?;
        }
        Ok(())
    }

    fn text_matches(&self, wanted: &str, actual: &str) -> bool {
        if self.exact {
            actual.trim() == wanted.trim()
        } else {
            actual.to_lowercase().contains(&wanted.to_lowercase())
        }
    }

    fn matches(&self, control: &Control, has_text: Option<&Regex>) -> bool {
        if let Some(role) = self.role {
            if control.role != role || !control.visible {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !self.text_matches(name, &control.name) {
                return false;
            }
        }
        if let Some(placeholder) = &self.placeholder {
            match &control.placeholder {
                Some(p) if self.text_matches(placeholder, p) => {}
                _ => return false,
            }
        }
        if let Some(label) = &self.label {
            match &control.label {
                Some(l) if self.text_matches(label, l) => {}
                _ => return false,
            }
        }
        if let Some(text) = &self.text {
            if !self.text_matches(text, &control.name) {
                return false;
            }
        }
        if let Some(re) = has_text {
            if !re.is_match(&control.name) {
                return false;
            }
        }
        true
    }

    /// Every control matching the criteria, before `nth` is applied
    pub fn matches_in<'v>(&self, view: &'v PageView) -> Vec<&'v Control> {
        let has_text = self.has_text.as_deref().and_then(|p| Regex::new(p).ok());
        view.controls
            .iter()
            .filter(|c| self.matches(c, has_text.as_ref()))
            .collect()
    }

    /// Visible matches, narrowed by `nth` when set
    pub fn visible_in<'v>(&self, view: &'v PageView) -> Vec<&'v Control> {
        let visible: Vec<&Control> = self.matches_in(view).into_iter().filter(|c| c.visible).collect();
        match self.nth {
            Some(n) => visible.get(n).copied().into_iter().collect(),
            None => visible,
        }
    }

    /// The single control an action targets.
    ///
    /// `Ok(None)` means nothing actionable yet; several matches without `nth`
    /// is a strict-mode error.
    pub fn resolve<'v>(&self, view: &'v PageView) -> E2eResult<Option<&'v Control>> {
        let candidates = self.visible_in(view);
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(Some(candidates[0])),
            n => Err(self.error(&format!(
                "resolved to {} elements: {}",
                n,
                candidates
                    .iter()
                    .map(|c| format!("{} \"{}\"", c.role, c.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    pub fn error(&self, reason: &str) -> E2eError {
        E2eError::Locator {
            locator: self.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(role) = self.role {
            parts.push(format!("role={}", role));
        }
        if let Some(name) = &self.name {
            parts.push(format!("name={:?}", name));
        }
        if let Some(p) = &self.placeholder {
            parts.push(format!("placeholder={:?}", p));
        }
        if let Some(l) = &self.label {
            parts.push(format!("label={:?}", l));
        }
        if let Some(t) = &self.text {
            parts.push(format!("text={:?}", t));
        }
        if let Some(h) = &self.has_text {
            parts.push(format!("has_text=/{}/", h));
        }
        if self.exact {
            parts.push("exact".to_string());
        }
        let mut out = parts.join(" ");
        if let Some(n) = self.nth {
            out.push_str(&format!(" nth={}", n));
        }
        f.write_str(&out)
    }
}
