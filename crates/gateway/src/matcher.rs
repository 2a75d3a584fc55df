//! Route matching
//!
//! Rules are kept in registration order. Lookup walks them newest first, so
//! a rule registered later overrides an earlier one matching the same
//! request. This is how a scenario replaces a default handler.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::error::{GatewayError, GatewayResult};
use crate::handler::Handler;
use crate::wire::Method;

/// URL-matching rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum RoutePattern {
    /// Exact URL path, query ignored
    Exact(String),
    /// Browser-automation glob over the full URL
    Glob(String),
    /// Unanchored regular expression over the full URL
    Regex(String),
}

impl RoutePattern {
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::Glob(pattern.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::Regex(pattern.into())
    }

    pub fn source(&self) -> &str {
        match self {
            RoutePattern::Exact(s) | RoutePattern::Glob(s) | RoutePattern::Regex(s) => s,
        }
    }
}

impl std::fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutePattern::Exact(s) => write!(f, "exact:{}", s),
            RoutePattern::Glob(s) => write!(f, "glob:{}", s),
            RoutePattern::Regex(s) => write!(f, "regex:{}", s),
        }
    }
}

/// Translate a glob into an anchored regex.
///
/// `**` matches any run of characters, `*` any run without `/`, and
/// `{a,b}` alternates. Everything else, `?` included, is literal.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    let mut in_group = false;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*");
                i += 1;
            }
            '*' => out.push_str("[^/]*"),
            '{' => {
                in_group = true;
                out.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Named captures extracted by a regex rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    values: HashMap<String, String>,
}

impl RouteParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: RoutePattern,
    regex: Option<Regex>,
}

impl CompiledPattern {
    fn compile(pattern: RoutePattern) -> GatewayResult<Self> {
        let regex = match &pattern {
            RoutePattern::Exact(_) => None,
            RoutePattern::Glob(glob) => Some(build_regex(&glob_to_regex(glob), glob)?),
            RoutePattern::Regex(re) => Some(build_regex(re, re)?),
        };
        Ok(Self { source: pattern, regex })
    }

    fn matches(&self, url: &Url) -> Option<RouteParams> {
        match (&self.source, &self.regex) {
            (RoutePattern::Exact(path), _) => (url.path() == path).then(RouteParams::default),
            (_, Some(regex)) => {
                let caps = regex.captures(url.as_str())?;
                let mut params = RouteParams::default();
                for name in regex.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        params.insert(name, m.as_str());
                    }
                }
                Some(params)
            }
            (_, None) => None,
        }
    }
}

fn build_regex(re: &str, original: &str) -> GatewayResult<Regex> {
    Regex::new(re).map_err(|e| GatewayError::InvalidPattern {
        pattern: original.to_string(),
        reason: e.to_string(),
    })
}

/// HTTP method constraint of a rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MethodFilter {
    #[default]
    Any,
    Only(Method),
}

impl TryFrom<String> for MethodFilter {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("any") || value == "*" {
            Ok(MethodFilter::Any)
        } else {
            value.parse().map(MethodFilter::Only)
        }
    }
}

impl From<MethodFilter> for String {
    fn from(filter: MethodFilter) -> Self {
        filter.to_string()
    }
}

impl MethodFilter {
    pub fn allows(&self, method: Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Only(m) => *m == method,
        }
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        MethodFilter::Only(method)
    }
}

impl std::fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodFilter::Any => f.write_str("ANY"),
            MethodFilter::Only(m) => write!(f, "{}", m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteId(pub u64);

/// A registered rule
#[derive(Clone)]
pub struct Rule {
    pub id: RouteId,
    pub name: String,
    pub method: MethodFilter,
    pattern: CompiledPattern,
    pub handler: Handler,
}

impl Rule {
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern.source
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("method", &self.method)
            .field("pattern", &self.pattern.source)
            .finish()
    }
}

/// A rule matching a request, with its extracted params
#[derive(Debug, Clone)]
pub struct Candidate {
    pub rule: Rule,
    pub params: RouteParams,
}

/// Ordered rule set
#[derive(Debug, Default)]
pub struct RouteTable {
    rules: Vec<Rule>,
    next_id: u64,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        method: MethodFilter,
        pattern: RoutePattern,
        handler: Handler,
    ) -> GatewayResult<RouteId> {
        let pattern = CompiledPattern::compile(pattern)?;
        self.next_id += 1;
        let id = RouteId(self.next_id);
        self.rules.push(Rule {
            id,
            name: name.into(),
            method,
            pattern,
            handler,
        });
        Ok(id)
    }

    pub fn unroute(&mut self, id: RouteId) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Matching rules, most recently registered first
    pub fn candidates(&self, method: Method, url: &Url) -> Vec<Candidate> {
        self.rules
            .iter()
            .rev()
            .filter(|r| r.method.allows(method))
            .filter_map(|r| {
                r.pattern.matches(url).map(|params| Candidate {
                    rule: r.clone(),
                    params,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::synth::Outcome;
    use serde_json::json;
    use test_case::test_case;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn noop() -> Handler {
        handler(|_| Outcome::Json(json!({})))
    }

    #[test_case("*/**/api/auth", "http://localhost:5173/api/auth", true ; "glob auth")]
    #[test_case("*/**/api/auth", "http://localhost:5173/api/auth/extra", false ; "glob anchored")]
    #[test_case("*/**/api/user/me", "http://localhost:5173/api/user/me", true ; "glob me")]
    #[test_case("**/api/order", "http://localhost:5173/api/order?page=1", false ; "glob query literal")]
    #[test_case("**/api/{order,franchise}", "http://localhost:5173/api/franchise", true ; "glob alternation")]
    #[test_case("http://*/api/docs", "http://localhost:5173/api/docs", true ; "single star host")]
    fn test_glob_matching(glob: &str, target: &str, expected: bool) {
        let re = Regex::new(&glob_to_regex(glob)).unwrap();
        assert_eq!(re.is_match(target), expected, "{} vs {}", glob, target);
    }

    #[test]
    fn test_exact_ignores_query() {
        let mut table = RouteTable::new();
        table
            .register("orders", MethodFilter::Any, RoutePattern::exact("/api/order"), noop())
            .unwrap();
        assert_eq!(table.candidates(Method::Get, &url("http://x/api/order?page=2")).len(), 1);
        assert!(table.candidates(Method::Get, &url("http://x/api/order/menu")).is_empty());
    }

    #[test]
    fn test_regex_params() {
        let mut table = RouteTable::new();
        table
            .register(
                "user",
                MethodFilter::Only(Method::Put),
                RoutePattern::regex(r"/api/user/(?P<id>[^/?]+)$"),
                noop(),
            )
            .unwrap();
        let found = table.candidates(Method::Put, &url("http://x/api/user/42"));
        assert_eq!(found[0].params.get("id"), Some("42"));
        assert!(table.candidates(Method::Get, &url("http://x/api/user/42")).is_empty());
    }

    #[test]
    fn test_last_registered_first() {
        let mut table = RouteTable::new();
        let first = table
            .register("default", MethodFilter::Any, RoutePattern::glob("**/api/auth"), noop())
            .unwrap();
        let second = table
            .register("override", MethodFilter::Any, RoutePattern::glob("**/api/auth"), noop())
            .unwrap();
        let found = table.candidates(Method::Put, &url("http://x/api/auth"));
        let ids: Vec<RouteId> = found.iter().map(|c| c.rule.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_unroute() {
        let mut table = RouteTable::new();
        let id = table
            .register("menu", MethodFilter::Any, RoutePattern::glob("**/api/order/menu"), noop())
            .unwrap();
        assert!(table.unroute(id));
        assert!(!table.unroute(id));
        assert!(table.is_empty());
    }

    #[test]
    fn test_invalid_regex() {
        let mut table = RouteTable::new();
        let err = table
            .register("bad", MethodFilter::Any, RoutePattern::regex("(unclosed"), noop())
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidPattern { .. }));
    }

    #[test]
    fn test_pattern_serde() {
        let p: RoutePattern = serde_yaml::from_str("kind: glob\npattern: '*/**/api/auth'\n").unwrap();
        assert_eq!(p, RoutePattern::glob("*/**/api/auth"));

        let m: MethodFilter = serde_yaml::from_str("PUT").unwrap();
        assert_eq!(m, MethodFilter::Only(Method::Put));
        let any: MethodFilter = serde_yaml::from_str("ANY").unwrap();
        assert_eq!(any, MethodFilter::Any);
    }
}
