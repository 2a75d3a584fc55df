//! Assertion layer: evaluates expectations against one observation

use regex::Regex;

use slicemock_gateway::InterceptRecord;

use crate::driver::PageView;
use crate::error::E2eError;
use crate::spec::{Expectation, WaitState};
use crate::locator::Locator;

/// Why an expectation did not hold, as of the last observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub predicate: String,
    pub expected: String,
    pub actual: String,
}

impl From<Mismatch> for E2eError {
    fn from(m: Mismatch) -> Self {
        E2eError::AssertionFailed {
            predicate: m.predicate,
            expected: m.expected,
            actual: m.actual,
        }
    }
}

fn mismatch(expectation: &Expectation, expected: impl Into<String>, actual: impl Into<String>) -> Mismatch {
    Mismatch {
        predicate: expectation.to_string(),
        expected: expected.into(),
        actual: actual.into(),
    }
}

fn compile(pattern: &str) -> Result<Regex, String> {
    Regex::new(pattern).map_err(|e| format!("bad regex {:?}: {}", pattern, e))
}

/// Check `expectation` against the page and the intercept log
pub fn check(expectation: &Expectation, view: &PageView, intercepts: &[InterceptRecord]) -> Result<(), Mismatch> {
    match expectation {
        Expectation::TextContains { region, text } => {
            let actual = view.text(*region);
            if actual.contains(text.as_str()) {
                Ok(())
            } else {
                Err(mismatch(expectation, format!("{} containing {:?}", region, text), actual))
            }
        }
        Expectation::TextAbsent { region, text } => {
            let actual = view.text(*region);
            if actual.contains(text.as_str()) {
                Err(mismatch(expectation, format!("{} without {:?}", region, text), actual))
            } else {
                Ok(())
            }
        }
        Expectation::UrlMatches(pattern) => {
            let re = compile(pattern).map_err(|e| mismatch(expectation, pattern.clone(), e))?;
            if re.is_match(&view.url) {
                Ok(())
            } else {
                Err(mismatch(expectation, format!("url matching /{}/", pattern), view.url.clone()))
            }
        }
        Expectation::TitleIs(title) => {
            if &view.title == title {
                Ok(())
            } else {
                Err(mismatch(expectation, title.clone(), view.title.clone()))
            }
        }
        Expectation::Visible(locator) => {
            if state_holds(locator, WaitState::Visible, view) {
                Ok(())
            } else {
                Err(mismatch(expectation, "a visible match", view.describe()))
            }
        }
        Expectation::Hidden(locator) => {
            if state_holds(locator, WaitState::Hidden, view) {
                Ok(())
            } else {
                Err(mismatch(expectation, "no visible match", view.describe()))
            }
        }
        Expectation::Count { target, count } => {
            let actual = target.visible_in(view).len();
            if actual == *count {
                Ok(())
            } else {
                Err(mismatch(expectation, count.to_string(), actual.to_string()))
            }
        }
        Expectation::Requested { method, url, times } => {
            let re = compile(url).map_err(|e| mismatch(expectation, url.clone(), e))?;
            let hits: Vec<&InterceptRecord> = intercepts
                .iter()
                .filter(|r| method.allows(r.method) && re.is_match(&r.url))
                .collect();
            if hits.len() == *times {
                Ok(())
            } else {
                let seen: Vec<String> = intercepts.iter().map(|r| format!("{} {}", r.method, r.url)).collect();
                Err(mismatch(
                    expectation,
                    format!("{} request(s)", times),
                    format!("{} request(s) among [{}]", hits.len(), seen.join(", ")),
                ))
            }
        }
    }
}

/// Whether the locator is currently in `state`
pub fn state_holds(locator: &Locator, state: WaitState, view: &PageView) -> bool {
    match state {
        WaitState::Visible => !locator.visible_in(view).is_empty(),
        WaitState::Hidden => locator.visible_in(view).is_empty(),
        WaitState::Attached => !locator.matches_in(view).is_empty(),
        WaitState::Detached => locator.matches_in(view).is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{AriaRole, Control, Region};
    use slicemock_gateway::{Method, MethodFilter};

    fn dashboard() -> PageView {
        let mut view = PageView {
            url: "http://localhost:5173/diner-dashboard".into(),
            title: "JWT Pizza".into(),
            ..Default::default()
        };
        view.regions.insert(Region::Main, "Your pizza kitchen\nname: pizza dinerx".into());
        view.regions.insert(Region::Header, "Logout pd".into());
        view.controls = vec![
            Control::link("initials", "pd"),
            Control::button("edit", "Edit"),
            Control::new("dialog", AriaRole::Dialog, "Edit user").visible(false),
        ];
        view
    }

    fn record(method: Method, url: &str) -> InterceptRecord {
        InterceptRecord {
            method,
            url: url.to_string(),
            rule: Some("rule".into()),
            status: Some(200),
        }
    }

    #[test]
    fn test_text_expectations() {
        let view = dashboard();
        let contains = Expectation::TextContains {
            region: Region::Main,
            text: "pizza dinerx".into(),
        };
        assert!(check(&contains, &view, &[]).is_ok());

        let absent = Expectation::TextAbsent {
            region: Region::Main,
            text: "Kai Chen".into(),
        };
        assert!(check(&absent, &view, &[]).is_ok());

        let wrong_region = Expectation::TextContains {
            region: Region::Header,
            text: "pizza dinerx".into(),
        };
        let err = check(&wrong_region, &view, &[]).unwrap_err();
        assert_eq!(err.actual, "Logout pd");
    }

    #[test]
    fn test_url_and_title() {
        let view = dashboard();
        assert!(check(&Expectation::UrlMatches(".*dashboard".into()), &view, &[]).is_ok());
        assert!(check(&Expectation::UrlMatches("admin".into()), &view, &[]).is_err());
        assert!(check(&Expectation::TitleIs("JWT Pizza".into()), &view, &[]).is_ok());
    }

    #[test]
    fn test_visibility() {
        let view = dashboard();
        let dialog = Locator::role(AriaRole::Dialog);
        assert!(check(&Expectation::Hidden(dialog.clone()), &view, &[]).is_ok());
        assert!(check(&Expectation::Visible(dialog), &view, &[]).is_err());
        assert!(state_holds(&Locator::text("Edit user"), WaitState::Attached, &view));
        assert!(state_holds(&Locator::text("Delete"), WaitState::Detached, &view));
    }

    #[test]
    fn test_requested_counts_exact() {
        let log = vec![
            record(Method::Put, "http://localhost:5173/api/auth"),
            record(Method::Get, "http://localhost:5173/api/user/me"),
            record(Method::Put, "http://localhost:5173/api/user/3"),
        ];
        let once = Expectation::Requested {
            method: MethodFilter::Only(Method::Put),
            url: "/api/auth$".into(),
            times: 1,
        };
        assert!(check(&once, &PageView::default(), &log).is_ok());

        let any_put = Expectation::Requested {
            method: MethodFilter::Only(Method::Put),
            url: "/api/".into(),
            times: 1,
        };
        let err = check(&any_put, &PageView::default(), &log).unwrap_err();
        assert!(err.actual.starts_with("2 request(s)"));
    }

    #[test]
    fn test_mismatch_becomes_assertion_error() {
        let err: E2eError = check(&Expectation::TitleIs("Other".into()), &dashboard(), &[])
            .unwrap_err()
            .into();
        assert!(err.is_assertion());
        assert!(err.to_string().contains("expected: Other"));
    }
}
