//! Maintenance windows declared as tracker issues.
//!
//! A maintenance issue carries its schedule in an HTML comment so it stays
//! invisible when rendered:
//!
//! ```text
//! <!--
//! start: 2024-05-01T22:00:00Z
//! end: 2024-05-02T02:00:00Z
//! expectedDown: api, website
//! expectedDegraded: search
//! -->
//! ```
//!
//! Issues without a parseable `start` and `end` are ignored. Windows whose
//! end has passed are reported for closure and never count as active.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use upwatch_core::{parse_timestamp, Issue, StatusVerdict};

/// Label marking an issue as a maintenance announcement.
pub const MAINTENANCE_LABEL: &str = "maintenance";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceWindow {
    pub issue_number: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub expected_down: BTreeSet<String>,
    pub expected_degraded: BTreeSet<String>,
}

/// Outcome of resolving this cycle's maintenance issues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub active: ActiveWindows,
    /// Issues whose window is over and should be closed.
    pub expired: Vec<u64>,
}

/// Windows in force for the current cycle. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveWindows(Vec<MaintenanceWindow>);

impl ActiveWindows {
    pub fn new(windows: Vec<MaintenanceWindow>) -> Self {
        Self(windows)
    }

    pub fn windows(&self) -> &[MaintenanceWindow] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `status` for `slug` was announced by any active window.
    pub fn is_expected(&self, slug: &str, status: StatusVerdict) -> bool {
        self.0.iter().any(|w| match status {
            StatusVerdict::Down => w.expected_down.contains(slug),
            StatusVerdict::Degraded => w.expected_degraded.contains(slug),
            StatusVerdict::Up | StatusVerdict::Unknown => false,
        })
    }
}

/// Split open maintenance issues into active windows and expired ones.
pub fn resolve(issues: &[Issue], now: DateTime<Utc>) -> Resolution {
    let mut resolution = Resolution::default();
    let mut active = Vec::new();

    for issue in issues {
        let Some(window) = parse_window(issue) else {
            debug!(issue = issue.number, "maintenance issue has no usable schedule");
            continue;
        };
        if window.end < now {
            debug!(issue = issue.number, end = %window.end, "maintenance window is over");
            resolution.expired.push(issue.number);
        } else {
            active.push(window);
        }
    }

    resolution.active = ActiveWindows::new(active);
    resolution
}

/// Structured window from an issue, or `None` if the issue has no
/// parseable schedule.
pub fn parse_window(issue: &Issue) -> Option<MaintenanceWindow> {
    let metadata = parse_metadata(issue.body.as_deref()?)?;
    let start = parse_timestamp(metadata.get("start")?)?;
    let end = parse_timestamp(metadata.get("end")?)?;

    Some(MaintenanceWindow {
        issue_number: issue.number,
        start,
        end,
        expected_down: slug_list(metadata.get("expectedDown")),
        expected_degraded: slug_list(metadata.get("expectedDegraded")),
    })
}

/// `key: value` pairs from the first `<!-- ... -->` block. Values are
/// everything after the first colon, so timestamps survive intact.
pub fn parse_metadata(body: &str) -> Option<HashMap<String, String>> {
    let (_, after_open) = body.split_once("<!--")?;
    let block = after_open
        .split_once("-->")
        .map_or(after_open, |(block, _)| block);

    let metadata = block
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    Some(metadata)
}

fn slug_list(value: Option<&String>) -> BTreeSet<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issue(number: u64, body: &str) -> Issue {
        Issue {
            number,
            title: "Scheduled maintenance".to_string(),
            body: Some(body.to_string()),
            html_url: format!("https://tracker.example/issues/{number}"),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap()
    }

    const BODY: &str = "We are upgrading the database.\n\
        <!--\n\
        start: 2024-05-01T22:00:00Z\n\
        end: 2024-05-02T02:00:00Z\n\
        expectedDown: api, website,\n\
        expectedDegraded:  search \n\
        -->\n\
        Thanks for your patience.";

    #[test]
    fn parses_metadata_block() {
        let meta = parse_metadata(BODY).unwrap();
        assert_eq!(meta["start"], "2024-05-01T22:00:00Z");
        assert_eq!(meta["expectedDegraded"], "search");
        assert!(!meta.contains_key("We are upgrading the database."));
    }

    #[test]
    fn body_without_block_has_no_metadata() {
        assert!(parse_metadata("just text: with a colon").is_none());
    }

    #[test]
    fn parses_window_with_independent_lists() {
        let window = parse_window(&issue(7, BODY)).unwrap();
        assert_eq!(window.issue_number, 7);
        assert_eq!(
            window.expected_down,
            BTreeSet::from(["api".to_string(), "website".to_string()])
        );
        assert_eq!(window.expected_degraded, BTreeSet::from(["search".to_string()]));
    }

    #[test]
    fn missing_end_is_not_a_window() {
        let body = "<!--\nstart: 2024-05-01T22:00:00Z\nexpectedDown: api\n-->";
        assert!(parse_window(&issue(1, body)).is_none());
    }

    #[test]
    fn unparseable_time_is_not_a_window() {
        let body = "<!--\nstart: tonight\nend: tomorrow\n-->";
        assert!(parse_window(&issue(1, body)).is_none());
    }

    #[test]
    fn issue_without_body_is_ignored() {
        let mut i = issue(1, "");
        i.body = None;
        let resolution = resolve(&[i], now());
        assert!(resolution.active.is_empty());
        assert!(resolution.expired.is_empty());
    }

    #[test]
    fn expired_windows_are_closed_not_active() {
        let past = "<!--\nstart: 2024-04-01T00:00:00Z\nend: 2024-04-02T00:00:00Z\nexpectedDown: api\n-->";
        let resolution = resolve(&[issue(1, BODY), issue(2, past)], now());

        assert_eq!(resolution.expired, vec![2]);
        assert_eq!(resolution.active.windows().len(), 1);
        assert_eq!(resolution.active.windows()[0].issue_number, 1);
    }

    #[test]
    fn expectation_matches_status_list() {
        let resolution = resolve(&[issue(1, BODY)], now());
        let active = &resolution.active;

        assert!(active.is_expected("api", StatusVerdict::Down));
        assert!(!active.is_expected("api", StatusVerdict::Degraded));
        assert!(active.is_expected("search", StatusVerdict::Degraded));
        assert!(!active.is_expected("search", StatusVerdict::Down));
        assert!(!active.is_expected("api", StatusVerdict::Up));
        assert!(!active.is_expected("billing", StatusVerdict::Down));
    }

    #[test]
    fn any_window_can_declare_expectation() {
        let other = "<!--\nstart: 2024-05-01\nend: 2024-05-03\nexpectedDown: billing\n-->";
        let resolution = resolve(&[issue(1, BODY), issue(2, other)], now());
        assert!(resolution.active.is_expected("billing", StatusVerdict::Down));
        assert!(resolution.active.is_expected("api", StatusVerdict::Down));
    }
}
