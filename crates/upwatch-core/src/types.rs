//! Shared types used across upwatch crates.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Response-time ceiling before an otherwise healthy site is degraded.
pub const DEFAULT_MAX_RESPONSE_TIME_MS: u64 = 60_000;

/// Per-probe transport timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Status codes accepted as "up" when a site does not list its own.
pub const DEFAULT_EXPECTED_STATUS_CODES: &[u16] = &[
    200, 201, 202, 203, 204, 205, 206, 207, 208, 226, 300, 301, 302, 303, 304, 305, 306, 307, 308,
];

/// Classified health of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusVerdict {
    Up,
    Down,
    Degraded,
    /// No history yet. Never produced by a probe.
    #[default]
    Unknown,
}

impl StatusVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusVerdict::Up => "up",
            StatusVerdict::Down => "down",
            StatusVerdict::Degraded => "degraded",
            StatusVerdict::Unknown => "unknown",
        }
    }

    /// Down or degraded.
    pub fn is_outage(&self) -> bool {
        matches!(self, StatusVerdict::Down | StatusVerdict::Degraded)
    }
}

impl fmt::Display for StatusVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusVerdict {
    type Err = std::convert::Infallible;

    /// Anything unrecognised reads as `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "up" => StatusVerdict::Up,
            "down" => StatusVerdict::Down,
            "degraded" => StatusVerdict::Degraded,
            _ => StatusVerdict::Unknown,
        })
    }
}

/// Which probe to run against a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    #[default]
    Http,
    Tcp,
    WebSocket,
}

impl CheckKind {
    /// Map a config value onto a check kind. Unset or unrecognised values
    /// fall back to HTTP.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("tcp") | Some("tcp-ping") => CheckKind::Tcp,
            Some("ws") | Some("wss") | Some("websocket") => CheckKind::WebSocket,
            _ => CheckKind::Http,
        }
    }
}

/// Outcome of a single probe attempt, before classification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawProbeResult {
    /// HTTP status, 200 for a successful tcp/websocket connect, 0 on
    /// transport failure.
    pub http_code: u16,
    /// Wall-clock time of the attempt.
    pub total_time: Duration,
    pub body: Option<String>,
}

impl RawProbeResult {
    /// Sentinel for a probe that never reached the remote end.
    pub fn failed() -> Self {
        Self::default()
    }

    /// Response time in whole milliseconds, rounded to nearest.
    pub fn response_time_ms(&self) -> u64 {
        (self.total_time.as_secs_f64() * 1000.0).round() as u64
    }
}

/// Body-text rules applied on top of the status-code verdict.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BodyRules {
    pub down_if_contains: Option<String>,
    pub degraded_if_contains: Option<String>,
    pub degraded_if_missing: Option<String>,
    pub down_if_missing: Option<String>,
}

/// A fully resolved site, with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSpec {
    pub slug: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub body: Option<String>,
    pub port: Option<u16>,
    /// Extra request headers as `(name, value)` pairs.
    pub headers: Vec<(String, String)>,
    pub check: CheckKind,
    pub expected_status_codes: BTreeSet<u16>,
    pub max_response_time_ms: u64,
    pub timeout_ms: u64,
    pub body_rules: BodyRules,
    pub tags: Vec<String>,
    pub assignees: Vec<String>,
}

impl SiteSpec {
    /// Minimal HTTP site with every default applied.
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            slug: crate::slug::slugify(name),
            name: name.to_string(),
            url: url.to_string(),
            method: "GET".to_string(),
            body: None,
            port: None,
            headers: Vec::new(),
            check: CheckKind::Http,
            expected_status_codes: DEFAULT_EXPECTED_STATUS_CODES.iter().copied().collect(),
            max_response_time_ms: DEFAULT_MAX_RESPONSE_TIME_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            body_rules: BodyRules::default(),
            tags: Vec::new(),
            assignees: Vec::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// An issue as seen on the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub html_url: String,
}

/// Request to open a new issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Optional author override for status commits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl CommitAuthor {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_kind_accepts_legacy_names() {
        assert_eq!(CheckKind::from_config(Some("tcp-ping")), CheckKind::Tcp);
        assert_eq!(CheckKind::from_config(Some("ws")), CheckKind::WebSocket);
        assert_eq!(CheckKind::from_config(Some("WebSocket")), CheckKind::WebSocket);
    }

    #[test]
    fn check_kind_defaults_to_http() {
        assert_eq!(CheckKind::from_config(None), CheckKind::Http);
        assert_eq!(CheckKind::from_config(Some("icmp")), CheckKind::Http);
    }

    #[test]
    fn response_time_rounds_to_nearest_ms() {
        let raw = RawProbeResult {
            http_code: 200,
            total_time: Duration::from_micros(1_499_600),
            body: None,
        };
        assert_eq!(raw.response_time_ms(), 1500);
    }

    #[test]
    fn unrecognised_status_reads_as_unknown() {
        assert_eq!("up".parse::<StatusVerdict>().unwrap(), StatusVerdict::Up);
        assert_eq!("sideways".parse::<StatusVerdict>().unwrap(), StatusVerdict::Unknown);
    }

    #[test]
    fn new_site_uses_defaults() {
        let site = SiteSpec::new("Example Site", "https://example.com");
        assert_eq!(site.slug, "example-site");
        assert_eq!(site.max_response_time_ms, DEFAULT_MAX_RESPONSE_TIME_MS);
        assert!(site.expected_status_codes.contains(&226));
        assert!(!site.expected_status_codes.contains(&404));
    }
}
