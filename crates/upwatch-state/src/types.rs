//! Persisted per-site history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use upwatch_core::{SiteSpec, StatusVerdict};

/// Written into every history record so readers know who produced it.
pub const GENERATOR: &str = "upwatch <https://github.com/upwatch/upwatch>";

/// Last recorded state of a site. One record per slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteHistoryRecord {
    pub url: String,
    pub status: StatusVerdict,
    pub code: u16,
    /// Milliseconds.
    pub response_time: u64,
    pub last_updated: DateTime<Utc>,
    /// When the site entered `status`.
    pub start_time: DateTime<Utc>,
    pub generator: String,
}

impl SiteHistoryRecord {
    pub fn new(
        site: &SiteSpec,
        status: StatusVerdict,
        code: u16,
        response_time: u64,
        start_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            url: site.url.clone(),
            status,
            code,
            response_time,
            last_updated: now,
            start_time,
            generator: GENERATOR.to_string(),
        }
    }
}

/// Status a site was in before this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorStatus {
    pub status: StatusVerdict,
    pub start_time: DateTime<Utc>,
}

impl PriorStatus {
    /// No usable history: `unknown`, starting now.
    pub fn unknown(now: DateTime<Utc>) -> Self {
        Self {
            status: StatusVerdict::Unknown,
            start_time: now,
        }
    }

    pub fn from_record(record: Option<&SiteHistoryRecord>, now: DateTime<Utc>) -> Self {
        match record {
            Some(r) => Self {
                status: r.status,
                start_time: r.start_time,
            },
            None => Self::unknown(now),
        }
    }

    /// Start time to record for `new_status`: carried over while the
    /// status holds, reset to `now` when it changes.
    pub fn start_time_for(&self, new_status: StatusVerdict, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.status == new_status {
            self.start_time
        } else {
            now
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prior_defaults_to_unknown() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let prior = PriorStatus::from_record(None, now);
        assert_eq!(prior.status, StatusVerdict::Unknown);
        assert_eq!(prior.start_time, now);
    }

    #[test]
    fn start_time_resets_on_change() {
        let then = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let prior = PriorStatus {
            status: StatusVerdict::Up,
            start_time: then,
        };
        assert_eq!(prior.start_time_for(StatusVerdict::Up, now), then);
        assert_eq!(prior.start_time_for(StatusVerdict::Down, now), now);
    }
}
