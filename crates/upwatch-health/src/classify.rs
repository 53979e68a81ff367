//! Status classification.
//!
//! Turns one raw probe result into a verdict using the site's expected
//! status codes, response-time ceiling, and body-text rules.

use upwatch_core::{RawProbeResult, SiteSpec, StatusVerdict};

/// Classify a probe result. Pure function of its inputs.
///
/// Order matters:
/// 1. code in the expected set ⇒ up, otherwise down;
/// 2. slower than `max_response_time_ms` ⇒ up becomes degraded;
/// 3. while still up: `down_if_contains` ⇒ down, else
///    `degraded_if_contains` ⇒ degraded;
/// 4. always: `degraded_if_missing` absent ⇒ degraded, then
///    `down_if_missing` absent ⇒ down. The down rule runs last and wins.
pub fn classify(site: &SiteSpec, raw: &RawProbeResult) -> StatusVerdict {
    let mut status = if site.expected_status_codes.contains(&raw.http_code) {
        StatusVerdict::Up
    } else {
        StatusVerdict::Down
    };

    if status == StatusVerdict::Up && raw.response_time_ms() > site.max_response_time_ms {
        status = StatusVerdict::Degraded;
    }

    let rules = &site.body_rules;
    let body = raw.body.as_deref();

    if status == StatusVerdict::Up
        && let Some(body) = body
    {
        if rules
            .down_if_contains
            .as_deref()
            .is_some_and(|needle| body.contains(needle))
        {
            status = StatusVerdict::Down;
        } else if rules
            .degraded_if_contains
            .as_deref()
            .is_some_and(|needle| body.contains(needle))
        {
            status = StatusVerdict::Degraded;
        }
    }

    // A probe without a body cannot contain the required text.
    let missing = |needle: &str| !body.is_some_and(|b| b.contains(needle));

    if rules.degraded_if_missing.as_deref().is_some_and(missing) {
        status = StatusVerdict::Degraded;
    }
    if rules.down_if_missing.as_deref().is_some_and(missing) {
        status = StatusVerdict::Down;
    }

    status
}
