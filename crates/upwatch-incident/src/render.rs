//! Commit messages, incident issue text and notification text.

use upwatch_core::{NewIssue, SiteSpec, StatusVerdict, UpwatchConfig};

pub const DEFAULT_COMMIT_TEMPLATE: &str =
    "$PREFIX $SITE_NAME is $STATUS ($RESPONSE_CODE in $RESPONSE_TIME ms) [skip ci] [upwatch]";

/// Label every incident issue carries, alongside the site slug.
pub const STATUS_LABEL: &str = "status";

/// Emoji prefixes for commit messages, per status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPrefixes {
    pub up: String,
    pub degraded: String,
    pub down: String,
}

impl Default for StatusPrefixes {
    fn default() -> Self {
        Self {
            up: "🟩".to_string(),
            degraded: "🟨".to_string(),
            down: "🟥".to_string(),
        }
    }
}

impl StatusPrefixes {
    /// Unknown renders like down; it only ever reaches a commit when forced.
    pub fn for_status(&self, status: StatusVerdict) -> &str {
        match status {
            StatusVerdict::Up => &self.up,
            StatusVerdict::Degraded => &self.degraded,
            StatusVerdict::Down | StatusVerdict::Unknown => &self.down,
        }
    }
}

/// Everything configurable about generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplates {
    pub commit: String,
    pub prefixes: StatusPrefixes,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            commit: DEFAULT_COMMIT_TEMPLATE.to_string(),
            prefixes: StatusPrefixes::default(),
        }
    }
}

impl MessageTemplates {
    pub fn from_config(config: &UpwatchConfig) -> Self {
        let defaults = StatusPrefixes::default();
        Self {
            commit: config
                .commit_messages
                .status_change
                .clone()
                .unwrap_or_else(|| DEFAULT_COMMIT_TEMPLATE.to_string()),
            prefixes: StatusPrefixes {
                up: config.commit_prefix_status_up.clone().unwrap_or(defaults.up),
                degraded: config
                    .commit_prefix_status_degraded
                    .clone()
                    .unwrap_or(defaults.degraded),
                down: config.commit_prefix_status_down.clone().unwrap_or(defaults.down),
            },
        }
    }

    /// Fill the commit template. Every occurrence of a placeholder is
    /// replaced.
    pub fn commit_message(
        &self,
        site: &SiteSpec,
        status: StatusVerdict,
        code: u16,
        response_time_ms: u64,
    ) -> String {
        self.commit
            .replace("$PREFIX", self.prefixes.for_status(status))
            .replace("$SITE_NAME", &site.name)
            .replace("$SITE_URL", &site.url)
            .replace("$SITE_METHOD", &site.method)
            .replace("$STATUS", status.as_str())
            .replace("$RESPONSE_CODE", &code.to_string())
            .replace("$RESPONSE_TIME", &response_time_ms.to_string())
    }
}

/// A commit as referenced from issue text.
#[derive(Debug, Clone, Copy)]
pub struct CommitRef<'a> {
    pub sha: &'a str,
    pub url: &'a str,
}

impl CommitRef<'_> {
    pub fn short(&self) -> &str {
        self.sha.get(..7).unwrap_or(self.sha)
    }

    fn markdown(&self) -> String {
        format!("[`{}`]({})", self.short(), self.url)
    }
}

pub fn issue_title(site: &SiteSpec, status: StatusVerdict) -> String {
    match status {
        StatusVerdict::Degraded => format!("⚠️ {} has degraded performance", site.name),
        _ => format!("🛑 {} is down", site.name),
    }
}

/// The issue opened for a new, unexpected outage.
pub fn incident_issue(
    site: &SiteSpec,
    status: StatusVerdict,
    code: u16,
    response_time_ms: u64,
    commit: CommitRef<'_>,
) -> NewIssue {
    let what = match status {
        StatusVerdict::Degraded => "experienced **degraded performance**",
        _ => "was **down**",
    };
    let body = format!(
        "In {}, {} ({}) {what}:\n- HTTP code: {code}\n- Response time: {response_time_ms} ms\n",
        commit.markdown(),
        site.name,
        site.url,
    );

    let mut labels = vec![STATUS_LABEL.to_string(), site.slug.clone()];
    labels.extend(site.tags.iter().cloned());

    NewIssue {
        title: issue_title(site, status),
        body,
        labels,
    }
}

/// Wording depends on what the issue was opened for, not on the outage
/// status it ended in.
fn recovery_phrase(issue_title: &str) -> &'static str {
    if issue_title.contains("degraded") {
        "performance has improved"
    } else {
        "is back up"
    }
}

pub fn resolved_comment(site: &SiteSpec, issue_title: &str, commit: CommitRef<'_>) -> String {
    format!(
        "**Resolved:** {} {} in {}.",
        site.name,
        recovery_phrase(issue_title),
        commit.markdown()
    )
}

pub fn opened_notification(site: &SiteSpec, status: StatusVerdict, issue_url: &str) -> String {
    match status {
        StatusVerdict::Degraded => format!(
            "🟨 {} ({}) is experiencing **degraded performance**: {issue_url}",
            site.name, site.url
        ),
        _ => format!("🟥 {} ({}) is **down**: {issue_url}", site.name, site.url),
    }
}

pub fn resolved_notification(site: &SiteSpec, issue_title: &str) -> String {
    format!("🟩 {} ({}) {}.", site.name, site.url, recovery_phrase(issue_title))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteSpec {
        let mut site = SiteSpec::new("Example API", "https://api.example.com");
        site.tags = vec!["backend".to_string()];
        site
    }

    const COMMIT: CommitRef<'static> = CommitRef {
        sha: "0123456789abcdef",
        url: "https://github.com/acme/status/commit/0123456789abcdef",
    };

    #[test]
    fn default_commit_message() {
        let msg = MessageTemplates::default().commit_message(&site(), StatusVerdict::Down, 500, 120);
        assert_eq!(
            msg,
            "🟥 Example API is down (500 in 120 ms) [skip ci] [upwatch]"
        );
    }

    #[test]
    fn configured_template_and_prefix() {
        let config = UpwatchConfig::from_yaml(
            "commitMessages:\n  statusChange: \"$PREFIX $SITE_METHOD $SITE_URL $STATUS/$STATUS\"\n\
             commitPrefixStatusUp: \"[ok]\"\n",
        )
        .unwrap();
        let templates = MessageTemplates::from_config(&config);
        let msg = templates.commit_message(&site(), StatusVerdict::Up, 200, 10);
        assert_eq!(msg, "[ok] GET https://api.example.com up/up");
        assert_eq!(templates.prefixes.down, "🟥");
    }

    #[test]
    fn titles_follow_status() {
        assert_eq!(issue_title(&site(), StatusVerdict::Down), "🛑 Example API is down");
        assert_eq!(
            issue_title(&site(), StatusVerdict::Degraded),
            "⚠️ Example API has degraded performance"
        );
    }

    #[test]
    fn incident_issue_body_and_labels() {
        let issue = incident_issue(&site(), StatusVerdict::Down, 503, 842, COMMIT);
        assert_eq!(issue.labels, vec!["status", "example-api", "backend"]);
        assert!(issue.body.starts_with(
            "In [`0123456`](https://github.com/acme/status/commit/0123456789abcdef), \
             Example API (https://api.example.com) was **down**:"
        ));
        assert!(issue.body.contains("- HTTP code: 503\n"));
        assert!(issue.body.contains("- Response time: 842 ms\n"));
    }

    #[test]
    fn resolution_wording_follows_issue_title() {
        let down_title = issue_title(&site(), StatusVerdict::Down);
        let degraded_title = issue_title(&site(), StatusVerdict::Degraded);

        assert_eq!(
            resolved_comment(&site(), &down_title, COMMIT),
            "**Resolved:** Example API is back up in \
             [`0123456`](https://github.com/acme/status/commit/0123456789abcdef)."
        );
        assert!(resolved_comment(&site(), &degraded_title, COMMIT).contains("performance has improved"));
        assert_eq!(
            resolved_notification(&site(), &degraded_title),
            "🟩 Example API (https://api.example.com) performance has improved."
        );
    }

    #[test]
    fn opened_notifications() {
        let url = "https://github.com/acme/status/issues/4";
        assert_eq!(
            opened_notification(&site(), StatusVerdict::Down, url),
            "🟥 Example API (https://api.example.com) is **down**: https://github.com/acme/status/issues/4"
        );
        assert!(opened_notification(&site(), StatusVerdict::Degraded, url).contains("degraded performance"));
    }

    #[test]
    fn short_sha_tolerates_short_input() {
        let commit = CommitRef { sha: "abc", url: "u" };
        assert_eq!(commit.short(), "abc");
    }
}
