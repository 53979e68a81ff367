//! `.upwatchrc.yml` configuration parser.
//!
//! Keys follow the camelCase spelling of the status-page config format so
//! existing files load unchanged. [`UpwatchConfig::sites`] resolves the raw
//! entries into [`SiteSpec`]s with every default applied.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("site {site}: invalid port {value:?}")]
    InvalidPort { site: String, value: String },
    #[error("repository is not set (config owner/repo or GITHUB_REPOSITORY)")]
    MissingRepository,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpwatchConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
    /// Assigned to every incident issue.
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub commit_messages: CommitMessages,
    pub commit_prefix_status_up: Option<String>,
    pub commit_prefix_status_degraded: Option<String>,
    pub commit_prefix_status_down: Option<String>,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    pub history_dir: Option<PathBuf>,
    #[serde(default)]
    pub history_backend: HistoryBackend,
}

/// Where site history is kept. Both live under the history directory so the
/// same path is committed either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// One `{slug}.yml` file per site.
    #[default]
    Files,
    /// A single redb database file, `history.redb`.
    Redb,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMessages {
    pub status_change: Option<String>,
    pub commit_author_name: Option<String>,
    pub commit_author_email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsConfig {
    pub webhook_url: Option<String>,
}

/// A site entry exactly as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
    pub slug: Option<String>,
    pub method: Option<String>,
    pub body: Option<String>,
    pub port: Option<PortValue>,
    #[serde(default)]
    pub headers: Vec<String>,
    pub check: Option<String>,
    pub expected_status_codes: Option<Vec<StatusCodeValue>>,
    pub max_response_time: Option<u64>,
    pub timeout: Option<u64>,
    #[serde(rename = "__dangerous__body_down")]
    pub body_down: Option<String>,
    #[serde(rename = "__dangerous__body_degraded")]
    pub body_degraded: Option<String>,
    #[serde(rename = "__dangerous__body_degraded_if_text_missing")]
    pub body_degraded_if_text_missing: Option<String>,
    #[serde(rename = "__dangerous__body_down_if_text_missing")]
    pub body_down_if_text_missing: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
}

/// Status codes may be written as numbers or quoted strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusCodeValue {
    Number(u16),
    Text(String),
}

impl StatusCodeValue {
    fn as_code(&self) -> Option<u16> {
        match self {
            StatusCodeValue::Number(n) => Some(*n),
            StatusCodeValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Ports may reference an environment variable (`$DB_PORT`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

impl UpwatchConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve every configured site, in config order.
    pub fn sites(&self) -> ConfigResult<Vec<SiteSpec>> {
        self.sites.iter().map(SiteConfig::resolve).collect()
    }

    /// `owner/repo`, preferring `GITHUB_REPOSITORY` when set.
    pub fn repository(&self) -> ConfigResult<(String, String)> {
        if let Ok(full) = std::env::var("GITHUB_REPOSITORY")
            && let Some((owner, repo)) = full.split_once('/')
        {
            return Ok((owner.to_string(), repo.to_string()));
        }
        match (&self.owner, &self.repo) {
            (Some(owner), Some(repo)) => Ok((owner.clone(), repo.clone())),
            _ => Err(ConfigError::MissingRepository),
        }
    }

    pub fn history_dir(&self) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("history"))
    }

    pub fn history_database(&self) -> PathBuf {
        self.history_dir().join("history.redb")
    }
}

impl SiteConfig {
    /// Apply defaults and expand `$VAR` references.
    pub fn resolve(&self) -> ConfigResult<SiteSpec> {
        let mut site = SiteSpec::new(&self.name, &expand_env(&self.url));

        if let Some(slug) = self.slug.as_deref().filter(|s| !s.trim().is_empty()) {
            site.slug = slug.trim().to_string();
        }
        if let Some(method) = &self.method {
            site.method = method.to_ascii_uppercase();
        }
        site.body = self.body.clone();
        site.port = match &self.port {
            None => None,
            Some(PortValue::Number(n)) => Some(*n),
            Some(PortValue::Text(raw)) => {
                let expanded = expand_env(raw);
                let port = expanded.trim().parse().map_err(|_| ConfigError::InvalidPort {
                    site: self.name.clone(),
                    value: expanded.clone(),
                })?;
                Some(port)
            }
        };
        site.headers = self
            .headers
            .iter()
            .filter_map(|h| h.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), expand_env(v.trim())))
            .collect();
        site.check = CheckKind::from_config(self.check.as_deref());
        if let Some(codes) = &self.expected_status_codes {
            site.expected_status_codes = codes
                .iter()
                .filter_map(StatusCodeValue::as_code)
                .collect::<BTreeSet<u16>>();
        }
        if let Some(max) = self.max_response_time {
            site.max_response_time_ms = max;
        }
        if let Some(timeout) = self.timeout {
            site.timeout_ms = timeout;
        }
        site.body_rules = BodyRules {
            down_if_contains: non_empty(&self.body_down),
            degraded_if_contains: non_empty(&self.body_degraded),
            degraded_if_missing: non_empty(&self.body_degraded_if_text_missing),
            down_if_missing: non_empty(&self.body_down_if_text_missing),
        };
        site.tags = self.tags.clone();
        site.assignees = self.assignees.clone();
        Ok(site)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

/// Replace `$NAME` with the value of the environment variable `NAME`.
/// Unset variables are left as written.
pub fn expand_env(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    if !input.contains('$') {
        return input.to_string();
    }
    ENV_REF.replace_all(input, |caps: &regex::Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
owner: acme
repo: status
assignees: [oncall]
commitMessages:
  statusChange: "$PREFIX $SITE_NAME went $STATUS"
  commitAuthorName: Status Bot
sites:
  - name: Google
    url: https://www.google.com
  - name: Database
    url: db.internal
    check: tcp-ping
    port: 5432
  - name: Custom
    slug: custom-api
    url: https://api.example.com/health
    method: post
    expectedStatusCodes: [200, "204"]
    maxResponseTime: 1500
    __dangerous__body_down_if_text_missing: '"ok":true'
    tags: [api]
"#;

    #[test]
    fn history_backend_defaults_to_files() {
        let config = UpwatchConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.history_backend, HistoryBackend::Files);

        let config = UpwatchConfig::from_yaml("historyDir: data\nhistoryBackend: redb\n").unwrap();
        assert_eq!(config.history_backend, HistoryBackend::Redb);
        assert_eq!(config.history_database(), PathBuf::from("data/history.redb"));
        assert!(UpwatchConfig::from_yaml("historyBackend: sqlite\n").is_err());
    }

    #[test]
    fn parses_sample_config() {
        let config = UpwatchConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.sites.len(), 3);
        assert_eq!(config.assignees, vec!["oncall".to_string()]);
        assert_eq!(
            config.commit_messages.commit_author_name.as_deref(),
            Some("Status Bot")
        );
    }

    #[test]
    fn resolves_defaults_and_overrides() {
        let config = UpwatchConfig::from_yaml(SAMPLE).unwrap();
        let sites = config.sites().unwrap();

        assert_eq!(sites[0].slug, "google");
        assert_eq!(sites[0].check, CheckKind::Http);
        assert_eq!(sites[0].max_response_time_ms, DEFAULT_MAX_RESPONSE_TIME_MS);

        assert_eq!(sites[1].check, CheckKind::Tcp);
        assert_eq!(sites[1].port, Some(5432));

        let custom = &sites[2];
        assert_eq!(custom.slug, "custom-api");
        assert_eq!(custom.method, "POST");
        assert_eq!(custom.expected_status_codes, BTreeSet::from([200, 204]));
        assert_eq!(custom.max_response_time_ms, 1500);
        assert_eq!(custom.body_rules.down_if_missing.as_deref(), Some("\"ok\":true"));
        assert_eq!(custom.tags, vec!["api".to_string()]);
    }

    #[test]
    fn expands_known_variables_only() {
        let lookup = |name: &str| (name == "HOST").then(|| "example.com".to_string());
        assert_eq!(
            expand_with("https://$HOST/$MISSING", lookup),
            "https://example.com/$MISSING"
        );
        assert_eq!(expand_with("plain", lookup), "plain");
    }

    #[test]
    fn invalid_port_is_reported() {
        let site = SiteConfig {
            name: "db".to_string(),
            url: "db.internal".to_string(),
            port: Some(PortValue::Text("not-a-port".to_string())),
            ..Default::default()
        };
        assert!(matches!(site.resolve(), Err(ConfigError::InvalidPort { .. })));
    }

    #[test]
    fn repository_from_config() {
        let config = UpwatchConfig {
            owner: Some("acme".to_string()),
            repo: Some("status".to_string()),
            ..Default::default()
        };
        if std::env::var("GITHUB_REPOSITORY").is_err() {
            assert_eq!(
                config.repository().unwrap(),
                ("acme".to_string(), "status".to_string())
            );
        }
    }
}
