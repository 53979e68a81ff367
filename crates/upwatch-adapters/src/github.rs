//! GitHub Issues as the incident tracker, over the REST API.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use upwatch_core::{Issue, IssueTracker, NewIssue};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_WEB_URL: &str = "https://github.com";
const USER_AGENT: &str = concat!("upwatch/", env!("CARGO_PKG_VERSION"));

pub struct GitHubTracker {
    http: reqwest::Client,
    api_url: String,
    web_url: String,
    owner: String,
    repo: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    body: Option<String>,
    html_url: String,
    /// Present when the "issue" is really a pull request.
    pull_request: Option<serde_json::Value>,
}

impl From<IssueResponse> for Issue {
    fn from(r: IssueResponse) -> Self {
        Issue {
            number: r.number,
            title: r.title,
            body: r.body,
            html_url: r.html_url,
        }
    }
}

impl GitHubTracker {
    pub fn new(owner: &str, repo: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build GitHub HTTP client")?;

        Ok(Self {
            http,
            api_url: DEFAULT_API_URL.to_string(),
            web_url: DEFAULT_WEB_URL.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
        })
    }

    /// Token from `GH_PAT`, falling back to `GITHUB_TOKEN`.
    pub fn from_env(owner: &str, repo: &str) -> Result<Self> {
        let token = std::env::var("GH_PAT")
            .or_else(|_| std::env::var("GITHUB_TOKEN"))
            .context("GH_PAT or GITHUB_TOKEN must be set to talk to GitHub")?;
        Self::new(owner, repo, &token)
    }

    /// Point at a GitHub Enterprise or test server.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/{}/issues", self.api_url, self.owner, self.repo)
    }

    fn issue_url(&self, number: u64, suffix: &str) -> String {
        format!("{}/{number}{suffix}", self.issues_url())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
    }
}

/// Fail on non-2xx, keeping GitHub's error message.
async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("GitHub {what} failed ({status}): {body}");
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    async fn list_open_by_label(&self, labels: &[&str]) -> Result<Vec<Issue>> {
        let labels = labels.join(",");
        let response = self
            .request(Method::GET, &self.issues_url())
            .query(&[
                ("state", "open"),
                ("labels", labels.as_str()),
                ("filter", "all"),
                ("sort", "created"),
                ("direction", "desc"),
                ("per_page", "100"),
            ])
            .send()
            .await
            .context("listing issues")?;
        let issues: Vec<IssueResponse> = check(response, "list issues")
            .await?
            .json()
            .await
            .context("decoding issue list")?;

        debug!(%labels, count = issues.len(), "listed open issues");
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(Issue::from)
            .collect())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<Issue> {
        let response = self
            .request(Method::POST, &self.issues_url())
            .json(&json!({
                "title": issue.title,
                "body": issue.body,
                "labels": issue.labels,
            }))
            .send()
            .await
            .context("creating issue")?;
        let created: IssueResponse = check(response, "create issue")
            .await?
            .json()
            .await
            .context("decoding created issue")?;
        Ok(created.into())
    }

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> Result<()> {
        let response = self
            .request(Method::POST, &self.issue_url(number, "/assignees"))
            .json(&json!({ "assignees": assignees }))
            .send()
            .await
            .context("adding assignees")?;
        check(response, "add assignees").await?;
        Ok(())
    }

    async fn lock_issue(&self, number: u64) -> Result<()> {
        let response = self
            .request(Method::PUT, &self.issue_url(number, "/lock"))
            .json(&json!({}))
            .send()
            .await
            .context("locking issue")?;
        check(response, "lock issue").await?;
        Ok(())
    }

    async fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        let response = self
            .request(Method::POST, &self.issue_url(number, "/comments"))
            .json(&json!({ "body": body }))
            .send()
            .await
            .context("commenting on issue")?;
        check(response, "add comment").await?;
        Ok(())
    }

    async fn close_issue(&self, number: u64) -> Result<()> {
        let response = self
            .request(Method::PATCH, &self.issue_url(number, ""))
            .json(&json!({ "state": "closed" }))
            .send()
            .await
            .context("closing issue")?;
        check(response, "close issue").await?;
        Ok(())
    }

    fn commit_url(&self, sha: &str) -> String {
        format!("{}/{}/{}/commit/{sha}", self.web_url, self.owner, self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;

    fn tracker(api: &str) -> GitHubTracker {
        GitHubTracker::new("acme", "status", "t0ken")
            .unwrap()
            .with_api_url(api)
    }

    const ISSUES: &str = r#"[
        {"number": 12, "title": "🛑 Api is down", "body": null,
         "html_url": "https://github.com/acme/status/issues/12"},
        {"number": 11, "title": "Bump deps", "body": "",
         "html_url": "https://github.com/acme/status/pull/11", "pull_request": {}}
    ]"#;

    #[tokio::test]
    async fn lists_open_issues_newest_first_without_prs() {
        let (api, request) = serve_once(200, ISSUES).await;

        let issues = tracker(&api).list_open_by_label(&["api"]).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].number, 12);
        assert_eq!(issues[0].body, None);

        let request = request.await.unwrap();
        let line = request.request_line();
        assert!(line.starts_with("GET /repos/acme/status/issues?"), "{line}");
        assert!(line.contains("state=open"));
        assert!(line.contains("labels=api"));
        assert!(line.contains("direction=desc"));
        assert!(request.head.to_ascii_lowercase().contains("authorization: bearer t0ken"));
    }

    #[tokio::test]
    async fn creates_issue_with_labels() {
        let (api, request) = serve_once(
            201,
            r#"{"number": 13, "title": "🛑 Api is down", "body": "b",
                "html_url": "https://github.com/acme/status/issues/13"}"#,
        )
        .await;

        let issue = tracker(&api)
            .create_issue(&NewIssue {
                title: "🛑 Api is down".into(),
                body: "b".into(),
                labels: vec!["status".into(), "api".into()],
            })
            .await
            .unwrap();
        assert_eq!(issue.number, 13);

        let request = request.await.unwrap();
        assert!(request.request_line().starts_with("POST /repos/acme/status/issues "));
        assert_eq!(request.json()["labels"], json!(["status", "api"]));
    }

    #[tokio::test]
    async fn closes_with_patch() {
        let (api, request) = serve_once(200, r#"{"number": 5}"#).await;
        tracker(&api).close_issue(5).await.unwrap();

        let request = request.await.unwrap();
        assert!(request.request_line().starts_with("PATCH /repos/acme/status/issues/5 "));
        assert_eq!(request.json(), json!({ "state": "closed" }));
    }

    #[tokio::test]
    async fn locks_with_put() {
        let (api, request) = serve_once(204, "").await;
        tracker(&api).lock_issue(5).await.unwrap();
        assert!(request
            .await
            .unwrap()
            .request_line()
            .starts_with("PUT /repos/acme/status/issues/5/lock "));
    }

    #[tokio::test]
    async fn error_status_carries_message() {
        let (api, _request) = serve_once(403, r#"{"message": "Resource not accessible"}"#).await;
        let err = tracker(&api).add_comment(5, "hi").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("403"), "{msg}");
        assert!(msg.contains("Resource not accessible"), "{msg}");
    }

    #[test]
    fn commit_links_point_at_web_ui() {
        let t = GitHubTracker::new("acme", "status", "x").unwrap();
        assert_eq!(
            t.commit_url("abc123"),
            "https://github.com/acme/status/commit/abc123"
        );
    }
}
