//! Collaborator interfaces the monitor cycle talks through.
//!
//! Adapters live in `upwatch-adapters`; tests substitute recording fakes.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{CommitAuthor, Issue, NewIssue};

/// Issue tracker holding incident and maintenance issues.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Open issues carrying every given label, newest first.
    async fn list_open_by_label(&self, labels: &[&str]) -> Result<Vec<Issue>>;

    async fn create_issue(&self, issue: &NewIssue) -> Result<Issue>;

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> Result<()>;

    async fn lock_issue(&self, number: u64) -> Result<()>;

    async fn add_comment(&self, number: u64, body: &str) -> Result<()>;

    async fn close_issue(&self, number: u64) -> Result<()>;

    /// Link to a commit, for embedding in issue bodies and comments.
    fn commit_url(&self, sha: &str) -> String;
}

/// Version control holding the history files.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Commit staged history changes and return the commit hash.
    async fn commit(&self, message: &str, author: &CommitAuthor) -> Result<String>;

    async fn push(&self) -> Result<()>;
}

/// Best-effort outbound chat notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Notifier used when nothing is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}
