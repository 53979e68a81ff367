//! upwatch-adapters — production implementations of the collaborator
//! ports in `upwatch_core::ports`.
//!
//! - [`GitHubTracker`]: incidents and maintenance windows as GitHub issues
//! - [`GitVcs`]: history commits through the `git` CLI
//! - [`WebhookNotifier`]: chat messages to an incoming webhook

pub mod git;
pub mod github;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use git::GitVcs;
pub use github::GitHubTracker;
pub use webhook::WebhookNotifier;
