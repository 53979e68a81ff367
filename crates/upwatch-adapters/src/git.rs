//! The working-tree repository as the VCS, via the `git` CLI.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use upwatch_core::{CommitAuthor, Vcs};

pub struct GitVcs {
    repo: PathBuf,
    /// Staged before every commit, relative to `repo`.
    history_dir: PathBuf,
}

impl GitVcs {
    pub fn new(repo: impl Into<PathBuf>, history_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            history_dir: history_dir.into(),
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Run `git <args>` in the repository and return trimmed stdout.
    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .await
            .context("failed to execute git. Is it installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let exit_code = output.status.code().unwrap_or(-1);
            bail!(
                "git {} failed (exit code {exit_code}).\n\n\
                 --- stderr ---\n{stderr}\n\
                 --- stdout ---\n{stdout}",
                args.first().copied().unwrap_or_default()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// `-c user.name=... -c user.email=...` for whichever parts are set.
fn author_args(author: &CommitAuthor) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(name) = &author.name {
        args.push("-c".to_string());
        args.push(format!("user.name={name}"));
    }
    if let Some(email) = &author.email {
        args.push("-c".to_string());
        args.push(format!("user.email={email}"));
    }
    args
}

#[async_trait]
impl Vcs for GitVcs {
    async fn commit(&self, message: &str, author: &CommitAuthor) -> Result<String> {
        let history = self.history_dir.to_string_lossy();
        self.git(&["add", "--", &history]).await?;

        let mut args = author_args(author);
        args.extend(["commit".to_string(), "-m".to_string(), message.to_string()]);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git(&args).await?;

        let sha = self.git(&["rev-parse", "HEAD"]).await?;
        debug!(%sha, %message, "committed history");
        Ok(sha)
    }

    async fn push(&self) -> Result<()> {
        self.git(&["push"]).await?;
        info!(repo = %self.repo.display(), "pushed history");
        Ok(())
    }
}
