//! Wiring config and adapters into monitor cycles.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::watch;
use tracing::{error, info};

use upwatch_adapters::{GitHubTracker, GitVcs, WebhookNotifier};
use upwatch_core::{HistoryBackend, Notifier, NullNotifier, UpwatchConfig};
use upwatch_health::{Checks, CycleReport, CycleSettings, MonitorCycle, ProbeOutcome};
use upwatch_state::{HistoryDir, HistoryStore, StateStore};

/// Flags shared by `run` and `watch`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    pub force_write: bool,
    pub push: bool,
}

pub fn load_config(path: &std::path::Path) -> Result<UpwatchConfig> {
    UpwatchConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

/// The history backend the config selects.
pub fn open_history(config: &UpwatchConfig) -> Result<Arc<dyn HistoryStore>> {
    Ok(match config.history_backend {
        HistoryBackend::Files => Arc::new(HistoryDir::new(config.history_dir())),
        HistoryBackend::Redb => {
            let path = config.history_database();
            let store = StateStore::open(&path)
                .with_context(|| format!("opening history database {}", path.display()))?;
            Arc::new(store)
        }
    })
}

fn build_cycle(config: &UpwatchConfig, opts: &RunOptions) -> Result<MonitorCycle> {
    let (owner, repo) = config.repository()?;
    let history_dir = config.history_dir();
    let history = open_history(config)?;

    let tracker = GitHubTracker::from_env(&owner, &repo)?;
    let notifier: Arc<dyn Notifier> = match WebhookNotifier::from_config(config)? {
        Some(webhook) => Arc::new(webhook),
        None => Arc::new(NullNotifier),
    };
    let checks = Checks::new().context("initializing probes")?;

    let mut settings = CycleSettings::from_config(config);
    settings.force_write = opts.force_write;
    settings.push = opts.push;

    info!(
        %owner,
        %repo,
        history = %history_dir.display(),
        backend = ?config.history_backend,
        "monitor configured"
    );
    Ok(MonitorCycle::new(
        history,
        Arc::new(tracker),
        Arc::new(GitVcs::new(".", &history_dir)),
        notifier,
        Arc::new(checks),
        settings,
    ))
}

/// One full cycle. Config is re-read every time so edits apply on the
/// next cycle.
pub async fn run_once(opts: &RunOptions) -> Result<CycleReport> {
    let config = load_config(&opts.config)?;
    let sites = config.sites()?;
    let cycle = build_cycle(&config, opts)?;
    Ok(cycle.run(&sites).await)
}

/// Run cycles back to back, `interval` apart, until shutdown.
pub async fn watch_loop(
    opts: &RunOptions,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "watch started");

    loop {
        match run_once(opts).await {
            Ok(report) => log_report(&report),
            Err(e) => error!(error = %e, "monitor cycle could not start"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                info!("watch shutting down");
                break;
            }
        }
    }
}

/// Probe and classify one site. Touches no history, issues or commits.
pub async fn check(config_path: &std::path::Path, slug: &str) -> Result<ProbeOutcome> {
    let config = load_config(config_path)?;
    let site = config
        .sites()?
        .into_iter()
        .find(|s| s.slug == slug)
        .ok_or_else(|| anyhow!("no site with slug {slug:?} in {}", config_path.display()))?;

    let checks = Checks::new().context("initializing probes")?;
    Ok(ProbeOutcome::run(&site, &checks).await)
}

pub fn log_report(report: &CycleReport) {
    for outcome in report.failures() {
        if let Some(e) = &outcome.error {
            error!(slug = %outcome.slug, error = %e, "site failed this cycle");
        }
    }
    info!(
        sites = report.outcomes.len(),
        changed = report.outcomes.iter().filter(|o| o.changed()).count(),
        closed_maintenance = report.closed_maintenance.len(),
        pushed = report.pushed,
        "cycle report"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use upwatch_core::{SiteSpec, StatusVerdict};
    use upwatch_state::SiteHistoryRecord;

    fn config_in(dir: &std::path::Path, backend: HistoryBackend) -> UpwatchConfig {
        UpwatchConfig {
            history_dir: Some(dir.join("history")),
            history_backend: backend,
            ..Default::default()
        }
    }

    fn record() -> SiteHistoryRecord {
        let site = SiteSpec::new("Api", "https://api.example.com");
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        SiteHistoryRecord::new(&site, StatusVerdict::Down, 503, 120, ts, ts)
    }

    #[test]
    fn files_backend_writes_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let history = open_history(&config_in(dir.path(), HistoryBackend::Files)).unwrap();

        history.write("api", &record()).unwrap();
        assert!(dir.path().join("history/api.yml").is_file());
        assert_eq!(history.read("api").unwrap(), Some(record()));
    }

    #[test]
    fn redb_backend_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), HistoryBackend::Redb);

        open_history(&config).unwrap().write("api", &record()).unwrap();
        assert!(dir.path().join("history/history.redb").is_file());
        assert!(!dir.path().join("history/api.yml").exists());

        let reopened = open_history(&config).unwrap();
        assert_eq!(reopened.read("api").unwrap(), Some(record()));
    }
}
