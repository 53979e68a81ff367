//! One monitor pass over every configured site.
//!
//! ```text
//! maintenance issues ─▶ active windows (read-only for the cycle)
//!                     └▶ close expired windows
//! for each site, in order:
//!   history.read ─▶ probe + confirm ─▶ changed or forced? ─▶ history.write ─▶ vcs.commit
//!                                            └ changed? ─▶ lookup issue ─▶ decide ─▶ act
//! vcs.push (once, if anything was committed)
//! ```
//!
//! Sites are processed strictly one after another. A collaborator failure
//! for one site is logged and recorded in its [`SiteOutcome`]; the next
//! site still runs. Notifier failures are only ever warnings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use upwatch_core::{
    CommitAuthor, Issue, IssueTracker, Notifier, SiteSpec, StatusVerdict, UpwatchConfig, Vcs,
};
use upwatch_incident::render::{self, CommitRef};
use upwatch_incident::{
    resolve, should_persist, ActiveWindows, IncidentAction, MessageTemplates, Transition,
    MAINTENANCE_LABEL,
};
use upwatch_state::{HistoryStore, PriorStatus, SiteHistoryRecord};

use crate::checker::CheckStrategy;
use crate::error::{MonitorError, MonitorResult};
use crate::retry::{Confirmed, RetryCoordinator, Sleeper, TokioSleeper};

/// Global knobs for a cycle, read once from config.
#[derive(Debug, Clone, Default)]
pub struct CycleSettings {
    pub templates: MessageTemplates,
    pub author: CommitAuthor,
    /// Assigned to every new incident, before the site's own assignees.
    pub assignees: Vec<String>,
    /// Write and commit history even when the status did not change.
    pub force_write: bool,
    pub push: bool,
}

impl CycleSettings {
    pub fn from_config(config: &UpwatchConfig) -> Self {
        Self {
            templates: MessageTemplates::from_config(config),
            author: CommitAuthor {
                name: config.commit_messages.commit_author_name.clone(),
                email: config.commit_messages.commit_author_email.clone(),
            },
            assignees: config.assignees.clone(),
            force_write: false,
            push: true,
        }
    }
}

/// What happened to one site this cycle.
#[derive(Debug)]
pub struct SiteOutcome {
    pub slug: String,
    pub previous: StatusVerdict,
    pub status: StatusVerdict,
    pub code: u16,
    pub response_time_ms: u64,
    pub attempts: u8,
    /// The status was announced by an active maintenance window.
    pub expected: bool,
    pub persisted: bool,
    pub commit: Option<String>,
    pub action: IncidentAction,
    /// Issue opened or resolved by `action`.
    pub issue: Option<u64>,
    pub error: Option<MonitorError>,
}

impl SiteOutcome {
    pub fn changed(&self) -> bool {
        self.previous != self.status
    }
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub outcomes: Vec<SiteOutcome>,
    /// Maintenance issues closed because their window ended.
    pub closed_maintenance: Vec<u64>,
    pub pushed: bool,
}

impl CycleReport {
    /// At least one site changed status, so downstream summaries are stale.
    pub fn has_delta(&self) -> bool {
        self.outcomes.iter().any(SiteOutcome::changed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SiteOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

pub struct MonitorCycle<S = TokioSleeper> {
    history: Arc<dyn HistoryStore>,
    tracker: Arc<dyn IssueTracker>,
    vcs: Arc<dyn Vcs>,
    notifier: Arc<dyn Notifier>,
    checks: Arc<dyn CheckStrategy>,
    retry: RetryCoordinator<S>,
    settings: CycleSettings,
}

impl MonitorCycle<TokioSleeper> {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        tracker: Arc<dyn IssueTracker>,
        vcs: Arc<dyn Vcs>,
        notifier: Arc<dyn Notifier>,
        checks: Arc<dyn CheckStrategy>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            history,
            tracker,
            vcs,
            notifier,
            checks,
            retry: RetryCoordinator::default(),
            settings,
        }
    }
}

impl<S: Sleeper> MonitorCycle<S> {
    /// Replace the retry coordinator, e.g. to avoid real cool-downs in tests.
    pub fn with_retry<T: Sleeper>(self, retry: RetryCoordinator<T>) -> MonitorCycle<T> {
        MonitorCycle {
            history: self.history,
            tracker: self.tracker,
            vcs: self.vcs,
            notifier: self.notifier,
            checks: self.checks,
            retry,
            settings: self.settings,
        }
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub async fn run(&self, sites: &[SiteSpec]) -> CycleReport {
        self.run_at(sites, Utc::now()).await
    }

    /// Run one cycle with `now` as the timestamp for every record written.
    pub async fn run_at(&self, sites: &[SiteSpec], now: DateTime<Utc>) -> CycleReport {
        info!(sites = sites.len(), "monitor cycle starting");
        let (windows, closed_maintenance) = self.maintenance(now).await;

        let mut outcomes = Vec::with_capacity(sites.len());
        for site in sites {
            outcomes.push(self.run_site(site, &windows, now).await);
        }

        let committed = outcomes.iter().any(|o| o.commit.is_some());
        let mut pushed = false;
        if committed && self.settings.push {
            match self.vcs.push().await {
                Ok(()) => pushed = true,
                Err(e) => error!(error = %e, "push failed"),
            }
        }

        let report = CycleReport {
            outcomes,
            closed_maintenance,
            pushed,
        };
        info!(
            sites = report.outcomes.len(),
            delta = report.has_delta(),
            failures = report.failures().count(),
            pushed,
            "monitor cycle finished"
        );
        report
    }

    /// Active windows plus the expired issues that were closed. Tracker
    /// trouble here only costs the cycle its maintenance suppression.
    async fn maintenance(&self, now: DateTime<Utc>) -> (ActiveWindows, Vec<u64>) {
        let issues = match self.tracker.list_open_by_label(&[MAINTENANCE_LABEL]).await {
            Ok(issues) => issues,
            Err(e) => {
                warn!(error = %e, "could not list maintenance issues, continuing without windows");
                return (ActiveWindows::default(), Vec::new());
            }
        };

        let resolution = resolve(&issues, now);
        let mut closed = Vec::with_capacity(resolution.expired.len());
        for number in resolution.expired {
            match self.tracker.close_issue(number).await {
                Ok(()) => {
                    info!(issue = number, "closed expired maintenance issue");
                    closed.push(number);
                }
                Err(e) => warn!(issue = number, error = %e, "failed to close maintenance issue"),
            }
        }

        debug!(active = resolution.active.windows().len(), "maintenance windows resolved");
        (resolution.active, closed)
    }

    async fn run_site(&self, site: &SiteSpec, windows: &ActiveWindows, now: DateTime<Utc>) -> SiteOutcome {
        let prior = match self.history.read(&site.slug) {
            Ok(record) => PriorStatus::from_record(record.as_ref(), now),
            Err(e) => {
                warn!(slug = %site.slug, error = %e, "history unreadable, treating as unknown");
                PriorStatus::unknown(now)
            }
        };

        let confirmed = self.retry.check(site, self.checks.as_ref()).await;
        let status = confirmed.outcome.status;
        let transition = Transition::new(prior.status, status, windows.is_expected(&site.slug, status));

        debug!(
            slug = %site.slug,
            previous = %prior.status,
            %status,
            code = confirmed.outcome.raw.http_code,
            attempts = confirmed.attempts,
            "site checked"
        );

        let mut outcome = SiteOutcome {
            slug: site.slug.clone(),
            previous: prior.status,
            status,
            code: confirmed.outcome.raw.http_code,
            response_time_ms: confirmed.outcome.raw.response_time_ms(),
            attempts: confirmed.attempts,
            expected: transition.expected,
            persisted: false,
            commit: None,
            action: IncidentAction::None,
            issue: None,
            error: None,
        };

        if let Err(e) = self.apply(site, &prior, transition, &confirmed, now, &mut outcome).await {
            error!(slug = %site.slug, error = %e, "site update failed");
            outcome.error = Some(e);
        }
        outcome
    }

    async fn apply(
        &self,
        site: &SiteSpec,
        prior: &PriorStatus,
        transition: Transition,
        confirmed: &Confirmed,
        now: DateTime<Utc>,
        outcome: &mut SiteOutcome,
    ) -> MonitorResult<()> {
        let status = transition.new;
        if !should_persist(prior.status, status, self.settings.force_write) {
            debug!(slug = %site.slug, %status, "status unchanged, nothing to write");
            return Ok(());
        }

        let record = SiteHistoryRecord::new(
            site,
            status,
            outcome.code,
            outcome.response_time_ms,
            prior.start_time_for(status, now),
            now,
        );
        self.history
            .write(&site.slug, &record)
            .map_err(|source| MonitorError::History {
                slug: site.slug.clone(),
                source,
            })?;
        outcome.persisted = true;

        let message = self.settings.templates.commit_message(
            site,
            status,
            confirmed.outcome.raw.http_code,
            outcome.response_time_ms,
        );
        let sha = self
            .vcs
            .commit(&message, &self.settings.author)
            .await
            .map_err(|source| MonitorError::Commit {
                slug: site.slug.clone(),
                source,
            })?;
        outcome.commit = Some(sha.clone());

        if !transition.changed() {
            return Ok(());
        }
        info!(slug = %site.slug, previous = %transition.previous, %status, "status changed");

        let existing = if transition.needs_issue_lookup() {
            self.tracker
                .list_open_by_label(&[site.slug.as_str()])
                .await
                .map_err(|source| tracker_error(site, source))?
                .into_iter()
                .next()
        } else {
            None
        };

        let action = transition.decide(existing.is_some());
        outcome.action = action;

        let url = self.tracker.commit_url(&sha);
        let commit = CommitRef { sha: &sha, url: &url };
        match (action, existing) {
            (IncidentAction::OpenNew, _) => {
                self.open_incident(site, status, outcome, commit).await?;
            }
            (IncidentAction::ResolveAndClose, Some(issue)) => {
                outcome.issue = Some(issue.number);
                self.resolve_incident(site, &issue, commit).await?;
            }
            (IncidentAction::KeepOpen, Some(issue)) => {
                info!(slug = %site.slug, issue = issue.number, "incident already open");
            }
            _ => {}
        }
        Ok(())
    }

    async fn open_incident(
        &self,
        site: &SiteSpec,
        status: StatusVerdict,
        outcome: &mut SiteOutcome,
        commit: CommitRef<'_>,
    ) -> MonitorResult<()> {
        let new_issue =
            render::incident_issue(site, status, outcome.code, outcome.response_time_ms, commit);
        let issue = self
            .tracker
            .create_issue(&new_issue)
            .await
            .map_err(|source| tracker_error(site, source))?;
        outcome.issue = Some(issue.number);

        let assignees: Vec<String> = self
            .settings
            .assignees
            .iter()
            .chain(&site.assignees)
            .cloned()
            .collect();
        if !assignees.is_empty() {
            self.tracker
                .add_assignees(issue.number, &assignees)
                .await
                .map_err(|source| tracker_error(site, source))?;
        }
        self.tracker
            .lock_issue(issue.number)
            .await
            .map_err(|source| tracker_error(site, source))?;
        info!(slug = %site.slug, issue = issue.number, %status, "opened incident");

        self.notify(site, &render::opened_notification(site, status, &issue.html_url))
            .await;
        Ok(())
    }

    async fn resolve_incident(
        &self,
        site: &SiteSpec,
        issue: &Issue,
        commit: CommitRef<'_>,
    ) -> MonitorResult<()> {
        self.tracker
            .add_comment(issue.number, &render::resolved_comment(site, &issue.title, commit))
            .await
            .map_err(|source| tracker_error(site, source))?;
        self.tracker
            .close_issue(issue.number)
            .await
            .map_err(|source| tracker_error(site, source))?;
        info!(slug = %site.slug, issue = issue.number, "resolved incident");

        self.notify(site, &render::resolved_notification(site, &issue.title))
            .await;
        Ok(())
    }

    async fn notify(&self, site: &SiteSpec, message: &str) {
        if let Err(e) = self.notifier.send(message).await {
            warn!(slug = %site.slug, error = %e, "notification failed");
        }
    }
}

fn tracker_error(site: &SiteSpec, source: anyhow::Error) -> MonitorError {
    MonitorError::Tracker {
        slug: site.slug.clone(),
        source,
    }
}
