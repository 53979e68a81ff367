//! Confirmation retries.
//!
//! A down or degraded first verdict is re-checked twice before it is
//! accepted, so a transient blip does not open an incident:
//!
//! ```text
//! probe ─ up ──────────────────────────────────────────────▶ accept
//!   └ down/degraded ─ cool-down 1 ─ probe ─ up ────────────▶ accept retry
//!                                     └ not up ─ cool-down 2 ─ probe ─ up ─▶ accept retry
//!                                                               └ not up ─▶ keep first
//! ```
//!
//! At most three probes per site per cycle. Waiting goes through
//! [`Sleeper`] so the policy can be tested without real time passing.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use upwatch_core::{RawProbeResult, SiteSpec, StatusVerdict};

use crate::checker::CheckStrategy;
use crate::classify::classify;

/// Named suspension points between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoolDown {
    First,
    Second,
}

impl CoolDown {
    fn next(self) -> Option<CoolDown> {
        match self {
            CoolDown::First => Some(CoolDown::Second),
            CoolDown::Second => None,
        }
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, stage: CoolDown, duration: Duration);
}

/// Real waiting on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, _stage: CoolDown, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cool-down lengths. The second is ten times the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, stage: CoolDown) -> Duration {
        match stage {
            CoolDown::First => self.unit,
            CoolDown::Second => self.unit * 10,
        }
    }
}

/// One classified attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub raw: RawProbeResult,
    pub status: StatusVerdict,
}

impl ProbeOutcome {
    pub async fn run(site: &SiteSpec, strategy: &dyn CheckStrategy) -> Self {
        let raw = strategy.probe(site).await;
        let status = classify(site, &raw);
        Self { raw, status }
    }
}

/// The verdict a cycle acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmed {
    pub outcome: ProbeOutcome,
    /// Probes spent, 1 to 3.
    pub attempts: u8,
}

pub struct RetryCoordinator<S = TokioSleeper> {
    policy: RetryPolicy,
    sleeper: S,
}

impl Default for RetryCoordinator<TokioSleeper> {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), TokioSleeper)
    }
}

impl<S: Sleeper> RetryCoordinator<S> {
    pub fn new(policy: RetryPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    /// Probe once, then confirm.
    pub async fn check(&self, site: &SiteSpec, strategy: &dyn CheckStrategy) -> Confirmed {
        let first = ProbeOutcome::run(site, strategy).await;
        self.confirm(site, first, strategy).await
    }

    /// Re-probe a non-up first attempt. Only an `up` retry replaces the
    /// first attempt; otherwise the first attempt's result stands.
    pub async fn confirm(
        &self,
        site: &SiteSpec,
        first: ProbeOutcome,
        strategy: &dyn CheckStrategy,
    ) -> Confirmed {
        if first.status == StatusVerdict::Up {
            return Confirmed {
                outcome: first,
                attempts: 1,
            };
        }

        let mut attempts = 1;
        let mut stage = Some(CoolDown::First);
        while let Some(cool_down) = stage {
            let delay = self.policy.delay(cool_down);
            debug!(slug = %site.slug, ?cool_down, ?delay, status = %first.status, "confirming");
            self.sleeper.sleep(cool_down, delay).await;

            let retry = ProbeOutcome::run(site, strategy).await;
            attempts += 1;
            if retry.status == StatusVerdict::Up {
                info!(slug = %site.slug, attempts, "recovered on retry, treating as up");
                return Confirmed {
                    outcome: retry,
                    attempts,
                };
            }
            stage = cool_down.next();
        }

        Confirmed {
            outcome: first,
            attempts,
        }
    }
}
