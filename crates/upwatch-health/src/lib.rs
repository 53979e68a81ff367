//! upwatch-health — probing sites and turning results into incidents.
//!
//! # Architecture
//!
//! ```text
//! MonitorCycle
//!   ├── maintenance windows (upwatch-incident)
//!   └── per site, sequentially
//!       ├── HistoryStore::read → previous status
//!       ├── RetryCoordinator
//!       │   ├── CheckStrategy::probe (http | tcp | websocket) → RawProbeResult
//!       │   └── classify → StatusVerdict
//!       ├── HistoryStore::write + Vcs::commit
//!       └── Transition::decide → IssueTracker / Notifier
//! ```
//!
//! Probes never fail: transport errors become a result with code 0, which
//! classifies as down.

pub mod checker;
pub mod classify;
pub mod error;
pub mod monitor;
pub mod retry;
pub mod websocket;

pub use checker::{default_tls_config, CheckStrategy, Checks, HttpCheck, TcpCheck};
pub use classify::classify;
pub use error::{MonitorError, MonitorResult, ProbeError};
pub use monitor::{CycleReport, CycleSettings, MonitorCycle, SiteOutcome};
pub use retry::{Confirmed, CoolDown, ProbeOutcome, RetryCoordinator, RetryPolicy, Sleeper, TokioSleeper};
pub use websocket::WebSocketCheck;
