//! Incident state machine.
//!
//! Decides, from a site's previous and newly confirmed status, whether an
//! incident issue is opened, left alone, or resolved. Pure; the caller
//! performs the side effects.
//!
//! | previous | new          | expected | open issue | action            |
//! |----------|--------------|----------|------------|-------------------|
//! | X        | X            | any      | any        | none              |
//! | any      | down/degr.   | yes      | any        | none              |
//! | any      | down/degr.   | no       | none       | open new          |
//! | any      | down/degr.   | no       | exists     | keep open         |
//! | any      | up           | n/a      | exists     | resolve and close |
//! | any      | up           | n/a      | none       | none              |
//! | any      | unknown      | n/a      | any        | none              |

use tracing::{debug, warn};

use upwatch_core::StatusVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentAction {
    None,
    OpenNew,
    /// Already tracked; a down to degraded flip stays on the same issue.
    KeepOpen,
    ResolveAndClose,
}

/// One site's status change, as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: StatusVerdict,
    pub new: StatusVerdict,
    /// The new status was announced by an active maintenance window.
    pub expected: bool,
}

impl Transition {
    pub fn new(previous: StatusVerdict, new: StatusVerdict, expected: bool) -> Self {
        Self {
            previous,
            new,
            expected,
        }
    }

    pub fn changed(&self) -> bool {
        self.previous != self.new
    }

    /// Whether deciding needs to know about an existing issue. Lets the
    /// caller skip the tracker lookup when no action is possible.
    pub fn needs_issue_lookup(&self) -> bool {
        if !self.changed() {
            return false;
        }
        match self.new {
            StatusVerdict::Down | StatusVerdict::Degraded => !self.expected,
            StatusVerdict::Up => true,
            StatusVerdict::Unknown => false,
        }
    }

    /// The action for this transition given whether the site already has an
    /// open incident issue.
    pub fn decide(&self, existing_issue: bool) -> IncidentAction {
        if !self.changed() {
            return IncidentAction::None;
        }

        match self.new {
            StatusVerdict::Down | StatusVerdict::Degraded => {
                if self.expected {
                    debug!(status = %self.new, "status announced by maintenance, no incident");
                    IncidentAction::None
                } else if existing_issue {
                    IncidentAction::KeepOpen
                } else {
                    IncidentAction::OpenNew
                }
            }
            StatusVerdict::Up => {
                if existing_issue {
                    IncidentAction::ResolveAndClose
                } else {
                    if self.previous.is_outage() {
                        warn!(previous = %self.previous, "site recovered but no open incident was found");
                    }
                    IncidentAction::None
                }
            }
            StatusVerdict::Unknown => IncidentAction::None,
        }
    }
}

pub fn decide(
    previous: StatusVerdict,
    new: StatusVerdict,
    expected: bool,
    existing_issue: bool,
) -> IncidentAction {
    Transition::new(previous, new, expected).decide(existing_issue)
}

/// Whether a history record is written this cycle.
pub fn should_persist(previous: StatusVerdict, new: StatusVerdict, forced: bool) -> bool {
    forced || previous != new
}
