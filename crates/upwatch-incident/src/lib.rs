//! upwatch-incident — what to do about a status change.
//!
//! - [`maintenance`]: parse maintenance issues into windows, split off
//!   expired ones, answer "was this status announced?"
//! - [`machine`]: previous/new status plus context to an [`IncidentAction`]
//! - [`render`]: commit messages, issue text, notification text
//!
//! Nothing here performs I/O.

pub mod machine;
pub mod maintenance;
pub mod render;

pub use machine::{decide, should_persist, IncidentAction, Transition};
pub use maintenance::{parse_window, resolve, ActiveWindows, MaintenanceWindow, Resolution, MAINTENANCE_LABEL};
pub use render::{CommitRef, MessageTemplates, StatusPrefixes};
