//! upwatch-core — shared types, configuration, and collaborator ports.

pub mod config;
pub mod ports;
pub mod slug;
pub mod time;
pub mod types;

pub use config::{ConfigError, ConfigResult, HistoryBackend, UpwatchConfig};
pub use ports::{IssueTracker, Notifier, NullNotifier, Vcs};
pub use slug::slugify;
pub use time::parse_timestamp;
pub use types::*;
