//! YAML history files, one per site (`{dir}/{slug}.yml`).
//!
//! This is the layout status pages read, so parsing is forgiving: list
//! markers (`- `) at line starts are ignored, missing fields fall back to
//! defaults, and timestamps accept anything [`parse_timestamp`] does.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use upwatch_core::{parse_timestamp, StatusVerdict};

use crate::error::{StateError, StateResult};
use crate::store::HistoryStore;
use crate::types::{SiteHistoryRecord, GENERATOR};

/// Directory of per-site YAML history files.
#[derive(Debug, Clone)]
pub struct HistoryDir {
    root: PathBuf,
}

/// Shape of a history file as found on disk; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LooseRecord {
    url: Option<String>,
    status: Option<String>,
    code: Option<u16>,
    response_time: Option<u64>,
    last_updated: Option<String>,
    start_time: Option<String>,
    generator: Option<String>,
}

impl HistoryDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the history file for `slug`.
    pub fn path_for(&self, slug: &str) -> PathBuf {
        self.root.join(format!("{slug}.yml"))
    }
}

impl HistoryStore for HistoryDir {
    fn read(&self, slug: &str) -> StateResult<Option<SiteHistoryRecord>> {
        let path = self.path_for(slug);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StateError::File { path, source }),
        };
        parse_history(&content).map(Some)
    }

    fn write(&self, slug: &str, record: &SiteHistoryRecord) -> StateResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|source| StateError::File {
            path: self.root.clone(),
            source,
        })?;
        let path = self.path_for(slug);
        let yaml = serde_yaml::to_string(record).map_err(|e| StateError::Serialize(e.to_string()))?;
        std::fs::write(&path, yaml).map_err(|source| StateError::File {
            path: path.clone(),
            source,
        })?;
        debug!(?path, status = %record.status, "history file written");
        Ok(())
    }
}

fn parse_history(content: &str) -> StateResult<SiteHistoryRecord> {
    let normalized: String = content
        .lines()
        .map(|line| line.strip_prefix("- ").unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n");

    let loose: LooseRecord =
        serde_yaml::from_str(&normalized).map_err(|e| StateError::Deserialize(e.to_string()))?;

    let last_updated = loose.last_updated.as_deref().and_then(parse_timestamp);
    let start_time = loose
        .start_time
        .as_deref()
        .and_then(parse_timestamp)
        .or(last_updated)
        .ok_or_else(|| StateError::Deserialize("history has no usable startTime".to_string()))?;

    Ok(SiteHistoryRecord {
        url: loose.url.unwrap_or_default(),
        status: loose
            .status
            .as_deref()
            .map(|s| s.parse().unwrap_or(StatusVerdict::Unknown))
            .unwrap_or_default(),
        code: loose.code.unwrap_or_default(),
        response_time: loose.response_time.unwrap_or_default(),
        last_updated: last_updated.unwrap_or(start_time),
        start_time,
        generator: loose.generator.unwrap_or_else(|| GENERATOR.to_string()),
    })
}
