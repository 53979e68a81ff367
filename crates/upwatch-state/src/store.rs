//! History stores.
//!
//! [`HistoryStore`] is the narrow interface the monitor cycle uses. Two
//! backends implement it: [`StateStore`] keeps records in an embedded redb
//! database (in-memory for tests), and [`crate::HistoryDir`] writes one
//! YAML file per site for consumption by status pages.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::HISTORY;
use crate::types::SiteHistoryRecord;

/// Per-site history keyed by slug.
pub trait HistoryStore: Send + Sync {
    /// `Ok(None)` when the site has never been recorded.
    fn read(&self, slug: &str) -> StateResult<Option<SiteHistoryRecord>>;

    fn write(&self, slug: &str, record: &SiteHistoryRecord) -> StateResult<()>;
}

/// History in a single redb file, selected with `historyBackend: redb`.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open the database at `path`, creating the file and its parent
    /// directory when missing.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StateError::File {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let store = Self::init(Database::create(path)?)?;
        debug!(?path, "history database opened");
        Ok(store)
    }

    pub fn open_in_memory() -> StateResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    /// Create the table up front so readers never see it missing.
    fn init(db: Database) -> StateResult<Self> {
        let txn = db.begin_write()?;
        txn.open_table(HISTORY)?;
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl HistoryStore for StateStore {
    fn read(&self, slug: &str) -> StateResult<Option<SiteHistoryRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(HISTORY)?;
        let Some(value) = table.get(slug)? else {
            return Ok(None);
        };
        serde_json::from_slice(value.value())
            .map(Some)
            .map_err(|e| StateError::Deserialize(e.to_string()))
    }

    fn write(&self, slug: &str, record: &SiteHistoryRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(|e| StateError::Serialize(e.to_string()))?;
        let txn = self.db.begin_write()?;
        txn.open_table(HISTORY)?.insert(slug, value.as_slice())?;
        txn.commit()?;
        debug!(%slug, status = %record.status, "history record stored");
        Ok(())
    }
}
