use redb::TableDefinition;

/// Latest record per site: slug to JSON-encoded [`crate::SiteHistoryRecord`].
pub const HISTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("site_history");
