//! Session store: lookups and guarded saves over a [`SessionTable`].
//!
//! # Data flow
//!
//! ```text
//! find_by_session_id ─► SchemaResolver ─► IdStrategy::lookup ─► SessionRecord
//! save ─► serialize_if_loaded ─► enforce_size_limit ─► insert / update
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::codec::{SessionCodec, codec_for};
use crate::config::SessionStoreConfig;
use crate::error::{Result, SchemaError};
use crate::record::SessionRecord;
use crate::schema::{IdStrategy, SchemaResolver, SchemaState};
use crate::sqlite::SqliteSessionTable;
use crate::storage::{SessionTable, find_column};

/// Session rows in one table, with a configured layout and codec.
pub struct SessionStore<T: SessionTable> {
    table: T,
    config: SessionStoreConfig,
    codec: Arc<dyn SessionCodec>,
    resolver: Arc<SchemaResolver>,
    // Outer None: not looked up yet. Inner None: column has no declared size.
    data_limit: Mutex<Option<Option<usize>>>,
}

impl<T: SessionTable> std::fmt::Debug for SessionStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("table", &self.table.name())
            .field("config", &self.config)
            .field("schema", &self.resolver.state())
            .finish_non_exhaustive()
    }
}

impl SessionStore<SqliteSessionTable> {
    /// Store over a SQLite database file, using `config.table_name`.
    pub fn open_sqlite(path: &Path, config: SessionStoreConfig) -> Result<Self> {
        config.validate()?;
        let table = SqliteSessionTable::open(path, config.table_name.clone())?;
        Self::new(table, config)
    }

    /// Store over a private in-memory SQLite database.
    pub fn open_in_memory(config: SessionStoreConfig) -> Result<Self> {
        config.validate()?;
        let table = SqliteSessionTable::open_in_memory(config.table_name.clone())?;
        Self::new(table, config)
    }
}

impl<T: SessionTable> SessionStore<T> {
    /// Store with its own schema resolver and the configured codec.
    pub fn new(table: T, config: SessionStoreConfig) -> Result<Self> {
        config.validate()?;
        let codec = codec_for(config.codec);
        Ok(Self {
            table,
            config,
            codec,
            resolver: Arc::new(SchemaResolver::new()),
            data_limit: Mutex::new(None),
        })
    }

    /// Share a resolver, e.g. [`SchemaResolver::shared`], across stores
    /// over the same table.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<SchemaResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn SessionCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn config(&self) -> &SessionStoreConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    pub fn schema_state(&self) -> SchemaState {
        self.resolver.state()
    }

    fn strategy(&self) -> Result<Arc<IdStrategy>> {
        self.resolver.strategy(&self.table, &self.config)
    }

    /// Unsaved record for an externally issued identifier.
    #[must_use]
    pub fn new_record(&self, session_id: impl Into<String>) -> SessionRecord {
        SessionRecord::new(session_id, Arc::clone(&self.codec))
    }

    /// Zero-or-one stored session for `session_id`.
    pub fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let strategy = self.strategy()?;
        let row = strategy.lookup(&self.table, &self.config.data_column, session_id)?;
        debug!(
            table = %self.table.name(),
            id_column = %strategy.column(),
            found = row.is_some(),
            "Session lookup"
        );
        Ok(row.map(|row| SessionRecord::from_row(row, strategy.mode(), Arc::clone(&self.codec))))
    }

    /// Stored session for `session_id`, or a fresh record carrying it.
    pub fn find_or_new(&self, session_id: &str) -> Result<SessionRecord> {
        match self.find_by_session_id(session_id)? {
            Some(record) => Ok(record),
            None => Ok(self.new_record(session_id)),
        }
    }

    /// Persist a record.
    ///
    /// Runs the serialize hook, then the size hook, then inserts or updates
    /// the row. On `Error::SessionOverflow` nothing is written.
    pub fn save(&self, record: &mut SessionRecord) -> Result<()> {
        record.serialize_if_loaded()?;

        if record.is_loaded() {
            let limit = self.data_column_size_limit()?;
            if let Err(overflow) = record.enforce_size_limit(limit) {
                warn!(
                    table = %self.table.name(),
                    size = overflow.size,
                    limit = overflow.limit,
                    "Rejected oversize session save"
                );
                return Err(overflow.into());
            }
        }

        let strategy = self.strategy()?;
        let binding = strategy.binding(&self.config.data_column);
        let rowid = match record.rowid() {
            Some(rowid) => {
                self.table
                    .update(binding, rowid, record.session_id(), record.raw_payload())?;
                rowid
            }
            None => self
                .table
                .insert(binding, record.session_id(), record.raw_payload())?,
        };
        record.mark_persisted(rowid, strategy.mode());

        debug!(
            table = %self.table.name(),
            rowid,
            payload_len = record.payload_size(),
            "Saved session"
        );
        Ok(())
    }

    /// Delete the stored session for `session_id`. Returns whether a row
    /// was removed.
    pub fn destroy(&self, session_id: &str) -> Result<bool> {
        let strategy = self.strategy()?;
        let removed = self
            .table
            .delete(strategy.binding(&self.config.data_column), session_id)?;
        debug!(table = %self.table.name(), removed, "Destroyed session");
        Ok(removed > 0)
    }

    /// Payload column capacity in bytes, `None` when the column has no
    /// declared size. Read from the table once and memoized.
    pub fn data_column_size_limit(&self) -> Result<Option<usize>> {
        if let Some(limit) = self.config.data_column_limit {
            return Ok(Some(limit));
        }

        let mut memo = match self.data_limit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(limit) = *memo {
            return Ok(limit);
        }

        let columns = self.table.columns()?;
        if columns.is_empty() {
            return Err(SchemaError::TableMissing {
                table: self.table.name().to_string(),
            }
            .into());
        }
        let column = find_column(&columns, &self.config.data_column).ok_or_else(|| {
            SchemaError::MissingDataColumn {
                table: self.table.name().to_string(),
                column: self.config.data_column.clone(),
            }
        })?;
        *memo = Some(column.limit);
        debug!(
            table = %self.table.name(),
            column = %column.name,
            limit = ?column.limit,
            "Read payload column capacity"
        );
        Ok(column.limit)
    }

    /// Forget cached column metadata (identifier binding and payload
    /// capacity), e.g. after a migration.
    pub fn invalidate_schema(&self) {
        self.resolver.invalidate();
        let mut memo = match self.data_limit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *memo = None;
    }
}
