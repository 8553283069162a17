//! Identifier column negotiation.
//!
//! Older session tables name the identifier column `sessid` instead of
//! `session_id`. The first identifier lookup inspects the live table and
//! binds an [`IdStrategy`]; every later lookup reuses it until the binding
//! is invalidated (e.g. after a migration).
//!
//! # Locking
//!
//! ```text
//! strategy() ──read lock──► bound? ──yes──► Arc<IdStrategy>
//!                              │no
//!                              ▼
//!                        gate (Mutex) ──► bound? (re-check) ──► columns() ──► bind
//! ```
//!
//! The gate admits one resolver at a time, and the re-check under the gate
//! keeps concurrent first lookups from resolving twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use tracing::{debug, info};

use crate::config::SessionStoreConfig;
use crate::error::{Error, SchemaError};
use crate::storage::{ColumnInfo, RowBinding, SessionRow, SessionTable, find_column};

/// Which identifier column the table exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdColumnMode {
    /// `session_id`
    Standard,
    /// `sessid`
    Legacy,
}

/// Observable resolver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Unresolved,
    Resolved(IdColumnMode),
}

/// Bound identifier behavior: which column the accessor maps to and how
/// lookups by identifier are issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdStrategy {
    mode: IdColumnMode,
    column: String,
}

impl IdStrategy {
    #[must_use]
    pub fn standard(column: impl Into<String>) -> Self {
        Self {
            mode: IdColumnMode::Standard,
            column: column.into(),
        }
    }

    #[must_use]
    pub fn legacy(column: impl Into<String>) -> Self {
        Self {
            mode: IdColumnMode::Legacy,
            column: column.into(),
        }
    }

    /// Pick a strategy from column metadata. A legacy column wins when both
    /// are present.
    pub fn from_columns(
        table: &str,
        columns: &[ColumnInfo],
        config: &SessionStoreConfig,
    ) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::TableMissing {
                table: table.to_string(),
            });
        }
        if let Some(col) = find_column(columns, &config.legacy_id_column) {
            return Ok(Self::legacy(col.name.clone()));
        }
        if let Some(col) = find_column(columns, &config.id_column) {
            return Ok(Self::standard(col.name.clone()));
        }
        Err(SchemaError::MissingIdColumn {
            table: table.to_string(),
            standard: config.id_column.clone(),
            legacy: config.legacy_id_column.clone(),
        })
    }

    #[must_use]
    pub fn mode(&self) -> IdColumnMode {
        self.mode
    }

    /// Physical column backing the session identifier accessor.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    #[must_use]
    pub fn binding<'a>(&'a self, data_column: &'a str) -> RowBinding<'a> {
        RowBinding {
            id_column: &self.column,
            data_column,
        }
    }

    /// Look up a row by identifier through the bound column.
    pub fn lookup(
        &self,
        table: &dyn SessionTable,
        data_column: &str,
        session_id: &str,
    ) -> Result<Option<SessionRow>, Error> {
        if self.mode == IdColumnMode::Legacy {
            debug!(column = %self.column, "Looking up session by legacy identifier column");
        }
        Ok(table.find_by(self.binding(data_column), session_id)?)
    }
}

static SHARED_RESOLVER: OnceLock<Arc<SchemaResolver>> = OnceLock::new();

/// One-time, lock-guarded identifier column negotiation.
#[derive(Debug, Default)]
pub struct SchemaResolver {
    bound: RwLock<Option<Arc<IdStrategy>>>,
    gate: Mutex<()>,
    resolutions: AtomicU64,
}

impl SchemaResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide resolver, for hosts with a single sessions table.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(SHARED_RESOLVER.get_or_init(|| Arc::new(Self::new())))
    }

    /// Bound strategy, resolving it on first use.
    pub fn strategy(
        &self,
        table: &dyn SessionTable,
        config: &SessionStoreConfig,
    ) -> Result<Arc<IdStrategy>, Error> {
        if let Some(strategy) = self.current() {
            return Ok(strategy);
        }

        let _gate = match self.gate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Another caller may have resolved while we waited on the gate.
        if let Some(strategy) = self.current() {
            return Ok(strategy);
        }

        let columns = table.columns()?;
        let strategy = Arc::new(IdStrategy::from_columns(table.name(), &columns, config)?);

        let mut bound = match self.bound.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *bound = Some(Arc::clone(&strategy));
        drop(bound);

        let resolutions = self.resolutions.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            table = %table.name(),
            id_column = %strategy.column(),
            mode = ?strategy.mode(),
            resolutions,
            "Resolved session identifier column"
        );
        Ok(strategy)
    }

    /// Currently bound strategy, without resolving.
    #[must_use]
    pub fn current(&self) -> Option<Arc<IdStrategy>> {
        let bound = match self.bound.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        bound.clone()
    }

    #[must_use]
    pub fn state(&self) -> SchemaState {
        self.current()
            .map_or(SchemaState::Unresolved, |s| SchemaState::Resolved(s.mode()))
    }

    /// Drop the binding; the next lookup re-reads column metadata.
    pub fn invalidate(&self) {
        let _gate = match self.gate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut bound = match self.bound.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if bound.take().is_some() {
            debug!("Invalidated session identifier binding");
        }
    }

    /// Number of resolutions performed so far.
    #[must_use]
    pub fn resolution_count(&self) -> u64 {
        self.resolutions.load(Ordering::Acquire)
    }
}
