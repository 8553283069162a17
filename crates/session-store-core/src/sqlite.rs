//! SQLite-backed [`SessionTable`].
//!
//! Column capacities come from declared types (`VARCHAR(n)`), which SQLite
//! records but does not enforce; the store enforces them on save instead.
//!
//! Payloads are read as raw bytes whatever their storage class, and written
//! back in the class they came from: text payloads are bound as bytes and
//! cast to TEXT so invalid UTF-8 survives a round trip.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::config::is_identifier;
use crate::error::{ConfigError, Error, StorageError};
use crate::schema::IdColumnMode;
use crate::storage::{ColumnInfo, RowBinding, SessionRow, SessionTable, StoredPayload};

/// Sessions table stored in a SQLite database.
pub struct SqliteSessionTable {
    conn: Mutex<Connection>,
    table: String,
}

impl std::fmt::Debug for SqliteSessionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionTable")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SqliteSessionTable {
    /// Wrap an open connection.
    pub fn new(conn: Connection, table: impl Into<String>) -> Result<Self, Error> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(ConfigError::InvalidIdentifier {
                field: "table_name",
                value: table,
            }
            .into());
        }
        Ok(Self {
            conn: Mutex::new(conn),
            table,
        })
    }

    /// Open (or create) a database file.
    pub fn open(path: &Path, table: impl Into<String>) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::new(conn, table)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory(table: impl Into<String>) -> Result<Self, Error> {
        Self::new(Connection::open_in_memory()?, table)
    }

    /// Create the sessions table if it does not exist.
    ///
    /// `id_column` is the identifier column to create; `data_limit` declares
    /// the payload column as `VARCHAR(n)` instead of `TEXT`.
    pub fn create_schema(
        &self,
        id_column: &str,
        data_column: &str,
        data_limit: Option<usize>,
    ) -> Result<(), Error> {
        for (field, value) in [("id_column", id_column), ("data_column", data_column)] {
            if !is_identifier(value) {
                return Err(ConfigError::InvalidIdentifier {
                    field,
                    value: value.to_string(),
                }
                .into());
            }
        }
        let data_type = data_limit.map_or_else(|| "TEXT".to_string(), |n| format!("VARCHAR({n})"));
        let table = &self.table;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                \"{id_column}\" VARCHAR(255) NOT NULL,
                \"{data_column}\" {data_type}
            );
            CREATE INDEX IF NOT EXISTS \"index_{table}_on_{id_column}\"
                ON \"{table}\" (\"{id_column}\");"
        );
        self.lock().execute_batch(&sql)?;
        info!(table = %table, id_column, data_column, data_type = %data_type, "Ensured sessions table");
        Ok(())
    }

    /// Create the table with the identifier column implied by `mode`.
    pub fn create_schema_for(
        &self,
        mode: IdColumnMode,
        config: &crate::config::SessionStoreConfig,
    ) -> Result<(), Error> {
        let id_column = match mode {
            IdColumnMode::Standard => &config.id_column,
            IdColumnMode::Legacy => &config.legacy_id_column,
        };
        self.create_schema(id_column, &config.data_column, config.data_column_limit)
    }

    /// Run a closure against the underlying connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn payload_from_sql(value: ValueRef<'_>) -> Option<StoredPayload> {
    match value {
        ValueRef::Null => None,
        ValueRef::Text(bytes) => Some(StoredPayload::Text(bytes.to_vec())),
        ValueRef::Blob(bytes) => Some(StoredPayload::Blob(bytes.to_vec())),
        ValueRef::Integer(n) => Some(StoredPayload::text(n.to_string())),
        ValueRef::Real(f) => Some(StoredPayload::text(f.to_string())),
    }
}

/// SQL expression binding a payload parameter in its storage class.
fn payload_expr(data: Option<&StoredPayload>, param: &str) -> String {
    match data {
        Some(StoredPayload::Text(_)) => format!("CAST({param} AS TEXT)"),
        Some(StoredPayload::Blob(_)) | None => param.to_string(),
    }
}

impl SessionTable for SqliteSessionTable {
    fn name(&self) -> &str {
        &self.table
    }

    fn columns(&self) -> Result<Vec<ColumnInfo>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", self.table))?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared_type: String = row.get(2)?;
                Ok(ColumnInfo::new(name, declared_type))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(table = %self.table, count = columns.len(), "Read column metadata");
        Ok(columns)
    }

    fn find_by(
        &self,
        binding: RowBinding<'_>,
        session_id: &str,
    ) -> Result<Option<SessionRow>, StorageError> {
        let sql = format!(
            "SELECT id, \"{id}\", \"{data}\" FROM \"{table}\" WHERE \"{id}\" = ?1 ORDER BY id LIMIT 1",
            id = binding.id_column,
            data = binding.data_column,
            table = self.table,
        );
        let row = self
            .lock()
            .query_row(&sql, [session_id], |row| {
                Ok(SessionRow {
                    rowid: row.get(0)?,
                    session_id: row.get(1)?,
                    data: payload_from_sql(row.get_ref(2)?),
                })
            })
            .optional()?;
        Ok(row)
    }

    fn insert(
        &self,
        binding: RowBinding<'_>,
        session_id: &str,
        data: Option<&StoredPayload>,
    ) -> Result<i64, StorageError> {
        let sql = format!(
            "INSERT INTO \"{table}\" (\"{id}\", \"{data}\") VALUES (?1, {value})",
            table = self.table,
            id = binding.id_column,
            data = binding.data_column,
            value = payload_expr(data, "?2"),
        );
        let bytes = data.map(StoredPayload::as_bytes);
        let conn = self.lock();
        conn.execute(&sql, params![session_id, bytes])?;
        Ok(conn.last_insert_rowid())
    }

    fn update(
        &self,
        binding: RowBinding<'_>,
        rowid: i64,
        session_id: &str,
        data: Option<&StoredPayload>,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "UPDATE \"{table}\" SET \"{id}\" = ?1, \"{data}\" = {value} WHERE id = ?3",
            table = self.table,
            id = binding.id_column,
            data = binding.data_column,
            value = payload_expr(data, "?2"),
        );
        let bytes = data.map(StoredPayload::as_bytes);
        let changed = self.lock().execute(&sql, params![session_id, bytes, rowid])?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!(
                "{} row {rowid}",
                self.table
            )));
        }
        Ok(())
    }

    fn delete(&self, binding: RowBinding<'_>, session_id: &str) -> Result<usize, StorageError> {
        let sql = format!(
            "DELETE FROM \"{table}\" WHERE \"{id}\" = ?1",
            table = self.table,
            id = binding.id_column,
        );
        Ok(self.lock().execute(&sql, [session_id])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANDARD: RowBinding<'static> = RowBinding {
        id_column: "session_id",
        data_column: "data",
    };

    fn make_table() -> SqliteSessionTable {
        let table = SqliteSessionTable::open_in_memory("sessions").unwrap();
        table.create_schema("session_id", "data", None).unwrap();
        table
    }

    #[test]
    fn rejects_non_identifier_table_names() {
        let err = SqliteSessionTable::open_in_memory("sessions\"--").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidIdentifier { .. })));
    }

    #[test]
    fn columns_of_missing_table_are_empty() {
        let table = SqliteSessionTable::open_in_memory("sessions").unwrap();
        assert!(table.columns().unwrap().is_empty());
    }

    #[test]
    fn create_schema_declares_payload_capacity() {
        let table = SqliteSessionTable::open_in_memory("sessions").unwrap();
        table.create_schema("sessid", "data", Some(10)).unwrap();
        let columns = table.columns().unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "sessid", "data"]);
        assert_eq!(columns[2].limit, Some(10));
        assert_eq!(columns[2].declared_type, "VARCHAR(10)");
    }

    #[test]
    fn create_schema_is_idempotent() {
        let table = make_table();
        table.create_schema("session_id", "data", None).unwrap();
        assert_eq!(table.columns().unwrap().len(), 3);
    }

    #[test]
    fn insert_find_update_delete() {
        let table = make_table();

        assert!(table.find_by(STANDARD, "abc").unwrap().is_none());

        let rowid = table
            .insert(STANDARD, "abc", Some(&"payload".into()))
            .unwrap();
        let row = table.find_by(STANDARD, "abc").unwrap().unwrap();
        assert_eq!(
            row,
            SessionRow {
                rowid,
                session_id: "abc".into(),
                data: Some(StoredPayload::text("payload")),
            }
        );

        table.update(STANDARD, rowid, "abc", None).unwrap();
        assert_eq!(table.find_by(STANDARD, "abc").unwrap().unwrap().data, None);

        assert_eq!(table.delete(STANDARD, "abc").unwrap(), 1);
        assert!(table.find_by(STANDARD, "abc").unwrap().is_none());
        assert_eq!(table.delete(STANDARD, "abc").unwrap(), 0);
    }

    fn storage_class(table: &SqliteSessionTable, rowid: i64) -> (String, Vec<u8>) {
        table.with_connection(|conn| {
            conn.query_row(
                "SELECT typeof(data), CAST(data AS BLOB) FROM sessions WHERE id = ?1",
                [rowid],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap()
        })
    }

    #[test]
    fn blob_and_non_utf8_text_payloads_load_as_bytes() {
        let table = make_table();
        table.with_connection(|conn| {
            conn.execute_batch(
                "INSERT INTO sessions (session_id, data) VALUES ('blob', X'04086F3A0A');
                 INSERT INTO sessions (session_id, data) VALUES ('text', CAST(X'FFFE00C3' AS TEXT));
                 INSERT INTO sessions (session_id, data) VALUES ('int', 42);",
            )
            .unwrap();
        });

        let blob = table.find_by(STANDARD, "blob").unwrap().unwrap();
        assert_eq!(
            blob.data,
            Some(StoredPayload::Blob(vec![0x04, 0x08, 0x6f, 0x3a, 0x0a]))
        );
        let text = table.find_by(STANDARD, "text").unwrap().unwrap();
        assert_eq!(
            text.data,
            Some(StoredPayload::Text(vec![0xff, 0xfe, 0x00, 0xc3]))
        );
        let int = table.find_by(STANDARD, "int").unwrap().unwrap();
        assert_eq!(int.data, Some(StoredPayload::text("42")));
    }

    #[test]
    fn payload_writes_keep_storage_class_and_bytes() {
        let table = make_table();
        let blob = StoredPayload::Blob(vec![0x04, 0x08, 0x00, 0xff]);
        let text = StoredPayload::Text(vec![0xff, 0xfe, 0x00, 0xc3]);

        let rowid = table.insert(STANDARD, "abc", Some(&blob)).unwrap();
        assert_eq!(
            storage_class(&table, rowid),
            ("blob".to_string(), blob.as_bytes().to_vec())
        );

        table.update(STANDARD, rowid, "abc", Some(&text)).unwrap();
        assert_eq!(
            storage_class(&table, rowid),
            ("text".to_string(), text.as_bytes().to_vec())
        );
        assert_eq!(table.find_by(STANDARD, "abc").unwrap().unwrap().data, Some(text));
    }

    #[test]
    fn update_of_vanished_row_is_not_found() {
        let table = make_table();
        let err = table.update(STANDARD, 99, "abc", None).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn querying_absent_column_is_database_error() {
        let table = make_table();
        let legacy = RowBinding {
            id_column: "sessid",
            data_column: "data",
        };
        let err = table.find_by(legacy, "abc").unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sessions.db");
        {
            let table = SqliteSessionTable::open(&path, "sessions").unwrap();
            table.create_schema("session_id", "data", None).unwrap();
            table.insert(STANDARD, "abc", Some(&"x".into())).unwrap();
        }
        let reopened = SqliteSessionTable::open(&path, "sessions").unwrap();
        assert!(reopened.find_by(STANDARD, "abc").unwrap().is_some());
    }
}
