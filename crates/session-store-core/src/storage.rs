//! Storage collaborator interface.
//!
//! The store never builds SQL itself; it talks to a [`SessionTable`], which
//! exposes column metadata and single-row reads and writes keyed by an
//! identifier column chosen at run time.

use crate::error::StorageError;

/// Column metadata as reported by the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type, e.g. `VARCHAR(255)` or `TEXT`.
    pub declared_type: String,
    /// Declared capacity in bytes, if the type carries one.
    pub limit: Option<usize>,
}

impl ColumnInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        let limit = declared_limit(&declared_type);
        Self {
            name: name.into(),
            declared_type,
            limit,
        }
    }
}

/// Find a column by name, ignoring ASCII case like SQL does.
#[must_use]
pub fn find_column<'a>(columns: &'a [ColumnInfo], name: &str) -> Option<&'a ColumnInfo> {
    columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Parse the size from declared types such as `VARCHAR(255)` or
/// `DECIMAL(10, 2)` (first argument wins).
#[must_use]
pub fn declared_limit(declared_type: &str) -> Option<usize> {
    let open = declared_type.find('(')?;
    let close = declared_type[open..].find(')')? + open;
    let args = &declared_type[open + 1..close];
    let first = args.split(',').next()?.trim();
    first.parse::<usize>().ok().filter(|n| *n > 0)
}

/// Payload column value exactly as stored, tagged with its storage class.
///
/// Bytes are kept raw: a payload that is not valid UTF-8, or that was stored
/// as a BLOB, must still load (and decode to empty data) and must be written
/// back unchanged when the session is never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPayload {
    Text(Vec<u8>),
    Blob(Vec<u8>),
}

impl StoredPayload {
    /// Text payload, as produced by the codecs.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into().into_bytes())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(bytes) | Self::Blob(bytes) => bytes,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    #[must_use]
    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Blob(_))
    }

    /// The payload as text, if it is stored as text and is valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(bytes) => std::str::from_utf8(bytes).ok(),
            Self::Blob(_) => None,
        }
    }
}

impl From<String> for StoredPayload {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<&str> for StoredPayload {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

/// One stored session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub rowid: i64,
    pub session_id: String,
    pub data: Option<StoredPayload>,
}

/// Column names a row operation works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBinding<'a> {
    pub id_column: &'a str,
    pub data_column: &'a str,
}

/// A relational table holding one row per session.
///
/// Implementations must be shareable across request threads.
pub trait SessionTable: Send + Sync {
    /// Table name, for diagnostics.
    fn name(&self) -> &str;

    /// Live column metadata. Implementations must not cache this: the
    /// schema resolver relies on it to observe migrations.
    fn columns(&self) -> Result<Vec<ColumnInfo>, StorageError>;

    /// Zero-or-one row whose identifier column equals `session_id`.
    fn find_by(
        &self,
        binding: RowBinding<'_>,
        session_id: &str,
    ) -> Result<Option<SessionRow>, StorageError>;

    /// Insert a new row and return its row id. The payload keeps its
    /// storage class.
    fn insert(
        &self,
        binding: RowBinding<'_>,
        session_id: &str,
        data: Option<&StoredPayload>,
    ) -> Result<i64, StorageError>;

    /// Overwrite identifier and payload of an existing row.
    fn update(
        &self,
        binding: RowBinding<'_>,
        rowid: i64,
        session_id: &str,
        data: Option<&StoredPayload>,
    ) -> Result<(), StorageError>;

    /// Delete rows for an identifier, returning how many were removed.
    fn delete(&self, binding: RowBinding<'_>, session_id: &str) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varchar_limit_is_parsed() {
        assert_eq!(declared_limit("VARCHAR(255)"), Some(255));
        assert_eq!(declared_limit("varchar( 10 )"), Some(10));
        assert_eq!(declared_limit("CHARACTER VARYING(64)"), Some(64));
        assert_eq!(declared_limit("NUMERIC(10, 2)"), Some(10));
    }

    #[test]
    fn unsized_types_have_no_limit() {
        assert_eq!(declared_limit("TEXT"), None);
        assert_eq!(declared_limit("BLOB"), None);
        assert_eq!(declared_limit(""), None);
        assert_eq!(declared_limit("VARCHAR(max)"), None);
        assert_eq!(declared_limit("VARCHAR(0)"), None);
        assert_eq!(declared_limit("VARCHAR(12"), None);
    }

    #[test]
    fn stored_payload_text_view_requires_utf8_text() {
        assert_eq!(StoredPayload::text("{}").as_str(), Some("{}"));
        assert_eq!(StoredPayload::Text(vec![0xff, 0xfe]).as_str(), None);
        assert_eq!(StoredPayload::Blob(b"{}".to_vec()).as_str(), None);
        assert_eq!(StoredPayload::Blob(vec![4, 8, 0]).len(), 3);
        assert!(StoredPayload::Blob(Vec::new()).is_empty());
    }

    #[test]
    fn find_column_ignores_case() {
        let columns = vec![
            ColumnInfo::new("id", "INTEGER"),
            ColumnInfo::new("Session_Id", "VARCHAR(255)"),
        ];
        let found = find_column(&columns, "session_id").unwrap();
        assert_eq!(found.limit, Some(255));
        assert!(find_column(&columns, "sessid").is_none());
    }
}
