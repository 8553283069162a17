//! session-store-core: web session state persisted as one relational row
//! per session.
//!
//! # Architecture
//!
//! ```text
//! find_by_session_id → SchemaResolver (once) → SessionTable → SessionRecord
//!                                                               ↓ data()
//!                                                         SessionCodec::decode
//! save → serialize_if_loaded → enforce_size_limit → SessionTable insert/update
//! ```
//!
//! # Modules
//!
//! - `record`: lazily decoded session row and its save hooks
//! - `schema`: identifier column negotiation (`session_id` vs legacy `sessid`)
//! - `store`: lookups, guarded saves, payload capacity memo
//! - `storage`: storage collaborator trait and column metadata
//! - `sqlite`: rusqlite implementation of the storage trait
//! - `codec`: payload encodings (MessagePack/Base64, JSON)
//! - `config`: TOML configuration
//! - `logging`: tracing subscriber setup
//! - `error`: error types with remediation hints
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod record;
pub mod schema;
pub mod sqlite;
pub mod storage;
pub mod store;

pub use codec::{JsonCodec, MarshalCodec, SessionCodec, SessionData};
pub use config::{CodecKind, Config, SessionStoreConfig};
pub use error::{Error, Result, SchemaError, SessionOverflow, StorageError};
pub use record::SessionRecord;
pub use schema::{IdColumnMode, IdStrategy, SchemaResolver, SchemaState};
pub use sqlite::SqliteSessionTable;
pub use storage::{ColumnInfo, RowBinding, SessionRow, SessionTable, StoredPayload};
pub use store::SessionStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
