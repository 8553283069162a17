//! One stored session.
//!
//! A record carries the payload column bytes exactly as stored (text or
//! blob) and decodes them lazily. Reading [`SessionRecord::data`] is what "loads" a session; a
//! record that was never read is saved with its payload byte-for-byte
//! untouched.
//!
//! # Save hooks
//!
//! ```text
//! serialize_if_loaded ──► enforce_size_limit ──► write
//! ```
//!
//! Both hooks are no-ops for unloaded records. A failing hook stops the save
//! before anything reaches storage.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::codec::{SessionCodec, SessionData};
use crate::error::{CodecError, SessionOverflow};
use crate::schema::IdColumnMode;
use crate::storage::{SessionRow, StoredPayload};

/// A session row with lazily materialized data.
#[derive(Clone)]
pub struct SessionRecord {
    rowid: Option<i64>,
    session_id: String,
    id_column: Option<IdColumnMode>,
    raw_payload: Option<StoredPayload>,
    data: Option<SessionData>,
    codec: Arc<dyn SessionCodec>,
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("rowid", &self.rowid)
            .field("id_column", &self.id_column)
            .field("payload_len", &self.payload_size())
            .field("loaded", &self.is_loaded())
            .field("codec", &self.codec.kind())
            .finish_non_exhaustive()
    }
}

impl SessionRecord {
    /// Fresh, unsaved session: no payload, data not yet materialized.
    #[must_use]
    pub fn new(session_id: impl Into<String>, codec: Arc<dyn SessionCodec>) -> Self {
        Self {
            rowid: None,
            session_id: session_id.into(),
            id_column: None,
            raw_payload: None,
            data: None,
            codec,
        }
    }

    /// Session hydrated from a stored row; data stays encoded until read.
    #[must_use]
    pub fn from_row(row: SessionRow, id_column: IdColumnMode, codec: Arc<dyn SessionCodec>) -> Self {
        Self {
            rowid: Some(row.rowid),
            session_id: row.session_id,
            id_column: Some(id_column),
            raw_payload: row.data,
            data: None,
            codec,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Written to whichever identifier column the table uses.
    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
    }

    /// Identifier column the accessor is bound to; `None` until the record
    /// has been loaded from or written to storage.
    #[must_use]
    pub fn id_column(&self) -> Option<IdColumnMode> {
        self.id_column
    }

    #[must_use]
    pub fn rowid(&self) -> Option<i64> {
        self.rowid
    }

    #[must_use]
    pub fn is_new_record(&self) -> bool {
        self.rowid.is_none()
    }

    /// Payload column value as last stored or serialized.
    #[must_use]
    pub fn raw_payload(&self) -> Option<&StoredPayload> {
        self.raw_payload.as_ref()
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.raw_payload.as_ref().map_or(0, StoredPayload::len)
    }

    /// Whether `data` has been materialized.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Session data, decoding the stored payload on first access.
    pub fn data(&mut self) -> &SessionData {
        self.data_mut()
    }

    /// Mutable session data, decoding the stored payload on first access.
    pub fn data_mut(&mut self) -> &mut SessionData {
        if self.data.is_none() {
            self.data = Some(self.decode_payload());
        }
        self.data.get_or_insert_with(SessionData::new)
    }

    /// Replace the session data wholesale.
    pub fn set_data(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    fn decode_payload(&self) -> SessionData {
        let Some(raw) = self.raw_payload.as_ref() else {
            return SessionData::new();
        };
        match self.codec.decode(raw.as_bytes()) {
            Some(data) => {
                debug!(keys = data.len(), "Materialized session data");
                data
            }
            None => {
                if !raw.is_empty() {
                    debug!(
                        payload_len = raw.len(),
                        blob = raw.is_blob(),
                        codec = %self.codec.kind(),
                        "Unreadable session payload; starting with empty data"
                    );
                }
                SessionData::new()
            }
        }
    }

    /// First save hook: re-encode `data` into the payload if it was loaded.
    ///
    /// Returns whether the payload was rewritten.
    pub fn serialize_if_loaded(&mut self) -> Result<bool, CodecError> {
        let Some(data) = self.data.as_ref() else {
            debug!("Session data not loaded; keeping stored payload");
            return Ok(false);
        };
        let encoded = self.codec.encode(data)?;
        self.raw_payload = Some(StoredPayload::text(encoded));
        Ok(true)
    }

    /// Second save hook: reject payloads larger than `limit` bytes.
    pub fn enforce_size_limit(&self, limit: Option<usize>) -> Result<(), SessionOverflow> {
        if !self.is_loaded() {
            return Ok(());
        }
        let Some(limit) = limit else {
            return Ok(());
        };
        let size = self.payload_size();
        if size > limit {
            return Err(SessionOverflow { size, limit });
        }
        Ok(())
    }

    pub(crate) fn mark_persisted(&mut self, rowid: i64, id_column: IdColumnMode) {
        self.rowid = Some(rowid);
        self.id_column = Some(id_column);
    }
}
