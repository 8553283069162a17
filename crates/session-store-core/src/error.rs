//! Error types for session-store-core

use std::fmt::Write;
use thiserror::Error;

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            alternatives: Vec::new(),
        }
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for session-store-core
#[derive(Error, Debug)]
pub enum Error {
    /// Encoded session payload does not fit in the payload column
    #[error(transparent)]
    SessionOverflow(#[from] SessionOverflow),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Table shape could not be resolved
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Payload encoding errors
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether this error is a rejected oversize save.
    #[must_use]
    pub fn is_session_overflow(&self) -> bool {
        matches!(self, Self::SessionOverflow(_))
    }

    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::SessionOverflow(err) => Some(err.remediation()),
            Self::Storage(err) => Some(err.remediation()),
            Self::Schema(err) => Some(err.remediation()),
            Self::Codec(_) => Some(
                Remediation::new("Session data could not be encoded. Store only plain values.")
                    .alternative("Switch the codec to `json` to inspect the stored payloads."),
            ),
            Self::Config(err) => Some(err.remediation()),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(StorageError::from(e))
    }
}

/// The encoded session payload is larger than the payload column can hold.
///
/// Raised from the save path before any write is issued; the stored row is
/// left exactly as it was.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("session data is {size} bytes, payload column holds at most {limit}")]
pub struct SessionOverflow {
    pub size: usize,
    pub limit: usize,
}

impl SessionOverflow {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        Remediation::new(format!(
            "Session data exceeds the payload column capacity ({} > {} bytes). Store less in the session.",
            self.size, self.limit
        ))
        .alternative("Widen the payload column (e.g. TEXT instead of VARCHAR) and invalidate the schema cache.")
        .alternative("Move large values out of the session and keep only references.")
    }
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl StorageError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Database(_) => Remediation::new(
                "Database operation failed. Check the database path and permissions and retry.",
            )
            .alternative("Ensure the sessions table exists and is writable."),
            Self::NotFound(_) => Remediation::new("The session row was not found.")
                .alternative("The row may have been destroyed concurrently; look it up again."),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// Schema negotiation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table `{table}` does not exist or exposes no columns")]
    TableMissing { table: String },

    #[error("table `{table}` has neither `{standard}` nor `{legacy}` identifier column")]
    MissingIdColumn {
        table: String,
        standard: String,
        legacy: String,
    },

    #[error("table `{table}` has no payload column `{column}`")]
    MissingDataColumn { table: String, column: String },
}

impl SchemaError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::TableMissing { table } => {
                Remediation::new(format!("Create the `{table}` table before storing sessions."))
                    .alternative("Call SqliteSessionTable::create_schema during setup.")
            }
            Self::MissingIdColumn {
                standard, legacy, ..
            } => Remediation::new(format!(
                "Add a `{standard}` column (or keep the legacy `{legacy}` column) to the sessions table."
            ))
            .alternative("Check `id_column` and `legacy_id_column` in the session config."),
            Self::MissingDataColumn { column, .. } => Remediation::new(format!(
                "Add the `{column}` payload column or point `data_column` at the right one."
            )),
        }
    }
}

/// Payload encoding errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to encode session data as MessagePack: {0}")]
    MessagePack(#[from] rmp_serde::encode::Error),

    #[error("failed to encode session data as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Invalid {field}: `{value}` is not a plain SQL identifier")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("Invalid config: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!("Create the config file at {path}."))
                .alternative("Omit the path to run with built-in defaults."),
            Self::ReadFailed(path, _) => {
                Remediation::new(format!("Check read permissions for {path}."))
            }
            Self::ParseFailed(_) => Remediation::new("Fix the TOML syntax in the config file.")
                .alternative("Start from an empty file; every key has a default."),
            Self::InvalidIdentifier { field, .. } => Remediation::new(format!(
                "Use only letters, digits and underscores for `{field}`, starting with a letter or underscore."
            )),
            Self::ValidationError(_) => Remediation::new("Correct the reported config value."),
        }
    }
}
