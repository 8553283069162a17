//! Configuration for the session store.
//!
//! ```toml
//! [session]
//! table_name = "sessions"
//! data_column = "data"
//! id_column = "session_id"
//! legacy_id_column = "sessid"
//! codec = "marshal"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionStoreConfig,
    pub logging: LogConfig,
}

impl Config {
    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.session.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&text)
    }
}

/// Which codec encodes the payload column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// MessagePack wrapped in Base64 text.
    #[default]
    Marshal,
    /// Plain JSON text.
    Json,
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marshal => write!(f, "marshal"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "marshal" | "msgpack" => Ok(Self::Marshal),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown codec: {s}. Expected one of: marshal, json")),
        }
    }
}

/// Table and column layout of the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStoreConfig {
    /// Table holding one row per session.
    pub table_name: String,
    /// Column holding the encoded session payload.
    pub data_column: String,
    /// Identifier column of current tables.
    pub id_column: String,
    /// Identifier column of older tables; preferred when present.
    pub legacy_id_column: String,
    /// Payload encoding.
    pub codec: CodecKind,
    /// Payload capacity in bytes. When unset the column's declared size is
    /// read from the table the first time a loaded session is saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_column_limit: Option<usize>,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            table_name: "sessions".to_string(),
            data_column: "data".to_string(),
            id_column: "session_id".to_string(),
            legacy_id_column: "sessid".to_string(),
            codec: CodecKind::Marshal,
            data_column_limit: None,
        }
    }
}

impl SessionStoreConfig {
    /// Names are interpolated into SQL, so only plain identifiers pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("table_name", &self.table_name)?;
        check_identifier("data_column", &self.data_column)?;
        check_identifier("id_column", &self.id_column)?;
        check_identifier("legacy_id_column", &self.legacy_id_column)?;

        if self.id_column == self.legacy_id_column {
            return Err(ConfigError::ValidationError(format!(
                "id_column and legacy_id_column are both `{}`",
                self.id_column
            )));
        }
        if self.data_column == self.id_column || self.data_column == self.legacy_id_column {
            return Err(ConfigError::ValidationError(format!(
                "data_column `{}` collides with an identifier column",
                self.data_column
            )));
        }
        Ok(())
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_identifier(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}
