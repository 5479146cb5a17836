// ABOUTME: Resumable import session state carried between chunk requests
// ABOUTME: Serialized into the session store after every accepted chunk

use super::parser::JsonLayout;
use super::target::TargetColumn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportState {
    Uninitialized,
    DetectingFormat,
    Streaming,
    Complete,
    TruncatedError,
    StalledError,
}

impl ImportState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ImportState::Complete | ImportState::TruncatedError | ImportState::StalledError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImportState::Uninitialized => "UNINITIALIZED",
            ImportState::DetectingFormat => "DETECTING_FORMAT",
            ImportState::Streaming => "STREAMING",
            ImportState::Complete => "COMPLETE",
            ImportState::TruncatedError => "TRUNCATED_ERROR",
            ImportState::StalledError => "STALLED_ERROR",
        }
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Csv,
    Tsv,
    Json,
    Xml,
}

impl DataFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            DataFormat::Csv => "csv",
            DataFormat::Tsv => "tsv",
            DataFormat::Json => "json",
            DataFormat::Xml => "xml",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested format; `auto` is resolved from the first bytes of the upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatChoice {
    #[default]
    Auto,
    Fixed(DataFormat),
}

impl FromStr for FormatChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(FormatChoice::Auto),
            "csv" => Ok(FormatChoice::Fixed(DataFormat::Csv)),
            "tsv" | "tab" => Ok(FormatChoice::Fixed(DataFormat::Tsv)),
            "json" => Ok(FormatChoice::Fixed(DataFormat::Json)),
            "xml" => Ok(FormatChoice::Fixed(DataFormat::Xml)),
            other => Err(format!(
                "unknown format '{}' (expected auto, csv, tsv, json or xml)",
                other
            )),
        }
    }
}

/// Everything the server remembers about one upload between chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSession {
    pub id: String,
    pub state: ImportState,
    pub format: Option<DataFormat>,
    pub json_layout: JsonLayout,
    /// The next positional record is the header row
    pub header_pending: bool,
    /// Target column for each position of a positional record
    pub column_map: Option<Vec<Option<String>>>,
    pub target_columns: Vec<TargetColumn>,
    pub truncated: bool,
    /// Offset reported in the last response
    pub offset: u64,
    /// Bytes received but not yet forming a complete record
    #[serde(with = "base64_bytes")]
    pub remainder: Vec<u8>,
    pub errors: u64,
    pub records: u64,
    /// Consecutive chunks that made no progress
    pub idle_chunks: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportSession {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: ImportState::Uninitialized,
            format: None,
            json_layout: JsonLayout::default(),
            header_pending: false,
            column_map: None,
            target_columns: Vec::new(),
            truncated: false,
            offset: 0,
            remainder: Vec::new(),
            errors: 0,
            records: 0,
            idle_chunks: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remainder_len(&self) -> u64 {
        self.remainder.len() as u64
    }
}

/// Byte buffers as base64 strings in stored sessions and responses
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_in_protocol_spelling() {
        let json = serde_json::to_string(&ImportState::TruncatedError).unwrap();
        assert_eq!(json, "\"TRUNCATED_ERROR\"");
        assert_eq!(ImportState::StalledError.to_string(), "STALLED_ERROR");
        assert!(ImportState::Complete.is_terminal());
        assert!(!ImportState::Streaming.is_terminal());
    }

    #[test]
    fn test_format_choice_parsing() {
        assert_eq!("AUTO".parse::<FormatChoice>().unwrap(), FormatChoice::Auto);
        assert_eq!(
            "tsv".parse::<FormatChoice>().unwrap(),
            FormatChoice::Fixed(DataFormat::Tsv)
        );
        assert!("parquet".parse::<FormatChoice>().is_err());
    }

    #[test]
    fn test_session_survives_serialization() {
        let mut session = ImportSession::new("abc");
        session.remainder = b"3,caf\xc3".to_vec();
        session.format = Some(DataFormat::Csv);
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"remainder\":\"MyxjYWbD\""));
        let restored: ImportSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
    }
}
