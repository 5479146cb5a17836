// ABOUTME: Chunk request parameters and the import options they carry
// ABOUTME: Parsed from the query string of an import request or built by the local import command

use super::session::FormatChoice;
use crate::error::ImportError;
use std::str::FromStr;

/// How bytea values arrive in the upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteaEncoding {
    /// Passed through as PostgreSQL bytea text
    #[default]
    Raw,
    /// Plain hex digits, optionally prefixed with `\x`
    Hex,
    Base64,
}

impl FromStr for ByteaEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "raw" => Ok(ByteaEncoding::Raw),
            "hex" => Ok(ByteaEncoding::Hex),
            "base64" => Ok(ByteaEncoding::Base64),
            other => Err(format!(
                "unknown bytea_encoding '{}' (expected raw, hex or base64)",
                other
            )),
        }
    }
}

/// What to import and how to read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub server: Option<String>,
    pub schema: String,
    pub table: String,
    pub format: FormatChoice,
    pub use_header: bool,
    /// Unquoted values that mean NULL
    pub allowed_nulls: Vec<String>,
    pub truncate: bool,
    pub bytea_encoding: ByteaEncoding,
}

impl ImportOptions {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            server: None,
            schema: schema.to_string(),
            table: table.to_string(),
            format: FormatChoice::Auto,
            use_header: false,
            allowed_nulls: Vec::new(),
            truncate: false,
            bytea_encoding: ByteaEncoding::Raw,
        }
    }
}

/// One byte range of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub session_id: String,
    /// Offset reported by the previous response, 0 to start over
    pub offset: u64,
    /// Length of the remainder reported by the previous response
    pub remainder_len: u64,
    pub eof: bool,
    /// Hex SHA-256 of the raw body
    pub chunk_hash: Option<String>,
    pub options: ImportOptions,
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ImportError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "" | "0" | "false" | "off" | "no" => Ok(false),
        other => Err(ImportError::Validation(format!(
            "parameter '{}' must be a boolean, got '{}'",
            name, other
        ))),
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64, ImportError> {
    value.trim().parse().map_err(|_| {
        ImportError::Validation(format!(
            "parameter '{}' must be a non-negative integer, got '{}'",
            name, value
        ))
    })
}

impl ChunkRequest {
    /// Build a request from query parameters
    ///
    /// Repeated `allowed_nulls` (or `allowed_nulls[]`) values accumulate.
    pub fn from_params(params: &[(String, String)]) -> Result<Self, ImportError> {
        let get = |name: &str| {
            params
                .iter()
                .rev()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        let required = |name: &str| {
            get(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    ImportError::Validation(format!("missing required parameter '{}'", name))
                })
        };

        let table = get("table")
            .or_else(|| get("subject"))
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                ImportError::Validation("missing required parameter 'table'".to_string())
            })?;

        let mut options = ImportOptions::new(
            get("schema").filter(|s| !s.is_empty()).unwrap_or("public"),
            table,
        );
        options.server = get("server").filter(|s| !s.is_empty()).map(str::to_string);
        if let Some(format) = get("format") {
            options.format = format.parse().map_err(ImportError::Validation)?;
        }
        if let Some(v) = get("use_header") {
            options.use_header = parse_bool("use_header", v)?;
        }
        if let Some(v) = get("opt_truncate") {
            options.truncate = parse_bool("opt_truncate", v)?;
        }
        if let Some(v) = get("bytea_encoding") {
            options.bytea_encoding = v.parse().map_err(ImportError::Validation)?;
        }
        options.allowed_nulls = params
            .iter()
            .filter(|(k, _)| k == "allowed_nulls" || k == "allowed_nulls[]")
            .map(|(_, v)| v.clone())
            .collect();

        Ok(Self {
            session_id: required("import_session_id")?.to_string(),
            offset: parse_u64("offset", required("offset")?)?,
            remainder_len: parse_u64("remainder_len", required("remainder_len")?)?,
            eof: get("eof").map(|v| parse_bool("eof", v)).transpose()?.unwrap_or(false),
            chunk_hash: get("chunk_hash")
                .filter(|v| !v.is_empty())
                .map(|v| v.to_ascii_lowercase()),
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::session::DataFormat;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_full_request() {
        let request = ChunkRequest::from_params(&params(&[
            ("server", "main"),
            ("schema", "sales"),
            ("subject", "orders"),
            ("import_session_id", "abc"),
            ("format", "tsv"),
            ("use_header", "1"),
            ("allowed_nulls[]", "NULL"),
            ("allowed_nulls[]", ""),
            ("opt_truncate", "true"),
            ("bytea_encoding", "base64"),
            ("offset", "1024"),
            ("remainder_len", "12"),
            ("eof", "on"),
            ("chunk_hash", "ABCDEF"),
        ]))
        .unwrap();

        assert_eq!(request.session_id, "abc");
        assert_eq!(request.offset, 1024);
        assert_eq!(request.remainder_len, 12);
        assert!(request.eof);
        assert_eq!(request.chunk_hash.as_deref(), Some("abcdef"));
        assert_eq!(request.options.server.as_deref(), Some("main"));
        assert_eq!(request.options.schema, "sales");
        assert_eq!(request.options.table, "orders");
        assert_eq!(request.options.format, FormatChoice::Fixed(DataFormat::Tsv));
        assert!(request.options.use_header);
        assert!(request.options.truncate);
        assert_eq!(request.options.allowed_nulls, vec!["NULL".to_string(), String::new()]);
        assert_eq!(request.options.bytea_encoding, ByteaEncoding::Base64);
    }

    #[test]
    fn test_defaults() {
        let request = ChunkRequest::from_params(&params(&[
            ("table", "people"),
            ("import_session_id", "s"),
            ("offset", "0"),
            ("remainder_len", "0"),
        ]))
        .unwrap();
        assert_eq!(request.options.schema, "public");
        assert_eq!(request.options.format, FormatChoice::Auto);
        assert!(!request.eof);
        assert!(request.chunk_hash.is_none());
    }

    #[test]
    fn test_missing_or_malformed_parameters() {
        let missing_offset = params(&[
            ("table", "t"),
            ("import_session_id", "s"),
            ("remainder_len", "0"),
        ]);
        assert!(matches!(
            ChunkRequest::from_params(&missing_offset),
            Err(ImportError::Validation(_))
        ));

        let bad_bool = params(&[
            ("table", "t"),
            ("import_session_id", "s"),
            ("offset", "0"),
            ("remainder_len", "0"),
            ("eof", "maybe"),
        ]);
        assert!(ChunkRequest::from_params(&bad_bool).is_err());

        let negative = params(&[
            ("table", "t"),
            ("import_session_id", "s"),
            ("offset", "-1"),
            ("remainder_len", "0"),
        ]);
        assert!(ChunkRequest::from_params(&negative).is_err());
    }
}
