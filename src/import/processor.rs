// ABOUTME: The chunk processor driving one import session through its state machine
// ABOUTME: Verifies, decompresses, parses and applies each chunk, then persists the session

use super::decompress::decompress;
use super::detect::detect_format;
use super::log::{ChunkLog, LogEntry};
use super::parser::{parse_records, Field, Parsed, Record};
use super::request::{ByteaEncoding, ChunkRequest, ImportOptions};
use super::session::{base64_bytes, DataFormat, FormatChoice, ImportSession, ImportState};
use super::store::SessionStore;
use super::target::{ImportTarget, TargetColumn, TargetProvider};
use crate::error::ImportError;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Consecutive chunks without progress before a session is declared stalled
pub const STALL_LIMIT: u32 = 3;

/// Decompressed chunks may be this many times larger than the request body limit
const DECOMPRESSION_RATIO: usize = 16;

/// A pending record may span at most this many request bodies
pub const REMAINDER_CHUNKS: usize = 4;

/// Body of a successful chunk response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResponse {
    pub offset: u64,
    pub remainder_len: u64,
    /// Unconsumed bytes, base64 encoded on the wire
    #[serde(with = "base64_bytes")]
    pub remainder: Vec<u8>,
    pub errors: u64,
    #[serde(rename = "logEntries")]
    pub log_entries: Vec<LogEntry>,
    pub state: ImportState,
    pub records: u64,
}

/// Read-only view of a stored session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub import_session_id: String,
    pub state: ImportState,
    pub format: Option<DataFormat>,
    pub offset: u64,
    pub remainder_len: u64,
    pub errors: u64,
    pub records: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ImportSession> for ImportProgress {
    fn from(session: &ImportSession) -> Self {
        Self {
            import_session_id: session.id.clone(),
            state: session.state,
            format: session.format,
            offset: session.offset,
            remainder_len: session.remainder_len(),
            errors: session.errors,
            records: session.records,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub struct ChunkProcessor {
    store: Arc<dyn SessionStore>,
    targets: Arc<dyn TargetProvider>,
    max_chunk_bytes: usize,
}

impl ChunkProcessor {
    pub fn new(
        store: Arc<dyn SessionStore>,
        targets: Arc<dyn TargetProvider>,
        max_chunk_bytes: usize,
    ) -> Self {
        Self {
            store,
            targets,
            max_chunk_bytes,
        }
    }

    pub fn max_chunk_bytes(&self) -> usize {
        self.max_chunk_bytes
    }

    /// Largest remainder a session may carry between chunks
    pub fn max_remainder_bytes(&self) -> usize {
        self.max_chunk_bytes.saturating_mul(REMAINDER_CHUNKS)
    }

    pub async fn progress(&self, session_id: &str) -> Result<ImportProgress, ImportError> {
        let session = self.store.load(session_id).await?.ok_or_else(|| {
            ImportError::Validation(format!("unknown import session '{}'", session_id))
        })?;
        Ok(ImportProgress::from(&session))
    }

    /// Process one chunk of an upload
    ///
    /// A chunk with offset 0 starts the session over. Any other chunk must
    /// continue exactly where the previous response left off.
    ///
    /// # Errors
    ///
    /// Rejections before the session is loaded leave it untouched. A stall
    /// is reported as an error after the session is stored as stalled.
    pub async fn process(
        &self,
        request: &ChunkRequest,
        body: &[u8],
    ) -> Result<ChunkResponse, ImportError> {
        if body.len() > self.max_chunk_bytes {
            return Err(ImportError::Validation(format!(
                "chunk of {} bytes exceeds the {} byte limit",
                body.len(),
                self.max_chunk_bytes
            )));
        }

        if let Some(expected) = &request.chunk_hash {
            let actual = sha256_hex(body);
            if *expected != actual {
                return Err(ImportError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let mut session = self.resume(request).await?;
        let options = &request.options;
        let mut log = ChunkLog::new();

        let data = decompress(body, self.max_chunk_bytes * DECOMPRESSION_RATIO)
            .map_err(|e| ImportError::Validation(format!("{:#}", e)))?;
        let mut buffer = std::mem::take(&mut session.remainder);
        buffer.extend_from_slice(&data);

        let previous_offset = session.offset;
        let previous_remainder = request.remainder_len;
        session.offset = request.offset + body.len() as u64;

        let resolved = self.resolve_format(&mut session, options, &buffer, request.eof, &mut log)?;
        let format = match resolved {
            Some(format) => format,
            None if request.eof && buffer.iter().all(|b| b.is_ascii_whitespace()) => {
                log.info("upload contained no records");
                session.state = ImportState::Complete;
                return self.finish(session, log).await;
            }
            None => {
                session.remainder = buffer;
                return self
                    .settle(session, previous_offset, previous_remainder, request.eof, log)
                    .await;
            }
        };

        let target = self.targets.target(options.server.as_deref()).await?;
        self.prepare_target(&mut session, target.as_ref(), options, &mut log)
            .await?;

        let outcome = parse_records(format, &buffer, request.eof, &mut session.json_layout);
        apply_records(&mut session, target.as_ref(), options, outcome.items, &mut log).await?;
        session.remainder = buffer[outcome.consumed..].to_vec();

        self.settle(session, previous_offset, previous_remainder, request.eof, log)
            .await
    }

    async fn resume(&self, request: &ChunkRequest) -> Result<ImportSession, ImportError> {
        if request.offset == 0 {
            tracing::debug!("Starting import session '{}'", request.session_id);
            return Ok(ImportSession::new(request.session_id.clone()));
        }

        let session = self.store.load(&request.session_id).await?.ok_or_else(|| {
            ImportError::Protocol(format!(
                "unknown or expired import session '{}'; restart at offset 0",
                request.session_id
            ))
        })?;
        if session.state.is_terminal() {
            return Err(ImportError::Protocol(format!(
                "import session '{}' is already {}",
                session.id, session.state
            )));
        }
        if session.offset != request.offset {
            return Err(ImportError::Protocol(format!(
                "chunk offset {} does not match session offset {}",
                request.offset, session.offset
            )));
        }
        if session.remainder_len() != request.remainder_len {
            return Err(ImportError::Protocol(format!(
                "remainder_len {} does not match session remainder of {} bytes",
                request.remainder_len,
                session.remainder_len()
            )));
        }
        Ok(session)
    }

    fn resolve_format(
        &self,
        session: &mut ImportSession,
        options: &ImportOptions,
        buffer: &[u8],
        eof: bool,
        log: &mut ChunkLog,
    ) -> Result<Option<DataFormat>, ImportError> {
        if let Some(format) = session.format {
            return Ok(Some(format));
        }
        session.state = ImportState::DetectingFormat;

        let format = match options.format {
            FormatChoice::Fixed(format) => format,
            FormatChoice::Auto => match detect_format(buffer, eof) {
                Ok(Some(format)) => {
                    log.info(format!("detected {} input", format));
                    format
                }
                Ok(None) => return Ok(None),
                Err(message) => return Err(ImportError::FormatDetection(message)),
            },
        };

        session.format = Some(format);
        session.header_pending = options.use_header;
        session.state = ImportState::Streaming;
        Ok(Some(format))
    }

    async fn prepare_target(
        &self,
        session: &mut ImportSession,
        target: &dyn ImportTarget,
        options: &ImportOptions,
        log: &mut ChunkLog,
    ) -> Result<(), ImportError> {
        if session.target_columns.is_empty() {
            let columns = target.columns(&options.schema, &options.table).await?;
            if columns.is_empty() {
                return Err(ImportError::Validation(format!(
                    "table {}.{} does not exist or has no insertable columns",
                    options.schema, options.table
                )));
            }
            session.target_columns = columns;
        }

        if options.truncate && !session.truncated {
            target.truncate(&options.schema, &options.table).await?;
            session.truncated = true;
            log.info(format!(
                "truncated {}.{} before loading",
                options.schema, options.table
            ));
        }
        Ok(())
    }

    /// Apply the progress rules, then store the session and build the response
    async fn settle(
        &self,
        mut session: ImportSession,
        previous_offset: u64,
        previous_remainder: u64,
        eof: bool,
        mut log: ChunkLog,
    ) -> Result<ChunkResponse, ImportError> {
        let limit = self.max_remainder_bytes();
        if !eof && session.remainder.len() > limit {
            log.error(format!(
                "pending record of {} byte(s) exceeds the {} byte limit; \
                 check for an unterminated quote or a missing record separator",
                session.remainder.len(),
                limit
            ));
            tracing::warn!(
                "⚠ Import session '{}' abandoned: {} byte(s) pending without a complete record",
                session.id,
                session.remainder.len()
            );
            session.remainder = Vec::new();
            session.state = ImportState::TruncatedError;
            return self.finish(session, log).await;
        }

        if eof {
            if session.remainder.is_empty() {
                session.state = ImportState::Complete;
                tracing::info!(
                    "✓ Import session '{}' complete: {} record(s), {} error(s)",
                    session.id,
                    session.records,
                    session.errors + log.errors()
                );
            } else {
                log.error(format!(
                    "{} byte(s) left unparsed at end of input",
                    session.remainder.len()
                ));
                session.state = ImportState::TruncatedError;
                tracing::warn!(
                    "⚠ Import session '{}' ended with {} unparsed byte(s)",
                    session.id,
                    session.remainder.len()
                );
            }
            return self.finish(session, log).await;
        }

        let advanced = session.offset > previous_offset;
        let shrank = session.remainder_len() < previous_remainder;
        if advanced || shrank {
            session.idle_chunks = 0;
        } else {
            session.idle_chunks += 1;
        }

        if session.idle_chunks >= STALL_LIMIT {
            session.state = ImportState::StalledError;
            session.errors += log.errors() + 1;
            session.updated_at = Utc::now();
            self.store.save(&session).await?;
            tracing::warn!(
                "⚠ Import session '{}' stalled at offset {}",
                session.id,
                session.offset
            );
            return Err(ImportError::Stalled(format!(
                "no progress in {} consecutive chunks at offset {} with {} byte(s) pending",
                STALL_LIMIT,
                session.offset,
                session.remainder.len()
            )));
        }

        self.finish(session, log).await
    }

    async fn finish(
        &self,
        mut session: ImportSession,
        log: ChunkLog,
    ) -> Result<ChunkResponse, ImportError> {
        session.errors += log.errors();
        session.updated_at = Utc::now();
        self.store.save(&session).await?;

        Ok(ChunkResponse {
            offset: session.offset,
            remainder_len: session.remainder_len(),
            remainder: session.remainder.clone(),
            errors: session.errors,
            log_entries: log.into_entries(),
            state: session.state,
            records: session.records,
        })
    }
}

/// Rows sharing one column list, inserted together
struct RowGroup {
    columns: Vec<TargetColumn>,
    rows: Vec<Vec<Option<String>>>,
    record_numbers: Vec<usize>,
}

async fn apply_records(
    session: &mut ImportSession,
    target: &dyn ImportTarget,
    options: &ImportOptions,
    items: Vec<Parsed>,
    log: &mut ChunkLog,
) -> Result<(), ImportError> {
    let mut group: Option<RowGroup> = None;

    for (index, item) in items.into_iter().enumerate() {
        let number = index + 1;
        let record = match item {
            Parsed::Record(record) => record,
            Parsed::Invalid(message) => {
                log.error(format!("record {} of this chunk: {}", number, message));
                continue;
            }
        };

        let row = match record {
            Record::Positional(fields) if session.header_pending => {
                session.header_pending = false;
                session.column_map = Some(map_header(&session.target_columns, &fields, log));
                continue;
            }
            Record::Positional(fields) => positional_row(session, options, fields),
            Record::Named(pairs) => named_row(&session.target_columns, options, pairs),
        };

        let (columns, values) = match row {
            Ok(row) => row,
            Err(message) => {
                log.error(format!("record {} of this chunk: {}", number, message));
                continue;
            }
        };

        match &mut group {
            Some(g) if g.columns == columns => {
                g.rows.push(values);
                g.record_numbers.push(number);
            }
            _ => {
                if let Some(full) = group.take() {
                    flush(session, target, options, full, log).await?;
                }
                group = Some(RowGroup {
                    columns,
                    rows: vec![values],
                    record_numbers: vec![number],
                });
            }
        }
    }

    if let Some(full) = group {
        flush(session, target, options, full, log).await?;
    }
    Ok(())
}

async fn flush(
    session: &mut ImportSession,
    target: &dyn ImportTarget,
    options: &ImportOptions,
    group: RowGroup,
    log: &mut ChunkLog,
) -> Result<(), ImportError> {
    let rejected = target
        .insert(&options.schema, &options.table, &group.columns, &group.rows)
        .await?;
    for rejection in &rejected {
        let number = group
            .record_numbers
            .get(rejection.index)
            .copied()
            .unwrap_or(rejection.index + 1);
        log.error(format!("record {} of this chunk: {}", number, rejection.message));
    }
    session.records += (group.rows.len() - rejected.len()) as u64;
    Ok(())
}

fn find_column<'a>(columns: &'a [TargetColumn], name: &str) -> Option<&'a TargetColumn> {
    columns
        .iter()
        .find(|c| c.name == name)
        .or_else(|| columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
}

fn map_header(
    columns: &[TargetColumn],
    header: &[Field],
    log: &mut ChunkLog,
) -> Vec<Option<String>> {
    header
        .iter()
        .map(|field| {
            let name = match field {
                Field::Text { value, .. } => value.trim(),
                Field::Null => "",
            };
            match find_column(columns, name) {
                Some(column) => Some(column.name.clone()),
                None => {
                    log.warning(format!(
                        "header column '{}' does not match the target table; values ignored",
                        name
                    ));
                    None
                }
            }
        })
        .collect()
}

type Row = (Vec<TargetColumn>, Vec<Option<String>>);

fn positional_row(
    session: &mut ImportSession,
    options: &ImportOptions,
    fields: Vec<Field>,
) -> Result<Row, String> {
    let target_columns = &session.target_columns;
    let map = session.column_map.get_or_insert_with(|| {
        target_columns.iter().map(|c| Some(c.name.clone())).collect()
    });
    if fields.len() != map.len() {
        return Err(format!(
            "expected {} field(s), found {}",
            map.len(),
            fields.len()
        ));
    }

    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (slot, field) in map.iter().zip(fields) {
        let Some(column) = slot.as_deref().and_then(|n| find_column(target_columns, n)) else {
            continue;
        };
        values.push(convert_field(column, options, field)?);
        columns.push(column.clone());
    }
    Ok((columns, values))
}

fn named_row(
    target_columns: &[TargetColumn],
    options: &ImportOptions,
    pairs: Vec<(String, Field)>,
) -> Result<Row, String> {
    let mut columns: Vec<TargetColumn> = Vec::new();
    let mut values = Vec::new();
    for (name, field) in pairs {
        let column =
            find_column(target_columns, &name).ok_or_else(|| format!("unknown column '{}'", name))?;
        if columns.iter().any(|c| c.name == column.name) {
            return Err(format!("column '{}' given more than once", column.name));
        }
        values.push(convert_field(column, options, field)?);
        columns.push(column.clone());
    }
    Ok((columns, values))
}

fn convert_field(
    column: &TargetColumn,
    options: &ImportOptions,
    field: Field,
) -> Result<Option<String>, String> {
    let (value, quoted) = match field {
        Field::Null => return Ok(None),
        Field::Text { value, quoted } => (value, quoted),
    };
    if !quoted && options.allowed_nulls.iter().any(|token| *token == value) {
        return Ok(None);
    }
    if column.is_bytea() {
        return decode_bytea(&value, options.bytea_encoding)
            .map(Some)
            .map_err(|e| format!("column '{}': {}", column.name, e));
    }
    Ok(Some(value))
}

/// Convert an uploaded binary value into PostgreSQL hex bytea text
fn decode_bytea(value: &str, encoding: ByteaEncoding) -> Result<String, String> {
    let bytes = match encoding {
        ByteaEncoding::Raw => return Ok(value.to_string()),
        ByteaEncoding::Hex => {
            let digits = value.trim();
            let digits = digits.strip_prefix("\\x").unwrap_or(digits);
            hex::decode(digits).map_err(|e| format!("invalid hex: {}", e))?
        }
        ByteaEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(value.trim())
            .map_err(|e| format!("invalid base64: {}", e))?,
    };
    Ok(format!("\\x{}", hex::encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::store::MemorySessionStore;
    use crate::import::target::MemoryTarget;
    use std::time::Duration;

    fn people() -> MemoryTarget {
        MemoryTarget::new().with_table(
            "public",
            "people",
            vec![
                TargetColumn::new("id", "integer", false),
                TargetColumn::new("name", "text", true),
            ],
        )
    }

    fn processor(target: &MemoryTarget) -> ChunkProcessor {
        ChunkProcessor::new(
            Arc::new(MemorySessionStore::new(Duration::from_secs(60))),
            Arc::new(target.clone()),
            1024 * 1024,
        )
    }

    fn request(offset: u64, remainder_len: u64, eof: bool) -> ChunkRequest {
        ChunkRequest {
            session_id: "s1".to_string(),
            offset,
            remainder_len,
            eof,
            chunk_hash: None,
            options: ImportOptions::new("public", "people"),
        }
    }

    fn text(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[tokio::test]
    async fn test_remainder_carries_across_chunks() {
        let target = people();
        let processor = processor(&target);

        let first = processor
            .process(&request(0, 0, false), b"1,ann\n2,bo")
            .await
            .unwrap();
        assert_eq!(first.offset, 10);
        assert_eq!(first.remainder, b"2,bo");
        assert_eq!(first.records, 1);
        assert_eq!(first.state, ImportState::Streaming);

        let second = processor
            .process(&request(10, 4, true), b"b\n")
            .await
            .unwrap();
        assert_eq!(second.offset, 12);
        assert_eq!(second.remainder_len, 0);
        assert_eq!(second.state, ImportState::Complete);
        assert_eq!(
            target.rows("public", "people"),
            vec![vec![text("1"), text("ann")], vec![text("2"), text("bob")]]
        );
    }

    #[tokio::test]
    async fn test_header_maps_columns_case_insensitively() {
        let target = people();
        let processor = processor(&target);
        let mut req = request(0, 0, true);
        req.options.use_header = true;

        let response = processor
            .process(&req, b"NAME,Id\ncy,3\n")
            .await
            .unwrap();
        assert_eq!(response.errors, 0);
        assert_eq!(target.rows("public", "people"), vec![vec![text("3"), text("cy")]]);
    }

    #[tokio::test]
    async fn test_null_tokens_skip_quoted_fields() {
        let target = people();
        let processor = processor(&target);
        let mut req = request(0, 0, true);
        req.options.allowed_nulls = vec!["NULL".to_string()];

        processor
            .process(&req, b"1,NULL\n2,\"NULL\"\n")
            .await
            .unwrap();
        assert_eq!(
            target.rows("public", "people"),
            vec![vec![text("1"), None], vec![text("2"), text("NULL")]]
        );
    }

    #[tokio::test]
    async fn test_rejected_rows_are_logged() {
        let target = people();
        let processor = processor(&target);
        let mut req = request(0, 0, true);
        req.options.allowed_nulls = vec![String::new()];

        let response = processor.process(&req, b"1,a\n,b\n3\n").await.unwrap();
        assert_eq!(response.records, 1);
        assert_eq!(response.errors, 2);
        assert!(response.log_entries.iter().any(|e| e.message.contains("not-null")));
        assert!(response
            .log_entries
            .iter()
            .any(|e| e.message.contains("expected 2 field(s), found 1")));
    }

    #[tokio::test]
    async fn test_json_objects_and_truncate_once() {
        let target = people();
        let processor = processor(&target);
        let mut req = request(0, 0, false);
        req.options.truncate = true;

        let first = processor
            .process(&req, br#"[{"id": 1, "name": "a"}, {"id": 2"#)
            .await
            .unwrap();
        assert_eq!(first.records, 1);

        let mut next = request(first.offset, first.remainder_len, true);
        next.options.truncate = true;
        let second = processor.process(&next, br#", "name": null}]"#).await.unwrap();
        assert_eq!(second.state, ImportState::Complete);
        assert_eq!(second.records, 2);
        assert_eq!(target.truncations("public", "people"), 1);
        assert_eq!(
            target.rows("public", "people"),
            vec![vec![text("1"), text("a")], vec![text("2"), None]]
        );
    }

    #[tokio::test]
    async fn test_out_of_order_chunk_is_rejected() {
        let target = people();
        let processor = processor(&target);
        processor
            .process(&request(0, 0, false), b"1,a\n")
            .await
            .unwrap();

        let result = processor.process(&request(99, 0, false), b"2,b\n").await;
        assert!(matches!(result, Err(ImportError::Protocol(_))));
        let result = processor.process(&request(4, 7, false), b"2,b\n").await;
        assert!(matches!(result, Err(ImportError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_detection_waits_for_a_full_line() {
        let target = people();
        let processor = processor(&target);
        let first = processor
            .process(&request(0, 0, false), b"1,a")
            .await
            .unwrap();
        assert_eq!(first.state, ImportState::DetectingFormat);
        assert_eq!(first.remainder, b"1,a");

        let second = processor
            .process(&request(3, 3, true), b"\n")
            .await
            .unwrap();
        assert_eq!(second.state, ImportState::Complete);
        assert_eq!(second.records, 1);
    }

    #[tokio::test]
    async fn test_undetectable_format() {
        let target = people();
        let processor = processor(&target);
        let result = processor
            .process(&request(0, 0, false), b"plain words\n")
            .await;
        assert!(matches!(result, Err(ImportError::FormatDetection(_))));
    }

    #[tokio::test]
    async fn test_missing_table() {
        let processor = processor(&MemoryTarget::new());
        let result = processor.process(&request(0, 0, true), b"1,a\n").await;
        assert!(matches!(result, Err(ImportError::Validation(_))));
    }

    #[tokio::test]
    async fn test_oversized_remainder_ends_session() {
        let target = people();
        let processor = ChunkProcessor::new(
            Arc::new(MemorySessionStore::new(Duration::from_secs(60))),
            Arc::new(target.clone()),
            1024,
        );
        let filler = vec![b'x'; 1000];

        let mut response = processor
            .process(&request(0, 0, false), b"1,\"never closed\n")
            .await
            .unwrap();
        let mut chunks = 0;
        while response.state == ImportState::Streaming {
            assert!(response.remainder_len <= processor.max_remainder_bytes() as u64);
            chunks += 1;
            assert!(chunks <= 10, "remainder grew without bound");
            response = processor
                .process(
                    &request(response.offset, response.remainder_len, false),
                    &filler,
                )
                .await
                .unwrap();
        }

        assert_eq!(chunks, 5);
        assert_eq!(response.state, ImportState::TruncatedError);
        assert_eq!(response.remainder_len, 0);
        assert_eq!(response.errors, 1);
        assert!(response.log_entries[0].message.contains("exceeds the 4096 byte limit"));
        assert!(target.rows("public", "people").is_empty());

        let result = processor
            .process(&request(response.offset, 0, false), &filler)
            .await;
        assert!(matches!(result, Err(ImportError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_same_chunks_give_same_responses() {
        let chunks: [&[u8]; 4] = [b"1,ann\n2,caf\xc3", b"\xa9\n3,b", b"ob\n4,", b"dee\n"];

        let mut runs = Vec::new();
        for _ in 0..2 {
            let target = people();
            let processor = processor(&target);
            let mut seen = Vec::new();
            let (mut offset, mut remainder_len) = (0, 0);
            for (i, chunk) in chunks.iter().enumerate() {
                let eof = i == chunks.len() - 1;
                let response = processor
                    .process(&request(offset, remainder_len, eof), chunk)
                    .await
                    .unwrap();
                offset = response.offset;
                remainder_len = response.remainder_len;
                seen.push((response.offset, response.remainder.clone(), response.records));
            }
            assert_eq!(target.rows("public", "people")[1], vec![text("2"), text("café")]);
            runs.push(seen);
        }

        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[0][0], (12, b"2,caf\xc3".to_vec(), 1));
        assert_eq!(runs[0][1], (17, b"3,b".to_vec(), 2));
        assert_eq!(runs[0][3], (26, Vec::new(), 4));
    }

    #[test]
    fn test_bytea_decoding() {
        assert_eq!(decode_bytea("\\x00ff", ByteaEncoding::Raw).unwrap(), "\\x00ff");
        assert_eq!(decode_bytea("00FF", ByteaEncoding::Hex).unwrap(), "\\x00ff");
        assert_eq!(decode_bytea("AP8=", ByteaEncoding::Base64).unwrap(), "\\x00ff");
        assert!(decode_bytea("0g", ByteaEncoding::Hex).is_err());
        assert!(decode_bytea("abc", ByteaEncoding::Hex).is_err());
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
