// ABOUTME: Local import command feeding a file through the chunk processor
// ABOUTME: Reads fixed-size byte ranges so the file is never held in memory

use crate::import::{
    sha256_hex, ChunkProcessor, ChunkRequest, ChunkResponse, ImportOptions, ImportState,
    MemorySessionStore, PgTargetProvider, TargetProvider,
};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Import `file` into the table named in `options` on `target_url`
///
/// Compressed files (gzip, bzip2, or the first entry of a zip archive) are
/// decompressed while reading. Each range goes through the same processor
/// the HTTP endpoint uses, with a session held in memory.
///
/// # Errors
///
/// Fails when the file cannot be read, the target table is unusable, or the
/// session stalls. Per-record problems are logged and counted instead.
pub async fn import(
    target_url: &str,
    file: &Path,
    options: ImportOptions,
    chunk_size: usize,
) -> Result<ChunkResponse> {
    crate::utils::validate_connection_string(target_url)
        .context("Invalid target connection string")?;
    let targets = Arc::new(PgTargetProvider::single(target_url));
    import_with(targets, file, options, chunk_size).await
}

/// Same as [`import`] with an explicit target provider
pub async fn import_with(
    targets: Arc<dyn TargetProvider>,
    file: &Path,
    options: ImportOptions,
    chunk_size: usize,
) -> Result<ChunkResponse> {
    if chunk_size == 0 {
        bail!("--chunk-size must be greater than zero");
    }
    let handle = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let size = handle
        .metadata()
        .with_context(|| format!("Failed to stat {}", file.display()))?
        .len();

    let progress = ProgressBar::new(size);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} {msg}")?
            .progress_chars("##-"),
    );

    let mut magic = [0u8; 4];
    let read = File::open(file)
        .and_then(|mut f| f.read(&mut magic))
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let reader = progress.wrap_read(BufReader::new(handle));

    let processor = ChunkProcessor::new(
        Arc::new(MemorySessionStore::new(Duration::from_secs(24 * 3600))),
        targets,
        chunk_size,
    );
    let session_id = format!("local-{}", chrono::Utc::now().timestamp_millis());
    tracing::info!(
        "Importing {} into {}.{}",
        file.display(),
        options.schema,
        options.table
    );

    let response = match &magic[..read] {
        [0x1f, 0x8b, ..] => {
            let decoder = flate2::read::MultiGzDecoder::new(reader);
            drive(&processor, &session_id, &options, decoder, chunk_size, &progress).await?
        }
        [b'B', b'Z', b'h', ..] => {
            let decoder = bzip2::read::BzDecoder::new(reader);
            drive(&processor, &session_id, &options, decoder, chunk_size, &progress).await?
        }
        [b'P', b'K', 0x03, 0x04] => {
            let mut archive = zip::ZipArchive::new(File::open(file)?)
                .with_context(|| format!("Failed to open zip archive {}", file.display()))?;
            let entry = archive
                .by_index(0)
                .context("Zip archive has no readable entries")?;
            progress.set_length(entry.size());
            let entry = progress.wrap_read(entry);
            drive(&processor, &session_id, &options, entry, chunk_size, &progress).await?
        }
        _ => drive(&processor, &session_id, &options, reader, chunk_size, &progress).await?,
    };
    progress.finish_and_clear();

    match response.state {
        ImportState::Complete => tracing::info!(
            "✓ Imported {} record(s) with {} error(s)",
            response.records,
            response.errors
        ),
        state => tracing::warn!(
            "⚠ Import finished as {} after {} record(s), {} error(s)",
            state,
            response.records,
            response.errors
        ),
    }
    Ok(response)
}

/// Fill `buf` up to `chunk_size` bytes, stopping early only at end of input
fn read_chunk(reader: &mut impl Read, chunk_size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(chunk_size);
    reader
        .take(chunk_size as u64)
        .read_to_end(&mut buf)
        .context("Failed to read input")?;
    Ok(buf)
}

async fn drive(
    processor: &ChunkProcessor,
    session_id: &str,
    options: &ImportOptions,
    mut reader: impl Read,
    chunk_size: usize,
    progress: &ProgressBar,
) -> Result<ChunkResponse> {
    let mut request = ChunkRequest {
        session_id: session_id.to_string(),
        offset: 0,
        remainder_len: 0,
        eof: false,
        chunk_hash: None,
        options: options.clone(),
    };

    let mut current = read_chunk(&mut reader, chunk_size)?;
    loop {
        // One range of lookahead tells the processor when it sees the last chunk.
        let next = if current.len() < chunk_size {
            Vec::new()
        } else {
            read_chunk(&mut reader, chunk_size)?
        };
        request.eof = next.is_empty();
        request.chunk_hash = Some(sha256_hex(&current));

        let response = processor.process(&request, &current).await?;
        for entry in &response.log_entries {
            tracing::debug!("{:?}: {}", entry.level, entry.message);
        }
        progress.set_message(format!("{} records, {} errors", response.records, response.errors));

        if request.eof {
            return Ok(response);
        }
        request.offset = response.offset;
        request.remainder_len = response.remainder_len;
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{MemoryTarget, TargetColumn};
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn target() -> MemoryTarget {
        MemoryTarget::new().with_table(
            "public",
            "events",
            vec![
                TargetColumn::new("id", "integer", false),
                TargetColumn::new("kind", "text", true),
            ],
        )
    }

    fn csv_rows(count: usize) -> String {
        let mut text = String::from("id,kind\n");
        for i in 0..count {
            text.push_str(&format!("{},\"kind {}\"\n", i, i));
        }
        text
    }

    #[tokio::test]
    async fn test_small_chunks_split_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(csv_rows(50).as_bytes()).unwrap();

        let target = target();
        let mut options = ImportOptions::new("public", "events");
        options.use_header = true;
        let response = import_with(Arc::new(target.clone()), file.path(), options, 7)
            .await
            .unwrap();

        assert_eq!(response.state, ImportState::Complete);
        assert_eq!(response.records, 50);
        assert_eq!(response.errors, 0);
        let rows = target.rows("public", "events");
        assert_eq!(rows[49], vec![Some("49".to_string()), Some("kind 49".to_string())]);
    }

    #[tokio::test]
    async fn test_gzip_file_is_streamed() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(csv_rows(20).as_bytes()).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&encoder.finish().unwrap()).unwrap();

        let target = target();
        let mut options = ImportOptions::new("public", "events");
        options.use_header = true;
        let response = import_with(Arc::new(target.clone()), file.path(), options, 64)
            .await
            .unwrap();
        assert_eq!(response.records, 20);
        assert_eq!(target.rows("public", "events").len(), 20);
    }

    #[tokio::test]
    async fn test_unterminated_quote_truncates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"1,ok\n2,\"never closed\n").unwrap();

        let target = target();
        let response = import_with(
            Arc::new(target.clone()),
            file.path(),
            ImportOptions::new("public", "events"),
            1024,
        )
        .await
        .unwrap();
        assert_eq!(response.state, ImportState::TruncatedError);
        assert_eq!(response.records, 1);
        assert_eq!(response.errors, 1);
    }
}
