// ABOUTME: Dump command writing a dependency-ordered SQL script
// ABOUTME: Streams through a plain, gzip, bzip2 or zip sink into a file or stdout

use crate::dump::{Compression, DumpOptions, DumpStats, Exporter, OutputSink};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Dump `source_url` to `output` (stdout when `None`)
///
/// # Arguments
///
/// * `source_url` - Connection string of the source server or database
/// * `options` - Scope, selection and rendering options
/// * `compression` - Framing applied to the script
/// * `output` - Destination file
///
/// # Errors
///
/// Fails on invalid options, connection or catalog errors, and write failures.
/// Per-object catalog failures are reported inside the script instead.
pub async fn dump(
    source_url: &str,
    options: DumpOptions,
    compression: Compression,
    output: Option<&Path>,
) -> Result<DumpStats> {
    let exporter = Exporter::new(source_url, options)?;

    let base_name = output
        .and_then(|path| path.file_stem())
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.trim_end_matches(".sql").to_string())
        .unwrap_or_else(|| "dump".to_string());

    let writer: Box<dyn Write + Send> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let (mut sink, framing) = OutputSink::begin(compression, &base_name, writer)?;
    tracing::info!("Writing {} ({})", framing.file_name, framing.content_type);

    let result = exporter.run(&mut sink).await;
    // The sink is closed on every path so partial output stays readable.
    let finished = sink.finish();
    let stats = result?;
    finished?;

    tracing::info!(
        "✓ Dumped {} database(s): {} object(s), {} row(s) from {} table(s)",
        stats.databases,
        stats.objects,
        stats.rows,
        stats.tables_with_data
    );
    if stats.catalog_failures > 0 || stats.deferred_skipped > 0 {
        tracing::warn!(
            "⚠ {} object(s) could not be read and {} deferred statement(s) were skipped",
            stats.catalog_failures,
            stats.deferred_skipped
        );
    }
    if stats.circular_objects > 0 {
        tracing::warn!(
            "⚠ {} object(s) are in circular dependencies; review the script before replaying it",
            stats.circular_objects
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_invalid_url_before_creating_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sql");
        let result = dump(
            "mysql://localhost/db",
            DumpOptions::default(),
            Compression::Plain,
            Some(&path),
        )
        .await;
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    #[ignore]
    async fn test_dump_to_gzip_file() {
        let url = std::env::var("TEST_SOURCE_URL").expect("TEST_SOURCE_URL not set");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.sql.gz");
        let stats = dump(&url, DumpOptions::default(), Compression::Gzip, Some(&path))
            .await
            .unwrap();
        assert_eq!(stats.databases, 1);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
