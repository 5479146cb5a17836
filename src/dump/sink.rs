// ABOUTME: Output sinks wrapping the dump stream in plain, gzip, bzip2 or zip framing
// ABOUTME: finish() closes every filter and writes the zip central directory

use anyhow::{Context, Result};
use clap::ValueEnum;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Compression {
    #[default]
    Plain,
    Gzip,
    Bzip2,
    Zip,
}

impl Compression {
    pub fn extension(self) -> &'static str {
        match self {
            Compression::Plain => "sql",
            Compression::Gzip => "sql.gz",
            Compression::Bzip2 => "sql.bz2",
            Compression::Zip => "zip",
        }
    }
}

/// How the produced bytes are described to whoever receives them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framing {
    pub content_type: &'static str,
    pub content_encoding: Option<&'static str>,
    pub file_name: String,
}

impl Framing {
    fn for_compression(compression: Compression, base_name: &str) -> Self {
        let (content_type, content_encoding) = match compression {
            Compression::Plain => ("application/sql", None),
            Compression::Gzip => ("application/sql", Some("gzip")),
            Compression::Bzip2 => ("application/x-bzip2", None),
            Compression::Zip => ("application/zip", None),
        };
        Self {
            content_type,
            content_encoding,
            file_name: format!("{}.{}", base_name, compression.extension()),
        }
    }
}

/// A filtered stream in front of `W`
///
/// Zip archives need a seekable target, so the archive is assembled in a
/// temporary file and copied to `W` when the sink is finished.
pub enum OutputSink<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Zip {
        archive: ZipWriter<File>,
        out: W,
    },
}

impl<W: Write> OutputSink<W> {
    /// Allocate the filter for `compression` and describe the framing
    pub fn begin(compression: Compression, base_name: &str, out: W) -> Result<(Self, Framing)> {
        let framing = Framing::for_compression(compression, base_name);
        let sink = match compression {
            Compression::Plain => OutputSink::Plain(out),
            Compression::Gzip => {
                OutputSink::Gzip(GzEncoder::new(out, flate2::Compression::default()))
            }
            Compression::Bzip2 => OutputSink::Bzip2(bzip2::write::BzEncoder::new(
                out,
                bzip2::Compression::default(),
            )),
            Compression::Zip => {
                let spool = tempfile::tempfile().context("Failed to create zip spool file")?;
                let mut archive = ZipWriter::new(spool);
                archive
                    .start_file(format!("{}.sql", base_name), SimpleFileOptions::default())
                    .context("Failed to start zip entry")?;
                OutputSink::Zip { archive, out }
            }
        };
        tracing::debug!("Output sink ready: {}", framing.file_name);
        Ok((sink, framing))
    }

    /// Flush and close the filter, returning the underlying writer
    pub fn finish(self) -> Result<W> {
        let mut out = match self {
            OutputSink::Plain(out) => out,
            OutputSink::Gzip(encoder) => encoder.finish().context("Failed to finish gzip stream")?,
            OutputSink::Bzip2(encoder) => {
                encoder.finish().context("Failed to finish bzip2 stream")?
            }
            OutputSink::Zip { archive, mut out } => {
                let mut spool = archive
                    .finish()
                    .context("Failed to write zip central directory")?;
                spool
                    .seek(SeekFrom::Start(0))
                    .context("Failed to rewind zip spool file")?;
                io::copy(&mut spool, &mut out).context("Failed to copy zip archive")?;
                out
            }
        };
        out.flush().context("Failed to flush output")?;
        Ok(out)
    }
}

impl<W: Write> Write for OutputSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Plain(out) => out.write(buf),
            OutputSink::Gzip(encoder) => encoder.write(buf),
            OutputSink::Bzip2(encoder) => encoder.write(buf),
            OutputSink::Zip { archive, .. } => archive.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Plain(out) => out.flush(),
            OutputSink::Gzip(encoder) => encoder.flush(),
            OutputSink::Bzip2(encoder) => encoder.flush(),
            OutputSink::Zip { archive, .. } => archive.flush(),
        }
    }
}
