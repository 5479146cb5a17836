// ABOUTME: Per-chunk decompression selected by magic bytes
// ABOUTME: gzip, bzip2 and the first entry of a zip archive are recognised

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use std::io::{Cursor, Read};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEncoding {
    Identity,
    Gzip,
    Bzip2,
    Zip,
}

pub fn sniff(chunk: &[u8]) -> ChunkEncoding {
    if chunk.starts_with(GZIP_MAGIC) {
        ChunkEncoding::Gzip
    } else if chunk.starts_with(BZIP2_MAGIC) {
        ChunkEncoding::Bzip2
    } else if chunk.starts_with(ZIP_MAGIC) {
        ChunkEncoding::Zip
    } else {
        ChunkEncoding::Identity
    }
}

fn read_limited(reader: impl Read, limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .context("corrupt compressed chunk")?;
    if out.len() > limit {
        bail!("decompressed chunk exceeds {} bytes", limit);
    }
    Ok(out)
}

/// Decompress `chunk` if it starts with a known magic, never producing more than `limit` bytes
pub fn decompress(chunk: &[u8], limit: usize) -> Result<Vec<u8>> {
    match sniff(chunk) {
        ChunkEncoding::Identity => Ok(chunk.to_vec()),
        ChunkEncoding::Gzip => read_limited(MultiGzDecoder::new(chunk), limit),
        ChunkEncoding::Bzip2 => read_limited(bzip2::read::BzDecoder::new(chunk), limit),
        ChunkEncoding::Zip => {
            let mut archive =
                zip::ZipArchive::new(Cursor::new(chunk)).context("corrupt zip chunk")?;
            if archive.len() == 0 {
                bail!("zip chunk has no entries");
            }
            let entry = archive.by_index(0).context("unreadable zip entry")?;
            read_limited(entry, limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_identity_passthrough() {
        assert_eq!(decompress(b"1,a\n", 100).unwrap(), b"1,a\n");
    }

    #[test]
    fn test_gzip_chunk() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"id,name\n1,a\n").unwrap();
        let bytes = encoder.finish().unwrap();
        assert_eq!(sniff(&bytes), ChunkEncoding::Gzip);
        assert_eq!(decompress(&bytes, 1024).unwrap(), b"id,name\n1,a\n");
    }

    #[test]
    fn test_zip_first_entry() {
        let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
        archive
            .start_file("rows.csv", zip::write::SimpleFileOptions::default())
            .unwrap();
        archive.write_all(b"1,a\n").unwrap();
        let bytes = archive.finish().unwrap().into_inner();
        assert_eq!(decompress(&bytes, 1024).unwrap(), b"1,a\n");
    }

    #[test]
    fn test_limit_enforced() {
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(&[b'x'; 4096]).unwrap();
        let bytes = encoder.finish().unwrap();
        assert!(decompress(&bytes, 1024).is_err());
        assert_eq!(decompress(&bytes, 4096).unwrap().len(), 4096);
    }
}
