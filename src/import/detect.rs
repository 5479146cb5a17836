// ABOUTME: Format auto-detection from the first bytes of an upload

use super::session::DataFormat;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Guess the format of `buffer`
///
/// `Ok(None)` means more bytes are needed. Structured and markup input is
/// recognised by its first non-blank byte; delimited input by the first
/// complete non-blank line, which must contain a tab or a comma.
pub fn detect_format(buffer: &[u8], eof: bool) -> Result<Option<DataFormat>, String> {
    let buffer = buffer.strip_prefix(UTF8_BOM).unwrap_or(buffer);
    let Some(start) = buffer.iter().position(|b| !b.is_ascii_whitespace()) else {
        return Ok(None);
    };

    match buffer[start] {
        b'{' | b'[' => return Ok(Some(DataFormat::Json)),
        b'<' => return Ok(Some(DataFormat::Xml)),
        _ => {}
    }

    let rest = &buffer[start..];
    let line = match rest.iter().position(|b| *b == b'\n') {
        Some(end) => &rest[..end],
        None if eof => rest,
        None => return Ok(None),
    };

    if line.contains(&b'\t') {
        Ok(Some(DataFormat::Tsv))
    } else if line.contains(&b',') {
        Ok(Some(DataFormat::Csv))
    } else {
        Err("cannot detect the input format: the first line has neither tabs nor commas; \
             specify format explicitly"
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_and_markup() {
        assert_eq!(detect_format(b"  [{\"a\":1}", false), Ok(Some(DataFormat::Json)));
        assert_eq!(detect_format(b"\xEF\xBB\xBF{", false), Ok(Some(DataFormat::Json)));
        assert_eq!(detect_format(b"\n<?xml version", false), Ok(Some(DataFormat::Xml)));
    }

    #[test]
    fn test_delimited_needs_a_complete_line() {
        assert_eq!(detect_format(b"id,name", false), Ok(None));
        assert_eq!(detect_format(b"id,name", true), Ok(Some(DataFormat::Csv)));
        assert_eq!(detect_format(b"\n\nid\tname\n1\tx", false), Ok(Some(DataFormat::Tsv)));
        assert_eq!(detect_format(b"   \n", false), Ok(None));
    }

    #[test]
    fn test_ambiguous_line_is_an_error() {
        assert!(detect_format(b"just words\n", false).is_err());
    }
}
