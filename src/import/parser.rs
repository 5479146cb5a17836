// ABOUTME: Incremental record parsers for csv, tsv, json and xml uploads
// ABOUTME: Returns complete records plus how many bytes they consumed; the rest is the remainder

use super::session::DataFormat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Null,
    Text { value: String, quoted: bool },
}

impl Field {
    pub fn text(value: impl Into<String>) -> Self {
        Field::Text {
            value: value.into(),
            quoted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Values by position (csv, tsv, json arrays)
    Positional(Vec<Field>),
    /// Values by column name (json objects, xml rows)
    Named(Vec<(String, Field)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Record(Record),
    /// A complete but unusable record
    Invalid(String),
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub items: Vec<Parsed>,
    pub consumed: usize,
}

/// How a json upload wraps its records, learned from its first bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonLayout {
    #[default]
    Undecided,
    /// Whitespace separated values
    Stream,
    /// One top-level array; records are its elements
    Array,
    /// The top-level array has been closed
    Closed,
}

/// Parse every complete record in `buffer`
///
/// With `eof` set, a final delimited record without a line terminator is
/// accepted when its quotes are balanced.
pub fn parse_records(
    format: DataFormat,
    buffer: &[u8],
    eof: bool,
    layout: &mut JsonLayout,
) -> ParseOutcome {
    match format {
        DataFormat::Csv => parse_delimited(buffer, b',', true, eof),
        DataFormat::Tsv => parse_delimited(buffer, b'\t', false, eof),
        DataFormat::Json => parse_json(buffer, eof, layout),
        DataFormat::Xml => parse_xml(buffer, eof),
    }
}

/// Whether each field of a raw delimited record started with a quote
fn quoted_flags(raw: &[u8], delimiter: u8) -> Vec<bool> {
    let mut flags = Vec::new();
    let mut field_start = true;
    let mut in_quotes = false;
    for &b in raw.iter().skip_while(|b| **b == b'\n' || **b == b'\r') {
        if field_start {
            flags.push(b == b'"');
            field_start = false;
            if b == b'"' {
                in_quotes = true;
                continue;
            }
        }
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if !in_quotes && b == delimiter {
            field_start = true;
        } else if !in_quotes && (b == b'\n' || b == b'\r') {
            break;
        }
    }
    if field_start {
        flags.push(false);
    }
    flags
}

fn quotes_balanced(raw: &[u8]) -> bool {
    raw.iter().filter(|b| **b == b'"').count() % 2 == 0
}

fn parse_delimited(buffer: &[u8], delimiter: u8, quoting: bool, eof: bool) -> ParseOutcome {
    let mut reader = csv_core::ReaderBuilder::new()
        .delimiter(delimiter)
        .quoting(quoting)
        .build();
    let mut outcome = ParseOutcome::default();
    let mut output = vec![0u8; 4096];
    let mut ends = vec![0usize; 64];
    let mut out_len = 0;
    let mut n_ends = 0;
    let mut pos = 0;
    let mut record_start = 0;
    let mut flushing = false;

    loop {
        let input = if flushing { &[][..] } else { &buffer[pos..] };
        let (result, n_in, n_out, n_end) =
            reader.read_record(input, &mut output[out_len..], &mut ends[n_ends..]);
        pos += n_in;
        out_len += n_out;
        n_ends += n_end;

        match result {
            csv_core::ReadRecordResult::OutputFull => {
                let len = output.len();
                output.resize(len * 2, 0);
            }
            csv_core::ReadRecordResult::OutputEndsFull => {
                let len = ends.len();
                ends.resize(len * 2, 0);
            }
            csv_core::ReadRecordResult::InputEmpty => {
                let tail = &buffer[record_start..];
                let pending = tail.iter().any(|b| !b.is_ascii_whitespace());
                if eof && !flushing && pending && (!quoting || quotes_balanced(tail)) {
                    flushing = true;
                    continue;
                }
                let blank_lines = tail.iter().all(|b| *b == b'\n' || *b == b'\r');
                if (eof && !pending) || blank_lines {
                    record_start = buffer.len();
                }
                break;
            }
            csv_core::ReadRecordResult::Record => {
                let raw = if flushing {
                    &buffer[record_start..]
                } else {
                    &buffer[record_start..pos]
                };
                let flags = if quoting {
                    quoted_flags(raw, delimiter)
                } else {
                    Vec::new()
                };
                outcome
                    .items
                    .push(decode_fields(&output[..out_len], &ends[..n_ends], &flags));
                record_start = if flushing { buffer.len() } else { pos };
                out_len = 0;
                n_ends = 0;
                if flushing {
                    break;
                }
            }
            csv_core::ReadRecordResult::End => break,
        }
    }

    outcome.consumed = record_start;
    outcome
}

fn decode_fields(output: &[u8], ends: &[usize], flags: &[bool]) -> Parsed {
    let text = match std::str::from_utf8(output) {
        Ok(text) => text,
        Err(e) => return Parsed::Invalid(format!("invalid UTF-8 ({})", e)),
    };
    let mut fields = Vec::with_capacity(ends.len());
    let mut start = 0;
    for (i, &end) in ends.iter().enumerate() {
        fields.push(Field::Text {
            value: text[start..end].to_string(),
            quoted: flags.get(i).copied().unwrap_or(false),
        });
        start = end;
    }
    Parsed::Record(Record::Positional(fields))
}

/// End of the json value starting at `start`, if it is complete
fn scan_json_value(buffer: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in buffer[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn json_field(value: serde_json::Value) -> Field {
    match value {
        serde_json::Value::Null => Field::Null,
        serde_json::Value::String(s) => Field::Text {
            value: s,
            quoted: true,
        },
        other => Field::Text {
            value: other.to_string(),
            quoted: true,
        },
    }
}

fn json_record(bytes: &[u8]) -> Parsed {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Object(map)) => Parsed::Record(Record::Named(
            map.into_iter().map(|(k, v)| (k, json_field(v))).collect(),
        )),
        Ok(serde_json::Value::Array(items)) => {
            Parsed::Record(Record::Positional(items.into_iter().map(json_field).collect()))
        }
        Ok(_) => Parsed::Invalid("expected a JSON object or array".to_string()),
        Err(e) => Parsed::Invalid(format!("invalid JSON: {}", e)),
    }
}

fn parse_json(buffer: &[u8], eof: bool, layout: &mut JsonLayout) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut pos = 0;

    loop {
        while pos < buffer.len()
            && (buffer[pos].is_ascii_whitespace()
                || (*layout == JsonLayout::Array && buffer[pos] == b','))
        {
            pos += 1;
        }
        if pos >= buffer.len() {
            outcome.consumed = pos;
            break;
        }

        if *layout == JsonLayout::Undecided {
            if buffer[pos] == b'[' {
                let next = buffer[pos + 1..]
                    .iter()
                    .position(|b| !b.is_ascii_whitespace())
                    .map(|p| buffer[pos + 1 + p]);
                match next {
                    Some(b'{') | Some(b'[') => {
                        *layout = JsonLayout::Array;
                        pos += 1;
                        continue;
                    }
                    Some(b']') => *layout = JsonLayout::Array,
                    Some(_) => *layout = JsonLayout::Stream,
                    None if eof => *layout = JsonLayout::Stream,
                    None => {
                        outcome.consumed = pos;
                        break;
                    }
                }
                if *layout == JsonLayout::Array {
                    pos += 1;
                    continue;
                }
            } else {
                *layout = JsonLayout::Stream;
            }
        }

        if *layout == JsonLayout::Array && buffer[pos] == b']' {
            *layout = JsonLayout::Closed;
            pos += 1;
            continue;
        }

        let b = buffer[pos];
        if *layout == JsonLayout::Closed || (b != b'{' && b != b'[') {
            let skip_to = buffer[pos..].iter().position(|c| *c == b'\n');
            match skip_to {
                Some(n) => {
                    outcome.items.push(Parsed::Invalid(format!(
                        "unexpected input '{}'",
                        String::from_utf8_lossy(&buffer[pos..pos + n]).trim()
                    )));
                    pos += n + 1;
                    continue;
                }
                None if eof => {
                    outcome.items.push(Parsed::Invalid(format!(
                        "unexpected input '{}'",
                        String::from_utf8_lossy(&buffer[pos..]).trim()
                    )));
                    outcome.consumed = buffer.len();
                    break;
                }
                None => {
                    outcome.consumed = pos;
                    break;
                }
            }
        }

        match scan_json_value(buffer, pos) {
            Some(end) => {
                outcome.items.push(json_record(&buffer[pos..end]));
                pos = end;
                outcome.consumed = pos;
            }
            None => {
                outcome.consumed = pos;
                break;
            }
        }
    }
    outcome
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Start of the next `<row>` element at or after `from`
fn find_row_open(buffer: &[u8], from: usize) -> Option<usize> {
    let mut at = from;
    while let Some(start) = find(buffer, at, b"<row") {
        match buffer.get(start + 4) {
            Some(b'>') | Some(b'/') => return Some(start),
            Some(c) if c.is_ascii_whitespace() => return Some(start),
            Some(_) => at = start + 4,
            None => return Some(start),
        }
    }
    None
}

fn parse_xml(buffer: &[u8], eof: bool) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut pos = 0;

    loop {
        let Some(open) = find_row_open(buffer, pos) else {
            // Keep a tag that may be the beginning of the next row.
            outcome.consumed = if eof {
                buffer.len()
            } else {
                buffer[pos..]
                    .iter()
                    .rposition(|b| *b == b'<')
                    .map(|p| pos + p)
                    .unwrap_or(buffer.len())
            };
            break;
        };
        let Some(gt) = find(buffer, open, b">") else {
            outcome.consumed = open;
            break;
        };
        if buffer[gt - 1] == b'/' {
            outcome
                .items
                .push(Parsed::Invalid("empty <row/> element".to_string()));
            pos = gt + 1;
            outcome.consumed = pos;
            continue;
        }
        let Some(close) = find(buffer, gt + 1, b"</row>") else {
            outcome.consumed = open;
            break;
        };
        outcome.items.push(parse_xml_row(&buffer[gt + 1..close]));
        pos = close + b"</row>".len();
        outcome.consumed = pos;
    }
    outcome
}

fn xml_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn xml_attribute(attributes: &str, key: &str) -> Option<String> {
    let mut search = attributes;
    while let Some(at) = search.find(key) {
        let before_ok = at == 0
            || search[..at]
                .chars()
                .last()
                .map(char::is_whitespace)
                .unwrap_or(true);
        let after = search[at + key.len()..].trim_start();
        if before_ok {
            if let Some(value) = after.strip_prefix('=') {
                let value = value.trim_start();
                let quote = value.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let body = &value[1..];
                    let end = body.find(quote)?;
                    return Some(xml_unescape(&body[..end]));
                }
            }
        }
        search = &search[at + key.len()..];
    }
    None
}

fn parse_xml_row(inner: &[u8]) -> Parsed {
    let text = match std::str::from_utf8(inner) {
        Ok(text) => text,
        Err(e) => return Parsed::Invalid(format!("invalid UTF-8 ({})", e)),
    };

    let mut fields = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<column") {
        rest = &rest[start + "<column".len()..];
        let Some(gt) = rest.find('>') else {
            return Parsed::Invalid("unterminated <column> tag".to_string());
        };
        let self_closing = rest[..gt].ends_with('/');
        let attributes = rest[..gt].trim_end_matches('/');
        let Some(name) = xml_attribute(attributes, "name") else {
            return Parsed::Invalid("<column> without a name attribute".to_string());
        };
        let is_null = xml_attribute(attributes, "null")
            .map(|v| matches!(v.as_str(), "null" | "true" | "1"))
            .unwrap_or(false);
        rest = &rest[gt + 1..];

        let value = if self_closing {
            String::new()
        } else {
            let Some(end) = rest.find("</column>") else {
                return Parsed::Invalid(format!("unterminated <column name=\"{}\">", name));
            };
            let value = xml_unescape(&rest[..end]);
            rest = &rest[end + "</column>".len()..];
            value
        };

        fields.push((
            name,
            if is_null {
                Field::Null
            } else {
                Field::Text {
                    value,
                    quoted: true,
                }
            },
        ));
    }

    if fields.is_empty() {
        return Parsed::Invalid("<row> without <column> elements".to_string());
    }
    Parsed::Record(Record::Named(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(format: DataFormat, input: &[u8], eof: bool) -> ParseOutcome {
        parse_records(format, input, eof, &mut JsonLayout::default())
    }

    fn positional(values: &[&str]) -> Parsed {
        Parsed::Record(Record::Positional(
            values.iter().map(|v| Field::text(*v)).collect(),
        ))
    }

    #[test]
    fn test_csv_keeps_partial_line() {
        let input = b"1,alpha\n2,beta\n3,gam";
        let outcome = parse(DataFormat::Csv, input, false);
        assert_eq!(outcome.items, vec![positional(&["1", "alpha"]), positional(&["2", "beta"])]);
        assert_eq!(&input[outcome.consumed..], b"3,gam");
    }

    #[test]
    fn test_csv_quotes_and_crlf() {
        let input = b"1,\"a, \"\"quoted\"\"\r\nvalue\",NULL\r\n";
        let outcome = parse(DataFormat::Csv, input, false);
        assert_eq!(outcome.consumed, input.len());
        assert_eq!(
            outcome.items,
            vec![Parsed::Record(Record::Positional(vec![
                Field::text("1"),
                Field::Text {
                    value: "a, \"quoted\"\r\nvalue".to_string(),
                    quoted: true
                },
                Field::text("NULL"),
            ]))]
        );
    }

    #[test]
    fn test_csv_final_line_flushed_at_eof() {
        let outcome = parse(DataFormat::Csv, b"1,a\n2,b", true);
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.consumed, 7);

        let unbalanced = b"1,a\n2,\"open";
        let outcome = parse(DataFormat::Csv, unbalanced, true);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(&unbalanced[outcome.consumed..], b"2,\"open");
    }

    #[test]
    fn test_tsv_has_no_quoting() {
        let outcome = parse(DataFormat::Tsv, b"1\t\"x\"\t\\N\n", false);
        assert_eq!(outcome.items, vec![positional(&["1", "\"x\"", "\\N"])]);
    }

    #[test]
    fn test_json_array_across_chunks() {
        let mut layout = JsonLayout::default();
        let first = b"[{\"id\": 1, \"name\": \"a\"}, {\"id\": 2, \"na";
        let outcome = parse_records(DataFormat::Json, first, false, &mut layout);
        assert_eq!(layout, JsonLayout::Array);
        assert_eq!(outcome.items.len(), 1);
        let remainder = &first[outcome.consumed..];
        assert!(remainder.starts_with(b"{\"id\": 2"));

        let mut second = remainder.to_vec();
        second.extend_from_slice(b"me\": null}]\n");
        let outcome = parse_records(DataFormat::Json, &second, true, &mut layout);
        assert_eq!(layout, JsonLayout::Closed);
        assert_eq!(outcome.consumed, second.len());
        assert_eq!(
            outcome.items,
            vec![Parsed::Record(Record::Named(vec![
                ("id".to_string(), Field::Text { value: "2".to_string(), quoted: true }),
                ("name".to_string(), Field::Null),
            ]))]
        );
    }

    #[test]
    fn test_json_stream_and_garbage() {
        let outcome = parse(DataFormat::Json, b"{\"a\":1}\n\"oops\"\n[1,2]\n", true);
        assert_eq!(outcome.items.len(), 3);
        assert!(matches!(outcome.items[1], Parsed::Invalid(_)));
        assert!(matches!(outcome.items[2], Parsed::Record(Record::Positional(_))));
    }

    #[test]
    fn test_xml_rows() {
        let input = b"<?xml version=\"1.0\"?>\n<data>\n<row><column name=\"id\">1</column>\
<column name=\"note\">a &amp; b</column></row>\n<row><column name=\"id\">2</column>\
<column name=\"note\" null=\"null\"/></row>\n<ro";
        let outcome = parse(DataFormat::Xml, input, false);
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(
            outcome.items[0],
            Parsed::Record(Record::Named(vec![
                ("id".to_string(), Field::Text { value: "1".to_string(), quoted: true }),
                ("note".to_string(), Field::Text { value: "a & b".to_string(), quoted: true }),
            ]))
        );
        assert_eq!(
            outcome.items[1],
            Parsed::Record(Record::Named(vec![
                ("id".to_string(), Field::Text { value: "2".to_string(), quoted: true }),
                ("note".to_string(), Field::Null),
            ]))
        );
        assert_eq!(&input[outcome.consumed..], b"<ro");
    }

    #[test]
    fn test_xml_trailer_consumed_at_eof() {
        let outcome = parse(DataFormat::Xml, b"</data>\n", true);
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.consumed, 8);
    }
}
