// ABOUTME: Line-oriented writer for the SQL script produced by a dump
// ABOUTME: Counts statements and renders section headers and comment blocks

use anyhow::{Context, Result};
use std::io::Write;

pub struct ScriptWriter<'w> {
    out: &'w mut (dyn Write + Send),
    statements: u64,
}

impl<'w> ScriptWriter<'w> {
    pub fn new(out: &'w mut (dyn Write + Send)) -> Self {
        Self { out, statements: 0 }
    }

    pub fn statements(&self) -> u64 {
        self.statements
    }

    /// Write a statement; text starting with `--` is written as a comment
    pub fn statement(&mut self, sql: &str) -> Result<()> {
        if let Some(note) = sql.strip_prefix("--") {
            return self.comment(note.trim_start());
        }
        self.statements += 1;
        writeln!(self.out, "{}", sql).context("Failed to write dump output")
    }

    /// Write `text` as `--` lines
    ///
    /// psql ends a comment at either `\n` or `\r`, so both split lines and any
    /// other control character is dropped.
    pub fn comment(&mut self, text: &str) -> Result<()> {
        for line in text.trim_end_matches(['\n', '\r']).split(['\n', '\r']) {
            let line: String = line.chars().filter(|c| !c.is_control()).collect();
            if line.is_empty() {
                writeln!(self.out, "--")
            } else {
                writeln!(self.out, "-- {}", line)
            }
            .context("Failed to write dump output")?;
        }
        Ok(())
    }

    pub fn section(&mut self, title: &str) -> Result<()> {
        write!(self.out, "\n--\n-- {}\n--\n\n", title).context("Failed to write dump output")
    }

    /// Write bytes verbatim, used for COPY data blocks
    pub fn raw(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .context("Failed to write dump output")
    }

    pub fn blank(&mut self) -> Result<()> {
        writeln!(self.out).context("Failed to write dump output")
    }

    /// Direct access for row formatters
    pub fn inner(&mut self) -> &mut (dyn Write + Send) {
        &mut *self.out
    }
}

/// Session settings written at the top of each database section
pub const PRELIMINARIES: &[&str] = &[
    "SET statement_timeout = 0;",
    "SET lock_timeout = 0;",
    "SET client_encoding = 'UTF8';",
    "SET standard_conforming_strings = on;",
    "SELECT pg_catalog.set_config('search_path', '', false);",
    "SET check_function_bodies = false;",
    "SET client_min_messages = warning;",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_counts_statements_only() {
        let mut buf: Vec<u8> = Vec::new();
        {
            let mut script = ScriptWriter::new(&mut buf);
            script.section("Tables").unwrap();
            script.statement("CREATE TABLE t ();").unwrap();
            script.statement("-- skipped").unwrap();
            script.comment("first\n\nsecond").unwrap();
            assert_eq!(script.statements(), 1);
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("--\n-- Tables\n--"));
        assert!(text.contains("-- first\n--\n-- second\n"));
    }

    #[test]
    fn test_comment_never_ends_early() {
        let mut buf: Vec<u8> = Vec::new();
        {
            let mut script = ScriptWriter::new(&mut buf);
            script.comment("a\rDROP TABLE x;").unwrap();
            script.statement("-- note on b\nDROP TABLE y;").unwrap();
            script.comment("tab\there\x0b").unwrap();
            assert_eq!(script.statements(), 0);
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains('\r'));
        for line in text.lines() {
            assert!(line.starts_with("--"), "uncommented line {:?}", line);
        }
        assert!(text.contains("-- DROP TABLE y;\n"));
        assert!(text.contains("-- tabhere\n"));
    }
}
