// ABOUTME: Row formatters rendering fetched batches as COPY blocks or multi-row INSERTs
// ABOUTME: Values arrive as text (or NULL) and are written without buffering the table

use super::options::InsertFormat;
use crate::catalog::{QualifiedName, TableDef};
use crate::utils::{quote_ident, quote_literal};
use std::io::{self, Write};

/// One fetched row, every column cast to text
pub type Row = Vec<Option<String>>;

/// What a formatter needs to know about the table it renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub name: QualifiedName,
    pub columns: Vec<String>,
}

impl TableMetadata {
    /// Generated columns are left out; the target computes them.
    pub fn from_table(table: &TableDef) -> Self {
        Self {
            name: table.name.clone(),
            columns: table.data_columns().iter().map(|c| c.name.clone()).collect(),
        }
    }

    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub trait RowFormatter: Send {
    fn begin(&mut self, table: &TableMetadata, out: &mut dyn Write) -> io::Result<()>;
    fn write_batch(
        &mut self,
        table: &TableMetadata,
        rows: &[Row],
        out: &mut dyn Write,
    ) -> io::Result<()>;
    fn finish(&mut self, table: &TableMetadata, out: &mut dyn Write) -> io::Result<()>;
}

pub fn formatter_for(format: InsertFormat) -> Box<dyn RowFormatter> {
    match format {
        InsertFormat::Copy => Box::new(CopyFormatter),
        InsertFormat::Insert => Box::new(InsertFormatter::default()),
    }
}

/// `COPY ... FROM stdin` text format
pub struct CopyFormatter;

fn copy_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl RowFormatter for CopyFormatter {
    fn begin(&mut self, table: &TableMetadata, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "COPY {} ({}) FROM stdin;",
            table.name.sql(),
            table.column_list()
        )
    }

    fn write_batch(
        &mut self,
        _table: &TableMetadata,
        rows: &[Row],
        out: &mut dyn Write,
    ) -> io::Result<()> {
        for row in rows {
            let line = row
                .iter()
                .map(|value| match value {
                    Some(v) => copy_escape(v),
                    None => "\\N".to_string(),
                })
                .collect::<Vec<_>>()
                .join("\t");
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    fn finish(&mut self, _table: &TableMetadata, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "\\.")?;
        writeln!(out)
    }
}

/// Multi-row `INSERT` statements, flushed at most `rows_per_statement` rows at a time
pub struct InsertFormatter {
    rows_per_statement: usize,
}

impl Default for InsertFormatter {
    fn default() -> Self {
        Self {
            rows_per_statement: 100,
        }
    }
}

impl RowFormatter for InsertFormatter {
    fn begin(&mut self, _table: &TableMetadata, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    fn write_batch(
        &mut self,
        table: &TableMetadata,
        rows: &[Row],
        out: &mut dyn Write,
    ) -> io::Result<()> {
        for chunk in rows.chunks(self.rows_per_statement.max(1)) {
            let values = chunk
                .iter()
                .map(|row| {
                    let fields = row
                        .iter()
                        .map(|value| match value {
                            Some(v) => quote_literal(v),
                            None => "NULL".to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({})", fields)
                })
                .collect::<Vec<_>>()
                .join(",\n    ");
            writeln!(
                out,
                "INSERT INTO {} ({}) VALUES\n    {};",
                table.name.sql(),
                table.column_list(),
                values
            )?;
        }
        Ok(())
    }

    fn finish(&mut self, _table: &TableMetadata, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> TableMetadata {
        TableMetadata {
            name: QualifiedName::new("public", "notes"),
            columns: vec!["id".to_string(), "body".to_string()],
        }
    }

    #[test]
    fn test_copy_escapes_and_nulls() {
        let table = metadata();
        let mut out = Vec::new();
        let mut formatter = CopyFormatter;
        formatter.begin(&table, &mut out).unwrap();
        formatter
            .write_batch(
                &table,
                &[
                    vec![Some("1".to_string()), Some("line\nbreak\tand \\ slash".to_string())],
                    vec![Some("2".to_string()), None],
                ],
                &mut out,
            )
            .unwrap();
        formatter.finish(&table, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "COPY \"public\".\"notes\" (\"id\", \"body\") FROM stdin;\n\
             1\tline\\nbreak\\tand \\\\ slash\n\
             2\t\\N\n\
             \\.\n\n"
        );
    }

    #[test]
    fn test_insert_batches_rows() {
        let table = metadata();
        let mut out = Vec::new();
        let mut formatter = InsertFormatter {
            rows_per_statement: 2,
        };
        let rows: Vec<Row> = (1..=3)
            .map(|i| vec![Some(i.to_string()), Some(format!("it's {}", i))])
            .collect();
        formatter.write_batch(&table, &rows, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("INSERT INTO").count(), 2);
        assert!(text.contains("('1', 'it''s 1'),\n    ('2', 'it''s 2');"));
        assert!(text.contains("('3', 'it''s 3');"));
    }
}
