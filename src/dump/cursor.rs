// ABOUTME: Server-side cursor reader streaming one table's rows in bounded batches
// ABOUTME: Peak memory is one batch; the cursor is closed on every exit path

use super::format::{Row, RowFormatter, TableMetadata};
use crate::catalog::{ObjectId, ObjectKind, TableDef};
use crate::utils::quote_ident;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use tokio_postgres::GenericClient;

/// Upper bound on `rows x estimated row width` held at once
pub const MEMORY_CEILING_BYTES: usize = 32 * 1024 * 1024;
pub const MIN_BATCH_SIZE: usize = 100;
pub const MAX_BATCH_SIZE: usize = 50_000;
/// Used when the table was never analyzed
pub const DEFAULT_ROW_WIDTH: usize = 100;

/// Rows per fetch so one batch stays under [`MEMORY_CEILING_BYTES`]
pub fn auto_batch_size(row_width: usize) -> usize {
    let width = if row_width == 0 {
        DEFAULT_ROW_WIDTH
    } else {
        row_width
    };
    (MEMORY_CEILING_BYTES / width).clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}

/// `SELECT` with every data column cast to text, reading this relation only
pub fn select_query(table: &TableDef) -> String {
    let columns = table
        .data_columns()
        .iter()
        .map(|c| format!("{}::text", c.quoted_name()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM ONLY {}", columns, table.name.sql())
}

/// Where table rows come from
#[async_trait]
pub trait DataSource: Send {
    /// Average on-disk bytes per row, 0 when unknown
    async fn estimated_row_width(&mut self, table: &TableDef) -> Result<usize>;
    async fn declare(&mut self, cursor: &str, table: &TableDef, query: &str) -> Result<()>;
    async fn fetch(&mut self, cursor: &str, limit: usize) -> Result<Vec<Row>>;
    async fn close(&mut self, cursor: &str) -> Result<()>;
}

/// One open cursor over one table or partition
pub struct ExportCursor<'s, S: DataSource + ?Sized> {
    source: &'s mut S,
    name: String,
    query: String,
    batch_size: usize,
    kind: ObjectKind,
    open: bool,
}

impl<'s, S: DataSource + ?Sized> ExportCursor<'s, S> {
    /// Declare a cursor for `table`; `batch_size` of `None` is computed from the row width
    pub async fn open(
        source: &'s mut S,
        table: &TableDef,
        batch_size: Option<usize>,
        sequence: u64,
    ) -> Result<ExportCursor<'s, S>> {
        let batch_size = match batch_size {
            Some(size) => size.max(1),
            None => {
                let width = source.estimated_row_width(table).await.unwrap_or_else(|e| {
                    tracing::debug!("Row width unknown for {}: {:#}", table.name, e);
                    0
                });
                auto_batch_size(width)
            }
        };
        let name = format!("porter_cursor_{}", sequence);
        let query = select_query(table);
        source
            .declare(&name, table, &query)
            .await
            .with_context(|| format!("Failed to open cursor for {}", table.name))?;
        tracing::debug!(
            "Opened {} for {} {} (batch size {})",
            name,
            table.kind(),
            table.name,
            batch_size
        );

        Ok(ExportCursor {
            source,
            name,
            query,
            batch_size,
            kind: table.kind(),
            open: true,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Fetch, render and discard batches until the cursor is exhausted
    ///
    /// Returns the number of rows written. The caller closes the cursor
    /// whether this succeeds or not.
    pub async fn process_rows(
        &mut self,
        formatter: &mut dyn RowFormatter,
        metadata: &TableMetadata,
        out: &mut (dyn Write + Send),
    ) -> Result<u64> {
        formatter
            .begin(metadata, out)
            .context("Failed to write data header")?;

        let mut rows = 0u64;
        loop {
            let batch = self
                .source
                .fetch(&self.name, self.batch_size)
                .await
                .with_context(|| format!("Failed to fetch rows from {}", metadata.name))?;
            if batch.is_empty() {
                break;
            }
            formatter
                .write_batch(metadata, &batch, out)
                .context("Failed to write rows")?;
            rows += batch.len() as u64;
            let short = batch.len() < self.batch_size;
            drop(batch);
            if short {
                break;
            }
        }

        formatter
            .finish(metadata, out)
            .context("Failed to write data trailer")?;
        Ok(rows)
    }

    /// Release the cursor; later calls do nothing
    pub async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.source
            .close(&self.name)
            .await
            .with_context(|| format!("Failed to close {}", self.name))
    }
}

/// Cursors inside the caller's transaction
pub struct PgDataSource<'c, C> {
    client: &'c C,
}

impl<'c, C> PgDataSource<'c, C> {
    pub fn new(client: &'c C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<'c, C: GenericClient + Sync> DataSource for PgDataSource<'c, C> {
    async fn estimated_row_width(&mut self, table: &TableDef) -> Result<usize> {
        let row = self
            .client
            .query_one(
                "SELECT CASE WHEN c.reltuples > 0
                             THEN (pg_catalog.pg_relation_size(c.oid) / c.reltuples)::bigint
                             ELSE 0 END
                 FROM pg_catalog.pg_class c WHERE c.oid = $1",
                &[&table.id.0],
            )
            .await
            .context("Failed to estimate row width")?;
        let width: i64 = row.get(0);
        Ok(usize::try_from(width).unwrap_or(0))
    }

    async fn declare(&mut self, cursor: &str, _table: &TableDef, query: &str) -> Result<()> {
        self.client
            .batch_execute(&format!(
                "DECLARE {} NO SCROLL CURSOR FOR {}",
                quote_ident(cursor),
                query
            ))
            .await
            .context("DECLARE CURSOR failed")?;
        Ok(())
    }

    async fn fetch(&mut self, cursor: &str, limit: usize) -> Result<Vec<Row>> {
        let rows = self
            .client
            .query(
                &format!("FETCH FORWARD {} FROM {}", limit, quote_ident(cursor)),
                &[],
            )
            .await
            .context("FETCH failed")?;
        Ok(rows
            .iter()
            .map(|row| (0..row.len()).map(|i| row.get::<_, Option<String>>(i)).collect())
            .collect())
    }

    async fn close(&mut self, cursor: &str) -> Result<()> {
        self.client
            .batch_execute(&format!("CLOSE {}", quote_ident(cursor)))
            .await
            .context("CLOSE failed")?;
        Ok(())
    }
}

/// In-memory rows keyed by table, for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    tables: HashMap<ObjectId, Vec<Row>>,
    cursors: HashMap<String, (ObjectId, usize)>,
    /// Names of cursors closed so far, in order
    pub closed: Vec<String>,
    /// Fail every fetch against this table
    pub fail_table: Option<ObjectId>,
    /// Largest batch handed out
    pub largest_batch: usize,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: ObjectId, rows: Vec<Row>) {
        self.tables.insert(table, rows);
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn estimated_row_width(&mut self, _table: &TableDef) -> Result<usize> {
        Ok(0)
    }

    async fn declare(&mut self, cursor: &str, table: &TableDef, _query: &str) -> Result<()> {
        self.cursors.insert(cursor.to_string(), (table.id, 0));
        Ok(())
    }

    async fn fetch(&mut self, cursor: &str, limit: usize) -> Result<Vec<Row>> {
        let (table, position) = self
            .cursors
            .get_mut(cursor)
            .ok_or_else(|| anyhow::anyhow!("cursor \"{}\" does not exist", cursor))?;
        if self.fail_table == Some(*table) {
            anyhow::bail!("simulated fetch failure on {}", table);
        }
        let rows = self.tables.get(table).map(Vec::as_slice).unwrap_or_default();
        let end = (*position + limit).min(rows.len());
        let batch = rows[*position..end].to_vec();
        *position = end;
        self.largest_batch = self.largest_batch.max(batch.len());
        Ok(batch)
    }

    async fn close(&mut self, cursor: &str) -> Result<()> {
        self.cursors.remove(cursor);
        self.closed.push(cursor.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, QualifiedName, TableShape};
    use crate::dump::format::CopyFormatter;

    fn table() -> TableDef {
        let mut table = TableDef::new(
            ObjectId(1),
            QualifiedName::new("public", "events"),
            TableShape::Plain,
        );
        table.columns.push(ColumnDef::new("id", "integer"));
        let mut total = ColumnDef::new("double_id", "integer");
        total.generated = Some("id * 2".to_string());
        table.columns.push(total);
        table
    }

    #[test]
    fn test_auto_batch_size_is_clamped() {
        assert_eq!(auto_batch_size(0), MAX_BATCH_SIZE);
        assert_eq!(auto_batch_size(1024), 32 * 1024);
        assert_eq!(auto_batch_size(10 * 1024 * 1024), MIN_BATCH_SIZE);
    }

    #[test]
    fn test_select_query_skips_generated_columns() {
        assert_eq!(
            select_query(&table()),
            "SELECT \"id\"::text FROM ONLY \"public\".\"events\""
        );
    }

    #[tokio::test]
    async fn test_process_rows_in_batches() {
        let table = table();
        let mut source = MemoryDataSource::new();
        source.insert(
            table.id,
            (0..25).map(|i| vec![Some(i.to_string())]).collect(),
        );

        let mut out: Vec<u8> = Vec::new();
        let mut cursor = ExportCursor::open(&mut source, &table, Some(10), 1).await.unwrap();
        let rows = cursor
            .process_rows(&mut CopyFormatter, &TableMetadata::from_table(&table), &mut out)
            .await
            .unwrap();
        cursor.close().await.unwrap();
        cursor.close().await.unwrap();

        assert_eq!(rows, 25);
        assert_eq!(source.largest_batch, 10);
        assert_eq!(source.closed, vec!["porter_cursor_1".to_string()]);
        assert_eq!(source.open_cursors(), 0);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("COPY \"public\".\"events\" (\"id\") FROM stdin;\n0\n"));
    }

    #[tokio::test]
    async fn test_close_after_failure() {
        let table = table();
        let mut source = MemoryDataSource::new();
        source.fail_table = Some(table.id);

        let mut out: Vec<u8> = Vec::new();
        let mut cursor = ExportCursor::open(&mut source, &table, None, 7).await.unwrap();
        let result = cursor
            .process_rows(&mut CopyFormatter, &TableMetadata::from_table(&table), &mut out)
            .await;
        cursor.close().await.unwrap();

        assert!(result.is_err());
        assert_eq!(source.closed, vec!["porter_cursor_7".to_string()]);
    }
}
