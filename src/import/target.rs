// ABOUTME: Destination tables for imported records
// ABOUTME: PostgreSQL targets insert in batches; an in-memory target backs tests and dry runs

use crate::config::ServerEntry;
use crate::error::ImportError;
use crate::postgres::connect_with_retry;
use crate::utils::{quote_ident, quote_qualified};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// PostgreSQL caps bind parameters per statement at 65535
const MAX_PARAMETERS: usize = 65_535;
const MAX_ROWS_PER_INSERT: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
    /// Output of `format_type`, used to cast the text parameter
    pub type_name: String,
    pub nullable: bool,
}

impl TargetColumn {
    pub fn new(name: &str, type_name: &str, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            nullable,
        }
    }

    pub fn is_bytea(&self) -> bool {
        self.type_name == "bytea"
    }
}

/// A row the target refused, by index within the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    pub index: usize,
    pub message: String,
}

#[async_trait]
pub trait ImportTarget: Send + Sync {
    /// Insertable columns in table order; empty when the table does not exist
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<TargetColumn>>;

    async fn truncate(&self, schema: &str, table: &str) -> Result<()>;

    /// Insert `rows` (values as text) into `columns`, reporting rejected rows
    async fn insert(
        &self,
        schema: &str,
        table: &str,
        columns: &[TargetColumn],
        rows: &[Vec<Option<String>>],
    ) -> Result<Vec<RowRejection>>;
}

/// Resolves the `server` request parameter to a target
#[async_trait]
pub trait TargetProvider: Send + Sync {
    async fn target(&self, server: Option<&str>) -> Result<Arc<dyn ImportTarget>, ImportError>;
}

pub struct PgImportTarget {
    client: Client,
}

impl PgImportTarget {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn insert_sql(schema: &str, table: &str, columns: &[TargetColumn], rows: usize) -> String {
        let column_list = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut param = 0;
        let values = (0..rows)
            .map(|_| {
                let row = columns
                    .iter()
                    .map(|c| {
                        param += 1;
                        format!("${}::text::{}", param, c.type_name)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", row)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_qualified(schema, table),
            column_list,
            values
        )
    }

    async fn insert_batch(
        &self,
        schema: &str,
        table: &str,
        columns: &[TargetColumn],
        rows: &[Vec<Option<String>>],
    ) -> std::result::Result<u64, tokio_postgres::Error> {
        let sql = Self::insert_sql(schema, table, columns, rows.len());
        let params: Vec<&(dyn ToSql + Sync)> = rows
            .iter()
            .flat_map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)))
            .collect();
        self.client.execute(&sql, &params).await
    }
}

#[async_trait]
impl ImportTarget for PgImportTarget {
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<TargetColumn>> {
        let rows = self
            .client
            .query(
                "SELECT a.attname::text,
                        pg_catalog.format_type(a.atttypid, a.atttypmod),
                        NOT a.attnotnull
                 FROM pg_catalog.pg_attribute a
                 JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                 WHERE n.nspname = $1 AND c.relname = $2
                   AND a.attnum > 0 AND NOT a.attisdropped AND a.attgenerated = ''
                 ORDER BY a.attnum",
                &[&schema, &table],
            )
            .await
            .with_context(|| format!("Failed to read columns of {}.{}", schema, table))?;

        Ok(rows
            .iter()
            .map(|row| TargetColumn {
                name: row.get(0),
                type_name: row.get(1),
                nullable: row.get(2),
            })
            .collect())
    }

    async fn truncate(&self, schema: &str, table: &str) -> Result<()> {
        self.client
            .batch_execute(&format!("TRUNCATE TABLE {}", quote_qualified(schema, table)))
            .await
            .with_context(|| format!("Failed to truncate {}.{}", schema, table))?;
        tracing::info!("Truncated {}.{} before import", schema, table);
        Ok(())
    }

    async fn insert(
        &self,
        schema: &str,
        table: &str,
        columns: &[TargetColumn],
        rows: &[Vec<Option<String>>],
    ) -> Result<Vec<RowRejection>> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(Vec::new());
        }
        let per_insert = (MAX_PARAMETERS / columns.len()).clamp(1, MAX_ROWS_PER_INSERT);
        let mut rejections = Vec::new();

        for (batch_index, batch) in rows.chunks(per_insert).enumerate() {
            if self.insert_batch(schema, table, columns, batch).await.is_ok() {
                continue;
            }
            // Retry one row at a time to find the rejected ones.
            for (i, row) in batch.iter().enumerate() {
                if let Err(e) = self
                    .insert_batch(schema, table, columns, std::slice::from_ref(row))
                    .await
                {
                    let message = e
                        .as_db_error()
                        .map(|db| db.message().to_string())
                        .unwrap_or_else(|| e.to_string());
                    rejections.push(RowRejection {
                        index: batch_index * per_insert + i,
                        message,
                    });
                }
            }
        }
        Ok(rejections)
    }
}

/// Connects to the configured server named by the request
pub struct PgTargetProvider {
    servers: BTreeMap<String, ServerEntry>,
}

impl PgTargetProvider {
    pub fn new(servers: BTreeMap<String, ServerEntry>) -> Self {
        Self { servers }
    }

    /// A provider with one unnamed server, used by the local import command
    pub fn single(url: &str) -> Self {
        let mut servers = BTreeMap::new();
        servers.insert(
            "default".to_string(),
            ServerEntry {
                url: url.to_string(),
            },
        );
        Self { servers }
    }

    fn resolve(&self, server: Option<&str>) -> Result<&ServerEntry, ImportError> {
        match server {
            Some(name) => self
                .servers
                .get(name)
                .ok_or_else(|| ImportError::Validation(format!("unknown server '{}'", name))),
            None if self.servers.len() == 1 => self
                .servers
                .values()
                .next()
                .ok_or_else(|| ImportError::Validation("no servers configured".to_string())),
            None => Err(ImportError::Validation(
                "missing required parameter 'server'".to_string(),
            )),
        }
    }
}

#[async_trait]
impl TargetProvider for PgTargetProvider {
    async fn target(&self, server: Option<&str>) -> Result<Arc<dyn ImportTarget>, ImportError> {
        let entry = self.resolve(server)?;
        let client = connect_with_retry(&entry.url)
            .await
            .context("Failed to connect to import target")?;
        Ok(Arc::new(PgImportTarget::new(client)))
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<TargetColumn>,
    rows: Vec<Vec<Option<String>>>,
    truncations: usize,
}

/// Tables held in memory; cloning shares the same tables
#[derive(Debug, Clone, Default)]
pub struct MemoryTarget {
    tables: Arc<Mutex<HashMap<(String, String), MemoryTable>>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, schema: &str, table: &str, columns: Vec<TargetColumn>) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.insert(
                (schema.to_string(), table.to_string()),
                MemoryTable {
                    columns,
                    ..Default::default()
                },
            );
        }
        self
    }

    /// Stored rows, full width in column order
    pub fn rows(&self, schema: &str, table: &str) -> Vec<Vec<Option<String>>> {
        self.tables
            .lock()
            .ok()
            .and_then(|tables| {
                tables
                    .get(&(schema.to_string(), table.to_string()))
                    .map(|t| t.rows.clone())
            })
            .unwrap_or_default()
    }

    pub fn truncations(&self, schema: &str, table: &str) -> usize {
        self.tables
            .lock()
            .ok()
            .and_then(|tables| {
                tables
                    .get(&(schema.to_string(), table.to_string()))
                    .map(|t| t.truncations)
            })
            .unwrap_or_default()
    }

    fn with_tables<T>(
        &self,
        f: impl FnOnce(&mut HashMap<(String, String), MemoryTable>) -> T,
    ) -> Result<T> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory target lock poisoned"))?;
        Ok(f(&mut tables))
    }
}

#[async_trait]
impl ImportTarget for MemoryTarget {
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<TargetColumn>> {
        self.with_tables(|tables| {
            tables
                .get(&(schema.to_string(), table.to_string()))
                .map(|t| t.columns.clone())
                .unwrap_or_default()
        })
    }

    async fn truncate(&self, schema: &str, table: &str) -> Result<()> {
        self.with_tables(|tables| {
            if let Some(t) = tables.get_mut(&(schema.to_string(), table.to_string())) {
                t.rows.clear();
                t.truncations += 1;
            }
        })
    }

    async fn insert(
        &self,
        schema: &str,
        table: &str,
        columns: &[TargetColumn],
        rows: &[Vec<Option<String>>],
    ) -> Result<Vec<RowRejection>> {
        self.with_tables(|tables| {
            let Some(t) = tables.get_mut(&(schema.to_string(), table.to_string())) else {
                return vec![RowRejection {
                    index: 0,
                    message: format!("relation \"{}.{}\" does not exist", schema, table),
                }];
            };
            let mut rejections = Vec::new();
            'rows: for (index, row) in rows.iter().enumerate() {
                let mut stored = vec![None; t.columns.len()];
                for (column, value) in columns.iter().zip(row) {
                    let Some(position) = t.columns.iter().position(|c| c.name == column.name) else {
                        rejections.push(RowRejection {
                            index,
                            message: format!("column \"{}\" does not exist", column.name),
                        });
                        continue 'rows;
                    };
                    stored[position] = value.clone();
                }
                if let Some(column) = t
                    .columns
                    .iter()
                    .zip(&stored)
                    .find(|(c, v)| !c.nullable && v.is_none())
                    .map(|(c, _)| c)
                {
                    rejections.push(RowRejection {
                        index,
                        message: format!(
                            "null value in column \"{}\" violates not-null constraint",
                            column.name
                        ),
                    });
                    continue;
                }
                t.rows.push(stored);
            }
            rejections
        })
    }
}

#[async_trait]
impl TargetProvider for MemoryTarget {
    async fn target(&self, _server: Option<&str>) -> Result<Arc<dyn ImportTarget>, ImportError> {
        Ok(Arc::new(self.clone()))
    }
}
