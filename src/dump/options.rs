// ABOUTME: Export options controlling scope, object selection and the shape of emitted SQL
// ABOUTME: Built from CLI flags by the dump command

use clap::ValueEnum;

/// How table rows are rendered in the data section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InsertFormat {
    /// `COPY ... FROM stdin` blocks
    #[default]
    Copy,
    /// Batched multi-row `INSERT` statements
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpScope {
    /// Roles, tablespaces and every database on the server
    Server,
    /// The database named in the connection URL
    #[default]
    Database,
}

#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub scope: DumpScope,
    /// Schemas to dump; empty means every user schema
    pub schemas: Vec<String>,
    /// Emit `DROP ... IF EXISTS ... CASCADE` before each create
    pub clean: bool,
    pub if_not_exists: bool,
    pub data_only: bool,
    pub structure_only: bool,
    /// Rows per cursor fetch; computed from the row width when unset
    pub batch_size: Option<usize>,
    pub insert_format: InsertFormat,
    pub include_comments: bool,
    /// Explicit `schema.name` subset; empty dumps everything in scope
    pub objects: Vec<String>,
    pub include_dependencies: bool,
    pub add_create_database: bool,
    pub add_create_schema: bool,
    pub suppress_preliminaries: bool,
    /// Wrap each database section in `BEGIN`/`COMMIT`
    pub single_transaction: bool,
    /// Read each database inside a `REPEATABLE READ, READ ONLY` transaction
    pub consistent: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            scope: DumpScope::Database,
            schemas: Vec::new(),
            clean: false,
            if_not_exists: false,
            data_only: false,
            structure_only: false,
            batch_size: None,
            insert_format: InsertFormat::Copy,
            include_comments: true,
            objects: Vec::new(),
            include_dependencies: false,
            add_create_database: false,
            add_create_schema: false,
            suppress_preliminaries: false,
            single_transaction: false,
            consistent: true,
        }
    }
}

impl DumpOptions {
    pub fn wants_structure(&self) -> bool {
        !self.data_only
    }

    pub fn wants_data(&self) -> bool {
        !self.structure_only
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_only && self.structure_only {
            anyhow::bail!("--data-only and --structure-only cannot be used together");
        }
        if self.batch_size == Some(0) {
            anyhow::bail!("--batch-size must be greater than zero");
        }
        for object in &self.objects {
            if object.trim().is_empty() {
                anyhow::bail!("Object names in --objects cannot be empty");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_sections_rejected() {
        let options = DumpOptions {
            data_only: true,
            structure_only: true,
            ..Default::default()
        };
        assert!(options.validate().is_err());
        assert!(DumpOptions::default().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let options = DumpOptions {
            batch_size: Some(0),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
