// ABOUTME: Installed-extension discovery for database dumps
// ABOUTME: Extensions are recreated up front; their member objects are never dumped one by one

use anyhow::{Context, Result};
use tokio_postgres::GenericClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    pub version: String,
    pub schema: String,
}

/// Get list of installed extensions on a database
///
/// `plpgsql` is excluded because every database already has it.
pub async fn get_installed_extensions<C: GenericClient + Sync>(
    client: &C,
) -> Result<Vec<Extension>> {
    let rows = client
        .query(
            "SELECT e.extname, e.extversion, n.nspname
             FROM pg_catalog.pg_extension e
             JOIN pg_catalog.pg_namespace n ON n.oid = e.extnamespace
             WHERE e.extname <> 'plpgsql'
             ORDER BY e.extname",
            &[],
        )
        .await
        .context("Failed to query installed extensions")?;

    let extensions = rows
        .iter()
        .map(|row| Extension {
            name: row.get(0),
            version: row.get(1),
            schema: row.get(2),
        })
        .collect();

    Ok(extensions)
}

/// Render the statement that recreates an extension in its original schema
pub fn create_extension_sql(extension: &Extension) -> String {
    format!(
        "CREATE EXTENSION IF NOT EXISTS {} WITH SCHEMA {};",
        crate::utils::quote_ident(&extension.name),
        crate::utils::quote_ident(&extension.schema)
    )
}
