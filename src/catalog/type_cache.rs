// ABOUTME: Per-run cache resolving type OIDs to the user-defined objects they name
// ABOUTME: Built fresh for each export run and dropped with it

use super::model::ObjectId;
use anyhow::{Context, Result};
use std::collections::HashMap;
use tokio_postgres::GenericClient;

const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

/// Maps `pg_type` OIDs to the dumpable object a column or signature depends on
///
/// Domains, enums, ranges and standalone composites resolve to their own type
/// OID; the row type of a table resolves to the table's relation OID; arrays
/// resolve through their element type; built-in types resolve to nothing.
#[derive(Debug, Default)]
pub struct TypeCache {
    resolved: HashMap<u32, Option<ObjectId>>,
    lookups: u64,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of catalog queries issued so far
    pub fn lookups(&self) -> u64 {
        self.lookups
    }

    pub async fn resolve<C: GenericClient + Sync>(
        &mut self,
        client: &C,
        type_oid: u32,
    ) -> Result<Option<ObjectId>> {
        let mut current = type_oid;
        // Arrays of arrays do not exist, but cap the walk anyway.
        for _ in 0..4 {
            if let Some(hit) = self.resolved.get(&current) {
                let hit = *hit;
                self.resolved.insert(type_oid, hit);
                return Ok(hit);
            }

            self.lookups += 1;
            let row = client
                .query_opt(
                    "SELECT t.typtype::text, t.typrelid, n.nspname::text, c.relkind::text,
                            t.typelem, t.typcategory::text
                     FROM pg_catalog.pg_type t
                     JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
                     LEFT JOIN pg_catalog.pg_class c ON c.oid = t.typrelid
                     WHERE t.oid = $1",
                    &[&current],
                )
                .await
                .with_context(|| format!("Failed to resolve type OID {}", current))?;

            let Some(row) = row else {
                self.resolved.insert(current, None);
                break;
            };

            let typtype: String = row.get(0);
            let typrelid: u32 = row.get(1);
            let schema: String = row.get(2);
            let relkind: Option<String> = row.get(3);
            let typelem: u32 = row.get(4);
            let category: String = row.get(5);

            if category == "A" && typelem != 0 {
                current = typelem;
                continue;
            }

            let resolved = classify(&typtype, typrelid, &schema, relkind.as_deref(), current);
            self.resolved.insert(current, resolved);
            self.resolved.insert(type_oid, resolved);
            return Ok(resolved);
        }

        self.resolved.insert(type_oid, None);
        Ok(None)
    }
}

fn classify(
    typtype: &str,
    typrelid: u32,
    schema: &str,
    relkind: Option<&str>,
    type_oid: u32,
) -> Option<ObjectId> {
    if SYSTEM_SCHEMAS.contains(&schema) {
        return None;
    }
    match typtype {
        "d" | "e" | "r" => Some(ObjectId(type_oid)),
        "c" if relkind == Some("c") => Some(ObjectId(type_oid)),
        "c" if typrelid != 0 => Some(ObjectId(typrelid)),
        _ => None,
    }
}
