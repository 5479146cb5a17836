// ABOUTME: Per-object DDL emitters sharing one interface and one deferred-statement queue
// ABOUTME: Ownership, privileges and comments are appended the same way for every kind

pub mod globals;
pub mod operator;
pub mod routine;
pub mod sequence;
pub mod table;
pub mod types;
pub mod view;

pub use globals::{RoleEmitter, TablespaceEmitter};
pub use operator::OperatorEmitter;
pub use routine::{AggregateEmitter, FunctionEmitter};
pub use sequence::{setval_statement, SequenceEmitter};
pub use table::TableEmitter;
pub use types::{DomainEmitter, TypeEmitter};
pub use view::{MaterializedViewEmitter, ViewEmitter};

use super::acl::grant_statements;
use super::deferred::DeferredQueue;
use super::options::DumpOptions;
use crate::catalog::{CatalogSnapshot, IndexDef, ObjectId, ObjectMeta};
use crate::graph::DependencyGraph;
use crate::utils::{quote_ident, quote_literal};
use std::collections::BTreeSet;

/// What an emitter may consult while rendering one object
pub struct EmitContext<'a> {
    pub catalog: &'a CatalogSnapshot,
    pub options: &'a DumpOptions,
    /// Order of the pass the object is emitted in, when it has one
    pub order: Option<&'a DependencyGraph>,
    pub included: &'a BTreeSet<ObjectId>,
}

impl<'a> EmitContext<'a> {
    /// True when `dependency` is emitted after `object` in the current pass
    pub fn should_defer(&self, object: ObjectId, dependency: ObjectId) -> bool {
        self.order
            .map(|graph| graph.should_defer(object, dependency))
            .unwrap_or(false)
    }

    /// The latest-ordered of `dependencies` that is emitted after `object`
    pub fn latest_deferred(&self, object: ObjectId, dependencies: &[ObjectId]) -> Option<ObjectId> {
        let graph = self.order?;
        dependencies
            .iter()
            .filter(|d| graph.should_defer(object, **d))
            .max_by_key(|d| graph.position(**d))
            .copied()
    }

    pub fn is_included(&self, id: ObjectId) -> bool {
        self.included.contains(&id)
    }

    /// Quoted name of another object in the snapshot
    pub fn name_of(&self, id: ObjectId) -> Option<String> {
        self.catalog.entry(id).map(|e| e.name.sql())
    }
}

/// Renders one object kind
///
/// Returns the statements to write in place; anything that has to wait is
/// pushed onto `deferred`.
pub trait ObjectEmitter {
    type Object;

    fn emit(
        &self,
        object: &Self::Object,
        cx: &EmitContext<'_>,
        deferred: &mut DeferredQueue,
    ) -> Vec<String>;
}

/// Ensure a catalog-produced statement ends with exactly one `;`
pub(crate) fn terminated(sql: &str) -> String {
    let trimmed = sql.trim_end();
    let trimmed = trimmed.trim_end_matches(';').trim_end();
    format!("{};", trimmed)
}

pub(crate) fn drop_statement(keyword: &str, target: &str) -> String {
    format!("DROP {} IF EXISTS {} CASCADE;", keyword, target)
}

/// `pg_get_indexdef` output, optionally rewritten to `IF NOT EXISTS`
pub(crate) fn index_statement(index: &IndexDef, if_not_exists: bool) -> String {
    let definition = index.definition.trim();
    if if_not_exists {
        for prefix in ["CREATE UNIQUE INDEX ", "CREATE INDEX "] {
            if let Some(rest) = definition.strip_prefix(prefix) {
                return terminated(&format!("{}IF NOT EXISTS {}", prefix, rest));
            }
        }
    }
    terminated(definition)
}

/// Ownership, grants and comment for one object
///
/// `keyword` names the object in `ALTER`/`COMMENT` (e.g. `TABLE`), `grant_on`
/// in `GRANT ... ON` (e.g. `SEQUENCE`); `None` skips grants for kinds that
/// have no ACL.
pub(crate) fn trailer(
    keyword: &str,
    target: &str,
    grant_on: Option<&str>,
    meta: &ObjectMeta,
    options: &DumpOptions,
) -> Vec<String> {
    let mut statements = Vec::new();
    if let Some(owner) = &meta.owner {
        statements.push(format!(
            "ALTER {} {} OWNER TO {};",
            keyword,
            target,
            quote_ident(owner)
        ));
    }
    if let Some(grant_on) = grant_on {
        statements.extend(grant_statements(
            &meta.acl,
            &format!("{} {}", grant_on, target),
        ));
    }
    if options.include_comments {
        if let Some(comment) = &meta.comment {
            statements.push(format!(
                "COMMENT ON {} {} IS {};",
                keyword,
                target,
                quote_literal(comment)
            ));
        }
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated() {
        assert_eq!(terminated("SELECT 1"), "SELECT 1;");
        assert_eq!(terminated("SELECT 1;\n"), "SELECT 1;");
        assert_eq!(terminated("SELECT 1 ;;"), "SELECT 1;");
    }

    #[test]
    fn test_index_statement_if_not_exists() {
        let index = IndexDef {
            name: "orders_created_idx".to_string(),
            definition: "CREATE INDEX orders_created_idx ON public.orders USING btree (created_at)"
                .to_string(),
        };
        assert_eq!(
            index_statement(&index, true),
            "CREATE INDEX IF NOT EXISTS orders_created_idx ON public.orders USING btree (created_at);"
        );
        assert!(index_statement(&index, false).starts_with("CREATE INDEX orders_created_idx"));
    }

    #[test]
    fn test_trailer_respects_include_comments() {
        let meta = ObjectMeta {
            owner: Some("app".to_string()),
            acl: vec!["reader=r/app".to_string()],
            comment: Some("customer's orders".to_string()),
        };
        let mut options = DumpOptions::default();
        let target = "\"public\".\"orders\"";
        let statements = trailer("TABLE", target, Some("TABLE"), &meta, &options);
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE \"public\".\"orders\" OWNER TO \"app\";",
                "GRANT SELECT ON TABLE \"public\".\"orders\" TO \"reader\";",
                "COMMENT ON TABLE \"public\".\"orders\" IS 'customer''s orders';",
            ]
        );

        options.include_comments = false;
        assert_eq!(trailer("TABLE", target, None, &meta, &options).len(), 1);
    }
}
