// ABOUTME: DDL for views and materialized views
// ABOUTME: Materialized views are created WITH NO DATA and refreshed in the post-pass

use super::{drop_statement, index_statement, trailer, EmitContext, ObjectEmitter};
use crate::catalog::ViewDef;
use crate::dump::deferred::{DeferredKind, DeferredQueue, DeferredStatement};
use crate::utils::quote_ident;

pub struct ViewEmitter;

impl ObjectEmitter for ViewEmitter {
    type Object = ViewDef;

    fn emit(
        &self,
        view: &ViewDef,
        cx: &EmitContext<'_>,
        _deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let target = view.name.sql();
        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(drop_statement("VIEW", &target));
        }
        let create = if cx.options.if_not_exists {
            "CREATE OR REPLACE VIEW"
        } else {
            "CREATE VIEW"
        };
        statements.push(format!("{} {} AS\n {};", create, target, view.query));
        statements.extend(trailer("VIEW", &target, Some("TABLE"), &view.meta, cx.options));
        statements
    }
}

pub struct MaterializedViewEmitter;

impl ObjectEmitter for MaterializedViewEmitter {
    type Object = ViewDef;

    fn emit(
        &self,
        view: &ViewDef,
        cx: &EmitContext<'_>,
        deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let target = view.name.sql();
        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(drop_statement("MATERIALIZED VIEW", &target));
        }
        statements.push(format!(
            "CREATE MATERIALIZED VIEW {}{}{} AS\n {}\n  WITH NO DATA;",
            if cx.options.if_not_exists {
                "IF NOT EXISTS "
            } else {
                ""
            },
            target,
            view.tablespace
                .as_deref()
                .map(|ts| format!(" TABLESPACE {}", quote_ident(ts)))
                .unwrap_or_default(),
            view.query
        ));
        statements.extend(
            view.indexes
                .iter()
                .map(|index| index_statement(index, cx.options.if_not_exists)),
        );
        if cx.options.wants_data() {
            deferred.push(DeferredStatement::new(
                DeferredKind::MvRefresh,
                view.id,
                format!("REFRESH MATERIALIZED VIEW {};", target),
            ));
        }
        statements.extend(trailer(
            "MATERIALIZED VIEW",
            &target,
            Some("TABLE"),
            &view.meta,
            cx.options,
        ));
        statements
    }
}
