// ABOUTME: DDL for domains and user-defined types (composite, enum, range)

use super::{drop_statement, trailer, EmitContext, ObjectEmitter};
use crate::catalog::{DomainDef, TypeBody, TypeDef};
use crate::dump::deferred::DeferredQueue;
use crate::utils::{quote_ident, quote_literal};

pub struct DomainEmitter;

impl ObjectEmitter for DomainEmitter {
    type Object = DomainDef;

    fn emit(
        &self,
        domain: &DomainDef,
        cx: &EmitContext<'_>,
        _deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let target = domain.name.sql();
        let mut sql = format!("CREATE DOMAIN {} AS {}", target, domain.base_type);
        if let Some(default) = &domain.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        if domain.not_null {
            sql.push_str(" NOT NULL");
        }
        for (name, definition) in &domain.checks {
            sql.push_str(&format!("\n    CONSTRAINT {} {}", quote_ident(name), definition));
        }
        sql.push(';');

        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(drop_statement("DOMAIN", &target));
        }
        statements.push(sql);
        statements.extend(trailer("DOMAIN", &target, Some("DOMAIN"), &domain.meta, cx.options));
        statements
    }
}

pub struct TypeEmitter;

impl ObjectEmitter for TypeEmitter {
    type Object = TypeDef;

    fn emit(
        &self,
        type_def: &TypeDef,
        cx: &EmitContext<'_>,
        _deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let target = type_def.name.sql();
        let body = match &type_def.body {
            TypeBody::Enum { labels } => format!(
                "AS ENUM (\n    {}\n)",
                labels
                    .iter()
                    .map(|l| quote_literal(l))
                    .collect::<Vec<_>>()
                    .join(",\n    ")
            ),
            TypeBody::Range { subtype } => format!("AS RANGE (\n    subtype = {}\n)", subtype),
            TypeBody::Composite { attributes } => format!(
                "AS (\n    {}\n)",
                attributes
                    .iter()
                    .map(|a| format!("{} {}", quote_ident(&a.name), a.type_name))
                    .collect::<Vec<_>>()
                    .join(",\n    ")
            ),
        };

        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(drop_statement("TYPE", &target));
        }
        statements.push(format!("CREATE TYPE {} {};", target, body));
        statements.extend(trailer("TYPE", &target, Some("TYPE"), &type_def.meta, cx.options));
        statements
    }
}
