// ABOUTME: DDL for standalone sequences
// ABOUTME: OWNED BY is deferred until the owning table exists; setval restores the current value

use super::{drop_statement, trailer, EmitContext, ObjectEmitter};
use crate::catalog::SequenceDef;
use crate::dump::deferred::{DeferredKind, DeferredQueue, DeferredStatement};
use crate::utils::{quote_ident, quote_literal};

pub struct SequenceEmitter;

impl ObjectEmitter for SequenceEmitter {
    type Object = SequenceDef;

    fn emit(
        &self,
        sequence: &SequenceDef,
        cx: &EmitContext<'_>,
        deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let target = sequence.name.sql();
        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(drop_statement("SEQUENCE", &target));
        }
        statements.push(format!(
            "CREATE SEQUENCE {}{}\n    AS {}\n    START WITH {}\n    INCREMENT BY {}\n    MINVALUE {}\n    MAXVALUE {}\n    CACHE {}{};",
            if cx.options.if_not_exists {
                "IF NOT EXISTS "
            } else {
                ""
            },
            target,
            sequence.data_type,
            sequence.start,
            sequence.increment,
            sequence.min_value,
            sequence.max_value,
            sequence.cache,
            if sequence.cycle { "\n    CYCLE" } else { "" }
        ));

        if let Some((table, column)) = &sequence.owned_by {
            // Guarded at drain time: skipped when the table is filtered out.
            let table_name = cx
                .name_of(*table)
                .unwrap_or_else(|| table.to_string());
            deferred.push(
                DeferredStatement::new(
                    DeferredKind::SequenceOwnership,
                    sequence.id,
                    format!(
                        "ALTER SEQUENCE {} OWNED BY {}.{};",
                        target,
                        table_name,
                        quote_ident(column)
                    ),
                )
                .requiring(*table),
            );
        }

        statements.extend(trailer(
            "SEQUENCE",
            &target,
            Some("SEQUENCE"),
            &sequence.meta,
            cx.options,
        ));
        statements
    }
}

/// `setval` call restoring the sequence's current value, written with table data
pub fn setval_statement(sequence: &SequenceDef) -> Option<String> {
    sequence.last_value.map(|value| {
        format!(
            "SELECT pg_catalog.setval({}, {}, {});",
            quote_literal(&sequence.name.sql()),
            value,
            sequence.is_called
        )
    })
}
