// ABOUTME: DDL for functions, procedures and aggregates
// ABOUTME: Function bodies come from pg_get_functiondef and are replayed as-is

use super::{drop_statement, terminated, trailer, EmitContext, ObjectEmitter};
use crate::catalog::{AggregateDef, FunctionDef};
use crate::dump::deferred::DeferredQueue;
use crate::utils::quote_literal;

pub struct FunctionEmitter;

impl ObjectEmitter for FunctionEmitter {
    type Object = FunctionDef;

    fn emit(
        &self,
        function: &FunctionDef,
        cx: &EmitContext<'_>,
        _deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let keyword = if function.is_procedure {
            "PROCEDURE"
        } else {
            "FUNCTION"
        };
        let signature = function.signature_sql();

        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(drop_statement(keyword, &signature));
        }
        // pg_get_functiondef already renders CREATE OR REPLACE.
        statements.push(terminated(&function.definition));
        statements.extend(trailer(keyword, &signature, Some(keyword), &function.meta, cx.options));
        statements
    }
}

pub struct AggregateEmitter;

impl ObjectEmitter for AggregateEmitter {
    type Object = AggregateDef;

    fn emit(
        &self,
        aggregate: &AggregateDef,
        cx: &EmitContext<'_>,
        _deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let signature = aggregate.signature_sql();

        let mut options = vec![
            format!("SFUNC = {}", aggregate.state_func),
            format!("STYPE = {}", aggregate.state_type),
        ];
        if let Some(final_func) = &aggregate.final_func {
            options.push(format!("FINALFUNC = {}", final_func));
        }
        if let Some(combine_func) = &aggregate.combine_func {
            options.push(format!("COMBINEFUNC = {}", combine_func));
        }
        if let Some(initial) = &aggregate.initial_value {
            options.push(format!("INITCOND = {}", quote_literal(initial)));
        }

        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(drop_statement("AGGREGATE", &signature));
        }
        statements.push(format!(
            "CREATE AGGREGATE {} (\n    {}\n);",
            signature,
            options.join(",\n    ")
        ));
        statements.extend(trailer(
            "AGGREGATE",
            &signature,
            Some("FUNCTION"),
            &aggregate.meta,
            cx.options,
        ));
        statements
    }
}
