// ABOUTME: DDL for user-defined operators

use super::{drop_statement, trailer, EmitContext, ObjectEmitter};
use crate::catalog::OperatorDef;
use crate::dump::deferred::DeferredQueue;
use crate::utils::quote_ident;

pub struct OperatorEmitter;

/// `regoper` text is qualified when outside the search path and needs `OPERATOR()`
fn operator_ref(name: &str) -> String {
    if name.contains('.') {
        format!("OPERATOR({})", name)
    } else {
        name.to_string()
    }
}

impl ObjectEmitter for OperatorEmitter {
    type Object = OperatorDef;

    fn emit(
        &self,
        operator: &OperatorDef,
        cx: &EmitContext<'_>,
        _deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let signature = operator.signature_sql();

        let mut options = vec![format!("FUNCTION = {}", operator.procedure)];
        if let Some(left) = &operator.left_type {
            options.push(format!("LEFTARG = {}", left));
        }
        if let Some(right) = &operator.right_type {
            options.push(format!("RIGHTARG = {}", right));
        }
        if let Some(commutator) = &operator.commutator {
            options.push(format!("COMMUTATOR = {}", operator_ref(commutator)));
        }
        if let Some(negator) = &operator.negator {
            options.push(format!("NEGATOR = {}", operator_ref(negator)));
        }
        if let Some(restrict) = &operator.restrict {
            options.push(format!("RESTRICT = {}", restrict));
        }
        if let Some(join) = &operator.join {
            options.push(format!("JOIN = {}", join));
        }

        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(drop_statement("OPERATOR", &signature));
        }
        statements.push(format!(
            "CREATE OPERATOR {}.{} (\n    {}\n);",
            quote_ident(&operator.name.schema),
            operator.name.name,
            options.join(",\n    ")
        ));
        statements.extend(trailer("OPERATOR", &signature, None, &operator.meta, cx.options));
        statements
    }
}
