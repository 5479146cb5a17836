// ABOUTME: DDL for plain, partitioned, partition and sub-partitioned tables
// ABOUTME: Forward references in defaults and checks, and all foreign keys, are deferred

use super::{drop_statement, index_statement, terminated, trailer, EmitContext, ObjectEmitter};
use crate::catalog::{
    ColumnDef, ConstraintDef, ConstraintKind, IdentityKind, ObjectId, TableDef, TableShape,
};
use crate::dump::deferred::{DeferredKind, DeferredQueue, DeferredStatement};
use crate::utils::{quote_ident, quote_literal, sanitize_identifier};
use std::collections::HashMap;

pub struct TableEmitter;

/// Render a column; `with_default` false leaves the default for a later `SET DEFAULT`
fn column_sql(column: &ColumnDef, with_default: bool) -> String {
    let mut sql = format!("{} {}", column.quoted_name(), column.type_name);
    if let Some(expression) = &column.generated {
        sql.push_str(&format!(" GENERATED ALWAYS AS ({}) STORED", expression));
    } else if let Some(identity) = column.identity {
        sql.push_str(match identity {
            IdentityKind::Always => " GENERATED ALWAYS AS IDENTITY",
            IdentityKind::ByDefault => " GENERATED BY DEFAULT AS IDENTITY",
        });
    } else if let (true, Some(default)) = (with_default, &column.default) {
        sql.push_str(&format!(" DEFAULT {}", default));
    }
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    sql
}

fn constraint_sql(constraint: &ConstraintDef) -> String {
    format!("CONSTRAINT {} {}", quote_ident(&constraint.name), constraint.definition)
}

/// Source constraints that were never validated cannot be created inline
fn is_not_valid(constraint: &ConstraintDef) -> bool {
    constraint.definition.trim_end().ends_with("NOT VALID")
}

struct Body<'t> {
    lines: Vec<String>,
    notes: Vec<String>,
    /// Columns left out of the CREATE, with the object they wait for
    late_columns: HashMap<&'t str, ObjectId>,
}

impl TableEmitter {
    fn columns<'t>(
        &self,
        table: &'t TableDef,
        cx: &EmitContext<'_>,
        deferred: &mut DeferredQueue,
        body: &mut Body<'t>,
    ) {
        let target = table.name.sql();
        for column in &table.columns {
            let waits_for = cx.latest_deferred(table.id, &column.default_refs);
            match (waits_for, column.generated.is_some()) {
                (Some(dependency), true) => {
                    body.late_columns.insert(column.name.as_str(), dependency);
                    deferred.push(
                        DeferredStatement::new(
                            DeferredKind::GeneratedColumn,
                            table.id,
                            format!(
                                "ALTER TABLE {} ADD COLUMN {};",
                                target,
                                column_sql(column, true)
                            ),
                        )
                        .waiting_for(dependency),
                    );
                }
                (Some(dependency), false) if column.default.is_some() => {
                    body.lines.push(column_sql(column, false));
                    let default = column.default.as_deref().unwrap_or_default();
                    deferred.push(
                        DeferredStatement::new(
                            DeferredKind::ColumnDefault,
                            table.id,
                            format!(
                                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                                target,
                                column.quoted_name(),
                                default
                            ),
                        )
                        .waiting_for(dependency),
                    );
                }
                _ => body.lines.push(column_sql(column, true)),
            }
        }
    }

    fn constraints<'t>(
        &self,
        table: &'t TableDef,
        cx: &EmitContext<'_>,
        deferred: &mut DeferredQueue,
        body: &mut Body<'t>,
    ) {
        let target = table.name.sql();
        for constraint in table.constraints.iter().filter(|c| c.is_local) {
            let add = format!(
                "ALTER TABLE {} ADD {};",
                target,
                constraint_sql(constraint)
            );
            match &constraint.kind {
                ConstraintKind::ForeignKey { references } => {
                    if !cx.is_included(*references) {
                        let referenced = cx
                            .catalog
                            .entry(*references)
                            .map(|e| e.name.display_name())
                            .unwrap_or_else(|| references.to_string());
                        body.notes.push(format!(
                            "-- Foreign key {} on {} skipped: \
                             referenced table {} is not part of this dump",
                            sanitize_identifier(&constraint.name),
                            table.name.display_name(),
                            referenced
                        ));
                        continue;
                    }
                    deferred.push(
                        DeferredStatement::new(DeferredKind::ForeignKey, table.id, add)
                            .requiring(*references),
                    );
                }
                ConstraintKind::Check => {
                    let waits_for = cx.latest_deferred(table.id, &constraint.function_refs);
                    match (waits_for, is_not_valid(constraint)) {
                        (Some(dependency), true) => deferred.push(
                            DeferredStatement::new(DeferredKind::CheckValidate, table.id, add)
                                .waiting_for(dependency),
                        ),
                        (Some(dependency), false) => {
                            deferred.push(
                                DeferredStatement::new(
                                    DeferredKind::CheckValidate,
                                    table.id,
                                    format!(
                                        "ALTER TABLE {} ADD {} NOT VALID;",
                                        target,
                                        constraint_sql(constraint)
                                    ),
                                )
                                .waiting_for(dependency),
                            );
                            deferred.push(
                                DeferredStatement::new(
                                    DeferredKind::CheckValidate,
                                    table.id,
                                    format!(
                                        "ALTER TABLE {} VALIDATE CONSTRAINT {};",
                                        target,
                                        quote_ident(&constraint.name)
                                    ),
                                )
                                .waiting_for(dependency),
                            );
                        }
                        (None, true) => deferred.push(DeferredStatement::new(
                            DeferredKind::CheckValidate,
                            table.id,
                            add,
                        )),
                        (None, false) => body.lines.push(constraint_sql(constraint)),
                    }
                }
                _ => {
                    let waits: Vec<ObjectId> = constraint
                        .columns
                        .iter()
                        .filter_map(|c| body.late_columns.get(c.as_str()).copied())
                        .collect();
                    match cx.latest_deferred(table.id, &waits) {
                        Some(dependency) => deferred.push(
                            DeferredStatement::new(DeferredKind::GeneratedColumn, table.id, add)
                                .waiting_for(dependency),
                        ),
                        None => body.lines.push(constraint_sql(constraint)),
                    }
                }
            }
        }
    }

    fn create_statement(
        &self,
        table: &TableDef,
        cx: &EmitContext<'_>,
        lines: &[String],
    ) -> Option<String> {
        let if_not_exists = if cx.options.if_not_exists {
            "IF NOT EXISTS "
        } else {
            ""
        };
        let body = if lines.is_empty() {
            String::new()
        } else {
            format!(" (\n    {}\n)", lines.join(",\n    "))
        };
        let partition_by = table
            .shape
            .partition_key()
            .map(|key| format!(" PARTITION BY {}", key))
            .unwrap_or_default();
        let tablespace = table
            .tablespace
            .as_deref()
            .map(|ts| format!(" TABLESPACE {}", quote_ident(ts)))
            .unwrap_or_default();

        let sql = match &table.shape {
            TableShape::Plain | TableShape::Partitioned { .. } => format!(
                "CREATE {}TABLE {}{}{}{}{};",
                if table.unlogged { "UNLOGGED " } else { "" },
                if_not_exists,
                table.name.sql(),
                if lines.is_empty() { " ()" } else { body.as_str() },
                partition_by,
                tablespace
            ),
            TableShape::Partition { parent, bound }
            | TableShape::SubPartitioned { parent, bound, .. } => {
                let parent = cx.name_of(*parent)?;
                format!(
                    "CREATE TABLE {}{} PARTITION OF {}{}\n    {}{}{};",
                    if_not_exists,
                    table.name.sql(),
                    parent,
                    body,
                    bound,
                    partition_by,
                    tablespace
                )
            }
        };
        Some(sql)
    }
}

impl ObjectEmitter for TableEmitter {
    type Object = TableDef;

    fn emit(
        &self,
        table: &TableDef,
        cx: &EmitContext<'_>,
        deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let target = table.name.sql();
        let mut body = Body {
            lines: Vec::new(),
            notes: Vec::new(),
            late_columns: HashMap::new(),
        };

        // Partitions take their columns from the parent.
        if matches!(table.shape, TableShape::Plain | TableShape::Partitioned { .. }) {
            self.columns(table, cx, deferred, &mut body);
        }
        self.constraints(table, cx, deferred, &mut body);

        let Some(create) = self.create_statement(table, cx, &body.lines) else {
            return vec![format!(
                "-- {} {} skipped: its parent table is not in the catalog snapshot",
                table.kind(),
                table.name.display_name()
            )];
        };

        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(drop_statement("TABLE", &target));
        }
        statements.push(create);
        statements.extend(body.notes);
        statements.extend(
            table
                .indexes
                .iter()
                .map(|index| index_statement(index, cx.options.if_not_exists)),
        );

        for rule in &table.rules {
            deferred.push(DeferredStatement::new(
                DeferredKind::Rule,
                table.id,
                terminated(&rule.definition),
            ));
        }
        for trigger in &table.triggers {
            deferred.push(DeferredStatement::new(
                DeferredKind::Trigger,
                table.id,
                terminated(&trigger.definition),
            ));
        }

        statements.extend(trailer("TABLE", &target, Some("TABLE"), &table.meta, cx.options));
        if cx.options.include_comments {
            for column in &table.columns {
                if let Some(comment) = &column.comment {
                    statements.push(format!(
                        "COMMENT ON COLUMN {}.{} IS {};",
                        target,
                        column.quoted_name(),
                        quote_literal(comment)
                    ));
                }
            }
        }
        statements
    }
}
