// ABOUTME: Server-scope DDL for roles and tablespaces
// ABOUTME: Role memberships are rendered separately, once every role exists

use super::{trailer, EmitContext, ObjectEmitter};
use crate::catalog::{RoleDef, TablespaceDef};
use crate::dump::deferred::DeferredQueue;
use crate::utils::{quote_ident, quote_literal};

pub struct RoleEmitter;

fn flag(enabled: bool, name: &str) -> String {
    if enabled {
        name.to_string()
    } else {
        format!("NO{}", name)
    }
}

impl RoleEmitter {
    /// `GRANT parent TO role` for each membership
    pub fn memberships(&self, role: &RoleDef) -> Vec<String> {
        role.member_of
            .iter()
            .map(|parent| format!("GRANT {} TO {};", quote_ident(parent), quote_ident(&role.name)))
            .collect()
    }
}

impl ObjectEmitter for RoleEmitter {
    type Object = RoleDef;

    fn emit(
        &self,
        role: &RoleDef,
        cx: &EmitContext<'_>,
        _deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let name = quote_ident(&role.name);
        let mut attributes = vec![
            flag(role.superuser, "SUPERUSER"),
            flag(role.inherit, "INHERIT"),
            flag(role.create_role, "CREATEROLE"),
            flag(role.create_db, "CREATEDB"),
            flag(role.can_login, "LOGIN"),
            flag(role.replication, "REPLICATION"),
        ];
        if role.connection_limit >= 0 {
            attributes.push(format!("CONNECTION LIMIT {}", role.connection_limit));
        }
        if let Some(valid_until) = &role.valid_until {
            attributes.push(format!("VALID UNTIL {}", quote_literal(valid_until)));
        }

        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(format!("DROP ROLE IF EXISTS {};", name));
        }
        statements.push(format!("CREATE ROLE {};", name));
        statements.push(format!("ALTER ROLE {} WITH {};", name, attributes.join(" ")));
        if cx.options.include_comments {
            if let Some(comment) = &role.comment {
                statements.push(format!("COMMENT ON ROLE {} IS {};", name, quote_literal(comment)));
            }
        }
        statements
    }
}

pub struct TablespaceEmitter;

impl ObjectEmitter for TablespaceEmitter {
    type Object = TablespaceDef;

    fn emit(
        &self,
        tablespace: &TablespaceDef,
        cx: &EmitContext<'_>,
        _deferred: &mut DeferredQueue,
    ) -> Vec<String> {
        let name = quote_ident(&tablespace.name);
        let mut statements = Vec::new();
        if cx.options.clean {
            statements.push(format!("DROP TABLESPACE IF EXISTS {};", name));
        }
        statements.push(format!(
            "CREATE TABLESPACE {} LOCATION {};",
            name,
            quote_literal(&tablespace.location)
        ));
        statements.extend(trailer(
            "TABLESPACE",
            &name,
            Some("TABLESPACE"),
            &tablespace.meta,
            cx.options,
        ));
        statements
    }
}
