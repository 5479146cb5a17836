// ABOUTME: Populates catalog snapshots from pg_catalog for one database or the whole server
// ABOUTME: Per-object detail failures are recorded in the snapshot instead of aborting the scan

use super::model::*;
use super::snapshot::CatalogSnapshot;
use super::type_cache::TypeCache;
use crate::postgres::get_installed_extensions;
use anyhow::{bail, Context, Result};
use tokio_postgres::GenericClient;

/// Oldest server we can introspect (`pg_trigger.tgparentid` appeared in 13)
pub const MIN_SERVER_VERSION: i32 = 130000;

const EXTENSION_MEMBER: &str = "NOT EXISTS (
    SELECT 1 FROM pg_catalog.pg_depend dep
    WHERE dep.classid = '{catalog}'::regclass AND dep.objid = {oid} AND dep.deptype = 'e')";

fn not_extension_member(catalog: &str, oid: &str) -> String {
    EXTENSION_MEMBER
        .replace("{catalog}", catalog)
        .replace("{oid}", oid)
}

/// Read `server_version_num` and refuse servers older than [`MIN_SERVER_VERSION`]
pub async fn check_server_version<C: GenericClient + Sync>(client: &C) -> Result<i32> {
    let row = client
        .query_one("SHOW server_version_num", &[])
        .await
        .context("Failed to query server version")?;
    let raw: String = row.get(0);
    let version: i32 = raw
        .trim()
        .parse()
        .with_context(|| format!("Unexpected server_version_num '{}'", raw))?;

    if version < MIN_SERVER_VERSION {
        bail!(
            "PostgreSQL server version {} is too old; version 13 or newer is required",
            version
        );
    }
    Ok(version)
}

/// Make every name that catalog functions print schema-qualified
///
/// With an empty `search_path`, `pg_get_viewdef`, `pg_get_functiondef`,
/// `format_type` and `regproc` output can be replayed on any target.
pub async fn pin_search_path<C: GenericClient + Sync>(client: &C) -> Result<()> {
    client
        .execute("SELECT pg_catalog.set_config('search_path', '', false)", &[])
        .await
        .context("Failed to clear search_path")?;
    Ok(())
}

/// List all non-template databases in the cluster
pub async fn list_databases<C: GenericClient + Sync>(client: &C) -> Result<Vec<DatabaseDef>> {
    let rows = client
        .query(
            "SELECT d.datname::text,
                    pg_catalog.pg_get_userbyid(d.datdba)::text,
                    pg_catalog.pg_encoding_to_char(d.encoding)::text,
                    d.datacl::text[],
                    pg_catalog.shobj_description(d.oid, 'pg_database')
             FROM pg_catalog.pg_database d
             WHERE d.datistemplate = false AND d.datallowconn
             ORDER BY d.datname",
            &[],
        )
        .await
        .context("Failed to list databases")?;

    let databases = rows
        .iter()
        .map(|row| DatabaseDef {
            name: row.get(0),
            owner: row.get(1),
            encoding: row.get(2),
            meta: ObjectMeta {
                owner: Some(row.get(1)),
                acl: row.get::<_, Option<Vec<String>>>(3).unwrap_or_default(),
                comment: row.get(4),
            },
        })
        .collect();

    Ok(databases)
}

/// Load roles and tablespaces for a server-scope dump
pub async fn load_globals<C: GenericClient + Sync>(client: &C) -> Result<GlobalCatalog> {
    let role_rows = client
        .query(
            "SELECT r.rolname::text, r.rolsuper, r.rolinherit, r.rolcreaterole, r.rolcreatedb,
                    r.rolcanlogin, r.rolreplication, r.rolconnlimit, r.rolvaliduntil::text,
                    ARRAY(SELECT b.rolname::text
                          FROM pg_catalog.pg_auth_members m
                          JOIN pg_catalog.pg_roles b ON b.oid = m.roleid
                          WHERE m.member = r.oid
                          ORDER BY b.rolname),
                    pg_catalog.shobj_description(r.oid, 'pg_authid')
             FROM pg_catalog.pg_roles r
             WHERE r.rolname !~ '^pg_'
             ORDER BY r.rolname",
            &[],
        )
        .await
        .context("Failed to list roles")?;

    let roles = role_rows
        .iter()
        .map(|row| RoleDef {
            name: row.get(0),
            superuser: row.get(1),
            inherit: row.get(2),
            create_role: row.get(3),
            create_db: row.get(4),
            can_login: row.get(5),
            replication: row.get(6),
            connection_limit: row.get(7),
            valid_until: row.get(8),
            member_of: row.get(9),
            comment: row.get(10),
        })
        .collect();

    let tablespace_rows = client
        .query(
            "SELECT t.spcname::text,
                    pg_catalog.pg_get_userbyid(t.spcowner)::text,
                    pg_catalog.pg_tablespace_location(t.oid),
                    t.spcacl::text[],
                    pg_catalog.shobj_description(t.oid, 'pg_tablespace')
             FROM pg_catalog.pg_tablespace t
             WHERE t.spcname NOT IN ('pg_default', 'pg_global')
             ORDER BY t.spcname",
            &[],
        )
        .await
        .context("Failed to list tablespaces")?;

    let tablespaces = tablespace_rows
        .iter()
        .map(|row| TablespaceDef {
            name: row.get(0),
            location: row.get(2),
            meta: ObjectMeta {
                owner: Some(row.get(1)),
                acl: row.get::<_, Option<Vec<String>>>(3).unwrap_or_default(),
                comment: row.get(4),
            },
        })
        .collect();

    Ok(GlobalCatalog { roles, tablespaces })
}

/// An object found by the scan, before it is inserted in OID order
enum Scanned {
    Table(TableDef),
    View(ViewDef),
    Sequence(SequenceDef),
    Function(FunctionDef),
    Aggregate(AggregateDef),
    Domain(DomainDef),
    Type(TypeDef),
    Operator(OperatorDef),
    Failed(ObjectEntry, String),
}

impl Scanned {
    fn id(&self) -> ObjectId {
        match self {
            Scanned::Table(t) => t.id,
            Scanned::View(v) => v.id,
            Scanned::Sequence(s) => s.id,
            Scanned::Function(f) => f.id,
            Scanned::Aggregate(a) => a.id,
            Scanned::Domain(d) => d.id,
            Scanned::Type(t) => t.id,
            Scanned::Operator(o) => o.id,
            Scanned::Failed(entry, _) => entry.id,
        }
    }
}

/// Loads one database's catalog into a [`CatalogSnapshot`]
///
/// Objects are inserted in OID order, which approximates creation order and is
/// stable across runs against the same server.
pub struct Introspector<'a, C> {
    client: &'a C,
    types: &'a mut TypeCache,
}

impl<'a, C: GenericClient + Sync> Introspector<'a, C> {
    pub fn new(client: &'a C, types: &'a mut TypeCache) -> Self {
        Self { client, types }
    }

    /// Scan `schemas` (all user schemas when empty) of the connected database
    pub async fn load(&mut self, database: &str, schemas: &[String]) -> Result<CatalogSnapshot> {
        let schemas = self.resolve_schemas(schemas).await?;
        tracing::debug!("Introspecting {} schema(s) of '{}'", schemas.len(), database);

        let mut snapshot = CatalogSnapshot::new(database);
        snapshot.extensions = get_installed_extensions(self.client).await?;
        snapshot.schemas = self.load_schemas(&schemas).await?;

        let mut scanned = Vec::new();
        self.scan_relations(&schemas, &mut scanned).await?;
        self.scan_routines(&schemas, &mut scanned).await?;
        self.scan_domains(&schemas, &mut scanned).await?;
        self.scan_types(&schemas, &mut scanned).await?;
        self.scan_operators(&schemas, &mut scanned).await?;
        scanned.sort_by_key(Scanned::id);

        let mut failures = 0;
        for item in scanned {
            match item {
                Scanned::Table(t) => snapshot.add_table(t),
                Scanned::View(v) => snapshot.add_view(v),
                Scanned::Sequence(s) => snapshot.add_sequence(s),
                Scanned::Function(f) => snapshot.add_function(f),
                Scanned::Aggregate(a) => snapshot.add_aggregate(a),
                Scanned::Domain(d) => snapshot.add_domain(d),
                Scanned::Type(t) => snapshot.add_type(t),
                Scanned::Operator(o) => snapshot.add_operator(o),
                Scanned::Failed(entry, message) => {
                    failures += 1;
                    snapshot.add_failure(entry, message);
                }
            }
        }

        if failures > 0 {
            tracing::warn!(
                "⚠ {} object(s) in '{}' could not be read from the catalog",
                failures,
                database
            );
        }
        tracing::debug!(
            "Loaded {} object(s) from '{}' ({} type lookups)",
            snapshot.entries().len(),
            database,
            self.types.lookups()
        );
        Ok(snapshot)
    }

    async fn resolve_schemas(&self, requested: &[String]) -> Result<Vec<String>> {
        if !requested.is_empty() {
            return Ok(requested.to_vec());
        }
        let rows = self
            .client
            .query(
                "SELECT n.nspname::text FROM pg_catalog.pg_namespace n
                 WHERE n.nspname !~ '^pg_' AND n.nspname <> 'information_schema'
                 ORDER BY n.nspname",
                &[],
            )
            .await
            .context("Failed to list schemas")?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn load_schemas(&self, schemas: &[String]) -> Result<Vec<SchemaDef>> {
        let rows = self
            .client
            .query(
                "SELECT n.nspname::text,
                        pg_catalog.pg_get_userbyid(n.nspowner)::text,
                        n.nspacl::text[],
                        pg_catalog.obj_description(n.oid, 'pg_namespace')
                 FROM pg_catalog.pg_namespace n
                 WHERE n.nspname = ANY($1)
                 ORDER BY n.nspname",
                &[&schemas],
            )
            .await
            .context("Failed to load schema definitions")?;

        Ok(rows
            .iter()
            .map(|row| SchemaDef {
                name: row.get(0),
                meta: ObjectMeta {
                    owner: Some(row.get(1)),
                    acl: row.get::<_, Option<Vec<String>>>(2).unwrap_or_default(),
                    comment: row.get(3),
                },
            })
            .collect())
    }

    async fn scan_relations(&mut self, schemas: &[String], out: &mut Vec<Scanned>) -> Result<()> {
        let query = format!(
            "SELECT c.oid, n.nspname::text, c.relname::text, c.relkind::text, c.relispartition,
                    pg_catalog.pg_get_userbyid(c.relowner)::text,
                    c.relacl::text[],
                    pg_catalog.obj_description(c.oid, 'pg_class'),
                    CASE WHEN c.relkind = 'p' THEN pg_catalog.pg_get_partkeydef(c.oid) END,
                    CASE WHEN c.relispartition
                         THEN pg_catalog.pg_get_expr(c.relpartbound, c.oid) END,
                    (SELECT i.inhparent FROM pg_catalog.pg_inherits i
                     WHERE i.inhrelid = c.oid AND c.relispartition),
                    c.reltuples::float8,
                    ts.spcname::text,
                    c.relpersistence::text
             FROM pg_catalog.pg_class c
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             LEFT JOIN pg_catalog.pg_tablespace ts ON ts.oid = c.reltablespace
             WHERE n.nspname = ANY($1)
               AND c.relkind IN ('r', 'p', 'v', 'm', 'S')
               AND {}
             ORDER BY c.oid",
            not_extension_member("pg_catalog.pg_class", "c.oid")
        );
        let rows = self
            .client
            .query(&query, &[&schemas])
            .await
            .context("Failed to scan relations")?;

        for row in rows {
            let oid: u32 = row.get(0);
            let name = QualifiedName::new(row.get::<_, String>(1), row.get::<_, String>(2));
            let relkind: String = row.get(3);
            let meta = ObjectMeta {
                owner: Some(row.get(5)),
                acl: row.get::<_, Option<Vec<String>>>(6).unwrap_or_default(),
                comment: row.get(7),
            };
            let tablespace: Option<String> = row.get(12);

            match relkind.as_str() {
                "r" | "p" => {
                    let key: Option<String> = row.get(8);
                    let bound: Option<String> = row.get(9);
                    let parent: Option<u32> = row.get(10);
                    let shape = match (key, bound, parent) {
                        (Some(key), Some(bound), Some(parent)) => TableShape::SubPartitioned {
                            parent: ObjectId(parent),
                            bound,
                            key,
                        },
                        (Some(key), _, _) => TableShape::Partitioned { key },
                        (None, Some(bound), Some(parent)) => TableShape::Partition {
                            parent: ObjectId(parent),
                            bound,
                        },
                        _ => TableShape::Plain,
                    };

                    let mut table = TableDef::new(ObjectId(oid), name, shape);
                    table.meta = meta;
                    table.tablespace = tablespace;
                    table.estimated_rows = row.get(11);
                    table.unlogged = row.get::<_, String>(13) == "u";

                    let entry = ObjectEntry {
                        id: table.id,
                        name: table.name.clone(),
                        kind: table.kind(),
                        parent: table.shape.parent(),
                    };
                    match self.load_table_details(&mut table).await {
                        Ok(()) => out.push(Scanned::Table(table)),
                        Err(e) => out.push(Scanned::Failed(entry, format!("{:#}", e))),
                    }
                }
                "v" | "m" => {
                    let materialized = relkind == "m";
                    let entry = ObjectEntry {
                        id: ObjectId(oid),
                        name: name.clone(),
                        kind: if materialized {
                            ObjectKind::MaterializedView
                        } else {
                            ObjectKind::View
                        },
                        parent: None,
                    };
                    match self.load_view(oid, name, materialized, tablespace, meta).await {
                        Ok(view) => out.push(Scanned::View(view)),
                        Err(e) => out.push(Scanned::Failed(entry, format!("{:#}", e))),
                    }
                }
                "S" => {
                    let entry = ObjectEntry {
                        id: ObjectId(oid),
                        name: name.clone(),
                        kind: ObjectKind::Sequence,
                        parent: None,
                    };
                    match self.load_sequence(oid, name, meta).await {
                        Ok(Some(sequence)) => out.push(Scanned::Sequence(sequence)),
                        Ok(None) => {}
                        Err(e) => out.push(Scanned::Failed(entry, format!("{:#}", e))),
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn load_table_details(&mut self, table: &mut TableDef) -> Result<()> {
        let oid = table.id.0;

        let rows = self
            .client
            .query(
                "SELECT a.attname::text,
                        pg_catalog.format_type(a.atttypid, a.atttypmod),
                        a.atttypid,
                        a.attnotnull,
                        pg_catalog.pg_get_expr(ad.adbin, ad.adrelid),
                        a.attgenerated::text,
                        a.attidentity::text,
                        a.attislocal,
                        pg_catalog.col_description(a.attrelid, a.attnum),
                        ARRAY(SELECT d.refobjid FROM pg_catalog.pg_depend d
                              WHERE d.classid = 'pg_catalog.pg_attrdef'::regclass
                                AND d.objid = ad.oid
                                AND d.refclassid IN ('pg_catalog.pg_proc'::regclass,
                                                     'pg_catalog.pg_class'::regclass)
                                AND d.refobjid <> a.attrelid)
                 FROM pg_catalog.pg_attribute a
                 LEFT JOIN pg_catalog.pg_attrdef ad
                        ON ad.adrelid = a.attrelid AND ad.adnum = a.attnum
                 WHERE a.attrelid = $1 AND a.attnum > 0 AND NOT a.attisdropped
                 ORDER BY a.attnum",
                &[&oid],
            )
            .await
            .with_context(|| format!("Failed to read columns of {}", table.name))?;

        for row in rows {
            let mut column = ColumnDef::new(row.get::<_, String>(0), row.get::<_, String>(1));
            column.type_ref = self.types.resolve(self.client, row.get(2)).await?;
            column.not_null = row.get(3);
            let expression: Option<String> = row.get(4);
            if row.get::<_, String>(5) == "s" {
                column.generated = expression;
            } else {
                column.default = expression;
            }
            column.identity = match row.get::<_, String>(6).as_str() {
                "a" => Some(IdentityKind::Always),
                "d" => Some(IdentityKind::ByDefault),
                _ => None,
            };
            column.is_local = row.get(7);
            column.comment = row.get(8);
            column.default_refs = row
                .get::<_, Vec<u32>>(9)
                .into_iter()
                .map(ObjectId)
                .collect();
            table.columns.push(column);
        }

        let rows = self
            .client
            .query(
                "SELECT con.conname::text,
                        con.contype::text,
                        pg_catalog.pg_get_constraintdef(con.oid),
                        con.confrelid,
                        con.conislocal AND con.conparentid = 0,
                        ARRAY(SELECT a.attname::text FROM pg_catalog.pg_attribute a
                              WHERE a.attrelid = con.conrelid AND a.attnum = ANY(con.conkey)
                              ORDER BY a.attnum),
                        ARRAY(SELECT d.refobjid FROM pg_catalog.pg_depend d
                              WHERE d.classid = 'pg_catalog.pg_constraint'::regclass
                                AND d.objid = con.oid
                                AND d.refclassid = 'pg_catalog.pg_proc'::regclass)
                 FROM pg_catalog.pg_constraint con
                 WHERE con.conrelid = $1 AND con.contype IN ('p', 'u', 'c', 'f', 'x')
                 ORDER BY con.contype, con.conname",
                &[&oid],
            )
            .await
            .with_context(|| format!("Failed to read constraints of {}", table.name))?;

        for row in rows {
            let kind = match row.get::<_, String>(1).as_str() {
                "p" => ConstraintKind::PrimaryKey,
                "u" => ConstraintKind::Unique,
                "c" => ConstraintKind::Check,
                "f" => ConstraintKind::ForeignKey {
                    references: ObjectId(row.get(3)),
                },
                _ => ConstraintKind::Exclusion,
            };
            table.constraints.push(ConstraintDef {
                name: row.get(0),
                kind,
                definition: row.get(2),
                is_local: row.get(4),
                columns: row.get(5),
                function_refs: row
                    .get::<_, Vec<u32>>(6)
                    .into_iter()
                    .map(ObjectId)
                    .collect(),
            });
        }

        table.indexes = self.load_indexes(oid).await?;

        let rows = self
            .client
            .query(
                "SELECT t.tgname::text, pg_catalog.pg_get_triggerdef(t.oid)
                 FROM pg_catalog.pg_trigger t
                 WHERE t.tgrelid = $1 AND NOT t.tgisinternal AND t.tgparentid = 0
                 ORDER BY t.tgname",
                &[&oid],
            )
            .await
            .with_context(|| format!("Failed to read triggers of {}", table.name))?;
        table.triggers = rows
            .iter()
            .map(|row| TriggerDef {
                name: row.get(0),
                definition: row.get(1),
            })
            .collect();

        let rows = self
            .client
            .query(
                "SELECT r.rulename::text, pg_catalog.pg_get_ruledef(r.oid)
                 FROM pg_catalog.pg_rewrite r
                 WHERE r.ev_class = $1 AND r.rulename <> '_RETURN'
                 ORDER BY r.rulename",
                &[&oid],
            )
            .await
            .with_context(|| format!("Failed to read rules of {}", table.name))?;
        table.rules = rows
            .iter()
            .map(|row| RuleDef {
                name: row.get(0),
                definition: row.get(1),
            })
            .collect();

        Ok(())
    }

    /// Indexes not backing a constraint and not attached to a parent's index
    async fn load_indexes(&self, relation: u32) -> Result<Vec<IndexDef>> {
        let rows = self
            .client
            .query(
                "SELECT ic.relname::text, pg_catalog.pg_get_indexdef(i.indexrelid)
                 FROM pg_catalog.pg_index i
                 JOIN pg_catalog.pg_class ic ON ic.oid = i.indexrelid
                 WHERE i.indrelid = $1
                   AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_constraint con
                                   WHERE con.conindid = i.indexrelid
                                     AND con.conrelid = i.indrelid)
                   AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_inherits inh
                                   WHERE inh.inhrelid = i.indexrelid)
                 ORDER BY ic.relname",
                &[&relation],
            )
            .await
            .context("Failed to read indexes")?;

        Ok(rows
            .iter()
            .map(|row| IndexDef {
                name: row.get(0),
                definition: row.get(1),
            })
            .collect())
    }

    async fn load_view(
        &self,
        oid: u32,
        name: QualifiedName,
        materialized: bool,
        tablespace: Option<String>,
        meta: ObjectMeta,
    ) -> Result<ViewDef> {
        let row = self
            .client
            .query_one(
                "SELECT pg_catalog.pg_get_viewdef($1::oid),
                        ARRAY(SELECT DISTINCT d.refobjid
                              FROM pg_catalog.pg_rewrite r
                              JOIN pg_catalog.pg_depend d
                                ON d.objid = r.oid
                               AND d.classid = 'pg_catalog.pg_rewrite'::regclass
                              WHERE r.ev_class = $1
                                AND d.refclassid = 'pg_catalog.pg_class'::regclass
                                AND d.refobjid <> $1)",
                &[&oid],
            )
            .await
            .with_context(|| format!("Failed to read definition of view {}", name))?;

        let indexes = if materialized {
            self.load_indexes(oid).await?
        } else {
            Vec::new()
        };

        let query: String = row.get(0);
        Ok(ViewDef {
            id: ObjectId(oid),
            name,
            query: query.trim().trim_end_matches(';').to_string(),
            materialized,
            depends_on: row
                .get::<_, Vec<u32>>(1)
                .into_iter()
                .map(ObjectId)
                .collect(),
            indexes,
            tablespace,
            meta,
        })
    }

    /// Returns `None` for identity-column sequences, which the table recreates
    async fn load_sequence(
        &self,
        oid: u32,
        name: QualifiedName,
        meta: ObjectMeta,
    ) -> Result<Option<SequenceDef>> {
        let row = self
            .client
            .query_one(
                "SELECT pg_catalog.format_type(s.seqtypid, NULL),
                        s.seqstart, s.seqincrement, s.seqmin, s.seqmax, s.seqcache, s.seqcycle,
                        owner.refobjid,
                        att.attname::text,
                        EXISTS (SELECT 1 FROM pg_catalog.pg_depend d
                                WHERE d.classid = 'pg_catalog.pg_class'::regclass
                                  AND d.objid = s.seqrelid AND d.deptype = 'i'),
                        pg_catalog.has_sequence_privilege(s.seqrelid, 'SELECT')
                 FROM pg_catalog.pg_sequence s
                 LEFT JOIN pg_catalog.pg_depend owner
                        ON owner.classid = 'pg_catalog.pg_class'::regclass
                       AND owner.objid = s.seqrelid
                       AND owner.refclassid = 'pg_catalog.pg_class'::regclass
                       AND owner.deptype = 'a'
                 LEFT JOIN pg_catalog.pg_attribute att
                        ON att.attrelid = owner.refobjid AND att.attnum = owner.refobjsubid
                 WHERE s.seqrelid = $1",
                &[&oid],
            )
            .await
            .with_context(|| format!("Failed to read sequence {}", name))?;

        if row.get::<_, bool>(9) {
            return Ok(None);
        }

        let (last_value, is_called) = if row.get::<_, bool>(10) {
            let state = self
                .client
                .query_one(
                    &format!("SELECT last_value, is_called FROM {}", name.sql()),
                    &[],
                )
                .await
                .with_context(|| format!("Failed to read current value of {}", name))?;
            (Some(state.get::<_, i64>(0)), state.get::<_, bool>(1))
        } else {
            tracing::warn!("⚠ No SELECT privilege on {}; its current value is not dumped", name);
            (None, false)
        };

        let owner: Option<u32> = row.get(7);
        let column: Option<String> = row.get(8);
        Ok(Some(SequenceDef {
            id: ObjectId(oid),
            name,
            data_type: row.get(0),
            start: row.get(1),
            increment: row.get(2),
            min_value: row.get(3),
            max_value: row.get(4),
            cache: row.get(5),
            cycle: row.get(6),
            last_value,
            is_called,
            owned_by: owner.zip(column).map(|(t, c)| (ObjectId(t), c)),
            meta,
        }))
    }

    async fn scan_routines(&mut self, schemas: &[String], out: &mut Vec<Scanned>) -> Result<()> {
        let query = format!(
            "SELECT p.oid, n.nspname::text, p.proname::text,
                    pg_catalog.pg_get_function_identity_arguments(p.oid),
                    p.prokind::text,
                    pg_catalog.pg_get_userbyid(p.proowner)::text,
                    p.proacl::text[],
                    pg_catalog.obj_description(p.oid, 'pg_proc')
             FROM pg_catalog.pg_proc p
             JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
             WHERE n.nspname = ANY($1) AND {}
             ORDER BY p.oid",
            not_extension_member("pg_catalog.pg_proc", "p.oid")
        );
        let rows = self
            .client
            .query(&query, &[&schemas])
            .await
            .context("Failed to scan functions")?;

        for row in rows {
            let oid: u32 = row.get(0);
            let name = QualifiedName::new(row.get::<_, String>(1), row.get::<_, String>(2));
            let identity_args: String = row.get(3);
            let prokind: String = row.get(4);
            let meta = ObjectMeta {
                owner: Some(row.get(5)),
                acl: row.get::<_, Option<Vec<String>>>(6).unwrap_or_default(),
                comment: row.get(7),
            };

            if prokind == "a" {
                let entry = ObjectEntry {
                    id: ObjectId(oid),
                    name: name.clone(),
                    kind: ObjectKind::Aggregate,
                    parent: None,
                };
                match self.load_aggregate(oid, name, identity_args, meta).await {
                    Ok(aggregate) => out.push(Scanned::Aggregate(aggregate)),
                    Err(e) => out.push(Scanned::Failed(entry, format!("{:#}", e))),
                }
                continue;
            }

            let entry = ObjectEntry {
                id: ObjectId(oid),
                name: name.clone(),
                kind: ObjectKind::Function,
                parent: None,
            };
            match self.load_function(oid, &name).await {
                Ok((definition, type_refs)) => out.push(Scanned::Function(FunctionDef {
                    id: ObjectId(oid),
                    name,
                    identity_args,
                    definition,
                    is_procedure: prokind == "p",
                    type_refs,
                    meta,
                })),
                Err(e) => out.push(Scanned::Failed(entry, format!("{:#}", e))),
            }
        }
        Ok(())
    }

    async fn load_function(
        &mut self,
        oid: u32,
        name: &QualifiedName,
    ) -> Result<(String, Vec<ObjectId>)> {
        let row = self
            .client
            .query_one(
                "SELECT pg_catalog.pg_get_functiondef(p.oid),
                        array_append(p.proargtypes::oid[], p.prorettype)
                 FROM pg_catalog.pg_proc p WHERE p.oid = $1",
                &[&oid],
            )
            .await
            .with_context(|| format!("Failed to read definition of function {}", name))?;

        let mut type_refs = Vec::new();
        for type_oid in row.get::<_, Vec<u32>>(1) {
            if let Some(id) = self.types.resolve(self.client, type_oid).await? {
                if !type_refs.contains(&id) {
                    type_refs.push(id);
                }
            }
        }
        Ok((row.get(0), type_refs))
    }

    async fn load_aggregate(
        &self,
        oid: u32,
        name: QualifiedName,
        identity_args: String,
        meta: ObjectMeta,
    ) -> Result<AggregateDef> {
        let row = self
            .client
            .query_one(
                "SELECT a.aggtransfn::regproc::text,
                        a.aggtransfn::oid,
                        CASE WHEN a.aggfinalfn::oid <> 0 THEN a.aggfinalfn::regproc::text END,
                        a.aggfinalfn::oid,
                        CASE WHEN a.aggcombinefn::oid <> 0 THEN a.aggcombinefn::regproc::text END,
                        a.aggcombinefn::oid,
                        pg_catalog.format_type(a.aggtranstype, NULL),
                        a.agginitval
                 FROM pg_catalog.pg_aggregate a WHERE a.aggfnoid = $1",
                &[&oid],
            )
            .await
            .with_context(|| format!("Failed to read aggregate {}", name))?;

        let support_refs = [row.get::<_, u32>(1), row.get(3), row.get(5)]
            .into_iter()
            .filter(|oid| *oid != 0)
            .map(ObjectId)
            .collect();

        Ok(AggregateDef {
            id: ObjectId(oid),
            name,
            identity_args,
            state_func: row.get(0),
            final_func: row.get(2),
            combine_func: row.get(4),
            state_type: row.get(6),
            initial_value: row.get(7),
            support_refs,
            meta,
        })
    }

    async fn scan_domains(&mut self, schemas: &[String], out: &mut Vec<Scanned>) -> Result<()> {
        let query = format!(
            "SELECT t.oid, n.nspname::text, t.typname::text,
                    pg_catalog.format_type(t.typbasetype, t.typtypmod),
                    t.typbasetype, t.typnotnull, t.typdefault,
                    pg_catalog.pg_get_userbyid(t.typowner)::text,
                    t.typacl::text[],
                    pg_catalog.obj_description(t.oid, 'pg_type')
             FROM pg_catalog.pg_type t
             JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
             WHERE t.typtype = 'd' AND n.nspname = ANY($1) AND {}
             ORDER BY t.oid",
            not_extension_member("pg_catalog.pg_type", "t.oid")
        );
        let rows = self
            .client
            .query(&query, &[&schemas])
            .await
            .context("Failed to scan domains")?;

        for row in rows {
            let oid: u32 = row.get(0);
            let name = QualifiedName::new(row.get::<_, String>(1), row.get::<_, String>(2));
            let base_ref = self.types.resolve(self.client, row.get(4)).await?;

            let checks = self
                .client
                .query(
                    "SELECT con.conname::text, pg_catalog.pg_get_constraintdef(con.oid)
                     FROM pg_catalog.pg_constraint con
                     WHERE con.contypid = $1 AND con.contype = 'c'
                     ORDER BY con.conname",
                    &[&oid],
                )
                .await;

            match checks {
                Ok(checks) => out.push(Scanned::Domain(DomainDef {
                    id: ObjectId(oid),
                    name,
                    base_type: row.get(3),
                    base_ref,
                    not_null: row.get(5),
                    default: row.get(6),
                    checks: checks.iter().map(|c| (c.get(0), c.get(1))).collect(),
                    meta: ObjectMeta {
                        owner: Some(row.get(7)),
                        acl: row.get::<_, Option<Vec<String>>>(8).unwrap_or_default(),
                        comment: row.get(9),
                    },
                })),
                Err(e) => out.push(Scanned::Failed(
                    ObjectEntry {
                        id: ObjectId(oid),
                        name,
                        kind: ObjectKind::Domain,
                        parent: None,
                    },
                    format!("Failed to read domain constraints: {}", e),
                )),
            }
        }
        Ok(())
    }

    async fn scan_types(&mut self, schemas: &[String], out: &mut Vec<Scanned>) -> Result<()> {
        let query = format!(
            "SELECT t.oid, n.nspname::text, t.typname::text, t.typtype::text, t.typrelid,
                    pg_catalog.pg_get_userbyid(t.typowner)::text,
                    t.typacl::text[],
                    pg_catalog.obj_description(t.oid, 'pg_type')
             FROM pg_catalog.pg_type t
             JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
             LEFT JOIN pg_catalog.pg_class c ON c.oid = t.typrelid
             WHERE n.nspname = ANY($1)
               AND (t.typtype IN ('e', 'r') OR (t.typtype = 'c' AND c.relkind = 'c'))
               AND {}
             ORDER BY t.oid",
            not_extension_member("pg_catalog.pg_type", "t.oid")
        );
        let rows = self
            .client
            .query(&query, &[&schemas])
            .await
            .context("Failed to scan types")?;

        for row in rows {
            let oid: u32 = row.get(0);
            let name = QualifiedName::new(row.get::<_, String>(1), row.get::<_, String>(2));
            let typtype: String = row.get(3);
            let typrelid: u32 = row.get(4);
            let meta = ObjectMeta {
                owner: Some(row.get(5)),
                acl: row.get::<_, Option<Vec<String>>>(6).unwrap_or_default(),
                comment: row.get(7),
            };

            let entry = ObjectEntry {
                id: ObjectId(oid),
                name: name.clone(),
                kind: ObjectKind::Type,
                parent: None,
            };
            match self.load_type_body(oid, &typtype, typrelid).await {
                Ok(body) => out.push(Scanned::Type(TypeDef {
                    id: ObjectId(oid),
                    name,
                    body,
                    meta,
                })),
                Err(e) => out.push(Scanned::Failed(entry, format!("{:#}", e))),
            }
        }
        Ok(())
    }

    async fn load_type_body(&mut self, oid: u32, typtype: &str, typrelid: u32) -> Result<TypeBody> {
        match typtype {
            "e" => {
                let rows = self
                    .client
                    .query(
                        "SELECT e.enumlabel::text FROM pg_catalog.pg_enum e
                         WHERE e.enumtypid = $1 ORDER BY e.enumsortorder",
                        &[&oid],
                    )
                    .await
                    .context("Failed to read enum labels")?;
                Ok(TypeBody::Enum {
                    labels: rows.iter().map(|r| r.get(0)).collect(),
                })
            }
            "r" => {
                let row = self
                    .client
                    .query_one(
                        "SELECT pg_catalog.format_type(r.rngsubtype, NULL)
                         FROM pg_catalog.pg_range r WHERE r.rngtypid = $1",
                        &[&oid],
                    )
                    .await
                    .context("Failed to read range subtype")?;
                Ok(TypeBody::Range {
                    subtype: row.get(0),
                })
            }
            _ => {
                let rows = self
                    .client
                    .query(
                        "SELECT a.attname::text,
                                pg_catalog.format_type(a.atttypid, a.atttypmod),
                                a.atttypid
                         FROM pg_catalog.pg_attribute a
                         WHERE a.attrelid = $1 AND a.attnum > 0 AND NOT a.attisdropped
                         ORDER BY a.attnum",
                        &[&typrelid],
                    )
                    .await
                    .context("Failed to read composite attributes")?;
                let mut attributes = Vec::with_capacity(rows.len());
                for row in rows {
                    attributes.push(TypeAttribute {
                        name: row.get(0),
                        type_name: row.get(1),
                        type_ref: self.types.resolve(self.client, row.get(2)).await?,
                    });
                }
                Ok(TypeBody::Composite { attributes })
            }
        }
    }

    async fn scan_operators(&mut self, schemas: &[String], out: &mut Vec<Scanned>) -> Result<()> {
        let query = format!(
            "SELECT o.oid, n.nspname::text, o.oprname::text,
                    CASE WHEN o.oprleft <> 0 THEN pg_catalog.format_type(o.oprleft, NULL) END,
                    CASE WHEN o.oprright <> 0 THEN pg_catalog.format_type(o.oprright, NULL) END,
                    o.oprcode::regproc::text,
                    o.oprcode::oid,
                    CASE WHEN o.oprcom <> 0 THEN o.oprcom::regoper::text END,
                    CASE WHEN o.oprnegate <> 0 THEN o.oprnegate::regoper::text END,
                    CASE WHEN o.oprrest::oid <> 0 THEN o.oprrest::regproc::text END,
                    CASE WHEN o.oprjoin::oid <> 0 THEN o.oprjoin::regproc::text END,
                    pg_catalog.pg_get_userbyid(o.oprowner)::text,
                    pg_catalog.obj_description(o.oid, 'pg_operator')
             FROM pg_catalog.pg_operator o
             JOIN pg_catalog.pg_namespace n ON n.oid = o.oprnamespace
             WHERE n.nspname = ANY($1) AND {}
             ORDER BY o.oid",
            not_extension_member("pg_catalog.pg_operator", "o.oid")
        );
        let rows = self
            .client
            .query(&query, &[&schemas])
            .await
            .context("Failed to scan operators")?;

        for row in rows {
            out.push(Scanned::Operator(OperatorDef {
                id: ObjectId(row.get(0)),
                name: QualifiedName::new(row.get::<_, String>(1), row.get::<_, String>(2)),
                left_type: row.get(3),
                right_type: row.get(4),
                procedure: row.get(5),
                procedure_ref: Some(ObjectId(row.get(6))),
                commutator: row.get(7),
                negator: row.get(8),
                restrict: row.get(9),
                join: row.get(10),
                meta: ObjectMeta {
                    owner: Some(row.get(11)),
                    acl: Vec::new(),
                    comment: row.get(12),
                },
            }));
        }
        Ok(())
    }
}
