// ABOUTME: Orchestrates a dump: globals, then each database in dependency order
// ABOUTME: Structure, data and the deferred post-pass are written as one SQL script

use super::cursor::{DataSource, ExportCursor, PgDataSource};
use super::deferred::{DeferredQueue, DeferredStatement};
use super::emit::{
    setval_statement, trailer, AggregateEmitter, DomainEmitter, EmitContext, FunctionEmitter,
    MaterializedViewEmitter, ObjectEmitter, OperatorEmitter, RoleEmitter, SequenceEmitter,
    TableEmitter, TablespaceEmitter, TypeEmitter, ViewEmitter,
};
use super::format::{formatter_for, TableMetadata};
use super::options::{DumpOptions, DumpScope};
use super::script::{ScriptWriter, PRELIMINARIES};
use super::selection::{resolve_selection, Selection};
use crate::catalog::{
    check_server_version, list_databases, load_globals, pin_search_path, CatalogError,
    CatalogSnapshot, DatabaseDef, GlobalCatalog, Introspector, ObjectEntry, ObjectId, ObjectKind,
    TypeCache,
};
use crate::graph::{DependencyAnalyzer, DependencyGraph};
use crate::postgres::{connect_to_database, connect_with_retry, create_extension_sql};
use crate::utils::{quote_ident, quote_literal, sanitize_identifier, validate_connection_string};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::io::Write;
use tokio_postgres::{Client, IsolationLevel};

/// Counters reported when a dump finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub databases: usize,
    pub objects: usize,
    pub tables_with_data: usize,
    pub rows: u64,
    pub deferred_written: usize,
    pub deferred_skipped: usize,
    pub catalog_failures: usize,
    pub circular_objects: usize,
}

impl DumpStats {
    fn absorb(&mut self, other: &DumpStats) {
        self.databases += other.databases;
        self.objects += other.objects;
        self.tables_with_data += other.tables_with_data;
        self.rows += other.rows;
        self.deferred_written += other.deferred_written;
        self.deferred_skipped += other.deferred_skipped;
        self.catalog_failures += other.catalog_failures;
        self.circular_objects += other.circular_objects;
    }
}

/// The dump of one database from an already-loaded snapshot
///
/// Owns the deferred-statement queue for the run; emitters push onto it and
/// the dump releases or drains it.
pub struct DatabaseDump<'a> {
    snapshot: &'a CatalogSnapshot,
    options: &'a DumpOptions,
    selection: Selection,
    deferred: DeferredQueue,
    emitted: BTreeSet<ObjectId>,
    stats: DumpStats,
    cursors_opened: u64,
}

impl<'a> DatabaseDump<'a> {
    pub fn new(snapshot: &'a CatalogSnapshot, options: &'a DumpOptions) -> Self {
        Self {
            snapshot,
            options,
            selection: resolve_selection(snapshot, options),
            deferred: DeferredQueue::new(),
            emitted: BTreeSet::new(),
            stats: DumpStats {
                databases: 1,
                ..Default::default()
            },
            cursors_opened: 0,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn stats(&self) -> &DumpStats {
        &self.stats
    }

    /// Preliminaries, structure, data, then the deferred post-pass
    pub async fn write_all(
        &mut self,
        script: &mut ScriptWriter<'_>,
        source: &mut dyn DataSource,
    ) -> Result<DumpStats> {
        if !self.options.suppress_preliminaries {
            for line in PRELIMINARIES {
                script.statement(line)?;
            }
        }
        if self.options.wants_structure() {
            self.write_structure(script)?;
        }
        if self.options.wants_data() {
            self.write_data(script, source).await?;
        }
        self.write_post_pass(script)?;
        Ok(self.stats.clone())
    }

    pub fn write_structure(&mut self, script: &mut ScriptWriter<'_>) -> Result<()> {
        let snapshot = self.snapshot;
        let analyzer = DependencyAnalyzer::new(snapshot, &self.selection.included);
        let type_graph = analyzer.type_graph();
        let unified = analyzer.unified_graph();
        let (early_views, late_views) = analyzer.view_graphs();

        if self.options.add_create_schema {
            self.write_schemas(script)?;
        }
        if !snapshot.extensions.is_empty() {
            script.section("Extensions")?;
            for extension in &snapshot.extensions {
                script.statement(&create_extension_sql(extension))?;
            }
        }

        // Enum and range types reference nothing we dump.
        let simple_types: Vec<&ObjectEntry> = snapshot
            .entries_of(&[ObjectKind::Type])
            .filter(|e| self.selection.contains(e.id))
            .filter(|e| matches!(snapshot.type_def(e.id), Ok(t) if !t.is_composite()))
            .collect();
        self.write_pass(script, "Types", &simple_types, None)?;
        self.write_graph_pass(script, "Domains and composite types", &type_graph)?;

        let sequences: Vec<&ObjectEntry> = snapshot
            .entries_of(&[ObjectKind::Sequence])
            .filter(|e| self.selection.contains(e.id))
            .collect();
        self.write_pass(script, "Sequences", &sequences, None)?;

        self.write_graph_pass(script, "Functions, tables and aggregates", &unified)?;

        let operators: Vec<&ObjectEntry> = snapshot
            .entries_of(&[ObjectKind::Operator])
            .filter(|e| self.selection.contains(e.id))
            .collect();
        self.write_pass(script, "Operators", &operators, None)?;

        self.write_graph_pass(script, "Views", &early_views)?;
        self.write_graph_pass(script, "Materialized views", &late_views)?;

        tracing::debug!(
            "Structure of '{}' written: {} object(s), {} deferred statement(s) pending",
            snapshot.database,
            self.stats.objects,
            self.deferred.len()
        );
        Ok(())
    }

    fn write_schemas(&mut self, script: &mut ScriptWriter<'_>) -> Result<()> {
        if self.snapshot.schemas.is_empty() {
            return Ok(());
        }
        script.section("Schemas")?;
        for schema in &self.snapshot.schemas {
            let name = quote_ident(&schema.name);
            if schema.name == "public" {
                script.statement(&format!("CREATE SCHEMA IF NOT EXISTS {};", name))?;
            } else {
                if self.options.clean {
                    script.statement(&format!("DROP SCHEMA IF EXISTS {} CASCADE;", name))?;
                }
                script.statement(&format!(
                    "CREATE SCHEMA {}{};",
                    if self.options.if_not_exists {
                        "IF NOT EXISTS "
                    } else {
                        ""
                    },
                    name
                ))?;
            }
            for statement in trailer("SCHEMA", &name, Some("SCHEMA"), &schema.meta, self.options) {
                script.statement(&statement)?;
            }
        }
        Ok(())
    }

    fn write_graph_pass(
        &mut self,
        script: &mut ScriptWriter<'_>,
        title: &str,
        graph: &DependencyGraph,
    ) -> Result<()> {
        if graph.sorted_nodes().is_empty() {
            return Ok(());
        }
        if graph.has_circular_dependencies() {
            let circular = graph.circular_nodes();
            tracing::warn!(
                "⚠ Circular dependencies among {} object(s) in '{}' ({}); using alphabetical order",
                circular.len(),
                self.snapshot.database,
                title.to_lowercase()
            );
            self.stats.circular_objects += circular.len();
        }

        let snapshot = self.snapshot;
        let entries: Vec<&ObjectEntry> = graph
            .sorted_nodes()
            .iter()
            .filter_map(|node| snapshot.entry(node.id))
            .collect();
        script.section(title)?;
        let warning = graph.circular_warning();
        if !warning.is_empty() {
            script.comment(&warning.join("\n"))?;
        }
        self.write_objects(script, &entries, Some(graph))
    }

    fn write_pass(
        &mut self,
        script: &mut ScriptWriter<'_>,
        title: &str,
        entries: &[&ObjectEntry],
        order: Option<&DependencyGraph>,
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        script.section(title)?;
        self.write_objects(script, entries, order)
    }

    fn write_objects(
        &mut self,
        script: &mut ScriptWriter<'_>,
        entries: &[&ObjectEntry],
        order: Option<&DependencyGraph>,
    ) -> Result<()> {
        for entry in entries {
            script.blank()?;
            script.comment(&format!(
                "Name: {}; Type: {}; Schema: {}",
                sanitize_identifier(&entry.name.name),
                entry.kind.sql_keyword(),
                sanitize_identifier(&entry.name.schema)
            ))?;

            match self.render(entry, order) {
                Ok(statements) => {
                    let created = statements.iter().any(|s| !s.starts_with("--"));
                    for statement in &statements {
                        script.statement(statement)?;
                    }
                    if created {
                        self.emitted.insert(entry.id);
                        self.stats.objects += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("⚠ {}", e);
                    script.comment(&format!("Skipped: {}", e))?;
                    self.stats.catalog_failures += 1;
                }
            }

            for statement in self.deferred.release_after(entry.id) {
                self.write_deferred(script, statement)?;
            }
        }
        Ok(())
    }

    /// Run the emitter for one object
    fn render(
        &mut self,
        entry: &ObjectEntry,
        order: Option<&DependencyGraph>,
    ) -> Result<Vec<String>, CatalogError> {
        let snapshot = self.snapshot;
        let cx = EmitContext {
            catalog: snapshot,
            options: self.options,
            order,
            included: &self.selection.included,
        };
        let deferred = &mut self.deferred;
        let id = entry.id;

        Ok(match entry.kind {
            ObjectKind::Table
            | ObjectKind::PartitionedTable
            | ObjectKind::Partition
            | ObjectKind::SubPartitionedTable => {
                TableEmitter.emit(snapshot.table(id)?, &cx, deferred)
            }
            ObjectKind::Function => FunctionEmitter.emit(snapshot.function(id)?, &cx, deferred),
            ObjectKind::Aggregate => AggregateEmitter.emit(snapshot.aggregate(id)?, &cx, deferred),
            ObjectKind::View => ViewEmitter.emit(snapshot.view(id)?, &cx, deferred),
            ObjectKind::MaterializedView => {
                MaterializedViewEmitter.emit(snapshot.view(id)?, &cx, deferred)
            }
            ObjectKind::Domain => DomainEmitter.emit(snapshot.domain(id)?, &cx, deferred),
            ObjectKind::Type => TypeEmitter.emit(snapshot.type_def(id)?, &cx, deferred),
            ObjectKind::Sequence => SequenceEmitter.emit(snapshot.sequence(id)?, &cx, deferred),
            ObjectKind::Operator => OperatorEmitter.emit(snapshot.operator(id)?, &cx, deferred),
        })
    }

    /// Write a deferred statement if everything it needs was created
    fn write_deferred(
        &mut self,
        script: &mut ScriptWriter<'_>,
        statement: DeferredStatement,
    ) -> Result<()> {
        let missing = statement
            .requires
            .iter()
            .find(|id| !self.emitted.contains(id));

        match missing {
            None => {
                script.statement(&statement.sql)?;
                self.stats.deferred_written += 1;
            }
            Some(id) => {
                let target = self.describe(statement.target);
                let absent = self.describe(*id);
                tracing::warn!(
                    "⚠ Skipping {} on {}: {} is not part of this dump",
                    statement.kind,
                    target,
                    absent
                );
                script.comment(&format!(
                    "Skipped {} on {}: {} is not part of this dump",
                    statement.kind, target, absent
                ))?;
                self.stats.deferred_skipped += 1;
            }
        }
        Ok(())
    }

    fn describe(&self, id: ObjectId) -> String {
        self.snapshot
            .entry(id)
            .map(|e| e.name.display_name())
            .unwrap_or_else(|| id.to_string())
    }

    /// Rows of every selected table with storage, in dependency order
    pub async fn write_data(
        &mut self,
        script: &mut ScriptWriter<'_>,
        source: &mut dyn DataSource,
    ) -> Result<()> {
        let snapshot = self.snapshot;
        let order = DependencyAnalyzer::new(snapshot, &self.selection.included).unified_graph();
        let mut section_written = false;

        for node in order.sorted_nodes() {
            if !node.kind.is_table_like() {
                continue;
            }
            let table = match snapshot.table(node.id) {
                Ok(table) => table,
                Err(e) => {
                    tracing::warn!("⚠ No data for {}: {}", node.name, e);
                    continue;
                }
            };
            if !table.shape.has_storage() || table.data_columns().is_empty() {
                continue;
            }

            if !section_written {
                script.section("Data")?;
                section_written = true;
            }
            script.comment(&format!(
                "Data for Name: {}; Type: TABLE DATA; Schema: {}",
                sanitize_identifier(&table.name.name),
                sanitize_identifier(&table.name.schema)
            ))?;

            let metadata = TableMetadata::from_table(table);
            let mut formatter = formatter_for(self.options.insert_format);
            self.cursors_opened += 1;
            let mut cursor = ExportCursor::open(
                &mut *source,
                table,
                self.options.batch_size,
                self.cursors_opened,
            )
            .await?;
            let result = cursor
                .process_rows(formatter.as_mut(), &metadata, script.inner())
                .await;
            let closed = cursor.close().await;
            let rows = result?;
            closed?;

            tracing::debug!("Dumped {} row(s) from {}", rows, table.name);
            self.stats.tables_with_data += 1;
            self.stats.rows += rows;
        }

        let included = &self.selection.included;
        let sequences = snapshot
            .entries()
            .iter()
            .filter(|e| e.kind == ObjectKind::Sequence && included.contains(&e.id))
            .filter_map(|e| snapshot.sequence(e.id).ok());
        for sequence in sequences {
            let Some(setval) = setval_statement(sequence) else {
                continue;
            };
            if !section_written {
                script.section("Data")?;
                section_written = true;
            }
            script.comment(&format!(
                "Sequence Set: {}",
                sequence.name.display_name()
            ))?;
            script.statement(&setval)?;
        }
        Ok(())
    }

    /// Drain whatever is still deferred, in the fixed post-pass order
    pub fn write_post_pass(&mut self, script: &mut ScriptWriter<'_>) -> Result<()> {
        let remaining = self.deferred.drain_post_pass();
        if remaining.is_empty() {
            return Ok(());
        }
        script.section("Constraints, refreshes, rules, triggers and ownership")?;
        let mut current = None;
        for statement in remaining {
            if current != Some(statement.kind) {
                script.blank()?;
                current = Some(statement.kind);
            }
            self.write_deferred(script, statement)?;
        }
        Ok(())
    }
}

/// Roles, memberships and tablespaces for a server-scope dump
pub fn write_globals(
    script: &mut ScriptWriter<'_>,
    globals: &GlobalCatalog,
    options: &DumpOptions,
) -> Result<()> {
    let snapshot = CatalogSnapshot::new("");
    let included = BTreeSet::new();
    let cx = EmitContext {
        catalog: &snapshot,
        options,
        order: None,
        included: &included,
    };
    let mut deferred = DeferredQueue::new();

    if !globals.roles.is_empty() {
        script.section("Roles")?;
        for role in &globals.roles {
            for statement in RoleEmitter.emit(role, &cx, &mut deferred) {
                script.statement(&statement)?;
            }
        }
        let memberships: Vec<String> = globals
            .roles
            .iter()
            .flat_map(|role| RoleEmitter.memberships(role))
            .collect();
        if !memberships.is_empty() {
            script.section("Role memberships")?;
            for statement in &memberships {
                script.statement(statement)?;
            }
        }
    }

    if !globals.tablespaces.is_empty() {
        script.section("Tablespaces")?;
        for tablespace in &globals.tablespaces {
            for statement in TablespaceEmitter.emit(tablespace, &cx, &mut deferred) {
                script.statement(&statement)?;
            }
        }
    }
    Ok(())
}

fn create_database_statements(database: &DatabaseDef, options: &DumpOptions) -> Vec<String> {
    let name = quote_ident(&database.name);
    let mut statements = Vec::new();
    if options.clean {
        statements.push(format!("DROP DATABASE IF EXISTS {};", name));
    }
    statements.push(format!(
        "CREATE DATABASE {} WITH TEMPLATE = template0 ENCODING = {} OWNER = {};",
        name,
        quote_literal(&database.encoding),
        quote_ident(&database.owner)
    ));
    statements.extend(trailer("DATABASE", &name, Some("DATABASE"), &database.meta, options));
    statements
}

/// Dumps a server or one database to a writer
pub struct Exporter {
    source_url: String,
    options: DumpOptions,
}

impl Exporter {
    pub fn new(source_url: &str, options: DumpOptions) -> Result<Self> {
        validate_connection_string(source_url).context("Invalid source connection string")?;
        options.validate()?;
        Ok(Self {
            source_url: source_url.to_string(),
            options,
        })
    }

    pub fn options(&self) -> &DumpOptions {
        &self.options
    }

    /// Write the complete script to `out`
    pub async fn run(&self, out: &mut (dyn Write + Send)) -> Result<DumpStats> {
        let mut client = connect_with_retry(&self.source_url)
            .await
            .context("Failed to connect to source database")?;
        let version = check_server_version(&client).await?;
        tracing::info!("Connected to source (server_version_num {})", version);

        let mut script = ScriptWriter::new(out);
        script.comment(&format!(
            "PostgreSQL dump\nDumped by postgres-porter {}",
            env!("CARGO_PKG_VERSION")
        ))?;

        let mut types = TypeCache::new();
        let mut totals = DumpStats::default();

        match self.options.scope {
            DumpScope::Server => {
                let globals = load_globals(&client).await?;
                tracing::info!(
                    "Dumping {} role(s) and {} tablespace(s)",
                    globals.roles.len(),
                    globals.tablespaces.len()
                );
                if self.options.wants_structure() {
                    write_globals(&mut script, &globals, &self.options)?;
                }

                let databases = list_databases(&client).await?;
                drop(client);
                tracing::info!("Dumping {} database(s)", databases.len());
                for database in &databases {
                    let mut db_client =
                        connect_to_database(&self.source_url, &database.name).await?;
                    let stats = self
                        .dump_database(&mut db_client, database, true, &mut types, &mut script)
                        .await?;
                    totals.absorb(&stats);
                }
            }
            DumpScope::Database => {
                let row = client
                    .query_one("SELECT current_database()::text", &[])
                    .await
                    .context("Failed to read current database")?;
                let current: String = row.get(0);
                let database = list_databases(&client)
                    .await?
                    .into_iter()
                    .find(|d| d.name == current)
                    .with_context(|| format!("Database '{}' not found in pg_database", current))?;
                let connect = self.options.add_create_database;
                let stats = self
                    .dump_database(&mut client, &database, connect, &mut types, &mut script)
                    .await?;
                totals.absorb(&stats);
            }
        }

        script.blank()?;
        script.comment("Dump complete")?;
        tracing::info!(
            "✓ Dump complete: {} database(s), {} object(s), {} row(s), {} statement(s)",
            totals.databases,
            totals.objects,
            totals.rows,
            script.statements()
        );
        if totals.deferred_skipped > 0 || totals.catalog_failures > 0 {
            tracing::warn!(
                "⚠ {} deferred statement(s) skipped, {} object(s) unreadable",
                totals.deferred_skipped,
                totals.catalog_failures
            );
        }
        Ok(totals)
    }

    async fn dump_database(
        &self,
        client: &mut Client,
        database: &DatabaseDef,
        connect: bool,
        types: &mut TypeCache,
        script: &mut ScriptWriter<'_>,
    ) -> Result<DumpStats> {
        tracing::info!("Dumping database '{}'", database.name);
        script.section(&format!("Database \"{}\"", database.name))?;
        if self.options.add_create_database {
            for statement in create_database_statements(database, &self.options) {
                script.statement(&statement)?;
            }
        }
        if connect {
            script.raw(&format!("\\connect {}\n\n", quote_ident(&database.name)))?;
        }
        if self.options.single_transaction {
            script.statement("BEGIN;")?;
        }

        let transaction = if self.options.consistent {
            client
                .build_transaction()
                .isolation_level(IsolationLevel::RepeatableRead)
                .read_only(true)
                .start()
                .await
        } else {
            client.transaction().await
        }
        .with_context(|| format!("Failed to start read transaction on '{}'", database.name))?;

        let result = async {
            pin_search_path(&transaction).await?;
            let snapshot = Introspector::new(&transaction, types)
                .load(&database.name, &self.options.schemas)
                .await?;
            let mut dump = DatabaseDump::new(&snapshot, &self.options);
            let mut source = PgDataSource::new(&transaction);
            dump.write_all(script, &mut source).await
        }
        .await;

        let stats = match result {
            Ok(stats) => {
                transaction
                    .commit()
                    .await
                    .context("Failed to finish read transaction")?;
                stats
            }
            Err(e) => {
                if let Err(rollback) = transaction.rollback().await {
                    tracing::error!("Rollback on '{}' failed: {}", database.name, rollback);
                }
                return Err(e.context(format!("Dump of database '{}' failed", database.name)));
            }
        };

        if self.options.single_transaction {
            script.statement("COMMIT;")?;
        }
        tracing::info!(
            "✓ Database '{}': {} object(s), {} table(s) with data, {} row(s)",
            database.name,
            stats.objects,
            stats.tables_with_data,
            stats.rows
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::*;
    use crate::dump::cursor::MemoryDataSource;

    fn table(id: u32, name: &str) -> TableDef {
        let mut table = TableDef::new(
            ObjectId(id),
            QualifiedName::new("public", name),
            TableShape::Plain,
        );
        table.columns.push(ColumnDef::new("id", "integer"));
        table
    }

    async fn render(
        snapshot: &CatalogSnapshot,
        options: &DumpOptions,
        source: &mut MemoryDataSource,
    ) -> (String, DumpStats) {
        let mut buf: Vec<u8> = Vec::new();
        let stats = {
            let mut script = ScriptWriter::new(&mut buf);
            let mut dump = DatabaseDump::new(snapshot, options);
            dump.write_all(&mut script, source).await.unwrap()
        };
        (String::from_utf8(buf).unwrap(), stats)
    }

    #[tokio::test]
    async fn test_sequence_ownership_skipped_when_table_filtered() {
        let mut snapshot = CatalogSnapshot::new("app");
        snapshot.add_table(table(1, "orders"));
        snapshot.add_table(table(2, "audit"));
        snapshot.add_sequence(SequenceDef {
            id: ObjectId(3),
            name: QualifiedName::new("public", "shared_seq"),
            data_type: "bigint".to_string(),
            start: 1,
            increment: 1,
            min_value: 1,
            max_value: 1000,
            cache: 1,
            cycle: false,
            last_value: None,
            is_called: false,
            owned_by: Some((ObjectId(2), "id".to_string())),
            meta: ObjectMeta::default(),
        });
        let options = DumpOptions {
            objects: vec!["public.orders".to_string(), "public.shared_seq".to_string()],
            structure_only: true,
            ..Default::default()
        };

        let (text, stats) = render(&snapshot, &options, &mut MemoryDataSource::new()).await;
        assert!(text.contains("CREATE SEQUENCE \"public\".\"shared_seq\""));
        assert!(!text.contains("OWNED BY"));
        assert!(text.contains(
            "-- Skipped sequence ownership on public.shared_seq: public.audit is not part of this dump"
        ));
        assert_eq!(stats.deferred_skipped, 1);
    }

    #[tokio::test]
    async fn test_data_written_between_structure_and_post_pass() {
        let mut snapshot = CatalogSnapshot::new("app");
        let mut orders = table(1, "orders");
        orders.triggers.push(TriggerDef {
            name: "orders_audit".to_string(),
            definition: "CREATE TRIGGER orders_audit AFTER INSERT ON public.orders FOR EACH ROW EXECUTE FUNCTION public.audit()".to_string(),
        });
        snapshot.add_table(orders);
        let mut source = MemoryDataSource::new();
        source.insert(ObjectId(1), vec![vec![Some("1".to_string())], vec![Some("2".to_string())]]);

        let (text, stats) = render(&snapshot, &DumpOptions::default(), &mut source).await;
        let create = text.find("CREATE TABLE \"public\".\"orders\"").unwrap();
        let copy = text.find("COPY \"public\".\"orders\" (\"id\") FROM stdin;").unwrap();
        let trigger = text.find("CREATE TRIGGER orders_audit").unwrap();
        assert!(create < copy && copy < trigger);
        assert!(text.starts_with("SET statement_timeout = 0;"));
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.tables_with_data, 1);
        assert_eq!(source.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_sequence_value_restored_after_rows() {
        let mut snapshot = CatalogSnapshot::new("app");
        snapshot.add_table(table(1, "orders"));
        snapshot.add_sequence(SequenceDef {
            id: ObjectId(2),
            name: QualifiedName::new("public", "orders_id_seq"),
            data_type: "integer".to_string(),
            start: 1,
            increment: 1,
            min_value: 1,
            max_value: 2147483647,
            cache: 1,
            cycle: false,
            last_value: Some(2),
            is_called: true,
            owned_by: Some((ObjectId(1), "id".to_string())),
            meta: ObjectMeta::default(),
        });
        let mut source = MemoryDataSource::new();
        source.insert(
            ObjectId(1),
            vec![vec![Some("1".to_string())], vec![Some("2".to_string())]],
        );

        let options = DumpOptions {
            objects: vec!["public.orders".to_string()],
            ..Default::default()
        };
        let (text, _) = render(&snapshot, &options, &mut source).await;
        let setval = "SELECT pg_catalog.setval('\"public\".\"orders_id_seq\"', 2, true);";
        let copy = text.find("COPY \"public\".\"orders\"").unwrap();
        let set = text.find(setval).unwrap();
        let owned = text.find("OWNED BY").unwrap();
        assert!(copy < set && set < owned);

        let structure = DumpOptions {
            structure_only: true,
            ..options
        };
        let (text, _) = render(&snapshot, &structure, &mut MemoryDataSource::new()).await;
        assert!(!text.contains("setval"));
    }

    #[tokio::test]
    async fn test_partitioned_parent_has_no_data_section() {
        let mut snapshot = CatalogSnapshot::new("app");
        let mut parent = TableDef::new(
            ObjectId(1),
            QualifiedName::new("public", "metrics"),
            TableShape::Partitioned {
                key: "RANGE (id)".to_string(),
            },
        );
        parent.columns.push(ColumnDef::new("id", "integer"));
        snapshot.add_table(parent);
        let mut child = TableDef::new(
            ObjectId(2),
            QualifiedName::new("public", "metrics_1"),
            TableShape::Partition {
                parent: ObjectId(1),
                bound: "FOR VALUES FROM (0) TO (100)".to_string(),
            },
        );
        child.columns.push(ColumnDef::new("id", "integer"));
        snapshot.add_table(child);
        let options = DumpOptions {
            objects: vec!["metrics".to_string()],
            suppress_preliminaries: true,
            ..Default::default()
        };

        let (text, _) = render(&snapshot, &options, &mut MemoryDataSource::new()).await;
        assert!(text.contains(
            "CREATE TABLE \"public\".\"metrics_1\" PARTITION OF \"public\".\"metrics\""
        ));
        assert!(!text.contains("COPY \"public\".\"metrics\" "));
        assert!(text.contains("COPY \"public\".\"metrics_1\" (\"id\") FROM stdin;"));
        assert!(!text.contains("SET statement_timeout"));
    }

    #[test]
    fn test_create_database_statements() {
        let database = DatabaseDef {
            name: "app".to_string(),
            owner: "owner".to_string(),
            encoding: "UTF8".to_string(),
            meta: ObjectMeta::default(),
        };
        let statements = create_database_statements(&database, &DumpOptions::default());
        assert_eq!(
            statements,
            vec!["CREATE DATABASE \"app\" WITH TEMPLATE = template0 ENCODING = 'UTF8' OWNER = \"owner\";"]
        );
    }

    #[tokio::test]
    #[ignore]
    async fn test_exporter_against_live_database() {
        let url = std::env::var("TEST_SOURCE_URL").expect("TEST_SOURCE_URL not set");
        let exporter = Exporter::new(&url, DumpOptions::default()).unwrap();
        let mut buf: Vec<u8> = Vec::new();
        let stats = exporter.run(&mut buf).await.unwrap();
        assert_eq!(stats.databases, 1);
        assert!(String::from_utf8(buf).unwrap().contains("-- Dump complete"));
    }
}
