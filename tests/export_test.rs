// ABOUTME: End-to-end export tests over in-memory catalog snapshots
// ABOUTME: Checks statement ordering, deferral, cycle warnings and cursor cleanup

use postgres_porter::catalog::*;
use postgres_porter::dump::{
    DatabaseDump, DumpOptions, DumpStats, MemoryDataSource, OutputSink, ScriptWriter,
};
use postgres_porter::dump::Compression;
use std::io::Read;

fn table(id: u32, name: &str) -> TableDef {
    let mut table = TableDef::new(
        ObjectId(id),
        QualifiedName::new("public", name),
        TableShape::Plain,
    );
    table.columns.push(ColumnDef::new("id", "integer"));
    table
}

fn foreign_key(name: &str, column: &str, references: u32) -> ConstraintDef {
    ConstraintDef {
        name: name.to_string(),
        kind: ConstraintKind::ForeignKey {
            references: ObjectId(references),
        },
        definition: format!("FOREIGN KEY ({}) REFERENCES public.accounts(id)", column),
        columns: vec![column.to_string()],
        function_refs: Vec::new(),
        is_local: true,
    }
}

fn function(id: u32, name: &str) -> FunctionDef {
    FunctionDef {
        id: ObjectId(id),
        name: QualifiedName::new("public", name),
        identity_args: "integer".to_string(),
        definition: format!(
            "CREATE OR REPLACE FUNCTION public.{}(v integer)\n RETURNS boolean\n LANGUAGE sql\nAS $function$select v > 0$function$\n",
            name
        ),
        is_procedure: false,
        type_refs: Vec::new(),
        meta: ObjectMeta::default(),
    }
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

fn position(text: &str, needle: &str) -> usize {
    text.find(needle)
        .unwrap_or_else(|| panic!("missing {:?} in:\n{}", needle, text))
}

#[tokio::test]
async fn test_foreign_key_follows_both_tables() {
    let mut snapshot = CatalogSnapshot::new("shop");
    // orders is scanned first, so only the edge puts accounts ahead of it
    let mut orders = table(2, "orders");
    orders.columns.push(ColumnDef::new("account_id", "integer"));
    orders
        .constraints
        .push(foreign_key("orders_account_id_fkey", "account_id", 1));
    snapshot.add_table(orders);
    snapshot.add_table(table(1, "accounts"));

    let options = DumpOptions {
        structure_only: true,
        ..Default::default()
    };
    let (text, stats) = render(&snapshot, &options, &mut MemoryDataSource::new()).await;

    let accounts = position(&text, "CREATE TABLE \"public\".\"accounts\"");
    let orders = position(&text, "CREATE TABLE \"public\".\"orders\"");
    let fk = position(
        &text,
        "ALTER TABLE \"public\".\"orders\" ADD CONSTRAINT \"orders_account_id_fkey\" FOREIGN KEY (account_id)",
    );
    assert!(accounts < orders);
    assert!(orders < fk);
    assert_eq!(stats.deferred_written, 1);
    assert_eq!(stats.circular_objects, 0);
}

#[tokio::test]
async fn test_check_on_later_function_is_validated_after_it() {
    let mut snapshot = CatalogSnapshot::new("shop");
    let mut payments = table(1, "payments");
    payments.columns.push(ColumnDef::new("amount", "integer"));
    payments.constraints.push(ConstraintDef {
        name: "payments_amount_check".to_string(),
        kind: ConstraintKind::Check,
        definition: "CHECK (public.is_positive(amount))".to_string(),
        columns: vec!["amount".to_string()],
        function_refs: vec![ObjectId(2)],
        is_local: true,
    });
    snapshot.add_table(payments);
    snapshot.add_function(function(2, "is_positive"));

    let options = DumpOptions {
        structure_only: true,
        ..Default::default()
    };
    let (text, _) = render(&snapshot, &options, &mut MemoryDataSource::new()).await;

    let create = position(&text, "CREATE TABLE \"public\".\"payments\"");
    let function = position(&text, "CREATE OR REPLACE FUNCTION public.is_positive");
    let not_valid = position(
        &text,
        "ALTER TABLE \"public\".\"payments\" ADD CONSTRAINT \"payments_amount_check\" CHECK (public.is_positive(amount)) NOT VALID;",
    );
    let validate = position(
        &text,
        "ALTER TABLE \"public\".\"payments\" VALIDATE CONSTRAINT \"payments_amount_check\";",
    );
    assert!(create < function);
    assert!(function < not_valid);
    assert!(not_valid < validate);
    // The constraint is not also created inline
    assert_eq!(text.matches("CHECK (public.is_positive(amount))").count(), 1);
}

#[tokio::test]
async fn test_selected_table_without_dependencies_omits_functions() {
    let mut snapshot = CatalogSnapshot::new("shop");
    snapshot.add_function(function(1, "next_code"));
    let mut codes = table(2, "codes");
    let mut code = ColumnDef::new("code", "integer");
    code.default = Some("public.next_code(1)".to_string());
    code.default_refs = vec![ObjectId(1)];
    codes.columns.push(code);
    snapshot.add_table(codes);

    let options = DumpOptions {
        objects: vec!["public.codes".to_string()],
        structure_only: true,
        ..Default::default()
    };
    let (text, _) = render(&snapshot, &options, &mut MemoryDataSource::new()).await;
    assert!(text.contains("CREATE TABLE \"public\".\"codes\""));
    assert!(!text.contains("FUNCTION public.next_code"));

    let with_dependencies = DumpOptions {
        include_dependencies: true,
        ..options
    };
    let (text, _) = render(&snapshot, &with_dependencies, &mut MemoryDataSource::new()).await;
    let function = position(&text, "CREATE OR REPLACE FUNCTION public.next_code");
    let table = position(&text, "CREATE TABLE \"public\".\"codes\"");
    assert!(function < table);
}

#[tokio::test]
async fn test_mutual_foreign_keys_warn_and_still_emit_everything() {
    let mut snapshot = CatalogSnapshot::new("shop");
    let mut accounts = table(1, "accounts");
    accounts.columns.push(ColumnDef::new("last_order", "integer"));
    accounts
        .constraints
        .push(foreign_key("accounts_last_order_fkey", "last_order", 2));
    let mut orders = table(2, "orders");
    orders.columns.push(ColumnDef::new("account_id", "integer"));
    orders
        .constraints
        .push(foreign_key("orders_account_id_fkey", "account_id", 1));
    snapshot.add_table(orders);
    snapshot.add_table(accounts);

    let options = DumpOptions {
        structure_only: true,
        ..Default::default()
    };
    let (text, stats) = render(&snapshot, &options, &mut MemoryDataSource::new()).await;

    assert!(text.contains("WARNING: circular dependencies detected."));
    assert_eq!(stats.circular_objects, 2);
    // Alphabetical fallback
    let accounts = position(&text, "CREATE TABLE \"public\".\"accounts\"");
    let orders = position(&text, "CREATE TABLE \"public\".\"orders\"");
    assert!(accounts < orders);
    let first_fk = position(&text, "ADD CONSTRAINT \"accounts_last_order_fkey\"");
    let second_fk = position(&text, "ADD CONSTRAINT \"orders_account_id_fkey\"");
    assert!(orders < first_fk && orders < second_fk);
}

#[tokio::test]
async fn test_hostile_names_stay_inside_comments() {
    let mut snapshot = CatalogSnapshot::new("shop");
    let mut orders = table(2, "orders");
    orders.columns.push(ColumnDef::new("account_id", "integer"));
    orders.constraints.push(foreign_key(
        "fk\nDROP TABLE important;",
        "account_id",
        1,
    ));
    snapshot.add_table(orders);
    snapshot.add_table(table(1, "acc\rDROP TABLE other;"));

    let options = DumpOptions {
        objects: vec!["public.orders".to_string()],
        structure_only: true,
        ..Default::default()
    };
    let (text, _) = render(&snapshot, &options, &mut MemoryDataSource::new()).await;

    assert!(text.contains("skipped: referenced table public.accDROP TABLE other; is not"));
    assert!(!text.contains('\r'));
    for line in text.split('\n') {
        assert!(
            !line.trim_start().starts_with("DROP TABLE"),
            "executable line {:?} in:\n{}",
            line,
            text
        );
    }
}

#[tokio::test]
async fn test_unreadable_object_becomes_a_comment() {
    let mut snapshot = CatalogSnapshot::new("shop");
    snapshot.add_table(table(1, "accounts"));
    snapshot.add_failure(
        ObjectEntry {
            id: ObjectId(2),
            name: QualifiedName::new("public", "secrets"),
            kind: ObjectKind::Table,
            parent: None,
        },
        "permission denied for table secrets",
    );

    let options = DumpOptions {
        structure_only: true,
        ..Default::default()
    };
    let (text, stats) = render(&snapshot, &options, &mut MemoryDataSource::new()).await;
    assert!(text.contains("CREATE TABLE \"public\".\"accounts\""));
    assert!(text.contains(
        "-- Skipped: could not read table public.secrets from the catalog: permission denied for table secrets"
    ));
    assert_eq!(stats.catalog_failures, 1);
}

#[tokio::test]
async fn test_data_cursor_released_when_fetch_fails() {
    let mut snapshot = CatalogSnapshot::new("shop");
    snapshot.add_table(table(1, "accounts"));
    let mut source = MemoryDataSource::new();
    source.insert(ObjectId(1), vec![vec![Some("1".to_string())]]);
    source.fail_table = Some(ObjectId(1));

    let options = DumpOptions::default();
    let mut buf: Vec<u8> = Vec::new();
    let result = {
        let mut script = ScriptWriter::new(&mut buf);
        let mut dump = DatabaseDump::new(&snapshot, &options);
        dump.write_all(&mut script, &mut source).await
    };
    assert!(result.is_err());
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_gzip_sink_round_trip() {
    let mut snapshot = CatalogSnapshot::new("shop");
    snapshot.add_table(table(1, "accounts"));
    let mut source = MemoryDataSource::new();
    source.insert(
        ObjectId(1),
        (0..250).map(|i| vec![Some(i.to_string())]).collect(),
    );
    let options = DumpOptions {
        batch_size: Some(100),
        ..Default::default()
    };

    let (mut sink, framing) = OutputSink::begin(Compression::Gzip, "shop", Vec::new()).unwrap();
    {
        let mut script = ScriptWriter::new(&mut sink);
        let mut dump = DatabaseDump::new(&snapshot, &options);
        let stats = dump.write_all(&mut script, &mut source).await.unwrap();
        assert_eq!(stats.rows, 250);
    }
    let bytes = sink.finish().unwrap();
    assert_eq!(framing.file_name, "shop.sql.gz");
    assert_eq!(source.largest_batch, 100);

    let mut text = String::new();
    flate2::read::GzDecoder::new(bytes.as_slice())
        .read_to_string(&mut text)
        .unwrap();
    assert!(text.contains("COPY \"public\".\"accounts\" (\"id\") FROM stdin;\n0\n1\n"));
    assert!(text.contains("249\n\\.\n"));
}
