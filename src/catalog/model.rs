// ABOUTME: Typed catalog metadata for every dumpable object kind
// ABOUTME: Plain data loaded by introspection and read by the graph analyzer and emitters

use crate::utils::{quote_ident, quote_qualified, sanitize_identifier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a catalog object (its OID on the source server)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    PartitionedTable,
    Partition,
    SubPartitionedTable,
    Function,
    Aggregate,
    View,
    MaterializedView,
    Domain,
    Type,
    Sequence,
    Operator,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::PartitionedTable => "partitioned table",
            ObjectKind::Partition => "partition",
            ObjectKind::SubPartitionedTable => "sub-partitioned table",
            ObjectKind::Function => "function",
            ObjectKind::Aggregate => "aggregate",
            ObjectKind::View => "view",
            ObjectKind::MaterializedView => "materialized view",
            ObjectKind::Domain => "domain",
            ObjectKind::Type => "type",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Operator => "operator",
        }
    }

    /// Keyword used in `ALTER <kind>`, `COMMENT ON <kind>` and `GRANT ... ON <kind>`
    pub fn sql_keyword(self) -> &'static str {
        match self {
            ObjectKind::Table
            | ObjectKind::PartitionedTable
            | ObjectKind::Partition
            | ObjectKind::SubPartitionedTable => "TABLE",
            ObjectKind::Function => "FUNCTION",
            ObjectKind::Aggregate => "AGGREGATE",
            ObjectKind::View => "VIEW",
            ObjectKind::MaterializedView => "MATERIALIZED VIEW",
            ObjectKind::Domain => "DOMAIN",
            ObjectKind::Type => "TYPE",
            ObjectKind::Sequence => "SEQUENCE",
            ObjectKind::Operator => "OPERATOR",
        }
    }

    pub fn is_table_like(self) -> bool {
        matches!(
            self,
            ObjectKind::Table
                | ObjectKind::PartitionedTable
                | ObjectKind::Partition
                | ObjectKind::SubPartitionedTable
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Quoted form for use inside SQL
    pub fn sql(&self) -> String {
        quote_qualified(&self.schema, &self.name)
    }

    /// Dotted form with control characters removed, safe inside `--` comments
    pub fn display_name(&self) -> String {
        format!(
            "{}.{}",
            sanitize_identifier(&self.schema),
            sanitize_identifier(&self.name)
        )
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Ownership, privileges and comment shared by every object kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub owner: Option<String>,
    /// Raw `aclitem` text, e.g. `alice=arw/postgres`
    pub acl: Vec<String>,
    pub comment: Option<String>,
}

/// One row of the catalog scan: enough to place an object in the dependency graph
/// even when its details could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub id: ObjectId,
    pub name: QualifiedName,
    pub kind: ObjectKind,
    pub parent: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableShape {
    Plain,
    Partitioned { key: String },
    Partition { parent: ObjectId, bound: String },
    SubPartitioned { parent: ObjectId, bound: String, key: String },
}

impl TableShape {
    pub fn kind(&self) -> ObjectKind {
        match self {
            TableShape::Plain => ObjectKind::Table,
            TableShape::Partitioned { .. } => ObjectKind::PartitionedTable,
            TableShape::Partition { .. } => ObjectKind::Partition,
            TableShape::SubPartitioned { .. } => ObjectKind::SubPartitionedTable,
        }
    }

    pub fn parent(&self) -> Option<ObjectId> {
        match self {
            TableShape::Partition { parent, .. } | TableShape::SubPartitioned { parent, .. } => {
                Some(*parent)
            }
            _ => None,
        }
    }

    pub fn partition_key(&self) -> Option<&str> {
        match self {
            TableShape::Partitioned { key } | TableShape::SubPartitioned { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn bound(&self) -> Option<&str> {
        match self {
            TableShape::Partition { bound, .. } | TableShape::SubPartitioned { bound, .. } => {
                Some(bound)
            }
            _ => None,
        }
    }

    /// Partitioned parents have no storage of their own
    pub fn has_storage(&self) -> bool {
        matches!(self, TableShape::Plain | TableShape::Partition { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Always,
    ByDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Output of `format_type`
    pub type_name: String,
    /// User-defined type (domain, composite, enum, range) the column uses
    pub type_ref: Option<ObjectId>,
    pub not_null: bool,
    pub default: Option<String>,
    /// Functions and sequences referenced by the default or generation expression
    pub default_refs: Vec<ObjectId>,
    /// Expression of a `GENERATED ALWAYS AS (...) STORED` column
    pub generated: Option<String>,
    pub identity: Option<IdentityKind>,
    /// False for columns inherited from a partition parent
    pub is_local: bool,
    pub comment: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            type_ref: None,
            not_null: false,
            default: None,
            default_refs: Vec::new(),
            generated: None,
            identity: None,
            is_local: true,
            comment: None,
        }
    }

    pub fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Check,
    ForeignKey { references: ObjectId },
    Exclusion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDef {
    pub name: String,
    pub kind: ConstraintKind,
    /// Output of `pg_get_constraintdef`, e.g. `CHECK ((amount > 0))`
    pub definition: String,
    pub columns: Vec<String>,
    /// Functions the constraint expression calls
    pub function_refs: Vec<ObjectId>,
    /// False for constraints inherited from a partition parent
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    /// Output of `pg_get_indexdef`
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDef {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDef {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub id: ObjectId,
    pub name: QualifiedName,
    pub shape: TableShape,
    pub unlogged: bool,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<ConstraintDef>,
    pub indexes: Vec<IndexDef>,
    pub triggers: Vec<TriggerDef>,
    pub rules: Vec<RuleDef>,
    pub tablespace: Option<String>,
    /// `pg_class.reltuples`, negative when never analyzed
    pub estimated_rows: f64,
    pub meta: ObjectMeta,
}

impl TableDef {
    pub fn new(id: ObjectId, name: QualifiedName, shape: TableShape) -> Self {
        Self {
            id,
            name,
            shape,
            unlogged: false,
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            triggers: Vec::new(),
            rules: Vec::new(),
            tablespace: None,
            estimated_rows: -1.0,
            meta: ObjectMeta::default(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.shape.kind()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns that can receive data (generated columns are computed on insert)
    pub fn data_columns(&self) -> Vec<&ColumnDef> {
        self.columns.iter().filter(|c| c.generated.is_none()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub id: ObjectId,
    pub name: QualifiedName,
    /// `pg_get_function_identity_arguments`
    pub identity_args: String,
    /// Full `CREATE OR REPLACE FUNCTION ...` text from `pg_get_functiondef`
    pub definition: String,
    pub is_procedure: bool,
    /// Relations whose row type appears in the signature
    pub type_refs: Vec<ObjectId>,
    pub meta: ObjectMeta,
}

impl FunctionDef {
    pub fn signature_sql(&self) -> String {
        format!("{}({})", self.name.sql(), self.identity_args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDef {
    pub id: ObjectId,
    pub name: QualifiedName,
    pub identity_args: String,
    pub state_func: String,
    pub state_type: String,
    pub final_func: Option<String>,
    pub combine_func: Option<String>,
    pub initial_value: Option<String>,
    /// Support functions (state, final, combine) by id
    pub support_refs: Vec<ObjectId>,
    pub meta: ObjectMeta,
}

impl AggregateDef {
    pub fn signature_sql(&self) -> String {
        let args = if self.identity_args.is_empty() {
            "*"
        } else {
            self.identity_args.as_str()
        };
        format!("{}({})", self.name.sql(), args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDef {
    pub id: ObjectId,
    pub name: QualifiedName,
    /// Query text from `pg_get_viewdef`
    pub query: String,
    pub materialized: bool,
    /// Relations the view's rewrite rule references
    pub depends_on: Vec<ObjectId>,
    /// Indexes on a materialized view
    pub indexes: Vec<IndexDef>,
    pub tablespace: Option<String>,
    pub meta: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainDef {
    pub id: ObjectId,
    pub name: QualifiedName,
    pub base_type: String,
    pub base_ref: Option<ObjectId>,
    pub not_null: bool,
    pub default: Option<String>,
    /// `(constraint name, CHECK (...) definition)`
    pub checks: Vec<(String, String)>,
    pub meta: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAttribute {
    pub name: String,
    pub type_name: String,
    pub type_ref: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeBody {
    Composite { attributes: Vec<TypeAttribute> },
    Enum { labels: Vec<String> },
    Range { subtype: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub id: ObjectId,
    pub name: QualifiedName,
    pub body: TypeBody,
    pub meta: ObjectMeta,
}

impl TypeDef {
    pub fn is_composite(&self) -> bool {
        matches!(self.body, TypeBody::Composite { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDef {
    pub id: ObjectId,
    pub name: QualifiedName,
    pub data_type: String,
    pub start: i64,
    pub increment: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub cache: i64,
    pub cycle: bool,
    /// Current value, `None` when it could not be read
    pub last_value: Option<i64>,
    /// Whether `nextval` returns `last_value + increment` rather than `last_value`
    pub is_called: bool,
    /// Owning `(table, column)` from `OWNED BY`
    pub owned_by: Option<(ObjectId, String)>,
    pub meta: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorDef {
    pub id: ObjectId,
    pub name: QualifiedName,
    pub left_type: Option<String>,
    pub right_type: Option<String>,
    /// Implementing function, already qualified
    pub procedure: String,
    pub procedure_ref: Option<ObjectId>,
    pub commutator: Option<String>,
    pub negator: Option<String>,
    pub restrict: Option<String>,
    pub join: Option<String>,
    pub meta: ObjectMeta,
}

impl OperatorDef {
    pub fn signature_sql(&self) -> String {
        format!(
            "{}.{}({}, {})",
            quote_ident(&self.name.schema),
            self.name.name,
            self.left_type.as_deref().unwrap_or("NONE"),
            self.right_type.as_deref().unwrap_or("NONE")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDef {
    pub name: String,
    pub meta: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDef {
    pub name: String,
    pub owner: String,
    pub encoding: String,
    pub meta: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleDef {
    pub name: String,
    pub superuser: bool,
    pub inherit: bool,
    pub create_role: bool,
    pub create_db: bool,
    pub can_login: bool,
    pub replication: bool,
    pub connection_limit: i32,
    pub valid_until: Option<String>,
    pub member_of: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablespaceDef {
    pub name: String,
    pub location: String,
    pub meta: ObjectMeta,
}

/// Cluster-wide objects dumped at server scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalCatalog {
    pub roles: Vec<RoleDef>,
    pub tablespaces: Vec<TablespaceDef>,
}
