// ABOUTME: In-memory catalog snapshot for one database, in catalog scan order
// ABOUTME: Per-object lookups that failed during introspection surface as CatalogError

use super::model::*;
use crate::postgres::Extension;
use std::collections::BTreeMap;

/// Why an object's details are not available to an emitter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("could not read {kind} {name} from the catalog: {message}")]
    LookupFailed {
        kind: ObjectKind,
        name: String,
        message: String,
    },
    #[error("object {0} is not present in the catalog snapshot")]
    Missing(ObjectId),
}

/// Everything the exporter knows about one database
///
/// `entries` preserves the catalog scan order, which is the deterministic
/// tie-break used by every topological pass.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub database: String,
    pub extensions: Vec<Extension>,
    pub schemas: Vec<SchemaDef>,
    entries: Vec<ObjectEntry>,
    tables: BTreeMap<ObjectId, TableDef>,
    functions: BTreeMap<ObjectId, FunctionDef>,
    aggregates: BTreeMap<ObjectId, AggregateDef>,
    views: BTreeMap<ObjectId, ViewDef>,
    domains: BTreeMap<ObjectId, DomainDef>,
    types: BTreeMap<ObjectId, TypeDef>,
    sequences: BTreeMap<ObjectId, SequenceDef>,
    operators: BTreeMap<ObjectId, OperatorDef>,
    failures: BTreeMap<ObjectId, String>,
}

macro_rules! lookup {
    ($method:ident, $field:ident, $ty:ty) => {
        pub fn $method(&self, id: ObjectId) -> Result<&$ty, CatalogError> {
            if let Some(def) = self.$field.get(&id) {
                return Ok(def);
            }
            Err(self.failure_for(id))
        }
    };
}

impl CatalogSnapshot {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// All scanned objects, in scan order
    pub fn entries(&self) -> &[ObjectEntry] {
        &self.entries
    }

    pub fn entry(&self, id: ObjectId) -> Option<&ObjectEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries_of<'a>(
        &'a self,
        kinds: &'a [ObjectKind],
    ) -> impl Iterator<Item = &'a ObjectEntry> + 'a {
        self.entries.iter().filter(move |e| kinds.contains(&e.kind))
    }

    /// Find an object by schema-qualified name
    pub fn find(&self, schema: &str, name: &str) -> Option<&ObjectEntry> {
        self.entries
            .iter()
            .find(|e| e.name.schema == schema && e.name.name == name)
    }

    lookup!(table, tables, TableDef);
    lookup!(function, functions, FunctionDef);
    lookup!(aggregate, aggregates, AggregateDef);
    lookup!(view, views, ViewDef);
    lookup!(domain, domains, DomainDef);
    lookup!(type_def, types, TypeDef);
    lookup!(sequence, sequences, SequenceDef);
    lookup!(operator, operators, OperatorDef);

    /// Partitions whose parent is `parent`, in scan order
    pub fn partitions_of(&self, parent: ObjectId) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|e| e.parent == Some(parent))
            .map(|e| e.id)
            .collect()
    }

    /// Sequences owned by a column of `table`
    pub fn sequences_owned_by(&self, table: ObjectId) -> Vec<ObjectId> {
        self.sequences
            .values()
            .filter(|s| matches!(&s.owned_by, Some((owner, _)) if *owner == table))
            .map(|s| s.id)
            .collect()
    }

    pub fn add_table(&mut self, table: TableDef) {
        self.push_entry(ObjectEntry {
            id: table.id,
            name: table.name.clone(),
            kind: table.kind(),
            parent: table.shape.parent(),
        });
        self.tables.insert(table.id, table);
    }

    pub fn add_function(&mut self, function: FunctionDef) {
        self.push_entry(ObjectEntry {
            id: function.id,
            name: function.name.clone(),
            kind: ObjectKind::Function,
            parent: None,
        });
        self.functions.insert(function.id, function);
    }

    pub fn add_aggregate(&mut self, aggregate: AggregateDef) {
        self.push_entry(ObjectEntry {
            id: aggregate.id,
            name: aggregate.name.clone(),
            kind: ObjectKind::Aggregate,
            parent: None,
        });
        self.aggregates.insert(aggregate.id, aggregate);
    }

    pub fn add_view(&mut self, view: ViewDef) {
        let kind = if view.materialized {
            ObjectKind::MaterializedView
        } else {
            ObjectKind::View
        };
        self.push_entry(ObjectEntry {
            id: view.id,
            name: view.name.clone(),
            kind,
            parent: None,
        });
        self.views.insert(view.id, view);
    }

    pub fn add_domain(&mut self, domain: DomainDef) {
        self.push_entry(ObjectEntry {
            id: domain.id,
            name: domain.name.clone(),
            kind: ObjectKind::Domain,
            parent: None,
        });
        self.domains.insert(domain.id, domain);
    }

    pub fn add_type(&mut self, type_def: TypeDef) {
        self.push_entry(ObjectEntry {
            id: type_def.id,
            name: type_def.name.clone(),
            kind: ObjectKind::Type,
            parent: None,
        });
        self.types.insert(type_def.id, type_def);
    }

    pub fn add_sequence(&mut self, sequence: SequenceDef) {
        self.push_entry(ObjectEntry {
            id: sequence.id,
            name: sequence.name.clone(),
            kind: ObjectKind::Sequence,
            parent: None,
        });
        self.sequences.insert(sequence.id, sequence);
    }

    pub fn add_operator(&mut self, operator: OperatorDef) {
        self.push_entry(ObjectEntry {
            id: operator.id,
            name: operator.name.clone(),
            kind: ObjectKind::Operator,
            parent: None,
        });
        self.operators.insert(operator.id, operator);
    }

    /// Record an object whose details could not be loaded
    ///
    /// The entry still takes part in ordering; emitters asking for it get a
    /// [`CatalogError::LookupFailed`].
    pub fn add_failure(&mut self, entry: ObjectEntry, message: impl Into<String>) {
        let id = entry.id;
        self.push_entry(entry);
        self.failures.insert(id, message.into());
    }

    fn push_entry(&mut self, entry: ObjectEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    fn failure_for(&self, id: ObjectId) -> CatalogError {
        match (self.failures.get(&id), self.entry(id)) {
            (Some(message), Some(entry)) => CatalogError::LookupFailed {
                kind: entry.kind,
                name: entry.name.display_name(),
                message: message.clone(),
            },
            _ => CatalogError::Missing(id),
        }
    }
}
