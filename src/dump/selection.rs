// ABOUTME: Resolves the set of objects a dump includes from an explicit object list
// ABOUTME: Partitions and owned sequences follow their table; dependencies only on request

use super::options::DumpOptions;
use crate::catalog::{CatalogSnapshot, ObjectEntry, ObjectId, ObjectKind, TypeBody};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub included: BTreeSet<ObjectId>,
    /// Requested names that matched nothing
    pub unmatched: Vec<String>,
}

impl Selection {
    pub fn contains(&self, id: ObjectId) -> bool {
        self.included.contains(&id)
    }
}

/// Work out which objects of `snapshot` are dumped
///
/// With no explicit object list everything in the snapshot is included.
/// Names are `schema.name`; a bare name is looked up in `public`. Selecting a
/// partitioned table pulls in all of its partitions, recursively.
pub fn resolve_selection(snapshot: &CatalogSnapshot, options: &DumpOptions) -> Selection {
    if options.objects.is_empty() {
        return Selection {
            included: snapshot.entries().iter().map(|e| e.id).collect(),
            unmatched: Vec::new(),
        };
    }

    let mut selection = Selection::default();
    for requested in &options.objects {
        let (schema, name) = split_name(requested);
        let matches: Vec<&ObjectEntry> = snapshot
            .entries()
            .iter()
            .filter(|e| e.name.schema == schema && e.name.name == name)
            .collect();
        if matches.is_empty() {
            tracing::warn!("⚠ Object '{}' not found in {}", requested, snapshot.database);
            selection.unmatched.push(requested.clone());
        }
        for entry in matches {
            selection.included.insert(entry.id);
        }
    }

    loop {
        let before = selection.included.len();
        let current: Vec<ObjectId> = selection.included.iter().copied().collect();
        for id in current {
            let Some(entry) = snapshot.entry(id) else {
                continue;
            };
            if entry.kind.is_table_like() {
                selection.included.extend(snapshot.partitions_of(id));
                selection.included.extend(snapshot.sequences_owned_by(id));
            }
            if options.include_dependencies {
                selection.included.extend(dependencies_of(snapshot, entry));
            }
        }
        if selection.included.len() == before {
            break;
        }
    }

    tracing::debug!(
        "Selected {} object(s) from {} requested name(s)",
        selection.included.len(),
        options.objects.len()
    );
    selection
}

fn split_name(requested: &str) -> (&str, &str) {
    match requested.split_once('.') {
        Some((schema, name)) => (schema, name),
        None => ("public", requested),
    }
}

/// Objects `entry` cannot be created without
///
/// Tables referenced by foreign keys are not dependencies here: foreign keys
/// to tables outside the dump are skipped instead.
fn dependencies_of(snapshot: &CatalogSnapshot, entry: &ObjectEntry) -> Vec<ObjectId> {
    let mut deps = Vec::new();
    if let Some(parent) = entry.parent {
        deps.push(parent);
    }
    match entry.kind {
        ObjectKind::Function => {
            if let Ok(function) = snapshot.function(entry.id) {
                deps.extend(&function.type_refs);
            }
        }
        ObjectKind::Aggregate => {
            if let Ok(aggregate) = snapshot.aggregate(entry.id) {
                deps.extend(&aggregate.support_refs);
            }
        }
        ObjectKind::View | ObjectKind::MaterializedView => {
            if let Ok(view) = snapshot.view(entry.id) {
                deps.extend(&view.depends_on);
            }
        }
        ObjectKind::Domain => {
            if let Ok(domain) = snapshot.domain(entry.id) {
                deps.extend(domain.base_ref);
            }
        }
        ObjectKind::Type => {
            if let Ok(type_def) = snapshot.type_def(entry.id) {
                if let TypeBody::Composite { attributes } = &type_def.body {
                    deps.extend(attributes.iter().filter_map(|a| a.type_ref));
                }
            }
        }
        ObjectKind::Operator => {
            if let Ok(operator) = snapshot.operator(entry.id) {
                deps.extend(operator.procedure_ref);
            }
        }
        ObjectKind::Sequence => {}
        _ => {
            if let Ok(table) = snapshot.table(entry.id) {
                for column in &table.columns {
                    deps.extend(column.type_ref);
                    deps.extend(&column.default_refs);
                }
                for constraint in &table.constraints {
                    deps.extend(&constraint.function_refs);
                }
            }
        }
    }
    // Only objects the snapshot knows about can be dumped.
    deps.retain(|id| snapshot.entry(*id).is_some());
    deps
}
