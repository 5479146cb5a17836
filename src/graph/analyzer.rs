// ABOUTME: Builds the per-pass dependency graphs of one database from a catalog snapshot
// ABOUTME: Unified function/table/aggregate pass, domain+composite pass, view passes

use super::dependency::{DependencyGraph, EdgeKind, GraphBuilder, ObjectNode};
use crate::catalog::{CatalogSnapshot, ConstraintKind, ObjectId, ObjectKind, TypeBody};
use std::collections::BTreeSet;

const UNIFIED_KINDS: &[ObjectKind] = &[
    ObjectKind::Function,
    ObjectKind::Table,
    ObjectKind::PartitionedTable,
    ObjectKind::Partition,
    ObjectKind::SubPartitionedTable,
    ObjectKind::Aggregate,
];

/// Scans a snapshot restricted to the selected objects and derives graphs
///
/// Objects whose details failed to load still become nodes, without edges, so
/// their failure comment lands at a stable position.
pub struct DependencyAnalyzer<'a> {
    snapshot: &'a CatalogSnapshot,
    included: &'a BTreeSet<ObjectId>,
}

impl<'a> DependencyAnalyzer<'a> {
    pub fn new(snapshot: &'a CatalogSnapshot, included: &'a BTreeSet<ObjectId>) -> Self {
        Self { snapshot, included }
    }

    fn builder_for(&self, kinds: &[ObjectKind]) -> GraphBuilder {
        let mut builder = GraphBuilder::new();
        for entry in self.snapshot.entries_of(kinds) {
            if self.included.contains(&entry.id) {
                builder.add_node(ObjectNode::from(entry));
            }
        }
        builder
    }

    /// Functions, every table shape and aggregates in one topological pass
    ///
    /// CHECK constraints calling functions add no edge; the emitter decides
    /// with `should_defer` whether such a constraint is validated later.
    pub fn unified_graph(&self) -> DependencyGraph {
        let mut builder = self.builder_for(UNIFIED_KINDS);

        for entry in self.snapshot.entries_of(UNIFIED_KINDS) {
            if !builder.contains(entry.id) {
                continue;
            }
            match entry.kind {
                ObjectKind::Function => {
                    if let Ok(function) = self.snapshot.function(entry.id) {
                        for type_ref in &function.type_refs {
                            builder.add_edge(entry.id, *type_ref, EdgeKind::SignatureType);
                        }
                    }
                }
                ObjectKind::Aggregate => {
                    if let Ok(aggregate) = self.snapshot.aggregate(entry.id) {
                        for support in &aggregate.support_refs {
                            builder.add_edge(entry.id, *support, EdgeKind::AggregateSupport);
                        }
                    }
                }
                _ => {
                    if let Some(parent) = entry.parent {
                        builder.add_edge(entry.id, parent, EdgeKind::PartitionOf);
                    }
                    let Ok(table) = self.snapshot.table(entry.id) else {
                        continue;
                    };
                    for column in &table.columns {
                        let relation = if column.generated.is_some() {
                            EdgeKind::GeneratedColumn
                        } else {
                            EdgeKind::ColumnDefault
                        };
                        for target in &column.default_refs {
                            builder.add_edge(entry.id, *target, relation);
                        }
                        if let Some(type_ref) = column.type_ref {
                            builder.add_edge(entry.id, type_ref, EdgeKind::TypeUsage);
                        }
                    }
                    for constraint in &table.constraints {
                        if let ConstraintKind::ForeignKey { references } = constraint.kind {
                            builder.add_edge(entry.id, references, EdgeKind::ForeignKey);
                        }
                    }
                }
            }
        }

        builder.build()
    }

    /// Domains and composite types, which may reference each other
    pub fn type_graph(&self) -> DependencyGraph {
        let mut builder = GraphBuilder::new();
        for entry in self.snapshot.entries_of(&[ObjectKind::Domain, ObjectKind::Type]) {
            if !self.included.contains(&entry.id) {
                continue;
            }
            let composite_or_domain = match entry.kind {
                ObjectKind::Domain => true,
                _ => self
                    .snapshot
                    .type_def(entry.id)
                    .map(|t| t.is_composite())
                    .unwrap_or(true),
            };
            if composite_or_domain {
                builder.add_node(ObjectNode::from(entry));
            }
        }

        for entry in self.snapshot.entries_of(&[ObjectKind::Domain, ObjectKind::Type]) {
            if !builder.contains(entry.id) {
                continue;
            }
            if let Ok(domain) = self.snapshot.domain(entry.id) {
                if let Some(base) = domain.base_ref {
                    builder.add_edge(entry.id, base, EdgeKind::TypeUsage);
                }
            }
            if let Ok(type_def) = self.snapshot.type_def(entry.id) {
                if let TypeBody::Composite { attributes } = &type_def.body {
                    for attribute in attributes {
                        if let Some(type_ref) = attribute.type_ref {
                            builder.add_edge(entry.id, type_ref, EdgeKind::TypeUsage);
                        }
                    }
                }
            }
        }

        builder.build()
    }

    /// View pass and materialized-view pass
    ///
    /// A plain view that reads (directly or through other views) from a
    /// materialized view moves into the second pass so it is created after it.
    pub fn view_graphs(&self) -> (DependencyGraph, DependencyGraph) {
        let views: Vec<_> = self
            .snapshot
            .entries_of(&[ObjectKind::View, ObjectKind::MaterializedView])
            .filter(|e| self.included.contains(&e.id))
            .collect();

        let mut late: BTreeSet<ObjectId> = views
            .iter()
            .filter(|e| e.kind == ObjectKind::MaterializedView)
            .map(|e| e.id)
            .collect();
        loop {
            let before = late.len();
            for entry in &views {
                if late.contains(&entry.id) {
                    continue;
                }
                if let Ok(view) = self.snapshot.view(entry.id) {
                    if view.depends_on.iter().any(|d| late.contains(d)) {
                        late.insert(entry.id);
                    }
                }
            }
            if late.len() == before {
                break;
            }
        }

        let mut early_builder = GraphBuilder::new();
        let mut late_builder = GraphBuilder::new();
        for entry in &views {
            let node = ObjectNode::from(*entry);
            if late.contains(&entry.id) {
                late_builder.add_node(node);
            } else {
                early_builder.add_node(node);
            }
        }
        for entry in &views {
            let Ok(view) = self.snapshot.view(entry.id) else {
                continue;
            };
            let builder = if late.contains(&entry.id) {
                &mut late_builder
            } else {
                &mut early_builder
            };
            for dependency in &view.depends_on {
                builder.add_edge(entry.id, *dependency, EdgeKind::ViewReference);
            }
        }

        (early_builder.build(), late_builder.build())
    }
}
