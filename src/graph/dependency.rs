// ABOUTME: Dependency graph of dumpable objects with a deterministic topological order
// ABOUTME: Kahn's algorithm with scan-order tie-break; residual nodes are reported as circular

use crate::catalog::{ObjectEntry, ObjectId, ObjectKind, QualifiedName};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::fmt;

/// One dumpable object as seen by the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNode {
    pub id: ObjectId,
    pub name: QualifiedName,
    pub kind: ObjectKind,
    pub parent: Option<ObjectId>,
}

impl From<&ObjectEntry> for ObjectNode {
    fn from(entry: &ObjectEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name.clone(),
            kind: entry.kind,
            parent: entry.parent,
        }
    }
}

/// Why `from` has to be created after `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    ColumnDefault,
    GeneratedColumn,
    ForeignKey,
    PartitionOf,
    AggregateSupport,
    SignatureType,
    TypeUsage,
    ViewReference,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EdgeKind::ColumnDefault => "column default",
            EdgeKind::GeneratedColumn => "generated column",
            EdgeKind::ForeignKey => "foreign key",
            EdgeKind::PartitionOf => "partition of",
            EdgeKind::AggregateSupport => "aggregate support function",
            EdgeKind::SignatureType => "signature type",
            EdgeKind::TypeUsage => "type usage",
            EdgeKind::ViewReference => "view reference",
        };
        f.write_str(label)
    }
}

/// `from` (the dependent) requires `to` (the dependency)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub from: ObjectId,
    pub to: ObjectId,
    pub relation: EdgeKind,
}

/// Collects nodes and edges; [`GraphBuilder::build`] computes the order
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<ObjectNode>,
    index: HashMap<ObjectId, usize>,
    edges: Vec<DependencyEdge>,
    seen: HashSet<(ObjectId, ObjectId)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; insertion order is the tie-break order
    pub fn add_node(&mut self, node: ObjectNode) {
        if self.index.contains_key(&node.id) {
            return;
        }
        self.index.insert(node.id, self.nodes.len());
        self.nodes.push(node);
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    /// Record that `from` requires `to`
    ///
    /// Self-references, duplicates and edges to objects outside the graph are ignored.
    pub fn add_edge(&mut self, from: ObjectId, to: ObjectId, relation: EdgeKind) {
        if from == to || !self.contains(from) || !self.contains(to) {
            return;
        }
        if self.seen.insert((from, to)) {
            self.edges.push(DependencyEdge { from, to, relation });
        }
    }

    pub fn build(self) -> DependencyGraph {
        let count = self.nodes.len();
        let mut pending = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

        for edge in &self.edges {
            let from = self.index[&edge.from];
            let to = self.index[&edge.to];
            pending[from] += 1;
            dependents[to].push(from);
        }

        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(count);
        let mut placed = vec![false; count];
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            placed[i] = true;
            for &dependent in &dependents[i] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        let mut residual: Vec<usize> = (0..count).filter(|i| !placed[*i]).collect();
        residual.sort_by(|a, b| {
            let (a, b) = (&self.nodes[*a], &self.nodes[*b]);
            a.name.name.cmp(&b.name.name).then(a.id.cmp(&b.id))
        });

        let circular: BTreeSet<ObjectId> = residual.iter().map(|i| self.nodes[*i].id).collect();
        order.extend(residual);

        let circular_edges = self
            .edges
            .iter()
            .filter(|e| circular.contains(&e.from) && circular.contains(&e.to))
            .copied()
            .collect();

        let sorted: Vec<ObjectNode> = order.into_iter().map(|i| self.nodes[i].clone()).collect();
        let positions = sorted
            .iter()
            .enumerate()
            .map(|(pos, node)| (node.id, pos))
            .collect();

        DependencyGraph {
            sorted,
            positions,
            edges: self.edges,
            circular,
            circular_edges,
        }
    }
}

/// Immutable result of one graph build
///
/// Every node appears exactly once in [`sorted_nodes`](Self::sorted_nodes). For
/// every edge not inside a cycle the dependency precedes the dependent. Nodes
/// left over by Kahn's algorithm are appended alphabetically by name, ties
/// broken by id, so the output is stable across runs.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    sorted: Vec<ObjectNode>,
    positions: HashMap<ObjectId, usize>,
    edges: Vec<DependencyEdge>,
    circular: BTreeSet<ObjectId>,
    circular_edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn sorted_nodes(&self) -> &[ObjectNode] {
        &self.sorted
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn has_circular_dependencies(&self) -> bool {
        !self.circular.is_empty()
    }

    /// Circular nodes in emission order
    pub fn circular_nodes(&self) -> Vec<&ObjectNode> {
        self.sorted
            .iter()
            .filter(|n| self.circular.contains(&n.id))
            .collect()
    }

    pub fn circular_edges(&self) -> &[DependencyEdge] {
        &self.circular_edges
    }

    pub fn is_circular(&self, id: ObjectId) -> bool {
        self.circular.contains(&id)
    }

    pub fn position(&self, id: ObjectId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn node(&self, id: ObjectId) -> Option<&ObjectNode> {
        self.position(id).map(|pos| &self.sorted[pos])
    }

    /// True when something inside `a` that references `b` cannot be emitted inline
    ///
    /// Objects outside the graph are never ordered after `a`.
    pub fn should_defer(&self, a: ObjectId, b: ObjectId) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(pa), Some(pb)) => pb > pa,
            _ => false,
        }
    }

    /// Comment lines explaining the fallback order of circular nodes
    pub fn circular_warning(&self) -> Vec<String> {
        if !self.has_circular_dependencies() {
            return Vec::new();
        }
        let mut lines = vec![
            "WARNING: circular dependencies detected.".to_string(),
            "The following objects are emitted in alphabetical order and may need".to_string(),
            "manual reordering when the script is replayed:".to_string(),
        ];
        for node in self.circular_nodes() {
            lines.push(format!("  {} {}", node.kind, node.name.display_name()));
        }
        for edge in &self.circular_edges {
            let from = self.node(edge.from).map(|n| n.name.display_name());
            let to = self.node(edge.to).map(|n| n.name.display_name());
            if let (Some(from), Some(to)) = (from, to) {
                lines.push(format!("  {} -> {} ({})", from, to, edge.relation));
            }
        }
        lines
    }
}
