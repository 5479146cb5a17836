// ABOUTME: Object dependency graphs and the analyzer that derives them from the catalog
// ABOUTME: Provides the topological order every DDL pass walks

pub mod analyzer;
pub mod dependency;

pub use analyzer::DependencyAnalyzer;
pub use dependency::{DependencyEdge, DependencyGraph, EdgeKind, GraphBuilder, ObjectNode};
