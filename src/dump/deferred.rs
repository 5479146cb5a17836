// ABOUTME: Queue of DDL fragments postponed until the objects they need exist
// ABOUTME: Object-gated entries are released early; the rest drain in a fixed post-pass order

use crate::catalog::ObjectId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeferredKind {
    ColumnDefault,
    GeneratedColumn,
    CheckValidate,
    ForeignKey,
    MvRefresh,
    Rule,
    Trigger,
    SequenceOwnership,
}

impl DeferredKind {
    /// Drain position in the post-pass
    ///
    /// Leftover object-gated fragments go first, then foreign keys,
    /// materialized-view refreshes, rules, triggers and sequence ownerships.
    fn post_pass_rank(self) -> u8 {
        match self {
            DeferredKind::ColumnDefault
            | DeferredKind::GeneratedColumn
            | DeferredKind::CheckValidate => 0,
            DeferredKind::ForeignKey => 1,
            DeferredKind::MvRefresh => 2,
            DeferredKind::Rule => 3,
            DeferredKind::Trigger => 4,
            DeferredKind::SequenceOwnership => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeferredKind::ColumnDefault => "column default",
            DeferredKind::GeneratedColumn => "generated column",
            DeferredKind::CheckValidate => "check constraint",
            DeferredKind::ForeignKey => "foreign key",
            DeferredKind::MvRefresh => "materialized view refresh",
            DeferredKind::Rule => "rule",
            DeferredKind::Trigger => "trigger",
            DeferredKind::SequenceOwnership => "sequence ownership",
        }
    }
}

impl fmt::Display for DeferredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredStatement {
    pub kind: DeferredKind,
    /// Object the statement alters
    pub target: ObjectId,
    /// Released right after this object is emitted
    pub waits_for: Option<ObjectId>,
    /// Objects that must have been created for the statement to run
    pub requires: Vec<ObjectId>,
    pub sql: String,
}

impl DeferredStatement {
    pub fn new(kind: DeferredKind, target: ObjectId, sql: impl Into<String>) -> Self {
        Self {
            kind,
            target,
            waits_for: None,
            requires: vec![target],
            sql: sql.into(),
        }
    }

    pub fn waiting_for(mut self, dependency: ObjectId) -> Self {
        self.waits_for = Some(dependency);
        if !self.requires.contains(&dependency) {
            self.requires.push(dependency);
        }
        self
    }

    pub fn requiring(mut self, dependency: ObjectId) -> Self {
        if !self.requires.contains(&dependency) {
            self.requires.push(dependency);
        }
        self
    }
}

/// Each pushed statement comes out exactly once, through
/// [`release_after`](Self::release_after) or [`drain_post_pass`](Self::drain_post_pass).
#[derive(Debug, Default)]
pub struct DeferredQueue {
    pending: Vec<DeferredStatement>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, statement: DeferredStatement) {
        tracing::debug!("Deferring {} for {}", statement.kind, statement.target);
        self.pending.push(statement);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the statements that were waiting for `emitted`, in push order
    pub fn release_after(&mut self, emitted: ObjectId) -> Vec<DeferredStatement> {
        let (ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|s| s.waits_for == Some(emitted));
        self.pending = rest;
        ready
    }

    /// Take everything left, in post-pass order (stable within a kind)
    pub fn drain_post_pass(&mut self) -> Vec<DeferredStatement> {
        let mut all = std::mem::take(&mut self.pending);
        all.sort_by_key(|s| s.kind.post_pass_rank());
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_pass_order_is_fixed() {
        let mut queue = DeferredQueue::new();
        queue.push(DeferredStatement::new(DeferredKind::SequenceOwnership, ObjectId(1), "own"));
        queue.push(DeferredStatement::new(DeferredKind::Trigger, ObjectId(2), "trg"));
        queue.push(DeferredStatement::new(DeferredKind::ForeignKey, ObjectId(3), "fk1"));
        queue.push(DeferredStatement::new(DeferredKind::Rule, ObjectId(4), "rule"));
        queue.push(DeferredStatement::new(DeferredKind::MvRefresh, ObjectId(5), "refresh"));
        queue.push(DeferredStatement::new(DeferredKind::ForeignKey, ObjectId(6), "fk2"));

        let sql: Vec<String> = queue.drain_post_pass().into_iter().map(|s| s.sql).collect();
        assert_eq!(sql, vec!["fk1", "fk2", "refresh", "rule", "trg", "own"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_release_after_takes_only_waiting_statements() {
        let mut queue = DeferredQueue::new();
        queue.push(
            DeferredStatement::new(DeferredKind::CheckValidate, ObjectId(1), "add not valid")
                .waiting_for(ObjectId(9)),
        );
        queue.push(
            DeferredStatement::new(DeferredKind::CheckValidate, ObjectId(1), "validate")
                .waiting_for(ObjectId(9)),
        );
        queue.push(DeferredStatement::new(DeferredKind::ForeignKey, ObjectId(1), "fk"));

        assert!(queue.release_after(ObjectId(8)).is_empty());
        let released = queue.release_after(ObjectId(9));
        assert_eq!(released.len(), 2);
        assert_eq!(released[0].sql, "add not valid");
        assert_eq!(released[0].requires, vec![ObjectId(1), ObjectId(9)]);
        assert_eq!(queue.len(), 1);
    }
}
