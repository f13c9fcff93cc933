use common::{BufferPoolId, RecordId};

/// What a transaction did to one record; tracked so `commit`/`rollback` know
/// which rows to finalize or undo, and so recovery can redo the same set for
/// a transaction that never reached its `COMMIT`/`ROLLBACK` log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Operation {
    pub kind: OperationKind,
    pub table: BufferPoolId,
    pub rid: RecordId,
}

impl Operation {
    pub fn new(kind: OperationKind, table: BufferPoolId, rid: RecordId) -> Self {
        Self { kind, table, rid }
    }
}

pub type OperationSet = std::collections::HashSet<Operation>;
