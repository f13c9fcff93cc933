//! Multi-version concurrency control: the `Trx`/`TrxKit` abstraction used by
//! every table write, the real `MvccTrx` implementation, and the no-op
//! `VacuousTrx` used by tables with no hidden version fields.

mod mvcc_trx;
mod operation;
mod replay;
mod trx;
mod vacuous;
mod wire;

pub use mvcc_trx::{MvccTrx, MvccTrxKit};
pub use operation::{Operation, OperationKind, OperationSet};
pub use replay::MvccTrxLogReplayer;
pub use trx::{Trx, TrxKit, TrxTableHandle, TrxTableSource};
pub use vacuous::{VacuousTrx, VacuousTrxKit};
pub use wire::{TrxLogOp, TrxLogPayload};

#[cfg(test)]
mod tests;
