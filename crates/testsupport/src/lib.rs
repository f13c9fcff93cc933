//! Test support utilities for the storage and recovery workspace.
//!
//! Provides an isolated, temp-directory-backed `Db` for tests
//! (`TestContext`), row/schema fixtures, and assertion helpers tailored to
//! the `db`/`mvcc` crates' API surface.

pub mod assertions;
pub mod context;
pub mod fixtures;

pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::context::*;
    pub use crate::fixtures::*;
}
