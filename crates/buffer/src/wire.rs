//! Log payload for `BUFFER_POOL` WAL entries.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferPoolOp {
    Allocate,
    Deallocate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BufferPoolLogPayload {
    pub buffer_pool_id: i32,
    pub op: BufferPoolOp,
    pub page_num: u64,
}
