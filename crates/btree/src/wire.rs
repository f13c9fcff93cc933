//! Log payloads for `BPLUS_TREE` WAL entries.

use common::{PageId, RecordId};
use serde::{Deserialize, Serialize};
use types::Value;

/// An index key paired with the RID of the row it points at. The RID breaks
/// ties between entries that share the same attribute value, so this pair
/// is what every node actually sorts and compares.
pub type TreeKey = (Vec<Value>, RecordId);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BTreeOp {
    InitHeaderPage {
        header_bytes: Vec<u8>,
    },
    UpdateRootPage {
        root_page_num: u64,
    },
    SetParentPage {
        parent_page_num: Option<u64>,
    },
    LeafInitEmpty,
    LeafSetNextPage {
        next_page_num: Option<u64>,
    },
    InternalInitEmpty,
    InternalCreateNewRoot {
        left_page_num: u64,
        right_page_num: u64,
        separator: TreeKey,
    },
    InternalUpdateKey {
        index: u32,
        key: TreeKey,
    },
    /// Carries the node's full post-insert encoding, so replay is a direct
    /// overwrite rather than a re-derivation of where the entry landed.
    NodeInsert {
        node_bytes: Vec<u8>,
    },
    /// Carries the node's full post-remove encoding.
    NodeRemove {
        node_bytes: Vec<u8>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BTreeLogPayload {
    pub buffer_pool_id: i32,
    pub page_num: u64,
    pub op: BTreeOp,
}
