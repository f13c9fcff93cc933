//! On-the-wire payload shape for `RECORD_MANAGER` log entries.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RecordOp {
    /// Initialize the target page as an empty record page. `widths` is the
    /// row-format record size (single element) or the PAX per-field widths.
    InitPage { widths: Vec<u32> },
    Insert { slot: u16, data: Vec<u8> },
    Delete { slot: u16 },
    Update { slot: u16, data: Vec<u8> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordLogPayload {
    pub buffer_pool_id: i32,
    pub page_num: u64,
    pub op: RecordOp,
}
