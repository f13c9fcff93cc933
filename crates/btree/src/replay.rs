//! Replays `BPLUS_TREE` log entries during recovery.

use std::sync::Arc;

use bincode::config::{self, Config};
use bincode::serde::decode_from_slice;
use buffer::BufferPoolManager;
use clog::{LogEntry, LogModule, LogReplayer};
use common::{BufferPoolId, DbResult, PageId};

use crate::node::BTreeNode;
use crate::page;
use crate::wire::{BTreeLogPayload, BTreeOp};

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Replays every index file registered by `BufferPoolId`, gated by each
/// page's own LSN so already-applied entries are skipped.
pub struct BplusTreeLogReplayer {
    buffer: Arc<BufferPoolManager>,
    indexes: Vec<BufferPoolId>,
}

impl BplusTreeLogReplayer {
    pub fn new(buffer: Arc<BufferPoolManager>, indexes: Vec<BufferPoolId>) -> Self {
        Self { buffer, indexes }
    }
}

impl LogReplayer for BplusTreeLogReplayer {
    fn replay(&mut self, entry: &LogEntry) -> DbResult<()> {
        if entry.module != LogModule::BplusTree {
            return Ok(());
        }
        let (payload, _): (BTreeLogPayload, usize) =
            decode_from_slice(&entry.payload, bincode_config())
                .map_err(|e| common::DbError::Wal(format!("bad btree log payload: {e}")))?;
        let id = BufferPoolId(payload.buffer_pool_id);
        if !self.indexes.contains(&id) {
            return Ok(());
        }
        let page_id = PageId(payload.page_num);
        let mut page = self.buffer.fetch_page_mut(id, page_id)?;
        if entry.lsn <= page.lsn() {
            return Ok(());
        }

        match payload.op {
            BTreeOp::InitHeaderPage { header_bytes } => {
                page.payload_mut()[..header_bytes.len()].copy_from_slice(&header_bytes);
            }
            BTreeOp::UpdateRootPage { root_page_num } => {
                let mut header = page::read_header(&page)?;
                header.root_page_num = root_page_num;
                page::write_header(&mut page, &header)?;
            }
            BTreeOp::SetParentPage { parent_page_num } => {
                let mut node = crate::node::read_node(&page)?;
                node.set_parent(parent_page_num.map(PageId));
                crate::node::write_node(&mut page, &node)?;
            }
            BTreeOp::LeafInitEmpty => {
                crate::node::write_node(&mut page, &BTreeNode::new_leaf(None))?;
            }
            BTreeOp::LeafSetNextPage { next_page_num } => {
                let mut node = crate::node::read_node(&page)?;
                if let BTreeNode::Leaf { next_leaf, .. } = &mut node {
                    *next_leaf = next_page_num.map(PageId);
                }
                crate::node::write_node(&mut page, &node)?;
            }
            BTreeOp::InternalInitEmpty => {
                crate::node::write_node(&mut page, &BTreeNode::new_internal(None, vec![], vec![]))?;
            }
            BTreeOp::InternalCreateNewRoot {
                left_page_num,
                right_page_num,
                separator,
            } => {
                let node = BTreeNode::new_internal(
                    None,
                    vec![separator],
                    vec![PageId(left_page_num), PageId(right_page_num)],
                );
                crate::node::write_node(&mut page, &node)?;
            }
            BTreeOp::InternalUpdateKey { index, key } => {
                let mut node = crate::node::read_node(&page)?;
                if let BTreeNode::Internal { keys, .. } = &mut node {
                    if (index as usize) < keys.len() {
                        keys[index as usize] = key;
                    }
                }
                crate::node::write_node(&mut page, &node)?;
            }
            BTreeOp::NodeInsert { node_bytes } => {
                let node = BTreeNode::decode(&node_bytes)?;
                crate::node::write_node(&mut page, &node)?;
            }
            BTreeOp::NodeRemove { node_bytes } => {
                // Empty bytes mark a page disposed by a sibling merge; its
                // content no longer matters, only that the LSN advances past
                // this entry.
                if !node_bytes.is_empty() {
                    let node = BTreeNode::decode(&node_bytes)?;
                    crate::node::write_node(&mut page, &node)?;
                }
            }
        }

        page.set_lsn(entry.lsn);
        Ok(())
    }
}
