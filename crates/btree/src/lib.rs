//! Concurrent B+Tree index over the buffer pool: latch-crabbed search and
//! mutation, full WAL coverage through [`mtxn::BplusTreeMiniTransaction`],
//! and LSN-gated recovery replay.

mod latch;
mod mtxn;
mod node;
mod page;
mod replay;
mod wire;

pub use latch::LatchMemo;
pub use mtxn::BplusTreeMiniTransaction;
pub use node::{BTreeNode, NodeType};
pub use page::{IndexHeader, HEADER_PAGE_NUM};
pub use replay::BplusTreeLogReplayer;
pub use wire::{BTreeLogPayload, BTreeOp, TreeKey};

use std::cmp::Ordering;
use std::sync::Arc;

use buffer::BufferPoolManager;
use common::{BufferPoolId, DbError, DbResult, PageId, RecordId};
use types::{SqlType, Value};

fn attr_cmp(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match types::compare_values(x, y) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    a.len().cmp(&b.len())
}

fn attr_eq(a: &[Value], b: &[Value]) -> bool {
    attr_cmp(a, b) == Ordering::Equal
}

fn rid_cmp(a: &RecordId, b: &RecordId) -> Ordering {
    a.page_id.cmp(&b.page_id).then(a.slot.cmp(&b.slot))
}

fn key_cmp(a: &TreeKey, b: &TreeKey) -> Ordering {
    attr_cmp(&a.0, &b.0).then_with(|| rid_cmp(&a.1, &b.1))
}

/// A persistent, concurrent B+tree index over one buffer-pool file.
pub struct BTreeIndex {
    buffer: Arc<BufferPoolManager>,
    id: BufferPoolId,
    internal_max_size: u16,
    leaf_max_size: u16,
}

impl BTreeIndex {
    /// Create a new, empty index: a header page (root pointer + key shape)
    /// and a single empty leaf as the root.
    pub fn create(
        buffer: Arc<BufferPoolManager>,
        id: BufferPoolId,
        file_name: &str,
        key_type: SqlType,
        key_len: u32,
    ) -> DbResult<Self> {
        buffer.open_file(id, file_name)?;
        let internal_max_size: u16 = 64;
        let leaf_max_size: u16 = 64;

        let header_page_id = { buffer.allocate_page(id)?.page_id() };
        let root_page_id = {
            let mut root_guard = buffer.allocate_page(id)?;
            node::write_node(&mut root_guard, &BTreeNode::new_leaf(None))?;
            root_guard.page_id()
        };

        let header = IndexHeader {
            root_page_num: root_page_id.0,
            key_type,
            key_len,
            internal_max_size,
            leaf_max_size,
        };
        let header_bytes = header.encode()?;
        let zero_page = vec![0u8; storage::PAGE_PAYLOAD_SIZE];

        let mut mtxn = BplusTreeMiniTransaction::new(&buffer, id);
        {
            let mut header_guard = buffer.fetch_page_mut(id, header_page_id)?;
            page::write_header(&mut header_guard, &header)?;
            mtxn.record(
                header_page_id,
                zero_page.clone(),
                BTreeOp::InitHeaderPage { header_bytes },
            );
        }
        mtxn.record(root_page_id, zero_page, BTreeOp::LeafInitEmpty);
        mtxn.commit()?;

        Ok(Self {
            buffer,
            id,
            internal_max_size,
            leaf_max_size,
        })
    }

    /// Open an existing index file, reading its header for shape metadata.
    pub fn open(buffer: Arc<BufferPoolManager>, id: BufferPoolId, file_name: &str) -> DbResult<Self> {
        buffer.open_file(id, file_name)?;
        let header = {
            let page = buffer.fetch_page(id, PageId(HEADER_PAGE_NUM))?;
            page::read_header(&page)?
        };
        Ok(Self {
            buffer,
            id,
            internal_max_size: header.internal_max_size,
            leaf_max_size: header.leaf_max_size,
        })
    }

    fn header(&self) -> DbResult<IndexHeader> {
        let page = self.buffer.fetch_page(self.id, PageId(HEADER_PAGE_NUM))?;
        page::read_header(&page)
    }

    fn root_page_id(&self) -> DbResult<PageId> {
        Ok(self.header()?.root_page_id())
    }

    pub fn buffer_pool_id(&self) -> BufferPoolId {
        self.id
    }

    /// Every RID stored under `key` (attribute equality, ignoring the RID
    /// tie-breaker). Descends with shared latches, releasing a parent the
    /// instant its child is latched.
    pub fn search(&self, key: &[Value]) -> DbResult<Vec<RecordId>> {
        let mut current = self.root_page_id()?;
        let mut memo = LatchMemo::new();
        loop {
            let guard = self.buffer.fetch_page(self.id, current)?;
            let node = node::read_node(&guard)?;
            memo.push_read(guard);
            memo.release_oldest(); // parent can be released now the child is latched
            match node {
                BTreeNode::Internal { keys, children, .. } => {
                    let idx = keys.partition_point(|k| attr_cmp(&k.0, key) != Ordering::Greater);
                    current = children[idx];
                }
                BTreeNode::Leaf { entries, mut next_leaf, .. } => {
                    let mut out: Vec<RecordId> = entries
                        .iter()
                        .filter(|(k, _)| attr_eq(k, key))
                        .map(|(_, rid)| *rid)
                        .collect();
                    // The same attribute value can straddle a split boundary;
                    // keep following siblings while their leading entry matches.
                    let mut last_matched = entries
                        .last()
                        .map(|(k, _)| attr_eq(k, key))
                        .unwrap_or(false);
                    while last_matched {
                        let Some(next_page) = next_leaf else { break };
                        let next_guard = self.buffer.fetch_page(self.id, next_page)?;
                        let BTreeNode::Leaf { entries: next_entries, next_leaf: nn, .. } =
                            node::read_node(&next_guard)?
                        else {
                            break;
                        };
                        let matched_any = next_entries.first().map(|(k, _)| attr_eq(k, key)).unwrap_or(false);
                        if !matched_any {
                            break;
                        }
                        out.extend(next_entries.iter().filter(|(k, _)| attr_eq(k, key)).map(|(_, rid)| *rid));
                        last_matched = next_entries.last().map(|(k, _)| attr_eq(k, key)).unwrap_or(false);
                        next_leaf = nn;
                    }
                    return Ok(out);
                }
            }
        }
    }

    /// Insert `(key, rid)`. Descends with exclusive latches, releasing
    /// ancestors once a node is proven unable to need a split from below.
    pub fn insert(&self, key: Vec<Value>, rid: RecordId) -> DbResult<()> {
        let mut mtxn = BplusTreeMiniTransaction::new(&self.buffer, self.id);
        match self.insert_inner(&mut mtxn, key, rid) {
            Ok(()) => Ok(()),
            Err(e) => {
                mtxn.fail();
                Err(e)
            }
        }
    }

    fn insert_inner(
        &self,
        mtxn: &mut BplusTreeMiniTransaction,
        key: Vec<Value>,
        rid: RecordId,
    ) -> DbResult<()> {
        let full_key: TreeKey = (key, rid);
        let root_at_start = self.root_page_id()?;
        let mut memo = LatchMemo::new();
        let mut current = root_at_start;

        loop {
            let guard = self.buffer.fetch_page_mut(self.id, current)?;
            let node = node::read_node(&guard)?;
            let safe = match &node {
                BTreeNode::Internal { keys, .. } => keys.len() + 1 <= self.internal_max_size as usize,
                BTreeNode::Leaf { entries, .. } => entries.len() + 1 <= self.leaf_max_size as usize,
            };
            memo.push_write(guard);
            if safe {
                memo.release_ancestors();
            }
            match node {
                BTreeNode::Internal { keys, children, .. } => {
                    let idx = keys.partition_point(|k| key_cmp(k, &full_key) != Ordering::Greater);
                    current = children[idx];
                }
                BTreeNode::Leaf { .. } => break,
            }
        }

        let mut carry = self.insert_into_leaf(&mut memo, &full_key, mtxn)?;
        while let Some((separator, new_child_page)) = carry {
            match memo.pop_write() {
                Some(mut parent_guard) => {
                    carry = self.insert_into_internal(&mut parent_guard, separator, new_child_page, mtxn)?;
                }
                None => {
                    self.create_new_root(root_at_start, separator, new_child_page, mtxn)?;
                    carry = None;
                }
            }
        }
        Ok(())
    }

    fn insert_into_leaf(
        &self,
        memo: &mut LatchMemo,
        full_key: &TreeKey,
        mtxn: &mut BplusTreeMiniTransaction,
    ) -> DbResult<Option<(TreeKey, PageId)>> {
        let mut guard = memo
            .pop_write()
            .ok_or_else(|| DbError::Internal("expected leaf latch held".into()))?;
        let before = guard.payload().to_vec();
        let mut node = node::read_node(&guard)?;
        let BTreeNode::Leaf { entries, next_leaf, parent } = &mut node else {
            return Err(DbError::Internal("descent landed on non-leaf".into()));
        };
        let pos = entries.partition_point(|k| key_cmp(k, full_key) != Ordering::Greater);
        entries.insert(pos, full_key.clone());

        if entries.len() <= self.leaf_max_size as usize {
            node::write_node(&mut guard, &node)?;
            let bytes = node.encode()?;
            mtxn.record(guard.page_id(), before, BTreeOp::NodeInsert { node_bytes: bytes });
            return Ok(None);
        }

        let mid = entries.len() / 2;
        let right_entries = entries.split_off(mid);
        let separator = right_entries[0].clone();
        let old_next = *next_leaf;
        let this_parent = *parent;

        let mut right_guard = self.buffer.allocate_page(self.id)?;
        let right_page_id = right_guard.page_id();
        *next_leaf = Some(right_page_id);
        let right_node = BTreeNode::Leaf {
            parent: this_parent,
            entries: right_entries,
            next_leaf: old_next,
        };

        node::write_node(&mut guard, &node)?;
        node::write_node(&mut right_guard, &right_node)?;

        mtxn.record(guard.page_id(), before, BTreeOp::NodeInsert { node_bytes: node.encode()? });
        mtxn.record(
            right_page_id,
            vec![0u8; storage::PAGE_PAYLOAD_SIZE],
            BTreeOp::NodeInsert { node_bytes: right_node.encode()? },
        );

        Ok(Some((separator, right_page_id)))
    }

    fn insert_into_internal(
        &self,
        guard: &mut buffer::PageGuardMut,
        separator: TreeKey,
        new_child: PageId,
        mtxn: &mut BplusTreeMiniTransaction,
    ) -> DbResult<Option<(TreeKey, PageId)>> {
        let before = guard.payload().to_vec();
        let mut node = node::read_node(guard)?;
        let parent = node.parent();
        let BTreeNode::Internal { keys, children, .. } = &mut node else {
            return Err(DbError::Internal("expected internal node".into()));
        };
        let idx = keys.partition_point(|k| key_cmp(k, &separator) != Ordering::Greater);
        keys.insert(idx, separator);
        children.insert(idx + 1, new_child);

        if keys.len() <= self.internal_max_size as usize {
            node::write_node(guard, &node)?;
            let bytes = node.encode()?;
            mtxn.record(guard.page_id(), before, BTreeOp::NodeInsert { node_bytes: bytes });
            return Ok(None);
        }

        let mid = keys.len() / 2;
        let up_key = keys[mid].clone();
        let right_keys = keys.split_off(mid + 1);
        keys.pop(); // drop up_key itself; it moves up rather than staying in either child
        let right_children = children.split_off(mid + 1);
        let right_node = BTreeNode::Internal {
            parent,
            keys: right_keys,
            children: right_children,
        };

        node::write_node(guard, &node)?;
        let mut right_guard = self.buffer.allocate_page(self.id)?;
        let right_page_id = right_guard.page_id();
        node::write_node(&mut right_guard, &right_node)?;

        mtxn.record(guard.page_id(), before, BTreeOp::NodeInsert { node_bytes: node.encode()? });
        mtxn.record(
            right_page_id,
            vec![0u8; storage::PAGE_PAYLOAD_SIZE],
            BTreeOp::NodeInsert { node_bytes: right_node.encode()? },
        );

        Ok(Some((up_key, right_page_id)))
    }

    fn create_new_root(
        &self,
        old_root: PageId,
        separator: TreeKey,
        new_child: PageId,
        mtxn: &mut BplusTreeMiniTransaction,
    ) -> DbResult<()> {
        let mut new_root_guard = self.buffer.allocate_page(self.id)?;
        let new_root_id = new_root_guard.page_id();
        let new_root_node = BTreeNode::new_internal(None, vec![separator.clone()], vec![old_root, new_child]);
        node::write_node(&mut new_root_guard, &new_root_node)?;
        mtxn.record(
            new_root_id,
            vec![0u8; storage::PAGE_PAYLOAD_SIZE],
            BTreeOp::InternalCreateNewRoot {
                left_page_num: old_root.0,
                right_page_num: new_child.0,
                separator,
            },
        );

        let mut header_guard = self.buffer.fetch_page_mut(self.id, PageId(HEADER_PAGE_NUM))?;
        let header_before = header_guard.payload().to_vec();
        let mut header = page::read_header(&header_guard)?;
        header.root_page_num = new_root_id.0;
        page::write_header(&mut header_guard, &header)?;
        mtxn.record(
            header_guard.page_id(),
            header_before,
            BTreeOp::UpdateRootPage { root_page_num: new_root_id.0 },
        );
        drop(header_guard);

        for child in [old_root, new_child] {
            let mut child_guard = self.buffer.fetch_page_mut(self.id, child)?;
            let before = child_guard.payload().to_vec();
            let mut child_node = node::read_node(&child_guard)?;
            child_node.set_parent(Some(new_root_id));
            node::write_node(&mut child_guard, &child_node)?;
            mtxn.record(
                child_guard.page_id(),
                before,
                BTreeOp::SetParentPage { parent_page_num: Some(new_root_id.0) },
            );
        }
        Ok(())
    }

    /// Delete `(key, rid)`. Holds the full root-to-leaf path exclusively
    /// (no optimistic ancestor release) and merges an underflowing leaf
    /// into its right sibling when the parent has one readily at hand.
    /// Underflow is not cascaded past the immediate parent; an internal
    /// node left under half-full after a single merge stays that way.
    pub fn delete(&self, key: &[Value], rid: RecordId) -> DbResult<bool> {
        let mut mtxn = BplusTreeMiniTransaction::new(&self.buffer, self.id);
        match self.delete_inner(&mut mtxn, key, rid) {
            Ok(deleted) => Ok(deleted),
            Err(e) => {
                mtxn.fail();
                Err(e)
            }
        }
    }

    fn delete_inner(&self, mtxn: &mut BplusTreeMiniTransaction, key: &[Value], rid: RecordId) -> DbResult<bool> {
        let full_key = (key.to_vec(), rid);
        let root_at_start = self.root_page_id()?;
        let mut memo = LatchMemo::new();
        let mut current = root_at_start;

        loop {
            let guard = self.buffer.fetch_page_mut(self.id, current)?;
            let node = node::read_node(&guard)?;
            memo.push_write(guard);
            match node {
                BTreeNode::Internal { keys, children, .. } => {
                    let idx = keys.partition_point(|k| key_cmp(k, &full_key) != Ordering::Greater);
                    current = children[idx];
                }
                BTreeNode::Leaf { .. } => break,
            }
        }

        let mut leaf_guard = memo
            .pop_write()
            .ok_or_else(|| DbError::Internal("expected leaf latch held".into()))?;
        let before = leaf_guard.payload().to_vec();
        let mut leaf_node = node::read_node(&leaf_guard)?;
        let BTreeNode::Leaf { entries, next_leaf, .. } = &mut leaf_node else {
            return Err(DbError::Internal("descent landed on non-leaf".into()));
        };
        let original_len = entries.len();
        entries.retain(|k| key_cmp(k, &full_key) != Ordering::Equal);
        let deleted = entries.len() < original_len;
        if !deleted {
            return Ok(false);
        }
        let underflow = entries.len() < (self.leaf_max_size as usize) / 2;
        let next = *next_leaf;
        let leaf_page_id = leaf_guard.page_id();

        node::write_node(&mut leaf_guard, &leaf_node)?;
        mtxn.record(leaf_page_id, before, BTreeOp::NodeRemove { node_bytes: leaf_node.encode()? });
        drop(leaf_guard);

        if !underflow || leaf_page_id == root_at_start {
            return Ok(true);
        }
        let Some(mut parent_guard) = memo.pop_write() else {
            return Ok(true);
        };
        self.try_merge_leaf_right(&mut parent_guard, leaf_page_id, next, mtxn)?;
        Ok(true)
    }

    /// Best-effort sibling merge: if `leaf_page_id`'s parent has it followed
    /// immediately by a sibling in the same parent, and the two leaves
    /// together fit in one, merge them and drop the separator from the
    /// parent. If the parent's last key is removed, promotes its only
    /// remaining child to root.
    fn try_merge_leaf_right(
        &self,
        parent_guard: &mut buffer::PageGuardMut,
        leaf_page_id: PageId,
        leaf_next: Option<PageId>,
        mtxn: &mut BplusTreeMiniTransaction,
    ) -> DbResult<()> {
        let Some(right_page_id) = leaf_next else { return Ok(()) };
        let parent_before = parent_guard.payload().to_vec();
        let mut parent_node = node::read_node(parent_guard)?;
        let BTreeNode::Internal { keys, children, .. } = &mut parent_node else {
            return Ok(());
        };
        let Some(leaf_idx) = children.iter().position(|&c| c == leaf_page_id) else {
            return Ok(());
        };
        if children.get(leaf_idx + 1) != Some(&right_page_id) {
            return Ok(()); // right sibling belongs to a different parent
        }

        let mut right_guard = self.buffer.fetch_page_mut(self.id, right_page_id)?;
        let right_before = right_guard.payload().to_vec();
        let BTreeNode::Leaf { entries: right_entries, next_leaf: right_next, .. } =
            node::read_node(&right_guard)?
        else {
            return Ok(());
        };

        let mut left_guard = self.buffer.fetch_page_mut(self.id, leaf_page_id)?;
        let left_before = left_guard.payload().to_vec();
        let mut left_node = node::read_node(&left_guard)?;
        let BTreeNode::Leaf { entries: left_entries, next_leaf: left_next, .. } = &mut left_node else {
            return Ok(());
        };
        if left_entries.len() + right_entries.len() > self.leaf_max_size as usize {
            return Ok(()); // too full to merge; leave underfull rather than split again
        }
        left_entries.extend(right_entries);
        *left_next = right_next;
        node::write_node(&mut left_guard, &left_node)?;
        mtxn.record(leaf_page_id, left_before, BTreeOp::NodeInsert { node_bytes: left_node.encode()? });
        mtxn.record(right_page_id, right_before, BTreeOp::NodeRemove { node_bytes: Vec::new() });
        drop(left_guard);
        drop(right_guard);
        self.buffer.dispose_page(self.id, right_page_id)?;

        keys.remove(leaf_idx);
        children.remove(leaf_idx + 1);

        if keys.is_empty() && children.len() == 1 {
            let only_child = children[0];
            node::write_node(parent_guard, &parent_node)?;
            mtxn.record(
                parent_guard.page_id(),
                parent_before,
                BTreeOp::NodeRemove { node_bytes: parent_node.encode()? },
            );
            let mut header_guard = self.buffer.fetch_page_mut(self.id, PageId(HEADER_PAGE_NUM))?;
            let header_before = header_guard.payload().to_vec();
            let mut header = page::read_header(&header_guard)?;
            header.root_page_num = only_child.0;
            page::write_header(&mut header_guard, &header)?;
            mtxn.record(
                header_guard.page_id(),
                header_before,
                BTreeOp::UpdateRootPage { root_page_num: only_child.0 },
            );
        } else {
            node::write_node(parent_guard, &parent_node)?;
            mtxn.record(
                parent_guard.page_id(),
                parent_before,
                BTreeOp::NodeRemove { node_bytes: parent_node.encode()? },
            );
        }
        Ok(())
    }

    /// Open a cursor over `[low, high]` (bounds optional, each inclusive).
    pub fn range_scan<'a>(&'a self, low: Option<&[Value]>, high: Option<&[Value]>) -> DbResult<RangeCursor<'a>> {
        let start_key = low.unwrap_or(&[]);
        let mut current = self.root_page_id()?;
        loop {
            let guard = self.buffer.fetch_page(self.id, current)?;
            match node::read_node(&guard)? {
                BTreeNode::Internal { keys, children, .. } => {
                    let idx = keys.partition_point(|k| attr_cmp(&k.0, start_key) != Ordering::Greater);
                    current = children[idx];
                }
                BTreeNode::Leaf { .. } => break,
            }
        }
        Ok(RangeCursor {
            index: self,
            leaf: Some(current),
            pos: 0,
            low: low.map(|k| k.to_vec()),
            high: high.map(|k| k.to_vec()),
        })
    }

    /// All entries, in key order (for diagnostics and tests).
    pub fn scan_all(&self) -> DbResult<Vec<(Vec<Value>, RecordId)>> {
        let mut cursor = self.range_scan(None, None)?;
        let mut out = Vec::new();
        while let Some((key, rid)) = cursor.next()? {
            out.push((key, rid));
        }
        Ok(out)
    }
}

/// Walks leaves left to right starting from a range's lower bound.
pub struct RangeCursor<'a> {
    index: &'a BTreeIndex,
    leaf: Option<PageId>,
    pos: usize,
    low: Option<Vec<Value>>,
    high: Option<Vec<Value>>,
}

impl<'a> RangeCursor<'a> {
    pub fn next(&mut self) -> DbResult<Option<(Vec<Value>, RecordId)>> {
        loop {
            let Some(leaf_id) = self.leaf else { return Ok(None) };
            let guard = self.index.buffer.fetch_page(self.index.id, leaf_id)?;
            let BTreeNode::Leaf { entries, next_leaf, .. } = node::read_node(&guard)? else {
                return Ok(None);
            };
            if self.pos >= entries.len() {
                self.leaf = next_leaf;
                self.pos = 0;
                continue;
            }
            let (key_with_rid, rid) = entries[self.pos].clone();
            self.pos += 1;
            if let Some(lo) = &self.low {
                if attr_cmp(&key_with_rid, lo) == Ordering::Less {
                    continue;
                }
            }
            if let Some(hi) = &self.high {
                if attr_cmp(&key_with_rid, hi) == Ordering::Greater {
                    return Ok(None);
                }
            }
            return Ok(Some((key_with_rid, rid)));
        }
    }
}

#[cfg(test)]
mod tests;
