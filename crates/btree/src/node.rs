//! B+Tree node definitions and their encoding into a page payload.

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, PageId};
use serde::{Deserialize, Serialize};
use storage::Page;

use crate::wire::TreeKey;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// The type of a B+Tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Internal,
    Leaf,
}

/// A B+Tree node, either internal or leaf. Encoded whole into a page's
/// payload region; `parent` lets a child find its ancestor without a
/// separate lookup table (stamped by `SET_PARENT_PAGE` on every split).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BTreeNode {
    Internal {
        parent: Option<PageId>,
        /// Separator keys, one per non-leftmost child.
        keys: Vec<TreeKey>,
        children: Vec<PageId>,
    },
    Leaf {
        parent: Option<PageId>,
        entries: Vec<TreeKey>,
        next_leaf: Option<PageId>,
    },
}

impl BTreeNode {
    pub fn new_leaf(parent: Option<PageId>) -> Self {
        Self::Leaf {
            parent,
            entries: Vec::new(),
            next_leaf: None,
        }
    }

    pub fn new_internal(parent: Option<PageId>, keys: Vec<TreeKey>, children: Vec<PageId>) -> Self {
        Self::Internal {
            parent,
            keys,
            children,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Internal { .. } => NodeType::Internal,
            Self::Leaf { .. } => NodeType::Leaf,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Internal { keys, .. } => keys.len(),
            Self::Leaf { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn parent(&self) -> Option<PageId> {
        match self {
            Self::Internal { parent, .. } => *parent,
            Self::Leaf { parent, .. } => *parent,
        }
    }

    pub fn set_parent(&mut self, new_parent: Option<PageId>) {
        match self {
            Self::Internal { parent, .. } => *parent = new_parent,
            Self::Leaf { parent, .. } => *parent = new_parent,
        }
    }

    pub fn encode(&self) -> DbResult<Vec<u8>> {
        let bytes = encode_to_vec(self, bincode_config())
            .map_err(|e| DbError::Storage(format!("failed to encode btree node: {e}")))?;
        if bytes.len() > storage::PAGE_PAYLOAD_SIZE {
            return Err(DbError::Storage(format!(
                "btree node too large: {} bytes (max {})",
                bytes.len(),
                storage::PAGE_PAYLOAD_SIZE
            )));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> DbResult<Self> {
        let (node, _): (Self, usize) = decode_from_slice(bytes, bincode_config())
            .map_err(|e| DbError::Storage(format!("failed to decode btree node: {e}")))?;
        Ok(node)
    }
}

/// Read the node currently stored in `page`'s payload.
pub fn read_node(page: &Page) -> DbResult<BTreeNode> {
    BTreeNode::decode(page.payload())
}

/// Overwrite `page`'s payload with `node`'s encoding.
pub fn write_node(page: &mut Page, node: &BTreeNode) -> DbResult<()> {
    let bytes = node.encode()?;
    page.payload_mut()[..bytes.len()].copy_from_slice(&bytes);
    Ok(())
}
