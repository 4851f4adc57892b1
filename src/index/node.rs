use bytes::{Buf, BufMut};
use log::warn;

use crate::common::{PageDbError, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};

use super::IndexKey;

/// page_id(4) + is_leaf(1) + parent_page_id(4) + key_count(4)
pub const NODE_HEADER_SIZE: usize = 13;

/// Common header plus next(4) + prev(4)
pub const LEAF_HEADER_SIZE: usize = NODE_HEADER_SIZE + 8;

const CHILD_SIZE: usize = 4;
const RECORD_SIZE: usize = 4;

fn encode_link(page_id: Option<PageId>) -> i32 {
    page_id.unwrap_or(INVALID_PAGE_ID).as_i32()
}

fn decode_link(raw: i32) -> Option<PageId> {
    if raw < 0 {
        None
    } else {
        Some(PageId::new(raw))
    }
}

/// Worst-case encoded size of a leaf holding `num_keys` keys.
pub fn max_leaf_size<K: IndexKey>(num_keys: usize) -> usize {
    LEAF_HEADER_SIZE + num_keys * (K::MAX_ENCODED_LEN + RECORD_SIZE)
}

/// Worst-case encoded size of an internal node holding `num_keys` keys.
pub fn max_internal_size<K: IndexKey>(num_keys: usize) -> usize {
    NODE_HEADER_SIZE + num_keys * K::MAX_ENCODED_LEN + (num_keys + 1) * CHILD_SIZE
}

/// Leaf node: sorted keys with a parallel array of record page ids, linked
/// to its neighbours in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode<K> {
    pub page_id: PageId,
    pub parent_page_id: Option<PageId>,
    pub keys: Vec<K>,
    pub records: Vec<PageId>,
    pub next_leaf_page_id: Option<PageId>,
    pub prev_leaf_page_id: Option<PageId>,
}

impl<K: IndexKey> LeafNode<K> {
    pub fn new(page_id: PageId, parent_page_id: Option<PageId>) -> Self {
        Self {
            page_id,
            parent_page_id,
            keys: Vec::new(),
            records: Vec::new(),
            next_leaf_page_id: None,
            prev_leaf_page_id: None,
        }
    }

    /// Position of `key`, or where it would be inserted.
    pub fn find(&self, key: &K) -> std::result::Result<usize, usize> {
        self.keys.binary_search(key)
    }

    /// Index of the first key not below `key`.
    pub fn lower_bound(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    pub fn insert_at(&mut self, pos: usize, key: K, record: PageId) {
        self.keys.insert(pos, key);
        self.records.insert(pos, record);
    }

    pub fn remove_at(&mut self, pos: usize) -> (K, PageId) {
        (self.keys.remove(pos), self.records.remove(pos))
    }

    /// Moves entries from `split_at` onward into a new right sibling stored
    /// at `right_page_id` and splices it into the leaf chain after `self`.
    /// The caller still has to fix the old right neighbour's prev link.
    pub fn split_off(&mut self, split_at: usize, right_page_id: PageId) -> LeafNode<K> {
        let right = LeafNode {
            page_id: right_page_id,
            parent_page_id: self.parent_page_id,
            keys: self.keys.split_off(split_at),
            records: self.records.split_off(split_at),
            next_leaf_page_id: self.next_leaf_page_id,
            prev_leaf_page_id: Some(self.page_id),
        };
        self.next_leaf_page_id = Some(right_page_id);
        right
    }
}

/// Internal node: `keys.len() + 1` children, child `i` covering
/// `[keys[i-1], keys[i])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode<K> {
    pub page_id: PageId,
    pub parent_page_id: Option<PageId>,
    pub keys: Vec<K>,
    pub children: Vec<PageId>,
}

impl<K: IndexKey> InternalNode<K> {
    pub fn new(page_id: PageId, parent_page_id: Option<PageId>) -> Self {
        Self {
            page_id,
            parent_page_id,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Index of the child whose range covers `key`. Keys equal to a
    /// separator belong to the child on its right.
    pub fn child_index(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    pub fn child_for(&self, key: &K) -> PageId {
        self.children[self.child_index(key)]
    }

    /// Inserts a separator and the child to its right in sorted position.
    pub fn insert_separator(&mut self, key: K, right_child: PageId) {
        let pos = self.keys.partition_point(|k| k < &key);
        self.keys.insert(pos, key);
        self.children.insert(pos + 1, right_child);
    }

    /// Splits around `keys[split_at]`, which is removed and returned for
    /// promotion. Keys and children after it move to a new node stored at
    /// `right_page_id`.
    pub fn split_off(&mut self, split_at: usize, right_page_id: PageId) -> (K, InternalNode<K>) {
        let mut right_keys = self.keys.split_off(split_at);
        let promoted = right_keys.remove(0);
        let right_children = self.children.split_off(split_at + 1);

        let right = InternalNode {
            page_id: right_page_id,
            parent_page_id: self.parent_page_id,
            keys: right_keys,
            children: right_children,
        };
        (promoted, right)
    }
}

/// A B+ tree node as stored in one page, dispatched on the on-disk
/// `is_leaf` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BPlusTreeNode<K> {
    Leaf(LeafNode<K>),
    Internal(InternalNode<K>),
}

impl<K: IndexKey> BPlusTreeNode<K> {
    pub fn page_id(&self) -> PageId {
        match self {
            BPlusTreeNode::Leaf(leaf) => leaf.page_id,
            BPlusTreeNode::Internal(node) => node.page_id,
        }
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        match self {
            BPlusTreeNode::Leaf(leaf) => leaf.parent_page_id,
            BPlusTreeNode::Internal(node) => node.parent_page_id,
        }
    }

    pub fn set_parent_page_id(&mut self, parent: Option<PageId>) {
        match self {
            BPlusTreeNode::Leaf(leaf) => leaf.parent_page_id = parent,
            BPlusTreeNode::Internal(node) => node.parent_page_id = parent,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, BPlusTreeNode::Leaf(_))
    }

    pub fn keys(&self) -> &[K] {
        match self {
            BPlusTreeNode::Leaf(leaf) => &leaf.keys,
            BPlusTreeNode::Internal(node) => &node.keys,
        }
    }

    /// Encodes the node into a page buffer (big-endian throughout).
    ///
    /// Entries that would run past the end of the page are dropped with a
    /// warning and the header records only the entries kept, so the page
    /// still decodes as a consistent node. Size `max_keys` so that never
    /// happens. Returns the number of keys actually written.
    pub fn serialize(&self, page: &mut [u8; PAGE_SIZE]) -> usize {
        let written = self.keys_that_fit();

        page.fill(0);
        let mut out: &mut [u8] = &mut page[..];

        out.put_i32(self.page_id().as_i32());
        out.put_u8(u8::from(self.is_leaf()));
        out.put_i32(encode_link(self.parent_page_id()));
        out.put_i32(written as i32);

        match self {
            BPlusTreeNode::Leaf(leaf) => {
                out.put_i32(encode_link(leaf.next_leaf_page_id));
                out.put_i32(encode_link(leaf.prev_leaf_page_id));
                for (key, record) in leaf.keys.iter().zip(&leaf.records).take(written) {
                    key.encode(&mut out);
                    out.put_i32(record.as_i32());
                }
            }
            BPlusTreeNode::Internal(node) => {
                for key in node.keys.iter().take(written) {
                    key.encode(&mut out);
                }
                for child in node.children.iter().take(written + 1) {
                    out.put_i32(child.as_i32());
                }
            }
        }

        if written < self.keys().len() {
            warn!(
                "{} truncated: wrote {} of {} keys",
                self.page_id(),
                written,
                self.keys().len()
            );
        }
        written
    }

    /// Leading keys whose entries fit in one page. An internal node keeps
    /// room for the child pointer that follows its last key.
    fn keys_that_fit(&self) -> usize {
        let (mut used, per_entry) = match self {
            BPlusTreeNode::Leaf(_) => (LEAF_HEADER_SIZE, RECORD_SIZE),
            BPlusTreeNode::Internal(_) => (NODE_HEADER_SIZE + CHILD_SIZE, CHILD_SIZE),
        };
        self.keys()
            .iter()
            .take_while(|key| {
                used += key.encoded_len() + per_entry;
                used <= PAGE_SIZE
            })
            .count()
    }

    /// Decodes the node stored in `page`, checking that it claims to live at
    /// `page_id`.
    pub fn deserialize(page_id: PageId, page: &[u8]) -> Result<Self> {
        let corrupt = |reason: &str| PageDbError::CorruptNode {
            page_id,
            reason: reason.to_string(),
        };

        let mut input = page;
        if input.remaining() < NODE_HEADER_SIZE {
            return Err(corrupt("page shorter than node header"));
        }

        let stored_id = input.get_i32();
        if stored_id != page_id.as_i32() {
            return Err(corrupt(&format!("header names page {}", stored_id)));
        }
        let is_leaf = match input.get_u8() {
            0 => false,
            1 => true,
            other => return Err(corrupt(&format!("bad leaf flag {}", other))),
        };
        let parent_page_id = decode_link(input.get_i32());
        let key_count = usize::try_from(input.get_i32())
            .map_err(|_| corrupt("negative key count"))?;

        if is_leaf {
            if input.remaining() < 8 {
                return Err(corrupt("leaf header truncated"));
            }
            let mut leaf = LeafNode::new(page_id, parent_page_id);
            leaf.next_leaf_page_id = decode_link(input.get_i32());
            leaf.prev_leaf_page_id = decode_link(input.get_i32());

            for _ in 0..key_count {
                let key = K::decode(&mut input).ok_or_else(|| corrupt("malformed key"))?;
                if input.remaining() < RECORD_SIZE {
                    return Err(corrupt("record id truncated"));
                }
                leaf.keys.push(key);
                leaf.records.push(PageId::new(input.get_i32()));
            }
            Ok(BPlusTreeNode::Leaf(leaf))
        } else {
            let mut node = InternalNode::new(page_id, parent_page_id);
            for _ in 0..key_count {
                let key = K::decode(&mut input).ok_or_else(|| corrupt("malformed key"))?;
                node.keys.push(key);
            }
            if input.remaining() < (key_count + 1) * CHILD_SIZE {
                return Err(corrupt("child pointers truncated"));
            }
            for _ in 0..=key_count {
                node.children.push(PageId::new(input.get_i32()));
            }
            Ok(BPlusTreeNode::Internal(node))
        }
    }
}
