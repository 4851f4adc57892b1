use std::collections::HashSet;
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, warn};

use crate::buffer::BufferPoolManager;
use crate::common::{PageDbError, PageId, Result, HEADER_PAGE_ID, MIN_MAX_KEYS, PAGE_SIZE};

use super::node::{max_internal_size, max_leaf_size};
use super::root_directory::{validate_index_name, RootDirectory, RootDirectoryRef};
use super::{BPlusTreeIterator, BPlusTreeNode, IndexKey, InternalNode, LeafNode};

/// Reads and decodes the node stored at `page_id`.
pub(crate) fn read_node<K: IndexKey>(
    bpm: &BufferPoolManager,
    page_id: PageId,
) -> Result<BPlusTreeNode<K>> {
    let guard = bpm.fetch_page_read(page_id)?;
    let data = guard.data();
    BPlusTreeNode::deserialize(page_id, &data[..])
}

pub(crate) fn read_leaf<K: IndexKey>(bpm: &BufferPoolManager, page_id: PageId) -> Result<LeafNode<K>> {
    match read_node(bpm, page_id)? {
        BPlusTreeNode::Leaf(leaf) => Ok(leaf),
        BPlusTreeNode::Internal(_) => Err(PageDbError::CorruptNode {
            page_id,
            reason: "expected a leaf".to_string(),
        }),
    }
}

/// A disk-resident B+ tree mapping keys to record page ids.
///
/// Every node lives in its own page and is reached only through the buffer
/// pool. The root page id is persisted in the store's root directory under
/// the index name, so reopening a tree with the same name and key type picks
/// up where it left off.
///
/// The tree holds no latches. Mutations take `&mut self`, so a single writer
/// is enforced at compile time; a split touches several pages in sequence
/// and is not atomic, so share the tree behind a `RwLock` if readers may run
/// on other threads.
///
/// Deletes never merge or borrow from siblings: nodes may fall below half
/// occupancy and leaves may become empty.
pub struct BPlusTree<K: IndexKey> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    max_keys: usize,
    directory_slot: usize,
    root_page_id: Option<PageId>,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Opens the index called `index_name`, registering it in the root
    /// directory if it does not exist yet.
    ///
    /// A node splits as soon as it holds `max_keys` keys, so stored nodes
    /// keep fewer. `max_keys` must be at least 3 and small enough that a node
    /// of that many of the largest keys fits in one page.
    pub fn new(index_name: &str, bpm: Arc<BufferPoolManager>, max_keys: usize) -> Result<Self> {
        validate_index_name(index_name)?;
        Self::validate_max_keys(max_keys)?;

        let (directory_slot, root_page_id) = {
            let mut guard = bpm.fetch_page_write(HEADER_PAGE_ID)?;
            let existing = {
                let data = guard.data();
                let directory = RootDirectoryRef::new(&data);
                let found = directory
                    .find(index_name)
                    .map(|slot| (slot, directory.root_page_id(slot)));
                found
            };
            match existing {
                Some(found) => found,
                None => {
                    let mut data = guard.data_mut();
                    let slot = RootDirectory::new(&mut data).register(index_name)?;
                    debug!("registered index {:?} in slot {}", index_name, slot);
                    (slot, None)
                }
            }
        };

        Ok(Self {
            index_name: index_name.to_string(),
            bpm,
            max_keys,
            directory_slot,
            root_page_id,
            _key: PhantomData,
        })
    }

    fn validate_max_keys(max_keys: usize) -> Result<()> {
        if max_keys < MIN_MAX_KEYS {
            return Err(PageDbError::InvalidConfig(format!(
                "max_keys must be at least {}, got {}",
                MIN_MAX_KEYS, max_keys
            )));
        }
        let worst = max_leaf_size::<K>(max_keys).max(max_internal_size::<K>(max_keys));
        if worst > PAGE_SIZE {
            return Err(PageDbError::InvalidConfig(format!(
                "max_keys {} needs up to {} bytes per node, page holds {}",
                max_keys, worst, PAGE_SIZE
            )));
        }
        Ok(())
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        self.root_page_id
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id.is_none()
    }

    /// Decodes the node stored at `page_id`.
    pub fn load_node(&self, page_id: PageId) -> Result<BPlusTreeNode<K>> {
        read_node(&self.bpm, page_id)
    }

    /// Looks up the record page id stored under `key`.
    pub fn search(&self, key: &K) -> Result<Option<PageId>> {
        let Some(root) = self.root_page_id else {
            return Ok(None);
        };

        let (_, leaf) = self.descend(root, key)?;
        Ok(leaf.find(key).ok().map(|pos| leaf.records[pos]))
    }

    /// Inserts `key -> record`. Returns `Ok(false)` if the key is already
    /// present, leaving the tree unchanged.
    pub fn insert(&mut self, key: K, record: PageId) -> Result<bool> {
        key.validate()?;

        let Some(root) = self.root_page_id else {
            let page_id = self.allocate_page()?;
            let mut leaf = LeafNode::new(page_id, None);
            leaf.insert_at(0, key, record);
            self.store_node(&BPlusTreeNode::Leaf(leaf))?;
            self.set_root(Some(page_id))?;
            return Ok(true);
        };

        let (path, mut leaf) = self.descend(root, &key)?;
        let pos = match leaf.find(&key) {
            Ok(_) => return Ok(false),
            Err(pos) => pos,
        };
        leaf.insert_at(pos, key, record);

        if leaf.keys.len() < self.max_keys {
            self.store_node(&BPlusTreeNode::Leaf(leaf))?;
            return Ok(true);
        }

        let right_page_id = self.allocate_page()?;
        let right = leaf.split_off(self.leaf_split_point(), right_page_id);
        let promoted = right.keys[0].clone();

        if let Some(next_page_id) = right.next_leaf_page_id {
            let mut next = read_leaf::<K>(&self.bpm, next_page_id)?;
            next.prev_leaf_page_id = Some(right_page_id);
            self.store_node(&BPlusTreeNode::Leaf(next))?;
        }

        debug!(
            "{}: split leaf {} -> {} at {:?}",
            self.index_name, leaf.page_id, right_page_id, promoted
        );

        let left_page_id = leaf.page_id;
        self.store_node(&BPlusTreeNode::Leaf(leaf))?;
        self.store_node(&BPlusTreeNode::Leaf(right))?;

        self.insert_into_parent(path, left_page_id, promoted, right_page_id)?;
        Ok(true)
    }

    /// Removes `key`. Returns `Ok(false)` if it was not present.
    pub fn delete(&mut self, key: &K) -> Result<bool> {
        let Some(root) = self.root_page_id else {
            return Ok(false);
        };

        let (_, mut leaf) = self.descend(root, key)?;
        let Ok(pos) = leaf.find(key) else {
            return Ok(false);
        };

        leaf.remove_at(pos);
        self.store_node(&BPlusTreeNode::Leaf(leaf))?;
        Ok(true)
    }

    /// Record page ids of all keys in `[low, high]`, in key order.
    pub fn range_search(&self, low: &K, high: &K) -> Result<Vec<PageId>> {
        self.range_iter(low, high)?
            .map(|entry| entry.map(|(_, record)| record))
            .collect()
    }

    /// Lazily walks the leaf chain over `[low, high]`.
    pub fn range_iter(&self, low: &K, high: &K) -> Result<BPlusTreeIterator<K>> {
        let Some(root) = self.root_page_id else {
            return Ok(BPlusTreeIterator::empty(Arc::clone(&self.bpm)));
        };

        let (_, leaf) = self.descend(root, low)?;
        let start = leaf.lower_bound(low);
        Ok(BPlusTreeIterator::new(
            Arc::clone(&self.bpm),
            leaf,
            start,
            high.clone(),
        ))
    }

    /// Number of levels, 0 for an empty tree.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root_page_id;

        while let Some(page_id) = current {
            match self.load_node(page_id) {
                Ok(BPlusTreeNode::Leaf(_)) => return height + 1,
                Ok(BPlusTreeNode::Internal(node)) => {
                    height += 1;
                    current = node.children.first().copied();
                }
                Err(e) => {
                    warn!("{}: height walk stopped at {}: {}", self.index_name, page_id, e);
                    return height;
                }
            }
        }
        height
    }

    /// Number of reachable nodes.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.visit_levels(|_, _| count += 1);
        count
    }

    /// Every key in ascending order, read along the leaf chain.
    pub fn all_keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.leftmost_leaf();

        while let Some(page_id) = current {
            if !seen.insert(page_id) {
                warn!("{}: leaf chain loops back to {}", self.index_name, page_id);
                break;
            }
            match read_leaf::<K>(&self.bpm, page_id) {
                Ok(leaf) => {
                    current = leaf.next_leaf_page_id;
                    keys.extend(leaf.keys);
                }
                Err(e) => {
                    warn!("{}: leaf scan stopped at {}: {}", self.index_name, page_id, e);
                    break;
                }
            }
        }
        keys
    }

    /// Level-by-level dump of the tree, one node per line.
    pub fn dump_tree(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "BPlusTree {:?} (max_keys={})", self.index_name, self.max_keys);
        if self.root_page_id.is_none() {
            let _ = writeln!(out, "  <empty>");
        }

        self.visit_levels(|level, node| {
            let indent = "  ".repeat(level + 1);
            let _ = match node {
                BPlusTreeNode::Leaf(leaf) => writeln!(
                    out,
                    "{}leaf {} keys={:?} prev={:?} next={:?}",
                    indent,
                    leaf.page_id.as_i32(),
                    leaf.keys,
                    leaf.prev_leaf_page_id.map(|p| p.as_i32()),
                    leaf.next_leaf_page_id.map(|p| p.as_i32()),
                ),
                BPlusTreeNode::Internal(inner) => writeln!(
                    out,
                    "{}internal {} keys={:?} children={:?}",
                    indent,
                    inner.page_id.as_i32(),
                    inner.keys,
                    inner.children.iter().map(|p| p.as_i32()).collect::<Vec<_>>(),
                ),
            };
        });
        out
    }

    /// Walks from `root` to the leaf covering `key`, returning the internal
    /// page ids on the way down (root first) and the decoded leaf.
    fn descend(&self, root: PageId, key: &K) -> Result<(Vec<PageId>, LeafNode<K>)> {
        let mut path = Vec::new();
        let mut current = root;

        loop {
            match self.load_node(current)? {
                BPlusTreeNode::Leaf(leaf) => return Ok((path, leaf)),
                BPlusTreeNode::Internal(node) => {
                    path.push(current);
                    current = node.child_for(key);
                }
            }
        }
    }

    /// Hooks a freshly split `right` sibling into the tree above `left`,
    /// splitting ancestors as needed and growing a new root at the top.
    fn insert_into_parent(
        &mut self,
        mut path: Vec<PageId>,
        mut left: PageId,
        mut key: K,
        mut right: PageId,
    ) -> Result<()> {
        while let Some(parent_page_id) = path.pop() {
            let mut parent = match self.load_node(parent_page_id)? {
                BPlusTreeNode::Internal(node) => node,
                BPlusTreeNode::Leaf(_) => {
                    return Err(PageDbError::CorruptNode {
                        page_id: parent_page_id,
                        reason: "expected an internal node".to_string(),
                    })
                }
            };

            parent.insert_separator(key, right);

            if parent.keys.len() < self.max_keys {
                self.store_node(&BPlusTreeNode::Internal(parent))?;
                return Ok(());
            }

            let sibling_page_id = self.allocate_page()?;
            let (promoted, sibling) = parent.split_off(self.internal_split_point(), sibling_page_id);

            debug!(
                "{}: split internal {} -> {} promoting {:?}",
                self.index_name, parent_page_id, sibling_page_id, promoted
            );

            let moved_children = sibling.children.clone();
            self.store_node(&BPlusTreeNode::Internal(parent))?;
            self.store_node(&BPlusTreeNode::Internal(sibling))?;
            for child in moved_children {
                self.set_parent(child, sibling_page_id)?;
            }

            left = parent_page_id;
            key = promoted;
            right = sibling_page_id;
        }

        let root_page_id = self.allocate_page()?;
        let mut root = InternalNode::new(root_page_id, None);
        root.keys.push(key);
        root.children.extend([left, right]);
        self.store_node(&BPlusTreeNode::Internal(root))?;

        self.set_parent(left, root_page_id)?;
        self.set_parent(right, root_page_id)?;
        self.set_root(Some(root_page_id))
    }

    /// Entries kept by the left leaf when a leaf fills up.
    fn leaf_split_point(&self) -> usize {
        (self.max_keys + 2) / 2
    }

    /// Index of the key promoted when an internal node fills up.
    fn internal_split_point(&self) -> usize {
        self.max_keys / 2
    }

    fn allocate_page(&self) -> Result<PageId> {
        let guard = self.bpm.new_page_guarded()?;
        Ok(guard.page_id())
    }

    fn store_node(&self, node: &BPlusTreeNode<K>) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(node.page_id())?;
        let mut data = guard.data_mut();
        node.serialize(&mut data);
        Ok(())
    }

    fn set_parent(&self, page_id: PageId, parent: PageId) -> Result<()> {
        let mut node = self.load_node(page_id)?;
        node.set_parent_page_id(Some(parent));
        self.store_node(&node)
    }

    fn set_root(&mut self, root: Option<PageId>) -> Result<()> {
        {
            let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
            let mut data = guard.data_mut();
            RootDirectory::new(&mut data).set_root_page_id(self.directory_slot, root);
        }

        debug!("{}: root is now {:?}", self.index_name, root);
        self.root_page_id = root;
        Ok(())
    }

    fn leftmost_leaf(&self) -> Option<PageId> {
        let mut current = self.root_page_id?;
        loop {
            match self.load_node(current) {
                Ok(BPlusTreeNode::Leaf(_)) => return Some(current),
                Ok(BPlusTreeNode::Internal(node)) => current = *node.children.first()?,
                Err(e) => {
                    warn!("{}: cannot reach leftmost leaf: {}", self.index_name, e);
                    return None;
                }
            }
        }
    }

    /// Breadth-first walk over reachable nodes, skipping pages that fail to
    /// decode and pages already seen.
    fn visit_levels<F: FnMut(usize, &BPlusTreeNode<K>)>(&self, mut visit: F) {
        let Some(root) = self.root_page_id else {
            return;
        };

        let mut seen = HashSet::new();
        let mut level = vec![root];
        let mut depth = 0;

        while !level.is_empty() {
            let mut next_level = Vec::new();
            for page_id in level {
                if !seen.insert(page_id) {
                    continue;
                }
                match self.load_node(page_id) {
                    Ok(node) => {
                        if let BPlusTreeNode::Internal(inner) = &node {
                            next_level.extend(inner.children.iter().copied());
                        }
                        visit(depth, &node);
                    }
                    Err(e) => warn!("{}: skipping {}: {}", self.index_name, page_id, e),
                }
            }
            level = next_level;
            depth += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ReplacementPolicy;
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(pool_size, ReplacementPolicy::Lru, dm));
        (bpm, temp_file)
    }

    #[test]
    fn test_leaf_splits_when_full() {
        let (bpm, _temp) = create_bpm(10);
        let mut tree = BPlusTree::<i32>::new("full", bpm, 3).unwrap();

        tree.insert(1, PageId::new(1)).unwrap();
        tree.insert(2, PageId::new(2)).unwrap();
        assert_eq!(tree.node_count(), 1);

        tree.insert(3, PageId::new(3)).unwrap();
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.height(), 2);
    }

    #[test]
    fn test_four_inserts_layout() {
        let (bpm, _temp) = create_bpm(10);
        let mut tree = BPlusTree::<i32>::new("scenario", bpm, 3).unwrap();

        for (i, key) in [10, 20, 5, 15].into_iter().enumerate() {
            assert!(tree.insert(key, PageId::new(100 + i as i32)).unwrap());
        }

        // 5 fills the root leaf and 15 fills [5, 10] again: three leaves, one root
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.search(&15).unwrap(), Some(PageId::new(103)));
        assert_eq!(
            tree.range_search(&5, &15).unwrap(),
            vec![PageId::new(102), PageId::new(100), PageId::new(103)]
        );
    }

    #[test]
    fn test_split_points() {
        let (bpm, _temp) = create_bpm(10);
        let tree = BPlusTree::<i32>::new("points", bpm, 10).unwrap();
        assert_eq!(tree.leaf_split_point(), 6);
        assert_eq!(tree.internal_split_point(), 5);
    }

    #[test]
    fn test_invalid_max_keys() {
        let (bpm, _temp) = create_bpm(10);
        assert!(matches!(
            BPlusTree::<i32>::new("tiny", Arc::clone(&bpm), 2),
            Err(PageDbError::InvalidConfig(_))
        ));
        assert!(matches!(
            BPlusTree::<String>::new("wide", bpm, 64),
            Err(PageDbError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_dump_tree_lists_every_node() {
        let (bpm, _temp) = create_bpm(10);
        let mut tree = BPlusTree::<i32>::new("dump", bpm, 3).unwrap();
        assert!(tree.dump_tree().contains("<empty>"));

        for key in 0..4 {
            tree.insert(key, PageId::new(key)).unwrap();
        }

        let dump = tree.dump_tree();
        assert_eq!(dump.matches("internal").count(), 1);
        assert_eq!(dump.matches("leaf").count(), 2);
    }
}
