use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, Result};

use super::b_plus_tree::read_leaf;
use super::{IndexKey, LeafNode};

/// Forward scan over the leaf chain, yielding `(key, record)` pairs up to and
/// including `end_key`.
///
/// The iterator holds a decoded copy of one leaf at a time and no pins, so
/// the tree must not be modified while a scan is in progress.
pub struct BPlusTreeIterator<K: IndexKey> {
    bpm: Arc<BufferPoolManager>,
    current: Option<LeafNode<K>>,
    current_index: usize,
    end_key: Option<K>,
    done: bool,
}

impl<K: IndexKey> BPlusTreeIterator<K> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf: LeafNode<K>, start: usize, end_key: K) -> Self {
        Self {
            bpm,
            current: Some(leaf),
            current_index: start,
            end_key: Some(end_key),
            done: false,
        }
    }

    pub(crate) fn empty(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            current: None,
            current_index: 0,
            end_key: None,
            done: true,
        }
    }

    pub fn next(&mut self) -> Result<Option<(K, PageId)>> {
        if self.done {
            return Ok(None);
        }

        loop {
            let Some(leaf) = &self.current else {
                break;
            };

            if self.current_index < leaf.keys.len() {
                let key = &leaf.keys[self.current_index];
                if self.end_key.as_ref().is_some_and(|end| key > end) {
                    break;
                }

                let item = (key.clone(), leaf.records[self.current_index]);
                self.current_index += 1;
                return Ok(Some(item));
            }

            // Empty leaves left behind by deletes are skipped
            let next_page_id = leaf.next_leaf_page_id;
            self.current = match next_page_id {
                Some(page_id) => Some(read_leaf(&self.bpm, page_id)?),
                None => None,
            };
            self.current_index = 0;
        }

        self.done = true;
        self.current = None;
        Ok(None)
    }
}

impl<K: IndexKey> Iterator for BPlusTreeIterator<K> {
    type Item = Result<(K, PageId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match BPlusTreeIterator::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
