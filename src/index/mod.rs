mod b_plus_tree;
mod btree_iterator;
mod key;
mod node;
mod root_directory;

pub use b_plus_tree::BPlusTree;
pub use btree_iterator::BPlusTreeIterator;
pub use key::{IndexKey, MAX_STRING_KEY_LEN};
pub use node::{
    max_internal_size, max_leaf_size, BPlusTreeNode, InternalNode, LeafNode, LEAF_HEADER_SIZE,
    NODE_HEADER_SIZE,
};
pub use root_directory::{
    validate_index_name, RootDirectory, RootDirectoryRef, MAX_INDEXES, MAX_INDEX_NAME_LEN,
};
