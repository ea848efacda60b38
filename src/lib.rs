mod database;
mod node;
mod store;
mod tree;

pub use database::Database;
pub use node::{
    Node, NodeRef, BTREE_MAX_KEY_SIZE, BTREE_MAX_VALUE_SIZE, BTREE_PAGE_SIZE,
};
pub use store::{DiskStore, MemStore, PageStore};
pub use tree::BTree;
