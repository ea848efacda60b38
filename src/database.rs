use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use crate::store::DiskStore;
use crate::tree::BTree;

pub struct Database {
    store: DiskStore,
    tree: BTree,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Database> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let store = DiskStore::open(file)?;
        let tree = BTree::from_root(store.root());
        Ok(Database { store, tree })
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.tree.get(&self.store, key)
    }

    pub fn set(&mut self, key: &[u8], val: &[u8]) -> io::Result<()> {
        self.tree.insert(&mut self.store, key, val);
        self.store.flush(self.tree.root())
    }

    pub fn del(&mut self, key: &[u8]) -> io::Result<bool> {
        let removed = self.tree.delete(&mut self.store, key);
        self.store.flush(self.tree.root())?;
        Ok(removed)
    }

    pub fn close(self) {}
}
