use byteorder::{ByteOrder, LittleEndian};
use memmap::{MmapMut, MmapOptions};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use super::PageStore;
use crate::node::{Node, NodeRef, BTREE_PAGE_SIZE};

const DB_SIG: &[u8; 16] = b"BuildYourOwnDB05";

const PAGE_SIZE_U64: u64 = BTREE_PAGE_SIZE as u64;

const INITIAL_MMAP_SIZE: u64 = 64 << 20;

#[derive(Debug)]
pub struct DiskStore {
    file: File,
    file_size: u64,
    mmap_total: u64,
    chunks: Vec<MmapMut>,
    flushed: u64,
    staged: Vec<Vec<u8>>,
    root: u64,
}

impl DiskStore {
    pub fn open(file: File) -> io::Result<DiskStore> {
        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE_U64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "file size is not a multiple of the page size",
            ));
        }

        let mut mmap_size = INITIAL_MMAP_SIZE;
        while mmap_size < file_size {
            mmap_size *= 2;
        }
        // the mapping may run past the end of the file until it is extended
        let chunk = unsafe {
            MmapOptions::new()
                .len(mmap_size as usize)
                .map_mut(&file)?
        };

        let mut store = DiskStore {
            file,
            file_size,
            mmap_total: mmap_size,
            chunks: vec![chunk],
            flushed: 0,
            staged: Vec::new(),
            root: 0,
        };
        store.master_load()?;
        log::debug!(
            "MASTER_LOAD [root={}][flushed={}]",
            store.root,
            store.flushed
        );
        Ok(store)
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    pub fn flush(&mut self, root: u64) -> io::Result<()> {
        self.write_pages()?;
        self.sync_pages(root)
    }

    // master page: | sig 16B | btree_root 8B | page_used 8B |
    fn master_load(&mut self) -> io::Result<()> {
        if self.file_size == 0 {
            // empty file, the master page is written on the first flush
            self.flushed = 1;
            self.root = 0;
            return Ok(());
        }

        let data = &self.chunks[0][..32];
        if &data[..16] != DB_SIG {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad signature"));
        }
        let root = LittleEndian::read_u64(&data[16..24]);
        let used = LittleEndian::read_u64(&data[24..32]);

        let file_pages = self.file_size / PAGE_SIZE_U64;
        if used < 1 || used > file_pages || root >= used {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad master page"));
        }

        self.root = root;
        self.flushed = used;
        Ok(())
    }

    // one pwrite, not the mmap: mapped stores are not atomic
    fn master_store(&mut self) -> io::Result<()> {
        let mut data = [0u8; 32];
        data[..16].copy_from_slice(DB_SIG);
        LittleEndian::write_u64(&mut data[16..24], self.root);
        LittleEndian::write_u64(&mut data[24..32], self.flushed);
        self.file.write_at(&data, 0)?;
        Ok(())
    }

    fn write_pages(&mut self) -> io::Result<()> {
        let npages = self.flushed + self.staged.len() as u64;
        // file first: the new chunk maps at the old mapping's end
        self.extend_file(npages)?;
        self.extend_mmap(npages)?;

        for i in 0..self.staged.len() {
            let ptr = self.flushed + i as u64;
            let (chunk, offset) = self.locate(ptr);
            self.chunks[chunk][offset..offset + BTREE_PAGE_SIZE]
                .copy_from_slice(&self.staged[i]);
        }
        Ok(())
    }

    fn sync_pages(&mut self, root: u64) -> io::Result<()> {
        // the new pages must be durable before the master references them
        self.file.sync_all()?;
        self.flushed += self.staged.len() as u64;
        self.staged.clear();

        self.root = root;
        self.master_store()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn extend_file(&mut self, npages: u64) -> io::Result<()> {
        let file_pages = self.file_size / PAGE_SIZE_U64;
        if file_pages >= npages {
            return Ok(());
        }
        let file_size = grown_pages(file_pages, npages) * PAGE_SIZE_U64;
        self.file.set_len(file_size)?;
        self.file_size = file_size;
        log::debug!("EXTEND_FILE [bytes={}]", file_size);
        Ok(())
    }

    fn extend_mmap(&mut self, npages: u64) -> io::Result<()> {
        if self.mmap_total >= npages * PAGE_SIZE_U64 {
            return Ok(());
        }
        let chunk = unsafe {
            MmapOptions::new()
                .offset(self.mmap_total)
                .len(self.mmap_total as usize)
                .map_mut(&self.file)?
        };
        self.mmap_total *= 2;
        self.chunks.push(chunk);
        log::debug!("EXTEND_MMAP [total={}]", self.mmap_total);
        Ok(())
    }

    fn locate(&self, ptr: u64) -> (usize, usize) {
        let mut start = 0;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let end = start + chunk.len() as u64 / PAGE_SIZE_U64;
            if ptr < end {
                return (i, (ptr - start) as usize * BTREE_PAGE_SIZE);
            }
            start = end;
        }
        panic!("page pointer {} out of range", ptr);
    }
}

impl PageStore for DiskStore {
    fn page(&self, ptr: u64) -> NodeRef<'_> {
        let (chunk, offset) = self.locate(ptr);
        NodeRef::new(&self.chunks[chunk][offset..offset + BTREE_PAGE_SIZE])
    }

    fn alloc(&mut self, mut node: Node) -> u64 {
        assert!(node.nbytes() as usize <= BTREE_PAGE_SIZE);
        node.data.resize(BTREE_PAGE_SIZE, 0);
        let ptr = self.flushed + self.staged.len() as u64;
        self.staged.push(node.data);
        ptr
    }

    fn free(&mut self, _ptr: u64) {
        // TODO: hook a free list in here instead of leaking the page
    }
}

fn grown_pages(mut have: u64, want: u64) -> u64 {
    while have < want {
        have += std::cmp::max(have / 8, 1);
    }
    have
}
