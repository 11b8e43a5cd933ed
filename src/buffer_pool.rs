//! LRU buffer pool over fixed-size data pages.
//!
//! Frames live in one owned `Vec<Frame>`; the LRU order and the free list
//! are expressed as indices into that vector rather than as an
//! `Rc<RefCell<_>>` graph, so there is a single owner and no interior
//! mutability in the hot path.

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};

use crate::device::TablespaceFiles;
use crate::error::SmallError;
use crate::page::{new_zero_page, page_lsn as read_page_lsn, PageBytes};
use crate::types::{PageId, SpaceId};

/// Number of frames evicted in one batch when the free list runs dry.
pub const EVICTION_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Invalid,
    FromBuffer,
    FromDisk,
}

struct Frame {
    data: Box<PageBytes>,
    space: SpaceId,
    page: PageId,
    state: FrameState,
}

/// A doubly-linked LRU list of frame indices, implemented over a flat
/// `Vec` of links so no node is individually heap-allocated.
struct LruList {
    prev: Vec<usize>,
    next: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruList {
    fn new(n: usize) -> Self {
        LruList {
            prev: vec![usize::MAX; n],
            next: vec![usize::MAX; n],
            head: None,
            tail: None,
        }
    }

    fn push_front(&mut self, idx: usize) {
        self.prev[idx] = usize::MAX;
        self.next[idx] = self.head.unwrap_or(usize::MAX);
        if let Some(h) = self.head {
            self.prev[h] = idx;
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn remove(&mut self, idx: usize) {
        let p = self.prev[idx];
        let n = self.next[idx];
        if p != usize::MAX {
            self.next[p] = n;
        } else {
            self.head = if n == usize::MAX { None } else { Some(n) };
        }
        if n != usize::MAX {
            self.prev[n] = p;
        } else {
            self.tail = if p == usize::MAX { None } else { Some(p) };
        }
        self.prev[idx] = usize::MAX;
        self.next[idx] = usize::MAX;
    }

    fn pop_back(&mut self) -> Option<usize> {
        let t = self.tail?;
        self.remove(t);
        Some(t)
    }

    fn touch(&mut self, idx: usize) {
        self.remove(idx);
        self.push_front(idx);
    }
}

pub struct BufferPool {
    frames: Vec<Frame>,
    lru: LruList,
    in_lru: Vec<bool>,
    free: VecDeque<usize>,
    index: HashMap<SpaceId, HashMap<PageId, usize>>,
}

impl BufferPool {
    pub fn new(n_frames: usize) -> Self {
        let mut frames = Vec::with_capacity(n_frames);
        for _ in 0..n_frames {
            frames.push(Frame {
                data: new_zero_page(),
                space: 0,
                page: 0,
                state: FrameState::Invalid,
            });
        }
        BufferPool {
            frames,
            lru: LruList::new(n_frames),
            in_lru: vec![false; n_frames],
            free: (0..n_frames).collect(),
            index: HashMap::new(),
        }
    }

    fn lookup(&self, space: SpaceId, page: PageId) -> Option<usize> {
        self.index.get(&space)?.get(&page).copied()
    }

    fn unindex(&mut self, idx: usize) {
        let f = &self.frames[idx];
        if let Some(m) = self.index.get_mut(&f.space) {
            m.remove(&f.page);
        }
    }

    /// Writes back `n` least-recently-used frames and returns them to the
    /// free list. Every eviction writes back unconditionally -- no dirty
    /// bit is tracked (see module docs in `crate::redo`).
    fn evict(&mut self, n: usize, device: &mut TablespaceFiles) -> Result<(), SmallError> {
        for _ in 0..n {
            let idx = match self.lru.pop_back() {
                Some(i) => i,
                None => break,
            };
            self.in_lru[idx] = false;
            let f = &self.frames[idx];
            if f.state != FrameState::Invalid {
                device.write_page(f.space, f.page, f.data.as_ref())?;
            }
            self.unindex(idx);
            self.frames[idx].state = FrameState::Invalid;
            self.free.push_back(idx);
        }
        Ok(())
    }

    fn allocate_frame(&mut self, device: &mut TablespaceFiles) -> Result<usize, SmallError> {
        if self.free.is_empty() {
            self.evict(EVICTION_BATCH, device)?;
        }
        self.free
            .pop_front()
            .ok_or_else(|| SmallError::malformed("buffer pool exhausted after eviction"))
    }

    /// Returns the cached frame for `(space, page)`, reading it from the
    /// device on a miss.
    pub fn get(
        &mut self,
        space: SpaceId,
        page: PageId,
        device: &mut TablespaceFiles,
    ) -> Result<&mut [u8], SmallError> {
        device.tablespace_map().base_lba(space)?;

        if let Some(idx) = self.lookup(space, page) {
            self.lru.touch(idx);
            return Ok(self.frames[idx].data.as_mut());
        }

        let idx = self.allocate_frame(device)?;
        device.read_page(space, page, self.frames[idx].data.as_mut())?;
        self.frames[idx].space = space;
        self.frames[idx].page = page;
        self.frames[idx].state = FrameState::FromDisk;
        self.index.entry(space).or_default().insert(page, idx);
        self.lru.push_front(idx);
        self.in_lru[idx] = true;
        debug!("buffer pool miss, loaded ({}, {}) from disk", space, page);
        Ok(self.frames[idx].data.as_mut())
    }

    /// Creates a fresh in-memory page for `(space, page)`. Fails if the
    /// page is already cached -- callers that want to overwrite an
    /// existing image should evict it first.
    pub fn new_page(
        &mut self,
        space: SpaceId,
        page: PageId,
        device: &mut TablespaceFiles,
    ) -> Result<&mut [u8], SmallError> {
        if self.lookup(space, page).is_some() {
            return Err(SmallError::already_present(space, page));
        }
        let idx = self.allocate_frame(device)?;
        for b in self.frames[idx].data.iter_mut() {
            *b = 0;
        }
        self.frames[idx].space = space;
        self.frames[idx].page = page;
        self.frames[idx].state = FrameState::FromBuffer;
        self.index.entry(space).or_default().insert(page, idx);
        self.lru.push_front(idx);
        self.in_lru[idx] = true;
        Ok(self.frames[idx].data.as_mut())
    }

    /// Creates (or resets) the page at `(space, page)` unconditionally --
    /// used by the page-create redo operator, which must succeed whether
    /// or not the page is already cached (page creation ignores the
    /// page-LSN gate entirely).
    pub fn create_page(
        &mut self,
        space: SpaceId,
        page: PageId,
        device: &mut TablespaceFiles,
    ) -> Result<&mut [u8], SmallError> {
        if let Some(idx) = self.lookup(space, page) {
            for b in self.frames[idx].data.iter_mut() {
                *b = 0;
            }
            self.frames[idx].state = FrameState::FromBuffer;
            self.lru.touch(idx);
            return Ok(self.frames[idx].data.as_mut());
        }
        self.new_page(space, page, device)
    }

    pub fn page_lsn(&self, space: SpaceId, page: PageId) -> Option<u64> {
        let idx = self.lookup(space, page)?;
        Some(read_page_lsn(self.frames[idx].data.as_ref()))
    }

    pub fn write_back(&mut self, space: SpaceId, page: PageId, device: &mut TablespaceFiles) -> Result<(), SmallError> {
        match self.lookup(space, page) {
            Some(idx) => device.write_page(space, page, self.frames[idx].data.as_ref()),
            None => {
                warn!("write_back requested for uncached page ({}, {})", space, page);
                Ok(())
            }
        }
    }

    /// Writes back every cached frame, tail-to-head, without evicting it.
    /// Used at driver shutdown.
    pub fn flush_all(&mut self, device: &mut TablespaceFiles) -> Result<(), SmallError> {
        let mut order = Vec::new();
        let mut idx_opt = self.lru.tail;
        while let Some(idx) = idx_opt {
            order.push(idx);
            let p = self.lru.prev[idx];
            idx_opt = if p == usize::MAX { None } else { Some(p) };
        }
        for idx in order {
            let f = &self.frames[idx];
            if f.state != FrameState::Invalid {
                device.write_page(f.space, f.page, f.data.as_ref())?;
            }
        }
        Ok(())
    }

    /// Membership invariant check: every in-pool frame is either on the
    /// LRU or on the free list, and vice versa (testable property 7).
    #[cfg(test)]
    fn check_membership_invariant(&self) {
        let mut seen = vec![false; self.frames.len()];
        for &idx in self.free.iter() {
            assert!(!self.in_lru[idx]);
            seen[idx] = true;
        }
        let mut cur = self.lru.head;
        while let Some(idx) = cur {
            assert!(self.in_lru[idx]);
            seen[idx] = true;
            cur = self.lru.next[idx];
        }
        assert!(seen.iter().all(|&s| s));
    }
}
