//! Page-based arena allocator.
//!
//! The arena carves variable-size byte blocks out of fixed-capacity pages
//! obtained from an injected [`Allocator`]. Each block handle records its
//! owning page and length, so `deallocate` is O(1) with no global lookup
//! table. A page is returned to the backing allocator when its last live
//! block is freed, with two exceptions: the document's base page lives as
//! long as the arena, and the current bump page is retained as the pending
//! page for reuse.

mod alloc;

pub use alloc::{Allocator, ArenaError, SystemAllocator};

use std::rc::Rc;

/// Page size buckets, smallest first. Requests larger than the biggest
/// bucket get a dedicated page sized to fit exactly.
const PAGE_BUCKETS: [usize; 3] = [4 * 1024, 16 * 1024, 64 * 1024];

/// Handle to an arena-served block: owning page index, byte offset, length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    pub(crate) page: u32,
    pub(crate) offset: u32,
    pub(crate) len: u32,
}

struct Page {
    /// Backing buffer; `None` once the page has been returned.
    data: Option<Box<[u8]>>,
    /// Bump cursor: bytes handed out so far.
    bump: usize,
    /// Bytes still live in this page.
    live: usize,
    /// The document's base page is never returned while the arena lives.
    pinned: bool,
}

impl Page {
    fn capacity(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }
}

/// A page-based arena bound to one backing allocator.
pub(crate) struct Arena {
    allocator: Rc<dyn Allocator>,
    pages: Vec<Page>,
    /// Index of the current bump page, if any.
    current: Option<usize>,
}

impl Arena {
    /// Create an arena and allocate its base page.
    ///
    /// The base page holds the document's own bookkeeping and is retained
    /// until the arena is dropped; content allocations open fresh pages.
    pub(crate) fn new(allocator: Rc<dyn Allocator>) -> Result<Arena, ArenaError> {
        let size = PAGE_BUCKETS[0];
        let data = allocator
            .allocate(size)
            .ok_or(ArenaError::OutOfMemory { requested: size })?;
        let base = Page {
            data: Some(data),
            bump: size, // fully reserved
            live: size,
            pinned: true,
        };
        Ok(Arena {
            allocator,
            pages: vec![base],
            current: None,
        })
    }

    /// Allocate `len` bytes. Never returns a zero-capacity block for a
    /// non-zero request; fails only when the backing allocator is exhausted.
    pub(crate) fn allocate(&mut self, len: usize) -> Result<Block, ArenaError> {
        if len > PAGE_BUCKETS[PAGE_BUCKETS.len() - 1] {
            return self.allocate_large(len);
        }

        if let Some(idx) = self.current {
            let page = &mut self.pages[idx];
            if page.bump + len <= page.capacity() {
                let offset = page.bump;
                page.bump += len;
                page.live += len;
                return Ok(Self::block(idx, offset, len));
            }
        }

        // Current page missing or full: open a fresh bucket page.
        let bucket = PAGE_BUCKETS
            .iter()
            .copied()
            .find(|&b| len <= b)
            .unwrap_or(PAGE_BUCKETS[PAGE_BUCKETS.len() - 1]);
        let idx = self.open_page(bucket, false)?;
        let page = &mut self.pages[idx];
        page.bump = len;
        page.live = len;
        self.current = Some(idx);
        Ok(Self::block(idx, 0, len))
    }

    /// Dedicated exact-size page for an oversized request.
    fn allocate_large(&mut self, len: usize) -> Result<Block, ArenaError> {
        let idx = self.open_page(len, false)?;
        let page = &mut self.pages[idx];
        page.bump = len;
        page.live = len;
        Ok(Self::block(idx, 0, len))
    }

    /// Free a block. O(1): decrements the owning page's live count and
    /// returns the page to the backing allocator when it reaches zero,
    /// unless the page is pinned or is the pending bump page.
    pub(crate) fn deallocate(&mut self, block: Block) {
        let idx = block.page as usize;
        let page = &mut self.pages[idx];
        debug_assert!(page.data.is_some(), "block points at a released page");
        debug_assert!(page.live >= block.len as usize);
        page.live = page.live.saturating_sub(block.len as usize);
        if page.live > 0 || page.pinned {
            return;
        }
        if self.current == Some(idx) {
            // Pending page: reset the cursor and keep it for reuse.
            page.bump = 0;
            return;
        }
        if let Some(data) = page.data.take() {
            self.allocator.deallocate(data);
        }
    }

    /// Read access to a block's bytes.
    pub(crate) fn get(&self, block: Block) -> &[u8] {
        match &self.pages[block.page as usize].data {
            Some(data) => {
                let start = block.offset as usize;
                &data[start..start + block.len as usize]
            }
            None => &[],
        }
    }

    /// Write access to a block's bytes.
    pub(crate) fn get_mut(&mut self, block: Block) -> &mut [u8] {
        match &mut self.pages[block.page as usize].data {
            Some(data) => {
                let start = block.offset as usize;
                &mut data[start..start + block.len as usize]
            }
            None => &mut [],
        }
    }

    /// Number of pages still holding a buffer.
    #[cfg(test)]
    pub(crate) fn live_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.data.is_some()).count()
    }

    /// Total live bytes across all pages (excluding the pinned base page).
    #[cfg(test)]
    pub(crate) fn bytes_in_use(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| !p.pinned)
            .map(|p| p.live)
            .sum()
    }

    fn open_page(&mut self, size: usize, pinned: bool) -> Result<usize, ArenaError> {
        let data = self
            .allocator
            .allocate(size)
            .ok_or(ArenaError::OutOfMemory { requested: size })?;
        // Reuse a released slot so page indices in old blocks stay unique.
        let slot = self.pages.iter().position(|p| p.data.is_none());
        let page = Page {
            data: Some(data),
            bump: 0,
            live: 0,
            pinned,
        };
        match slot {
            Some(i) => {
                self.pages[i] = page;
                Ok(i)
            }
            None => {
                self.pages.push(page);
                Ok(self.pages.len() - 1)
            }
        }
    }

    fn block(page: usize, offset: usize, len: usize) -> Block {
        Block {
            page: page as u32,
            offset: offset as u32,
            len: len as u32,
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        for page in &mut self.pages {
            if let Some(data) = page.data.take() {
                self.allocator.deallocate(data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    struct CountingAllocator {
        allocated: Cell<usize>,
        deallocated: Cell<usize>,
    }

    impl CountingAllocator {
        fn new() -> Rc<CountingAllocator> {
            Rc::new(CountingAllocator {
                allocated: Cell::new(0),
                deallocated: Cell::new(0),
            })
        }
    }

    impl Allocator for CountingAllocator {
        fn allocate(&self, size: usize) -> Option<Box<[u8]>> {
            self.allocated.set(self.allocated.get() + 1);
            Some(vec![0u8; size].into_boxed_slice())
        }

        fn deallocate(&self, block: Box<[u8]>) {
            self.deallocated.set(self.deallocated.get() + 1);
            drop(block);
        }
    }

    #[test]
    fn base_page_allocated_eagerly() {
        let counter = CountingAllocator::new();
        let arena = Arena::new(counter.clone()).unwrap();
        assert_eq!(counter.allocated.get(), 1);
        assert_eq!(arena.live_pages(), 1);
        drop(arena);
        assert_eq!(counter.deallocated.get(), 1);
    }

    #[test]
    fn small_blocks_share_a_page() {
        let counter = CountingAllocator::new();
        let mut arena = Arena::new(counter.clone()).unwrap();
        let a = arena.allocate(100).unwrap();
        let b = arena.allocate(200).unwrap();
        assert_eq!(a.page, b.page);
        assert_eq!(counter.allocated.get(), 2); // base + one content page
    }

    #[test]
    fn large_request_gets_dedicated_page() {
        let counter = CountingAllocator::new();
        let mut arena = Arena::new(counter.clone()).unwrap();
        let big = arena.allocate(200_000).unwrap();
        assert_eq!(arena.get(big).len(), 200_000);
        arena.deallocate(big);
        // Dedicated page returned immediately.
        assert_eq!(counter.deallocated.get(), 1);
    }

    #[test]
    fn pending_page_is_retained_for_reuse() {
        let counter = CountingAllocator::new();
        let mut arena = Arena::new(counter.clone()).unwrap();
        let a = arena.allocate(64).unwrap();
        arena.deallocate(a);
        assert_eq!(counter.deallocated.get(), 0);
        // Reuses the retained page rather than opening a new one.
        let b = arena.allocate(64).unwrap();
        assert_eq!(b.offset, 0);
        assert_eq!(counter.allocated.get(), 2);
    }

    #[test]
    fn block_contents_are_isolated() {
        let mut arena = Arena::new(Rc::new(SystemAllocator)).unwrap();
        let a = arena.allocate(4).unwrap();
        let b = arena.allocate(4).unwrap();
        arena.get_mut(a).copy_from_slice(b"aaaa");
        arena.get_mut(b).copy_from_slice(b"bbbb");
        assert_eq!(arena.get(a), b"aaaa");
        assert_eq!(arena.get(b), b"bbbb");
    }

    proptest! {
        /// Live byte accounting matches the sum of live block lengths, for
        /// any interleaving of allocations and frees, and nothing leaks.
        #[test]
        fn round_trip_accounting(ops in proptest::collection::vec((1usize..5000, any::<bool>()), 1..64)) {
            let counter = CountingAllocator::new();
            {
                let mut arena = Arena::new(counter.clone()).unwrap();
                let mut live: Vec<Block> = Vec::new();
                for (size, free_first) in ops {
                    if free_first && !live.is_empty() {
                        let block = live.swap_remove(0);
                        arena.deallocate(block);
                    }
                    live.push(arena.allocate(size).unwrap());
                    let expected: usize = live.iter().map(|b| b.len as usize).sum();
                    prop_assert_eq!(arena.bytes_in_use(), expected);
                }
                for block in live.drain(..) {
                    arena.deallocate(block);
                }
                prop_assert_eq!(arena.bytes_in_use(), 0);
            }
            prop_assert_eq!(counter.allocated.get(), counter.deallocated.get());
        }
    }
}
