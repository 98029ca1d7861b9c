//! Backing allocator abstraction.
//!
//! The arena obtains whole pages from an [`Allocator`] and returns them when
//! their last live block is freed. Callers inject an allocator at document
//! construction; the default [`SystemAllocator`] uses the global heap.

use std::fmt;

use thiserror::Error;

/// Supplies and reclaims page-sized byte buffers for an arena.
///
/// An allocator instance is captured when a `Document` is constructed and is
/// used for every page of that document's arena. Two allocator instances must
/// never be mixed for one document's lifetime: every page handed out by
/// `allocate` is returned to the *same* allocator via `deallocate`. Replacing
/// the allocator passed to new documents does not affect documents that
/// captured a previous one.
pub trait Allocator {
    /// Allocate a zeroed buffer of exactly `size` bytes.
    ///
    /// Returns `None` when the backing store is exhausted; the arena turns
    /// this into [`ArenaError::OutOfMemory`], which is fatal to the operation
    /// in progress.
    fn allocate(&self, size: usize) -> Option<Box<[u8]>>;

    /// Reclaim a buffer previously returned by `allocate`.
    fn deallocate(&self, block: Box<[u8]>);
}

/// Default allocator backed by the global heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Option<Box<[u8]>> {
        Some(vec![0u8; size].into_boxed_slice())
    }

    fn deallocate(&self, block: Box<[u8]>) {
        drop(block);
    }
}

impl fmt::Debug for dyn Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Allocator")
    }
}

/// Errors raised by the arena.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The backing allocator refused a page request. Fatal to the operation
    /// in progress; partially built state is discarded by the caller.
    #[error("arena out of memory: requested {requested} bytes")]
    OutOfMemory {
        /// Number of bytes requested from the backing allocator.
        requested: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_allocator_round_trip() {
        let alloc = SystemAllocator;
        let block = alloc.allocate(128).unwrap();
        assert_eq!(block.len(), 128);
        assert!(block.iter().all(|&b| b == 0));
        alloc.deallocate(block);
    }
}
