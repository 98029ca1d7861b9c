//! Text storage for node names and values.
//!
//! A name or value is stored one of three ways: as a span into the parse
//! buffer when it came from in-place parsing, inline in the node when it is
//! short, or in an arena block otherwise. Spans keep in-place parsing
//! zero-copy; inline storage keeps short `set_name`/`set_value` calls from
//! touching the arena at all.

use smallvec::SmallVec;

use crate::arena::Block;

/// Longest byte string stored inline in a node or attribute.
pub(crate) const INLINE_CAP: usize = 22;

#[derive(Debug, Default)]
pub(crate) enum TextSlot {
    /// No text. Reads as "".
    #[default]
    Empty,
    /// Short string held directly in the slot.
    Inline(SmallVec<[u8; INLINE_CAP]>),
    /// Range of the document's parse buffer (decoded in place).
    Span { offset: u32, len: u32 },
    /// Arena-allocated string.
    Heap(Block),
}

impl TextSlot {
    pub(crate) fn inline(bytes: &[u8]) -> TextSlot {
        debug_assert!(bytes.len() <= INLINE_CAP);
        TextSlot::Inline(SmallVec::from_slice(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_holds_short_strings_without_spilling() {
        let slot = TextSlot::inline(b"version");
        match slot {
            TextSlot::Inline(bytes) => {
                assert_eq!(&bytes[..], b"version");
                assert!(!bytes.spilled());
            }
            _ => panic!("expected inline storage"),
        }
    }
}
