//! Parse option flags.

use std::ops::BitOr;

/// Bit set controlling which constructs the parser keeps and how text is
/// treated. Combine flags with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions(u32);

impl ParseOptions {
    /// Elements, attributes, and text only.
    pub const MINIMAL: ParseOptions = ParseOptions(0);
    /// Keep processing instructions as nodes.
    pub const KEEP_PI: ParseOptions = ParseOptions(1 << 0);
    /// Keep comments as nodes.
    pub const KEEP_COMMENTS: ParseOptions = ParseOptions(1 << 1);
    /// Keep the XML declaration as a node with its prolog attributes.
    pub const KEEP_DECLARATION: ParseOptions = ParseOptions(1 << 2);
    /// Turn CDATA sections into text nodes. Without this flag their
    /// content is dropped.
    pub const CDATA_AS_TEXT: ParseOptions = ParseOptions(1 << 3);
    /// Decode character and named entity references in text and
    /// attribute values.
    pub const DECODE_ENTITIES: ParseOptions = ParseOptions(1 << 4);
    /// Strip leading and trailing whitespace from text nodes.
    pub const TRIM_TEXT: ParseOptions = ParseOptions(1 << 5);
    /// Keep text nodes that consist of whitespace only.
    pub const KEEP_WS_TEXT: ParseOptions = ParseOptions(1 << 6);
    /// Merge adjacent text pieces (around skipped comments, CDATA
    /// boundaries) into one text node.
    pub const MERGE_TEXT: ParseOptions = ParseOptions(1 << 7);
    /// Fragment mode: allow multiple root elements and top-level text.
    pub const FRAGMENT: ParseOptions = ParseOptions(1 << 8);

    pub fn contains(self, other: ParseOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions::DECODE_ENTITIES | ParseOptions::CDATA_AS_TEXT
    }
}

impl BitOr for ParseOptions {
    type Output = ParseOptions;

    fn bitor(self, rhs: ParseOptions) -> ParseOptions {
        ParseOptions(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_test() {
        let opts = ParseOptions::KEEP_PI | ParseOptions::KEEP_COMMENTS;
        assert!(opts.contains(ParseOptions::KEEP_PI));
        assert!(opts.contains(ParseOptions::KEEP_COMMENTS));
        assert!(!opts.contains(ParseOptions::FRAGMENT));
        assert!(opts.contains(ParseOptions::MINIMAL));
    }

    #[test]
    fn default_decodes_entities_and_keeps_cdata() {
        let opts = ParseOptions::default();
        assert!(opts.contains(ParseOptions::DECODE_ENTITIES));
        assert!(opts.contains(ParseOptions::CDATA_AS_TEXT));
        assert!(!opts.contains(ParseOptions::KEEP_COMMENTS));
    }
}
