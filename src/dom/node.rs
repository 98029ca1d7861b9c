//! Node and attribute storage types.

use crate::dom::strings::TextSlot;

/// Generation-checked handle to a node.
///
/// Handles survive unrelated mutations but are invalidated when their node is
/// removed; a stale handle is detected by its generation and rejected rather
/// than silently resolving to a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) gen: u32,
}

/// Generation-checked handle to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrId {
    pub(crate) index: u32,
    pub(crate) gen: u32,
}

/// The kind of a node. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The document root. Exactly one per document, cannot be created or
    /// removed by callers.
    Document,
    /// An element with a tag name, attributes, and children.
    Element,
    /// Character data.
    Text,
    /// A comment.
    Comment,
    /// A processing instruction with a target name and a value.
    Pi,
    /// The XML declaration. Prolog attributes such as `version` live on it.
    Declaration,
}

impl NodeKind {
    /// Kinds that may hold children.
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Document | NodeKind::Element)
    }

    /// Kinds with a meaningful name.
    pub fn has_name(self) -> bool {
        matches!(self, NodeKind::Element | NodeKind::Pi | NodeKind::Declaration)
    }

    /// Kinds with a meaningful value.
    pub fn has_value(self) -> bool {
        matches!(self, NodeKind::Text | NodeKind::Comment | NodeKind::Pi)
    }

    /// Kinds that may carry attributes.
    pub fn has_attributes(self) -> bool {
        matches!(self, NodeKind::Element | NodeKind::Declaration)
    }
}

/// One tree node. Links are slot indices; `u32::MAX` (`NIL`) means absent.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) name: TextSlot,
    pub(crate) value: TextSlot,
    pub(crate) parent: u32,
    pub(crate) first_child: u32,
    pub(crate) last_child: u32,
    pub(crate) prev_sibling: u32,
    pub(crate) next_sibling: u32,
    pub(crate) first_attr: u32,
    pub(crate) last_attr: u32,
}

pub(crate) const NIL: u32 = u32::MAX;

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Node {
        Node {
            kind,
            name: TextSlot::Empty,
            value: TextSlot::Empty,
            parent: NIL,
            first_child: NIL,
            last_child: NIL,
            prev_sibling: NIL,
            next_sibling: NIL,
            first_attr: NIL,
            last_attr: NIL,
        }
    }
}

/// One attribute. Attributes of a node form a doubly-linked list so removal
/// in the middle stays O(1).
#[derive(Debug)]
pub(crate) struct Attr {
    pub(crate) name: TextSlot,
    pub(crate) value: TextSlot,
    pub(crate) prev: u32,
    pub(crate) next: u32,
}

impl Attr {
    pub(crate) fn new() -> Attr {
        Attr {
            name: TextSlot::Empty,
            value: TextSlot::Empty,
            prev: NIL,
            next: NIL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_capabilities() {
        assert!(NodeKind::Document.is_container());
        assert!(NodeKind::Element.is_container());
        assert!(!NodeKind::Text.is_container());

        assert!(NodeKind::Element.has_name());
        assert!(NodeKind::Pi.has_name());
        assert!(!NodeKind::Text.has_name());
        assert!(!NodeKind::Comment.has_name());

        assert!(NodeKind::Text.has_value());
        assert!(NodeKind::Pi.has_value());
        assert!(!NodeKind::Element.has_value());

        assert!(NodeKind::Element.has_attributes());
        assert!(NodeKind::Declaration.has_attributes());
        assert!(!NodeKind::Pi.has_attributes());
    }

    #[test]
    fn handles_compare_by_index_and_generation() {
        let a = NodeId { index: 3, gen: 1 };
        let b = NodeId { index: 3, gen: 2 };
        assert_ne!(a, b);
        assert_eq!(a, NodeId { index: 3, gen: 1 });
    }
}
