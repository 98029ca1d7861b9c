//! Axis navigation.
//!
//! Each axis yields its sequence in axis order: forward axes in document
//! order, reverse axes nearest-first. Positional predicates index into
//! that order, so the evaluator applies them before merging the per-node
//! sequences.

use crate::dom::{Document, NodeId, NodeKind};
use crate::xpath::parser::{Axis, NodeTest};
use crate::xpath::value::XPathItem;

/// Walk one axis from `item`, keeping members that satisfy `test`.
pub(crate) fn navigate(
    doc: &Document<'_>,
    item: XPathItem,
    axis: Axis,
    test: &NodeTest,
) -> Vec<XPathItem> {
    let mut out = Vec::new();
    collect(doc, item, axis, &mut out);
    out.retain(|candidate| matches_test(doc, *candidate, axis, test));
    out
}

fn collect(doc: &Document<'_>, item: XPathItem, axis: Axis, out: &mut Vec<XPathItem>) {
    let node = item.node;
    let is_attr = item.attr.is_some();
    match axis {
        Axis::Child => {
            if !is_attr {
                out.extend(doc.children(node).map(XPathItem::node));
            }
        }
        Axis::Descendant => {
            if !is_attr {
                out.extend(doc.descendants(node).map(XPathItem::node));
            }
        }
        Axis::DescendantOrSelf => {
            out.push(item);
            if !is_attr {
                out.extend(doc.descendants(node).map(XPathItem::node));
            }
        }
        Axis::Parent => {
            if is_attr {
                out.push(XPathItem::node(node));
            } else if let Some(p) = doc.parent(node) {
                out.push(XPathItem::node(p));
            }
        }
        Axis::Ancestor => {
            // For an attribute the owning element is the nearest ancestor.
            let mut cur = if is_attr { Some(node) } else { doc.parent(node) };
            while let Some(n) = cur {
                out.push(XPathItem::node(n));
                cur = doc.parent(n);
            }
        }
        Axis::AncestorOrSelf => {
            out.push(item);
            let start = if is_attr {
                Some(node)
            } else {
                doc.parent(node)
            };
            let mut cur = start;
            while let Some(n) = cur {
                out.push(XPathItem::node(n));
                cur = doc.parent(n);
            }
        }
        Axis::SelfAxis => out.push(item),
        Axis::FollowingSibling => {
            if !is_attr {
                let mut cur = doc.next_sibling(node);
                while let Some(n) = cur {
                    out.push(XPathItem::node(n));
                    cur = doc.next_sibling(n);
                }
            }
        }
        Axis::PrecedingSibling => {
            if !is_attr {
                let mut cur = doc.prev_sibling(node);
                while let Some(n) = cur {
                    out.push(XPathItem::node(n));
                    cur = doc.prev_sibling(n);
                }
            }
        }
        Axis::Following => {
            // An attribute precedes its element's content, so following
            // starts with the element's own subtree.
            if is_attr {
                out.extend(doc.descendants(node).map(XPathItem::node));
            }
            let mut cur = node;
            loop {
                let mut sib = doc.next_sibling(cur);
                while let Some(s) = sib {
                    out.push(XPathItem::node(s));
                    out.extend(doc.descendants(s).map(XPathItem::node));
                    sib = doc.next_sibling(s);
                }
                match doc.parent(cur) {
                    Some(p) => cur = p,
                    None => break,
                }
            }
        }
        Axis::Preceding => {
            // Reverse document order, ancestors excluded.
            let mut cur = node;
            loop {
                let mut sib = doc.prev_sibling(cur);
                while let Some(s) = sib {
                    let mut subtree: Vec<NodeId> = vec![s];
                    subtree.extend(doc.descendants(s));
                    out.extend(subtree.into_iter().rev().map(XPathItem::node));
                    sib = doc.prev_sibling(s);
                }
                match doc.parent(cur) {
                    Some(p) => cur = p,
                    None => break,
                }
            }
        }
        Axis::Attribute => {
            if !is_attr {
                out.extend(
                    doc.attributes(node)
                        .map(|a| XPathItem::attribute(node, a)),
                );
            }
        }
        // Namespace nodes are not modeled; the axis is always empty.
        Axis::Namespace => {}
    }
}

/// Node test semantics. Name tests and `*` match the axis's principal
/// node type: attributes on the attribute axis, elements elsewhere.
pub(crate) fn matches_test(
    doc: &Document<'_>,
    item: XPathItem,
    axis: Axis,
    test: &NodeTest,
) -> bool {
    match test {
        NodeTest::AnyNode => true,
        NodeTest::Text => item.attr.is_none() && doc.kind(item.node) == Some(NodeKind::Text),
        NodeTest::Comment => {
            item.attr.is_none() && doc.kind(item.node) == Some(NodeKind::Comment)
        }
        NodeTest::Pi(target) => {
            if item.attr.is_some() || doc.kind(item.node) != Some(NodeKind::Pi) {
                return false;
            }
            match target {
                Some(t) => doc.name(item.node) == t,
                None => true,
            }
        }
        NodeTest::Wildcard => match item.attr {
            Some(_) => axis == Axis::Attribute,
            None => doc.kind(item.node) == Some(NodeKind::Element),
        },
        NodeTest::Name(name) => match item.attr {
            Some(attr) => axis == Axis::Attribute && doc.attr_name(attr) == name,
            None => {
                doc.kind(item.node) == Some(NodeKind::Element) && doc.name(item.node) == name
            }
        },
    }
}
