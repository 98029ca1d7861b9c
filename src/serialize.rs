//! Markup output: turn a tree back into XML text.

use crate::dom::{Document, NodeId, NodeKind};

/// Serialize the whole document, children of the root in order.
pub fn serialize_document(doc: &Document<'_>) -> String {
    let mut out = String::new();
    for child in doc.children(doc.root()) {
        write_node(doc, child, &mut out);
    }
    out
}

/// Serialize one node and its subtree.
pub fn serialize_node(doc: &Document<'_>, node: NodeId) -> String {
    let mut out = String::new();
    match doc.kind(node) {
        Some(NodeKind::Document) => {
            for child in doc.children(node) {
                write_node(doc, child, &mut out);
            }
        }
        Some(_) => write_node(doc, node, &mut out),
        None => {}
    }
    out
}

enum WalkOp {
    Open(NodeId),
    Close(NodeId),
}

// Explicit work stack: document depth must not become call stack depth.
fn write_node(doc: &Document<'_>, node: NodeId, out: &mut String) {
    let mut stack = vec![WalkOp::Open(node)];
    while let Some(op) = stack.pop() {
        let n = match op {
            WalkOp::Close(n) => {
                out.push_str("</");
                out.push_str(doc.name(n));
                out.push('>');
                continue;
            }
            WalkOp::Open(n) => n,
        };
        match doc.kind(n) {
            Some(NodeKind::Element) => {
                out.push('<');
                out.push_str(doc.name(n));
                write_attrs(doc, n, out);
                if doc.first_child(n).is_none() {
                    out.push_str(" />");
                    continue;
                }
                out.push('>');
                stack.push(WalkOp::Close(n));
                let children: Vec<NodeId> = doc.children(n).collect();
                for child in children.into_iter().rev() {
                    stack.push(WalkOp::Open(child));
                }
            }
            Some(NodeKind::Text) => escape_text(doc.value(n), out),
            Some(NodeKind::Comment) => {
                out.push_str("<!--");
                out.push_str(doc.value(n));
                out.push_str("-->");
            }
            Some(NodeKind::Pi) => {
                out.push_str("<?");
                out.push_str(doc.name(n));
                let value = doc.value(n);
                if !value.is_empty() {
                    out.push(' ');
                    out.push_str(value);
                }
                out.push_str("?>");
            }
            Some(NodeKind::Declaration) => {
                out.push_str("<?");
                out.push_str(doc.name(n));
                write_attrs(doc, n, out);
                out.push_str("?>");
            }
            Some(NodeKind::Document) | None => {}
        }
    }
}

fn write_attrs(doc: &Document<'_>, node: NodeId, out: &mut String) {
    for attr in doc.attributes(node) {
        out.push(' ');
        out.push_str(doc.attr_name(attr));
        out.push_str("=\"");
        escape_attr(doc.attr_value(attr), out);
        out.push('"');
    }
}

fn escape_text(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_serializes() {
        let mut doc = Document::new();
        let root = doc.root();
        let top = doc.append_child(root, NodeKind::Element).unwrap();
        doc.set_name(top, "top").unwrap();
        doc.append_attribute(top, "q", "a\"b").unwrap();
        let text = doc.append_child(top, NodeKind::Text).unwrap();
        doc.set_value(text, "1 < 2 & 3").unwrap();
        let empty = doc.append_child(top, NodeKind::Element).unwrap();
        doc.set_name(empty, "empty").unwrap();

        assert_eq!(
            serialize_document(&doc),
            "<top q=\"a&quot;b\">1 &lt; 2 &amp; 3<empty /></top>"
        );
    }

    #[test]
    fn serializes_prolog_nodes() {
        let mut doc = Document::new();
        let root = doc.root();
        let decl = doc.append_child(root, NodeKind::Declaration).unwrap();
        doc.set_name(decl, "xml").unwrap();
        doc.append_attribute(decl, "version", "1.0").unwrap();
        let top = doc.append_child(root, NodeKind::Element).unwrap();
        doc.set_name(top, "r").unwrap();
        let pi = doc.append_child(top, NodeKind::Pi).unwrap();
        doc.set_name(pi, "php").unwrap();
        doc.set_value(pi, "echo 1;").unwrap();
        let comment = doc.append_child(top, NodeKind::Comment).unwrap();
        doc.set_value(comment, " note ").unwrap();

        assert_eq!(
            serialize_document(&doc),
            "<?xml version=\"1.0\"?><r><?php echo 1;?><!-- note --></r>"
        );
    }

    #[test]
    fn serializes_deeply_nested_documents() {
        let mut doc = Document::new();
        let mut cur = doc.root();
        for _ in 0..100_000 {
            cur = doc.append_child(cur, NodeKind::Element).unwrap();
            doc.set_name(cur, "d").unwrap();
        }
        let out = serialize_document(&doc);
        assert!(out.starts_with("<d><d>"));
        assert!(out.contains("<d />"));
        assert!(out.ends_with("</d></d>"));
        assert_eq!(out.len(), 99_999 * 7 + 5);
    }
}
