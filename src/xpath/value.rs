//! Query values and type coercion.
//!
//! A query evaluates to one of four types: node-set, boolean, number, or
//! string. Coercions follow XPath 1.0: a node-set's string value is the
//! string value of its first node in document order, numbers convert
//! through their string form, and NaN is falsy.

use crate::dom::{AttrId, Document, NodeId, NodeKind};

/// One member of a node-set: a tree node, or an attribute of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XPathItem {
    pub node: NodeId,
    pub attr: Option<AttrId>,
}

impl XPathItem {
    pub fn node(node: NodeId) -> XPathItem {
        XPathItem { node, attr: None }
    }

    pub fn attribute(node: NodeId, attr: AttrId) -> XPathItem {
        XPathItem {
            node,
            attr: Some(attr),
        }
    }
}

/// Result of evaluating a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Items sorted in document order, without duplicates.
    Nodes(Vec<XPathItem>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// Boolean coercion. Does not need the document.
    pub fn boolean(&self) -> bool {
        match self {
            Value::Nodes(items) => !items.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    /// Numeric coercion.
    pub fn number(&self, doc: &Document<'_>) -> f64 {
        match self {
            Value::Nodes(_) => parse_number(&self.string(doc)),
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
        }
    }

    /// String coercion.
    pub fn string(&self, doc: &Document<'_>) -> String {
        match self {
            Value::Nodes(items) => match items.first() {
                Some(item) => item_string_value(doc, *item),
                None => String::new(),
            },
            Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
        }
    }
}

/// String value of a single item: attribute value, text content, or the
/// concatenated text of an element's subtree.
pub(crate) fn item_string_value(doc: &Document<'_>, item: XPathItem) -> String {
    if let Some(attr) = item.attr {
        return doc.attr_value(attr).to_string();
    }
    match doc.kind(item.node) {
        Some(NodeKind::Element) | Some(NodeKind::Document) => {
            let mut out = String::new();
            for n in doc.descendants(item.node) {
                if doc.kind(n) == Some(NodeKind::Text) {
                    out.push_str(doc.value(n));
                }
            }
            out
        }
        Some(NodeKind::Text) | Some(NodeKind::Comment) | Some(NodeKind::Pi) => {
            doc.value(item.node).to_string()
        }
        _ => String::new(),
    }
}

/// XPath number formatting: no exponent, integers without a fraction.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// XPath number parsing: optional minus, digits, optional fraction. No
/// exponent form; anything else is NaN.
pub(crate) fn parse_number(s: &str) -> f64 {
    let t = s.trim_matches(|c: char| c.is_ascii_whitespace());
    let body = t.strip_prefix('-').unwrap_or(t);
    if body.is_empty() {
        return f64::NAN;
    }
    let mut seen_dot = false;
    let mut seen_digit = false;
    for b in body.bytes() {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => return f64::NAN,
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    t.parse().unwrap_or(f64::NAN)
}
