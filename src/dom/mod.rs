//! Document tree: nodes, attributes, text storage, and mutation.

mod document;
mod node;
mod strings;

pub use document::{Attributes, Children, Descendants, Document, DomError};
pub use node::{AttrId, NodeId, NodeKind};

pub(crate) use document::ROOT;
