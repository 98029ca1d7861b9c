//! xylem - In-memory XML document model with an XPath 1.0 query engine
//!
//! The tree lives in slab storage with generation-checked handles, long
//! strings go through a page-based arena, and parsing mutates the input
//! buffer in place so text spans borrow instead of copy.
//!
//! ```
//! use xylem::Document;
//!
//! let doc = Document::parse("<library><book year='1974'/></library>").unwrap();
//! let hits = doc.select_nodes("//book[@year > 1970]", doc.root()).unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

mod arena;
mod dom;
mod parse;
pub mod serialize;
mod xpath;

pub use arena::{Allocator, ArenaError, SystemAllocator};
pub use dom::{Attributes, AttrId, Children, Descendants, Document, DomError, NodeId, NodeKind};
pub use parse::{ParseError, ParseErrorKind, ParseOptions};
pub use xpath::{Query, Value, XPathError, XPathItem};
