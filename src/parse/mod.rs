//! Markup parsing: options, errors, and the in-place parser.

mod error;
mod options;
mod parser;

pub use error::{ParseError, ParseErrorKind};
pub use options::ParseOptions;

pub(crate) use parser::run_parser;
