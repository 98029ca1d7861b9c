//! Query compilation and evaluation errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    /// The expression text could not be parsed.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    /// A function call names no known function.
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
    /// A known function was called with the wrong number of arguments.
    #[error("wrong number of arguments to '{name}'")]
    WrongArity { name: String },
    /// A step or function needed a node-set but got another type.
    #[error("expression does not evaluate to a node-set")]
    NotANodeSet,
}

impl XPathError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> XPathError {
        XPathError::Syntax {
            offset,
            message: message.into(),
        }
    }
}
