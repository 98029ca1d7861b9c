//! Parse failure taxonomy.

use std::fmt;

use thiserror::Error;

/// What went wrong during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// `<` followed by something that is not a tag.
    UnrecognizedTag,
    /// Malformed processing instruction or XML declaration.
    BadPi,
    /// Comment without a `-->` terminator.
    BadComment,
    /// CDATA section without a `]]>` terminator.
    BadCdata,
    /// Malformed or unterminated DOCTYPE.
    BadDoctype,
    /// Malformed start tag.
    BadStartElement,
    /// Malformed attribute.
    BadAttribute,
    /// Malformed end tag.
    BadEndElement,
    /// End tag name does not match the open element.
    EndElementMismatch,
    /// The document has no root element.
    NoDocumentElement,
    /// More than one root element outside fragment mode.
    MultipleRoots,
    /// Input ended with elements still open.
    UnexpectedEof,
    /// The arena could not serve an allocation during parsing.
    OutOfMemory,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseErrorKind::UnrecognizedTag => "unrecognized tag",
            ParseErrorKind::BadPi => "malformed processing instruction",
            ParseErrorKind::BadComment => "unterminated comment",
            ParseErrorKind::BadCdata => "unterminated CDATA section",
            ParseErrorKind::BadDoctype => "malformed DOCTYPE",
            ParseErrorKind::BadStartElement => "malformed start tag",
            ParseErrorKind::BadAttribute => "malformed attribute",
            ParseErrorKind::BadEndElement => "malformed end tag",
            ParseErrorKind::EndElementMismatch => "end tag does not match open element",
            ParseErrorKind::NoDocumentElement => "document has no root element",
            ParseErrorKind::MultipleRoots => "document has more than one root element",
            ParseErrorKind::UnexpectedEof => "unexpected end of input",
            ParseErrorKind::OutOfMemory => "out of memory",
        };
        f.write_str(msg)
    }
}

/// A parse failure with the byte offset where it was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, offset: usize) -> ParseError {
        ParseError { kind, offset }
    }
}
