//! In-place markup parser.
//!
//! The parser walks the buffer with memchr, builds nodes directly in the
//! document, and decodes entities by rewriting text and attribute value
//! ranges in place. Decoded output is never longer than its source, so the
//! write cursor can never overtake the read cursor. Node names and values
//! are stored as spans into the buffer; the document takes ownership of the
//! buffer after the parser returns.

use memchr::{memchr, memchr2};

use crate::dom::{Document, NodeKind, ROOT};
use crate::parse::{ParseError, ParseErrorKind, ParseOptions};

pub(crate) fn run_parser(
    doc: &mut Document<'_>,
    buf: &mut [u8],
    options: ParseOptions,
) -> Result<(), ParseError> {
    let parser = Parser {
        doc,
        buf,
        pos: 0,
        options,
        stack: vec![StackEntry {
            idx: ROOT,
            name: (0, 0),
            last_text: None,
        }],
        seen_root_element: false,
    };
    parser.run()
}

struct StackEntry {
    idx: u32,
    /// Name span of the open element, for end tag matching.
    name: (usize, usize),
    /// Most recent text child and its span, for text merging.
    last_text: Option<(u32, usize, usize)>,
}

struct Parser<'a, 'd, 'buf> {
    doc: &'d mut Document<'buf>,
    buf: &'a mut [u8],
    pos: usize,
    options: ParseOptions,
    stack: Vec<StackEntry>,
    seen_root_element: bool,
}

impl Parser<'_, '_, '_> {
    fn run(mut self) -> Result<(), ParseError> {
        loop {
            let tag = memchr(b'<', &self.buf[self.pos..]).map(|i| self.pos + i);
            let text_end = tag.unwrap_or(self.buf.len());
            if text_end > self.pos {
                let start = self.pos;
                self.text(start, text_end, self.options.contains(ParseOptions::DECODE_ENTITIES))?;
            }
            let Some(tag) = tag else { break };
            self.pos = tag;
            match self.buf.get(tag + 1) {
                None => return Err(ParseError::new(ParseErrorKind::UnexpectedEof, tag)),
                Some(b'/') => self.end_tag()?,
                Some(b'!') => self.exclamation()?,
                Some(b'?') => self.question()?,
                Some(&b) if is_name_start_char(b) => self.start_tag()?,
                Some(_) => return Err(ParseError::new(ParseErrorKind::UnrecognizedTag, tag)),
            }
        }
        if self.stack.len() > 1 {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedEof,
                self.buf.len(),
            ));
        }
        if !self.options.contains(ParseOptions::FRAGMENT)
            && self.doc.document_element().is_none()
        {
            return Err(ParseError::new(
                ParseErrorKind::NoDocumentElement,
                self.buf.len(),
            ));
        }
        Ok(())
    }

    // ---- text ----

    /// Handle a text run at `[start, end)`. `decode` selects entity
    /// decoding; CDATA content comes through with it disabled.
    fn text(&mut self, start: usize, end: usize, decode: bool) -> Result<(), ParseError> {
        let top = self.stack.len() - 1;
        let parent = self.stack[top].idx;
        // Top-level character data belongs to no element; only fragment
        // mode keeps it.
        if parent == ROOT && !self.options.contains(ParseOptions::FRAGMENT) {
            return Ok(());
        }

        let (mut start, mut len) = if memchr2(b'&', b'\r', &self.buf[start..end]).is_none() {
            (start, end - start)
        } else {
            (start, decode_range(self.buf, start, end, decode))
        };

        if self.options.contains(ParseOptions::TRIM_TEXT) {
            while len > 0 && self.buf[start].is_ascii_whitespace() {
                start += 1;
                len -= 1;
            }
            while len > 0 && self.buf[start + len - 1].is_ascii_whitespace() {
                len -= 1;
            }
        }
        let all_ws = self.buf[start..start + len]
            .iter()
            .all(|b| b.is_ascii_whitespace());
        if len == 0 || (all_ws && !self.options.contains(ParseOptions::KEEP_WS_TEXT)) {
            return Ok(());
        }

        if self.options.contains(ParseOptions::MERGE_TEXT) {
            if let Some((node, prev_start, prev_len)) = self.stack[top].last_text {
                // Slide this piece down next to the previous one. The gap
                // holds markup that has already been consumed.
                let dest = prev_start + prev_len;
                self.buf.copy_within(start..start + len, dest);
                let merged = prev_len + len;
                self.doc.set_span_value(node, prev_start, merged);
                self.stack[top].last_text = Some((node, prev_start, merged));
                return Ok(());
            }
        }

        let idx = self.doc.alloc_node(NodeKind::Text);
        self.doc.set_span_value(idx, start, len);
        self.doc.link_child_last(parent, idx);
        self.stack[top].last_text = Some((idx, start, len));
        Ok(())
    }

    // ---- tags ----

    fn start_tag(&mut self) -> Result<(), ParseError> {
        let tag = self.pos;
        self.pos += 1;
        let (ns, nl) = self
            .read_name()
            .ok_or(ParseError::new(ParseErrorKind::BadStartElement, tag))?;

        let parent = match self.stack.last() {
            Some(entry) => entry.idx,
            None => ROOT,
        };
        if parent == ROOT {
            if self.seen_root_element && !self.options.contains(ParseOptions::FRAGMENT) {
                return Err(ParseError::new(ParseErrorKind::MultipleRoots, tag));
            }
            self.seen_root_element = true;
        }

        let idx = self.doc.alloc_node(NodeKind::Element);
        self.doc.set_span_name(idx, ns, nl);
        self.doc.link_child_last(parent, idx);
        if let Some(top) = self.stack.last_mut() {
            top.last_text = None;
        }

        loop {
            self.skip_whitespace();
            match self.buf.get(self.pos) {
                None => return Err(ParseError::new(ParseErrorKind::UnexpectedEof, self.pos)),
                Some(b'>') => {
                    self.pos += 1;
                    self.stack.push(StackEntry {
                        idx,
                        name: (ns, nl),
                        last_text: None,
                    });
                    return Ok(());
                }
                Some(b'/') => {
                    if self.buf.get(self.pos + 1) != Some(&b'>') {
                        return Err(ParseError::new(
                            ParseErrorKind::BadStartElement,
                            self.pos,
                        ));
                    }
                    self.pos += 2;
                    return Ok(());
                }
                Some(&b) if is_name_start_char(b) => {
                    self.attribute(Some(idx))?;
                }
                Some(_) => {
                    return Err(ParseError::new(ParseErrorKind::BadStartElement, self.pos))
                }
            }
        }
    }

    fn end_tag(&mut self) -> Result<(), ParseError> {
        let tag = self.pos;
        self.pos += 2;
        let (ns, nl) = self
            .read_name()
            .ok_or(ParseError::new(ParseErrorKind::BadEndElement, tag))?;
        self.skip_whitespace();
        if self.buf.get(self.pos) != Some(&b'>') {
            return Err(ParseError::new(ParseErrorKind::BadEndElement, self.pos));
        }
        self.pos += 1;

        if self.stack.len() == 1 {
            return Err(ParseError::new(ParseErrorKind::EndElementMismatch, tag));
        }
        let (es, el) = match self.stack.last() {
            Some(entry) => entry.name,
            None => (0, 0),
        };
        if self.buf[ns..ns + nl] != self.buf[es..es + el] {
            return Err(ParseError::new(ParseErrorKind::EndElementMismatch, tag));
        }
        self.stack.pop();
        Ok(())
    }

    fn exclamation(&mut self) -> Result<(), ParseError> {
        let tag = self.pos;
        if self.starts_with(b"<!--") {
            let content = tag + 4;
            let end = find(self.buf, content, b"-->")
                .ok_or(ParseError::new(ParseErrorKind::BadComment, tag))?;
            if self.options.contains(ParseOptions::KEEP_COMMENTS) {
                let top = self.stack.len() - 1;
                let parent = self.stack[top].idx;
                let idx = self.doc.alloc_node(NodeKind::Comment);
                self.doc.set_span_value(idx, content, end - content);
                self.doc.link_child_last(parent, idx);
                self.stack[top].last_text = None;
            }
            self.pos = end + 3;
            Ok(())
        } else if self.starts_with(b"<![CDATA[") {
            let content = tag + 9;
            let end = find(self.buf, content, b"]]>")
                .ok_or(ParseError::new(ParseErrorKind::BadCdata, tag))?;
            self.pos = end + 3;
            if self.options.contains(ParseOptions::CDATA_AS_TEXT) && end > content {
                // CDATA content is literal: no entity decoding.
                self.text(content, end, false)?;
            }
            Ok(())
        } else if self.starts_with(b"<!DOCTYPE") {
            if self.stack.len() != 1 {
                return Err(ParseError::new(ParseErrorKind::BadDoctype, tag));
            }
            // Skip to the matching '>', tracking nesting for the internal
            // subset.
            let mut depth = 0usize;
            let mut pos = tag;
            while pos < self.buf.len() {
                match self.buf[pos] {
                    b'<' => depth += 1,
                    b'>' => {
                        depth -= 1;
                        if depth == 0 {
                            self.pos = pos + 1;
                            return Ok(());
                        }
                    }
                    _ => {}
                }
                pos += 1;
            }
            Err(ParseError::new(ParseErrorKind::BadDoctype, tag))
        } else {
            Err(ParseError::new(ParseErrorKind::UnrecognizedTag, tag))
        }
    }

    fn question(&mut self) -> Result<(), ParseError> {
        let tag = self.pos;
        self.pos += 2;
        let (ns, nl) = self
            .read_name()
            .ok_or(ParseError::new(ParseErrorKind::BadPi, tag))?;

        if self.buf[ns..ns + nl].eq_ignore_ascii_case(b"xml") {
            return self.declaration(tag, ns, nl);
        }

        self.skip_whitespace();
        let vstart = self.pos;
        let vend =
            find(self.buf, vstart, b"?>").ok_or(ParseError::new(ParseErrorKind::BadPi, tag))?;
        self.pos = vend + 2;
        if self.options.contains(ParseOptions::KEEP_PI) {
            let top = self.stack.len() - 1;
            let parent = self.stack[top].idx;
            let idx = self.doc.alloc_node(NodeKind::Pi);
            self.doc.set_span_name(idx, ns, nl);
            self.doc.set_span_value(idx, vstart, vend - vstart);
            self.doc.link_child_last(parent, idx);
            self.stack[top].last_text = None;
        }
        Ok(())
    }

    fn declaration(&mut self, tag: usize, ns: usize, nl: usize) -> Result<(), ParseError> {
        if self.stack.len() != 1 {
            return Err(ParseError::new(ParseErrorKind::BadPi, tag));
        }
        let node = if self.options.contains(ParseOptions::KEEP_DECLARATION) {
            let idx = self.doc.alloc_node(NodeKind::Declaration);
            self.doc.set_span_name(idx, ns, nl);
            self.doc.link_child_last(ROOT, idx);
            Some(idx)
        } else {
            None
        };
        loop {
            self.skip_whitespace();
            if self.starts_with(b"?>") {
                self.pos += 2;
                return Ok(());
            }
            match self.buf.get(self.pos) {
                Some(&b) if is_name_start_char(b) => self.attribute(node)?,
                _ => return Err(ParseError::new(ParseErrorKind::BadPi, self.pos)),
            }
        }
    }

    /// Parse one `name="value"` pair at the cursor. `node` is `None` when
    /// the owner is being discarded.
    fn attribute(&mut self, node: Option<u32>) -> Result<(), ParseError> {
        let at = self.pos;
        let (ans, anl) = self
            .read_name()
            .ok_or(ParseError::new(ParseErrorKind::BadAttribute, at))?;
        self.skip_whitespace();
        if self.buf.get(self.pos) != Some(&b'=') {
            return Err(ParseError::new(ParseErrorKind::BadAttribute, self.pos));
        }
        self.pos += 1;
        self.skip_whitespace();
        let quote = match self.buf.get(self.pos) {
            Some(&q @ (b'"' | b'\'')) => q,
            _ => return Err(ParseError::new(ParseErrorKind::BadAttribute, self.pos)),
        };
        let vstart = self.pos + 1;
        let vend = memchr(quote, &self.buf[vstart..])
            .map(|i| vstart + i)
            .ok_or(ParseError::new(ParseErrorKind::BadAttribute, at))?;
        let decode = self.options.contains(ParseOptions::DECODE_ENTITIES);
        let len = if memchr2(b'&', b'\r', &self.buf[vstart..vend]).is_none() {
            vend - vstart
        } else {
            decode_range(self.buf, vstart, vend, decode)
        };
        self.pos = vend + 1;
        if let Some(n) = node {
            self.doc.add_span_attr(n, (ans, anl), (vstart, len));
        }
        Ok(())
    }

    // ---- low-level scanning ----

    fn read_name(&mut self) -> Option<(usize, usize)> {
        let start = self.pos;
        match self.buf.get(start) {
            Some(&b) if is_name_start_char(b) => {}
            _ => return None,
        }
        self.pos += 1;
        while self
            .buf
            .get(self.pos)
            .is_some_and(|&b| is_name_char(b))
        {
            self.pos += 1;
        }
        Some((start, self.pos - start))
    }

    fn skip_whitespace(&mut self) {
        while self
            .buf
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn starts_with(&self, needle: &[u8]) -> bool {
        self.buf[self.pos..].starts_with(needle)
    }
}

/// Find `needle` at or after `from`.
fn find(buf: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    let mut pos = from;
    while pos + needle.len() <= buf.len() {
        let i = memchr(needle[0], &buf[pos..])? + pos;
        if buf[i..].starts_with(needle) {
            return Some(i);
        }
        pos = i + 1;
    }
    None
}

/// Rewrite `[start, end)` in place: normalize line endings and, when
/// `decode` is set, expand entity references. Returns the decoded length;
/// the result occupies `[start, start + len)`.
fn decode_range(buf: &mut [u8], start: usize, end: usize, decode: bool) -> usize {
    let mut read = start;
    let mut write = start;
    while read < end {
        match buf[read] {
            b'\r' => {
                buf[write] = b'\n';
                write += 1;
                read += 1;
                if read < end && buf[read] == b'\n' {
                    read += 1;
                }
            }
            b'&' if decode => match decode_entity(&buf[read..end]) {
                Some((bytes, count, consumed)) => {
                    buf[write..write + count].copy_from_slice(&bytes[..count]);
                    write += count;
                    read += consumed;
                }
                None => {
                    buf[write] = b'&';
                    write += 1;
                    read += 1;
                }
            },
            b => {
                buf[write] = b;
                write += 1;
                read += 1;
            }
        }
    }
    write - start
}

/// Decode one entity reference at the start of `input`. Returns the UTF-8
/// bytes, their count, and the source length consumed. `None` leaves the
/// reference literal, matching lenient handling of stray ampersands.
fn decode_entity(input: &[u8]) -> Option<([u8; 4], usize, usize)> {
    let semi = memchr(b';', input)?;
    let body = &input[1..semi];
    let consumed = semi + 1;
    let put = |b: u8| -> ([u8; 4], usize, usize) { ([b, 0, 0, 0], 1, consumed) };
    match body {
        b"lt" => Some(put(b'<')),
        b"gt" => Some(put(b'>')),
        b"amp" => Some(put(b'&')),
        b"quot" => Some(put(b'"')),
        b"apos" => Some(put(b'\'')),
        _ => {
            let rest = body.strip_prefix(b"#")?;
            let code = if let Some(hex) = rest.strip_prefix(b"x").or(rest.strip_prefix(b"X")) {
                u32::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?
            } else {
                std::str::from_utf8(rest).ok()?.parse::<u32>().ok()?
            };
            let ch = char::from_u32(code)?;
            let mut bytes = [0u8; 4];
            let count = ch.encode_utf8(&mut bytes).len();
            Some((bytes, count, consumed))
        }
    }
}

/// XML name start: ASCII letters, underscore, colon, or any non-ASCII byte.
#[inline]
fn is_name_start_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

/// XML name continuation characters.
#[inline]
fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b':') || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_named_and_numeric_entities() {
        let mut buf = b"a &lt;&#65;&#x42;&amp; z".to_vec();
        let end = buf.len();
        let len = decode_range(&mut buf, 0, end, true);
        assert_eq!(&buf[..len], b"a <AB& z");
    }

    #[test]
    fn unknown_entities_stay_literal() {
        let mut buf = b"&nope; &unterminated".to_vec();
        let end = buf.len();
        let len = decode_range(&mut buf, 0, end, true);
        assert_eq!(&buf[..len], b"&nope; &unterminated");
    }

    #[test]
    fn line_endings_normalize() {
        let mut buf = b"a\r\nb\rc".to_vec();
        let end = buf.len();
        let len = decode_range(&mut buf, 0, end, true);
        assert_eq!(&buf[..len], b"a\nb\nc");
    }

    #[test]
    fn find_handles_repeated_prefixes() {
        assert_eq!(find(b"--- -->", 0, b"-->"), Some(4));
        assert_eq!(find(b"no terminator", 0, b"-->"), None);
    }
}
