//! Parsing, tree surgery, and output through the public API.

use xylem::serialize::{serialize_document, serialize_node};
use xylem::{Document, NodeKind, ParseErrorKind, ParseOptions};

#[test]
fn parses_and_navigates() {
    let doc = Document::parse(
        "<library name='city'><book year='1974'>title</book><book year='2001'/></library>",
    )
    .unwrap();
    let library = doc.document_element().unwrap();
    assert_eq!(doc.name(library), "library");
    let name = doc.attribute(library, "name").unwrap();
    assert_eq!(doc.attr_value(name), "city");

    let books: Vec<_> = doc.children(library).collect();
    assert_eq!(books.len(), 2);
    assert_eq!(doc.child_value(books[0]), "title");
    assert_eq!(doc.parent(books[1]), Some(library));
    assert_eq!(doc.next_sibling(books[0]), Some(books[1]));
    assert_eq!(doc.prev_sibling(books[1]), Some(books[0]));
}

#[test]
fn entities_and_line_endings_decode_by_default() {
    let doc = Document::parse("<n a='&lt;&#65;&gt;'>one&amp;\r\ntwo</n>").unwrap();
    let n = doc.document_element().unwrap();
    let a = doc.attribute(n, "a").unwrap();
    assert_eq!(doc.attr_value(a), "<A>");
    assert_eq!(doc.child_value(n), "one&\ntwo");
}

#[test]
fn cdata_becomes_text() {
    let doc = Document::parse("<n><![CDATA[1 < 2 & 3]]></n>").unwrap();
    assert_eq!(doc.child_value(doc.document_element().unwrap()), "1 < 2 & 3");
}

#[test]
fn prolog_nodes_are_skipped_unless_asked_for() {
    let text = "<?xml version='1.0'?><!-- note --><n><?pi data?></n>";
    let doc = Document::parse(text).unwrap();
    assert_eq!(doc.node_count(), 2);

    let options = ParseOptions::default()
        | ParseOptions::KEEP_DECLARATION
        | ParseOptions::KEEP_COMMENTS
        | ParseOptions::KEEP_PI;
    let doc = Document::parse_with_options(text, options).unwrap();
    let kinds: Vec<_> = doc
        .descendants(doc.root())
        .filter_map(|n| doc.kind(n))
        .collect();
    assert_eq!(
        kinds,
        vec![
            NodeKind::Declaration,
            NodeKind::Comment,
            NodeKind::Element,
            NodeKind::Pi
        ]
    );
}

#[test]
fn whitespace_and_trimming_options() {
    let text = "<a>  <b>  padded  </b>  </a>";
    let doc = Document::parse(text).unwrap();
    let a = doc.document_element().unwrap();
    // Whitespace-only runs are dropped, interior text survives untouched.
    assert_eq!(doc.children(a).count(), 1);
    assert_eq!(doc.child_value(doc.child(a, "b").unwrap()), "  padded  ");

    let doc =
        Document::parse_with_options(text, ParseOptions::default() | ParseOptions::TRIM_TEXT)
            .unwrap();
    let a = doc.document_element().unwrap();
    assert_eq!(doc.child_value(doc.child(a, "b").unwrap()), "padded");

    let doc =
        Document::parse_with_options(text, ParseOptions::default() | ParseOptions::KEEP_WS_TEXT)
            .unwrap();
    let a = doc.document_element().unwrap();
    assert_eq!(doc.children(a).count(), 3);
}

#[test]
fn fragments_allow_loose_roots() {
    assert_eq!(
        Document::parse("<a/><b/>").unwrap_err().kind,
        ParseErrorKind::MultipleRoots
    );
    let doc =
        Document::parse_with_options("<a/>text<b/>", ParseOptions::default() | ParseOptions::FRAGMENT)
            .unwrap();
    assert_eq!(doc.children(doc.root()).count(), 3);
}

#[test]
fn malformed_input_is_rejected() {
    assert_eq!(
        Document::parse("<a></b>").unwrap_err().kind,
        ParseErrorKind::EndElementMismatch
    );
    assert_eq!(
        Document::parse("<a>").unwrap_err().kind,
        ParseErrorKind::UnexpectedEof
    );
    assert_eq!(
        Document::parse("plain text").unwrap_err().kind,
        ParseErrorKind::NoDocumentElement
    );
    assert_eq!(
        Document::parse("<a x=1/>").unwrap_err().kind,
        ParseErrorKind::BadAttribute
    );
}

#[test]
fn in_place_parse_borrows_the_buffer() {
    let mut buf = b"<greeting kind='warm'>hello &amp; welcome</greeting>".to_vec();
    let doc = Document::parse_inplace(&mut buf).unwrap();
    let greeting = doc.document_element().unwrap();
    assert_eq!(doc.child_value(greeting), "hello & welcome");
    assert_eq!(
        doc.attr_value(doc.attribute(greeting, "kind").unwrap()),
        "warm"
    );
}

#[test]
fn mutation_keeps_sibling_links_consistent() {
    let mut doc = Document::parse("<list><a/><c/></list>").unwrap();
    let list = doc.document_element().unwrap();
    let a = doc.child(list, "a").unwrap();
    let c = doc.child(list, "c").unwrap();

    let b = doc.insert_child_after(list, NodeKind::Element, a).unwrap();
    doc.set_name(b, "b").unwrap();

    let forward: Vec<_> = doc.children(list).map(|n| doc.name(n).to_string()).collect();
    assert_eq!(forward, ["a", "b", "c"]);

    let mut backward = Vec::new();
    let mut cur = doc.last_child(list);
    while let Some(n) = cur {
        backward.push(doc.name(n).to_string());
        cur = doc.prev_sibling(n);
    }
    assert_eq!(backward, ["c", "b", "a"]);

    doc.remove_child(list, b).unwrap();
    assert!(!doc.is_valid(b));
    assert_eq!(doc.next_sibling(a), Some(c));
    assert_eq!(doc.prev_sibling(c), Some(a));
}

#[test]
fn cross_document_copy_preserves_the_source() {
    let source = Document::parse("<src><item n='1'>one</item></src>").unwrap();
    let item = source.child(source.document_element().unwrap(), "item").unwrap();

    let mut dest = Document::parse("<dst/>").unwrap();
    let dst = dest.document_element().unwrap();
    let copy = dest.append_copy_from(dst, &source, item).unwrap();
    assert_eq!(dest.name(copy), "item");
    assert_eq!(dest.child_value(copy), "one");
    assert_eq!(
        dest.attr_value(dest.attribute(copy, "n").unwrap()),
        "1"
    );
    // The source tree is untouched.
    assert!(source.is_valid(item));
}

#[test]
fn serializes_back_to_equivalent_markup() {
    let text = "<library><book year=\"1974\">title &amp; more</book><empty /></library>";
    let doc = Document::parse(text).unwrap();
    let rendered = serialize_document(&doc);
    assert_eq!(rendered, text);

    let reparsed = Document::parse(&rendered).unwrap();
    assert_eq!(serialize_document(&reparsed), rendered);

    let book = doc.child(doc.document_element().unwrap(), "book").unwrap();
    assert_eq!(
        serialize_node(&doc, book),
        "<book year=\"1974\">title &amp; more</book>"
    );
}
