//! The document: node storage, tree links, and the mutation API.

use std::fmt;
use std::mem;
use std::rc::Rc;

use smallvec::SmallVec;
use thiserror::Error;

use crate::arena::{Allocator, Arena, ArenaError, Block, SystemAllocator};
use crate::dom::node::{Attr, AttrId, Node, NodeId, NodeKind, NIL};
use crate::dom::strings::TextSlot;
use crate::parse::{run_parser, ParseError, ParseErrorKind, ParseOptions};

/// Slot index of the document root node.
pub(crate) const ROOT: u32 = 0;

/// Errors from tree mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// The handle is stale (its node was removed) or belongs to another
    /// document.
    #[error("stale or foreign handle")]
    InvalidHandle,
    /// The target node's kind cannot hold children.
    #[error("node kind cannot hold children")]
    NotAContainer,
    /// The node's kind has no name.
    #[error("node kind has no name")]
    NameNotSupported,
    /// The node's kind has no value.
    #[error("node kind has no value")]
    ValueNotSupported,
    /// The node's kind cannot carry attributes.
    #[error("node kind cannot carry attributes")]
    AttributesNotSupported,
    /// The reference node is not a child of the given parent.
    #[error("reference node is not a child of the given parent")]
    NotAChild,
    /// Moving a node under one of its own descendants.
    #[error("cannot move a node into its own subtree")]
    MoveIntoSubtree,
    /// The kind cannot be created at this position, such as a second
    /// document node or a declaration below an element.
    #[error("node kind cannot be created at this position")]
    KindNotAllowed,
    /// The arena could not serve an allocation. The tree is unchanged.
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

struct NodeSlot {
    gen: u32,
    node: Option<Node>,
}

struct AttrSlot {
    gen: u32,
    attr: Option<Attr>,
}

enum ParseBuffer<'buf> {
    None,
    Borrowed(&'buf mut [u8]),
    Owned(Block),
}

/// An XML document: a tree of nodes backed by a page arena.
///
/// The lifetime parameter is the parse buffer's. Documents built from
/// scratch or by copying parse are `Document<'static>`; in-place parsing
/// borrows the caller's buffer for the document's lifetime.
pub struct Document<'buf> {
    arena: Arena,
    nodes: Vec<NodeSlot>,
    free_nodes: Vec<u32>,
    attrs: Vec<AttrSlot>,
    free_attrs: Vec<u32>,
    buffer: ParseBuffer<'buf>,
}

impl Document<'static> {
    /// Create an empty document on the global heap.
    pub fn new() -> Document<'static> {
        match Document::with_allocator(Rc::new(SystemAllocator)) {
            Ok(doc) => doc,
            // SystemAllocator never refuses a request.
            Err(_) => unreachable!(),
        }
    }

    /// Create an empty document whose arena pages come from `allocator`.
    pub fn with_allocator(allocator: Rc<dyn Allocator>) -> Result<Document<'static>, DomError> {
        let arena = Arena::new(allocator)?;
        let root = NodeSlot {
            gen: 0,
            node: Some(Node::new(NodeKind::Document)),
        };
        Ok(Document {
            arena,
            nodes: vec![root],
            free_nodes: Vec::new(),
            attrs: Vec::new(),
            free_attrs: Vec::new(),
            buffer: ParseBuffer::None,
        })
    }

    /// Parse `text` into a new document, copying it so the document owns
    /// its buffer.
    pub fn parse(text: &str) -> Result<Document<'static>, ParseError> {
        Document::parse_with_options(text, ParseOptions::default())
    }

    /// Parse with explicit options.
    pub fn parse_with_options(
        text: &str,
        options: ParseOptions,
    ) -> Result<Document<'static>, ParseError> {
        Document::parse_with_allocator(text, options, Rc::new(SystemAllocator))
    }

    /// Parse with explicit options and a custom page allocator.
    pub fn parse_with_allocator(
        text: &str,
        options: ParseOptions,
        allocator: Rc<dyn Allocator>,
    ) -> Result<Document<'static>, ParseError> {
        let mut bytes = text.as_bytes().to_vec();
        let mut doc = Document::with_allocator(allocator)
            .map_err(|_| ParseError::new(ParseErrorKind::OutOfMemory, 0))?;
        run_parser(&mut doc, &mut bytes, options)?;
        if !bytes.is_empty() {
            let block = doc
                .arena
                .allocate(bytes.len())
                .map_err(|_| ParseError::new(ParseErrorKind::OutOfMemory, 0))?;
            doc.arena.get_mut(block).copy_from_slice(&bytes);
            doc.buffer = ParseBuffer::Owned(block);
        }
        Ok(doc)
    }
}

impl<'buf> Document<'buf> {
    /// Parse `buf` in place. Markup is decoded by mutating the buffer and
    /// the document borrows it for its lifetime; no text is copied.
    pub fn parse_inplace(buf: &'buf mut [u8]) -> Result<Document<'buf>, ParseError> {
        Document::parse_inplace_with_options(buf, ParseOptions::default())
    }

    /// In-place parse with explicit options.
    pub fn parse_inplace_with_options(
        buf: &'buf mut [u8],
        options: ParseOptions,
    ) -> Result<Document<'buf>, ParseError> {
        Document::parse_inplace_with_allocator(buf, options, Rc::new(SystemAllocator))
    }

    /// In-place parse with explicit options and a custom page allocator.
    pub fn parse_inplace_with_allocator(
        buf: &'buf mut [u8],
        options: ParseOptions,
        allocator: Rc<dyn Allocator>,
    ) -> Result<Document<'buf>, ParseError> {
        let doc = Document::with_allocator(allocator)
            .map_err(|_| ParseError::new(ParseErrorKind::OutOfMemory, 0))?;
        let mut doc = Document {
            arena: doc.arena,
            nodes: doc.nodes,
            free_nodes: doc.free_nodes,
            attrs: doc.attrs,
            free_attrs: doc.free_attrs,
            buffer: ParseBuffer::None,
        };
        run_parser(&mut doc, &mut *buf, options)?;
        doc.buffer = ParseBuffer::Borrowed(buf);
        Ok(doc)
    }

    // ---- handle resolution ----

    fn resolve(&self, id: NodeId) -> Result<u32, DomError> {
        let slot = self
            .nodes
            .get(id.index as usize)
            .ok_or(DomError::InvalidHandle)?;
        if slot.gen != id.gen || slot.node.is_none() {
            return Err(DomError::InvalidHandle);
        }
        Ok(id.index)
    }

    fn resolve_attr(&self, id: AttrId) -> Result<u32, DomError> {
        let slot = self
            .attrs
            .get(id.index as usize)
            .ok_or(DomError::InvalidHandle)?;
        if slot.gen != id.gen || slot.attr.is_none() {
            return Err(DomError::InvalidHandle);
        }
        Ok(id.index)
    }

    /// True when the handle still refers to a live node of this document.
    pub fn is_valid(&self, id: NodeId) -> bool {
        self.resolve(id).is_ok()
    }

    pub(crate) fn node_ref(&self, idx: u32) -> &Node {
        match &self.nodes[idx as usize].node {
            Some(node) => node,
            None => panic!("internal: dangling node index"),
        }
    }

    pub(crate) fn node_mut_raw(&mut self, idx: u32) -> &mut Node {
        match &mut self.nodes[idx as usize].node {
            Some(node) => node,
            None => panic!("internal: dangling node index"),
        }
    }

    pub(crate) fn attr_ref(&self, idx: u32) -> &Attr {
        match &self.attrs[idx as usize].attr {
            Some(attr) => attr,
            None => panic!("internal: dangling attribute index"),
        }
    }

    fn attr_mut_raw(&mut self, idx: u32) -> &mut Attr {
        match &mut self.attrs[idx as usize].attr {
            Some(attr) => attr,
            None => panic!("internal: dangling attribute index"),
        }
    }

    pub(crate) fn id_for(&self, idx: u32) -> NodeId {
        NodeId {
            index: idx,
            gen: self.nodes[idx as usize].gen,
        }
    }

    pub(crate) fn attr_id_for(&self, idx: u32) -> AttrId {
        AttrId {
            index: idx,
            gen: self.attrs[idx as usize].gen,
        }
    }

    // ---- text storage ----

    fn buffer_bytes(&self) -> &[u8] {
        match &self.buffer {
            ParseBuffer::None => &[],
            ParseBuffer::Borrowed(buf) => buf,
            ParseBuffer::Owned(block) => self.arena.get(*block),
        }
    }

    pub(crate) fn slot_str<'a>(&'a self, slot: &'a TextSlot) -> &'a str {
        let bytes: &[u8] = match slot {
            TextSlot::Empty => &[],
            TextSlot::Inline(bytes) => bytes,
            TextSlot::Span { offset, len } => {
                let start = *offset as usize;
                &self.buffer_bytes()[start..start + *len as usize]
            }
            TextSlot::Heap(block) => self.arena.get(*block),
        };
        std::str::from_utf8(bytes).unwrap_or("")
    }

    fn store_text(&mut self, bytes: &[u8]) -> Result<TextSlot, ArenaError> {
        if bytes.is_empty() {
            Ok(TextSlot::Empty)
        } else if bytes.len() <= crate::dom::strings::INLINE_CAP {
            Ok(TextSlot::inline(bytes))
        } else {
            let block = self.arena.allocate(bytes.len())?;
            self.arena.get_mut(block).copy_from_slice(bytes);
            Ok(TextSlot::Heap(block))
        }
    }

    fn free_text(&mut self, slot: TextSlot) {
        if let TextSlot::Heap(block) = slot {
            self.arena.deallocate(block);
        }
    }

    // ---- read access ----

    /// Handle of the document root node.
    pub fn root(&self) -> NodeId {
        self.id_for(ROOT)
    }

    /// The document element: the single element child of the root.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .find(|&id| self.kind(id) == Some(NodeKind::Element))
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.resolve(id).ok().map(|idx| self.node_ref(idx).kind)
    }

    /// Node name, or "" for kinds without one or stale handles.
    pub fn name(&self, id: NodeId) -> &str {
        match self.resolve(id) {
            Ok(idx) => self.slot_str(&self.node_ref(idx).name),
            Err(_) => "",
        }
    }

    /// Node value, or "" for kinds without one or stale handles.
    pub fn value(&self, id: NodeId) -> &str {
        match self.resolve(id) {
            Ok(idx) => self.slot_str(&self.node_ref(idx).value),
            Err(_) => "",
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.resolve(id).ok()?;
        let parent = self.node_ref(idx).parent;
        (parent != NIL).then(|| self.id_for(parent))
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.resolve(id).ok()?;
        let child = self.node_ref(idx).first_child;
        (child != NIL).then(|| self.id_for(child))
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.resolve(id).ok()?;
        let child = self.node_ref(idx).last_child;
        (child != NIL).then(|| self.id_for(child))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.resolve(id).ok()?;
        let sib = self.node_ref(idx).next_sibling;
        (sib != NIL).then(|| self.id_for(sib))
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.resolve(id).ok()?;
        let sib = self.node_ref(idx).prev_sibling;
        (sib != NIL).then(|| self.id_for(sib))
    }

    /// Iterate the direct children of `id` in document order.
    pub fn children(&self, id: NodeId) -> Children<'_, 'buf> {
        let cur = match self.resolve(id) {
            Ok(idx) => self.node_ref(idx).first_child,
            Err(_) => NIL,
        };
        Children { doc: self, cur }
    }

    /// Iterate all descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_, 'buf> {
        let mut stack = Vec::new();
        if let Ok(idx) = self.resolve(id) {
            self.push_children_reversed(idx, &mut stack);
        }
        Descendants { doc: self, stack }
    }

    fn push_children_reversed(&self, idx: u32, stack: &mut Vec<u32>) {
        let mut children: SmallVec<[u32; 8]> = SmallVec::new();
        let mut c = self.node_ref(idx).first_child;
        while c != NIL {
            children.push(c);
            c = self.node_ref(c).next_sibling;
        }
        stack.extend(children.iter().rev());
    }

    /// Iterate the attributes of `id` in list order.
    pub fn attributes(&self, id: NodeId) -> Attributes<'_, 'buf> {
        let cur = match self.resolve(id) {
            Ok(idx) => self.node_ref(idx).first_attr,
            Err(_) => NIL,
        };
        Attributes { doc: self, cur }
    }

    pub fn attr_name(&self, id: AttrId) -> &str {
        match self.resolve_attr(id) {
            Ok(idx) => self.slot_str(&self.attr_ref(idx).name),
            Err(_) => "",
        }
    }

    pub fn attr_value(&self, id: AttrId) -> &str {
        match self.resolve_attr(id) {
            Ok(idx) => self.slot_str(&self.attr_ref(idx).value),
            Err(_) => "",
        }
    }

    /// Find an attribute of `id` by name.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<AttrId> {
        self.attributes(id).find(|&a| self.attr_name(a) == name)
    }

    /// Find the first child element of `id` with the given name.
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .find(|&c| self.kind(c) == Some(NodeKind::Element) && self.name(c) == name)
    }

    /// Value of the first text child of `id`, or "".
    pub fn child_value(&self, id: NodeId) -> &str {
        for c in self.children(id) {
            if self.kind(c) == Some(NodeKind::Text) {
                return self.value(c);
            }
        }
        ""
    }

    /// Number of live nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    // ---- slab management ----

    pub(crate) fn alloc_node(&mut self, kind: NodeKind) -> u32 {
        match self.free_nodes.pop() {
            Some(idx) => {
                self.nodes[idx as usize].node = Some(Node::new(kind));
                idx
            }
            None => {
                self.nodes.push(NodeSlot {
                    gen: 0,
                    node: Some(Node::new(kind)),
                });
                (self.nodes.len() - 1) as u32
            }
        }
    }

    fn alloc_attr(&mut self) -> u32 {
        match self.free_attrs.pop() {
            Some(idx) => {
                self.attrs[idx as usize].attr = Some(Attr::new());
                idx
            }
            None => {
                self.attrs.push(AttrSlot {
                    gen: 0,
                    attr: Some(Attr::new()),
                });
                (self.attrs.len() - 1) as u32
            }
        }
    }

    fn free_node_slot(&mut self, idx: u32) {
        let slot = &mut self.nodes[idx as usize];
        slot.gen = slot.gen.wrapping_add(1);
        let taken = slot.node.take();
        if let Some(node) = taken {
            self.free_text(node.name);
            self.free_text(node.value);
        }
        self.free_nodes.push(idx);
    }

    fn free_attr_slot(&mut self, idx: u32) {
        let slot = &mut self.attrs[idx as usize];
        slot.gen = slot.gen.wrapping_add(1);
        let taken = slot.attr.take();
        if let Some(attr) = taken {
            self.free_text(attr.name);
            self.free_text(attr.value);
        }
        self.free_attrs.push(idx);
    }

    // ---- link management ----

    pub(crate) fn link_child_last(&mut self, parent: u32, child: u32) {
        let last = self.node_ref(parent).last_child;
        {
            let c = self.node_mut_raw(child);
            c.parent = parent;
            c.prev_sibling = last;
            c.next_sibling = NIL;
        }
        if last == NIL {
            self.node_mut_raw(parent).first_child = child;
        } else {
            self.node_mut_raw(last).next_sibling = child;
        }
        self.node_mut_raw(parent).last_child = child;
    }

    fn link_child_first(&mut self, parent: u32, child: u32) {
        let first = self.node_ref(parent).first_child;
        {
            let c = self.node_mut_raw(child);
            c.parent = parent;
            c.prev_sibling = NIL;
            c.next_sibling = first;
        }
        if first == NIL {
            self.node_mut_raw(parent).last_child = child;
        } else {
            self.node_mut_raw(first).prev_sibling = child;
        }
        self.node_mut_raw(parent).first_child = child;
    }

    fn link_child_before(&mut self, parent: u32, child: u32, reference: u32) {
        let prev = self.node_ref(reference).prev_sibling;
        {
            let c = self.node_mut_raw(child);
            c.parent = parent;
            c.prev_sibling = prev;
            c.next_sibling = reference;
        }
        self.node_mut_raw(reference).prev_sibling = child;
        if prev == NIL {
            self.node_mut_raw(parent).first_child = child;
        } else {
            self.node_mut_raw(prev).next_sibling = child;
        }
    }

    fn link_child_after(&mut self, parent: u32, child: u32, reference: u32) {
        let next = self.node_ref(reference).next_sibling;
        {
            let c = self.node_mut_raw(child);
            c.parent = parent;
            c.prev_sibling = reference;
            c.next_sibling = next;
        }
        self.node_mut_raw(reference).next_sibling = child;
        if next == NIL {
            self.node_mut_raw(parent).last_child = child;
        } else {
            self.node_mut_raw(next).prev_sibling = child;
        }
    }

    fn unlink_child(&mut self, child: u32) {
        let (parent, prev, next) = {
            let node = self.node_ref(child);
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        if prev == NIL {
            self.node_mut_raw(parent).first_child = next;
        } else {
            self.node_mut_raw(prev).next_sibling = next;
        }
        if next == NIL {
            self.node_mut_raw(parent).last_child = prev;
        } else {
            self.node_mut_raw(next).prev_sibling = prev;
        }
        let node = self.node_mut_raw(child);
        node.parent = NIL;
        node.prev_sibling = NIL;
        node.next_sibling = NIL;
    }

    fn link_attr_last(&mut self, node: u32, attr: u32) {
        let last = self.node_ref(node).last_attr;
        {
            let a = self.attr_mut_raw(attr);
            a.prev = last;
            a.next = NIL;
        }
        if last == NIL {
            self.node_mut_raw(node).first_attr = attr;
        } else {
            self.attr_mut_raw(last).next = attr;
        }
        self.node_mut_raw(node).last_attr = attr;
    }

    /// Free an entire subtree without recursion. The subtree must already
    /// be unlinked from its parent.
    fn destroy_subtree(&mut self, root: u32) {
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let mut c = self.node_ref(idx).first_child;
            while c != NIL {
                stack.push(c);
                c = self.node_ref(c).next_sibling;
            }
            let mut a = self.node_ref(idx).first_attr;
            while a != NIL {
                let next = self.attr_ref(a).next;
                self.free_attr_slot(a);
                a = next;
            }
            self.free_node_slot(idx);
        }
    }

    fn check_insert(&self, parent_idx: u32, kind: NodeKind) -> Result<(), DomError> {
        let parent_kind = self.node_ref(parent_idx).kind;
        if !parent_kind.is_container() {
            return Err(DomError::NotAContainer);
        }
        if kind == NodeKind::Document {
            return Err(DomError::KindNotAllowed);
        }
        if kind == NodeKind::Declaration && parent_kind != NodeKind::Document {
            return Err(DomError::KindNotAllowed);
        }
        Ok(())
    }

    // ---- mutation ----

    /// Create a node of `kind` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId, DomError> {
        let p = self.resolve(parent)?;
        self.check_insert(p, kind)?;
        let idx = self.alloc_node(kind);
        self.link_child_last(p, idx);
        Ok(self.id_for(idx))
    }

    /// Create a node of `kind` as the first child of `parent`.
    pub fn prepend_child(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId, DomError> {
        let p = self.resolve(parent)?;
        self.check_insert(p, kind)?;
        let idx = self.alloc_node(kind);
        self.link_child_first(p, idx);
        Ok(self.id_for(idx))
    }

    /// Create a node of `kind` immediately before `reference`, which must
    /// be a child of `parent`.
    pub fn insert_child_before(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        reference: NodeId,
    ) -> Result<NodeId, DomError> {
        let p = self.resolve(parent)?;
        let r = self.resolve(reference)?;
        self.check_insert(p, kind)?;
        if self.node_ref(r).parent != p {
            return Err(DomError::NotAChild);
        }
        let idx = self.alloc_node(kind);
        self.link_child_before(p, idx, r);
        Ok(self.id_for(idx))
    }

    /// Create a node of `kind` immediately after `reference`, which must
    /// be a child of `parent`.
    pub fn insert_child_after(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        reference: NodeId,
    ) -> Result<NodeId, DomError> {
        let p = self.resolve(parent)?;
        let r = self.resolve(reference)?;
        self.check_insert(p, kind)?;
        if self.node_ref(r).parent != p {
            return Err(DomError::NotAChild);
        }
        let idx = self.alloc_node(kind);
        self.link_child_after(p, idx, r);
        Ok(self.id_for(idx))
    }

    /// Remove `child` and its whole subtree. Handles into the subtree
    /// become stale.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let p = self.resolve(parent)?;
        let c = self.resolve(child)?;
        if self.node_ref(c).parent != p {
            return Err(DomError::NotAChild);
        }
        self.unlink_child(c);
        self.destroy_subtree(c);
        Ok(())
    }

    /// Set the node's name. On allocation failure the old name is kept.
    pub fn set_name(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        let idx = self.resolve(id)?;
        if !self.node_ref(idx).kind.has_name() {
            return Err(DomError::NameNotSupported);
        }
        let slot = self.store_text(name.as_bytes())?;
        let old = mem::replace(&mut self.node_mut_raw(idx).name, slot);
        self.free_text(old);
        Ok(())
    }

    /// Set the node's value. On allocation failure the old value is kept.
    pub fn set_value(&mut self, id: NodeId, value: &str) -> Result<(), DomError> {
        let idx = self.resolve(id)?;
        if !self.node_ref(idx).kind.has_value() {
            return Err(DomError::ValueNotSupported);
        }
        let slot = self.store_text(value.as_bytes())?;
        let old = mem::replace(&mut self.node_mut_raw(idx).value, slot);
        self.free_text(old);
        Ok(())
    }

    /// Add an attribute at the end of the node's attribute list.
    pub fn append_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: &str,
    ) -> Result<AttrId, DomError> {
        let idx = self.resolve(id)?;
        if !self.node_ref(idx).kind.has_attributes() {
            return Err(DomError::AttributesNotSupported);
        }
        let name_slot = self.store_text(name.as_bytes())?;
        let value_slot = match self.store_text(value.as_bytes()) {
            Ok(slot) => slot,
            Err(err) => {
                self.free_text(name_slot);
                return Err(err.into());
            }
        };
        let a = self.alloc_attr();
        {
            let attr = self.attr_mut_raw(a);
            attr.name = name_slot;
            attr.value = value_slot;
        }
        self.link_attr_last(idx, a);
        Ok(self.attr_id_for(a))
    }

    /// Rename an attribute.
    pub fn set_attr_name(&mut self, id: AttrId, name: &str) -> Result<(), DomError> {
        let idx = self.resolve_attr(id)?;
        let slot = self.store_text(name.as_bytes())?;
        let old = mem::replace(&mut self.attr_mut_raw(idx).name, slot);
        self.free_text(old);
        Ok(())
    }

    /// Replace an attribute's value.
    pub fn set_attr_value(&mut self, id: AttrId, value: &str) -> Result<(), DomError> {
        let idx = self.resolve_attr(id)?;
        let slot = self.store_text(value.as_bytes())?;
        let old = mem::replace(&mut self.attr_mut_raw(idx).value, slot);
        self.free_text(old);
        Ok(())
    }

    /// Remove an attribute from `id`'s list. The handle becomes stale.
    pub fn remove_attribute(&mut self, id: NodeId, attr: AttrId) -> Result<(), DomError> {
        let n = self.resolve(id)?;
        let a = self.resolve_attr(attr)?;
        // Confirm the attribute is on this node's list.
        let mut cur = self.node_ref(n).first_attr;
        let mut found = false;
        while cur != NIL {
            if cur == a {
                found = true;
                break;
            }
            cur = self.attr_ref(cur).next;
        }
        if !found {
            return Err(DomError::NotAChild);
        }
        let (prev, next) = {
            let attr = self.attr_ref(a);
            (attr.prev, attr.next)
        };
        if prev == NIL {
            self.node_mut_raw(n).first_attr = next;
        } else {
            self.attr_mut_raw(prev).next = next;
        }
        if next == NIL {
            self.node_mut_raw(n).last_attr = prev;
        } else {
            self.attr_mut_raw(next).prev = prev;
        }
        self.free_attr_slot(a);
        Ok(())
    }

    /// Deep-copy `proto` (from this document) as the last child of `parent`.
    pub fn append_copy(&mut self, parent: NodeId, proto: NodeId) -> Result<NodeId, DomError> {
        let snap = self.snapshot_local(proto)?;
        self.graft(parent, &snap, Position::Last)
    }

    /// Deep-copy `proto` (from this document) as the first child of `parent`.
    pub fn prepend_copy(&mut self, parent: NodeId, proto: NodeId) -> Result<NodeId, DomError> {
        let snap = self.snapshot_local(proto)?;
        self.graft(parent, &snap, Position::First)
    }

    /// Deep-copy `proto` from another document as the last child of `parent`.
    pub fn append_copy_from(
        &mut self,
        parent: NodeId,
        source: &Document<'_>,
        proto: NodeId,
    ) -> Result<NodeId, DomError> {
        let snap = source.snapshot_local(proto)?;
        self.graft(parent, &snap, Position::Last)
    }

    /// Move `node` (with its subtree) to be the last child of `parent`.
    pub fn append_move(&mut self, parent: NodeId, node: NodeId) -> Result<NodeId, DomError> {
        let p = self.check_move(parent, node)?;
        let n = self.resolve(node)?;
        self.unlink_child(n);
        self.link_child_last(p, n);
        Ok(node)
    }

    /// Move `node` (with its subtree) to be the first child of `parent`.
    pub fn prepend_move(&mut self, parent: NodeId, node: NodeId) -> Result<NodeId, DomError> {
        let p = self.check_move(parent, node)?;
        let n = self.resolve(node)?;
        self.unlink_child(n);
        self.link_child_first(p, n);
        Ok(node)
    }

    fn check_move(&self, parent: NodeId, node: NodeId) -> Result<u32, DomError> {
        let p = self.resolve(parent)?;
        let n = self.resolve(node)?;
        let kind = self.node_ref(n).kind;
        if kind == NodeKind::Document {
            return Err(DomError::KindNotAllowed);
        }
        self.check_insert(p, kind)?;
        // Walk up from the target: moving under the node itself or any of
        // its descendants would detach the subtree from the tree.
        let mut cur = p;
        while cur != NIL {
            if cur == n {
                return Err(DomError::MoveIntoSubtree);
            }
            cur = self.node_ref(cur).parent;
        }
        Ok(p)
    }

    fn snapshot_local(&self, proto: NodeId) -> Result<Vec<SnapNode>, DomError> {
        let root = self.resolve(proto)?;
        if self.node_ref(root).kind == NodeKind::Document {
            return Err(DomError::KindNotAllowed);
        }
        let mut snap = Vec::new();
        // Preorder walk recording each node's snapshot-parent index.
        let mut stack: Vec<(u32, Option<usize>)> = vec![(root, None)];
        while let Some((idx, parent)) = stack.pop() {
            let node = self.node_ref(idx);
            let mut attrs = Vec::new();
            let mut a = node.first_attr;
            while a != NIL {
                let attr = self.attr_ref(a);
                attrs.push((
                    self.slot_str(&attr.name).as_bytes().to_vec(),
                    self.slot_str(&attr.value).as_bytes().to_vec(),
                ));
                a = attr.next;
            }
            snap.push(SnapNode {
                kind: node.kind,
                name: self.slot_str(&node.name).as_bytes().to_vec(),
                value: self.slot_str(&node.value).as_bytes().to_vec(),
                attrs,
                parent,
            });
            let snap_idx = snap.len() - 1;
            let mut children: SmallVec<[u32; 8]> = SmallVec::new();
            let mut c = node.first_child;
            while c != NIL {
                children.push(c);
                c = self.node_ref(c).next_sibling;
            }
            for &c in children.iter().rev() {
                stack.push((c, Some(snap_idx)));
            }
        }
        Ok(snap)
    }

    fn graft(
        &mut self,
        parent: NodeId,
        snap: &[SnapNode],
        position: Position,
    ) -> Result<NodeId, DomError> {
        let p = self.resolve(parent)?;
        self.check_insert(p, snap[0].kind)?;
        let mut mapping: Vec<u32> = Vec::with_capacity(snap.len());
        match self.graft_inner(p, snap, position, &mut mapping) {
            Ok(id) => Ok(id),
            Err(err) => {
                // Roll back the partially built copy.
                if let Some(&root) = mapping.first() {
                    self.unlink_child(root);
                    self.destroy_subtree(root);
                }
                Err(err)
            }
        }
    }

    fn graft_inner(
        &mut self,
        parent: u32,
        snap: &[SnapNode],
        position: Position,
        mapping: &mut Vec<u32>,
    ) -> Result<NodeId, DomError> {
        for sn in snap {
            let name_slot = self.store_text(&sn.name)?;
            let value_slot = match self.store_text(&sn.value) {
                Ok(slot) => slot,
                Err(err) => {
                    self.free_text(name_slot);
                    return Err(err.into());
                }
            };
            let idx = self.alloc_node(sn.kind);
            {
                let node = self.node_mut_raw(idx);
                node.name = name_slot;
                node.value = value_slot;
            }
            match sn.parent {
                None => match position {
                    Position::Last => self.link_child_last(parent, idx),
                    Position::First => self.link_child_first(parent, idx),
                },
                Some(sp) => self.link_child_last(mapping[sp], idx),
            }
            mapping.push(idx);
            for (an, av) in &sn.attrs {
                let name_slot = self.store_text(an)?;
                let value_slot = match self.store_text(av) {
                    Ok(slot) => slot,
                    Err(err) => {
                        self.free_text(name_slot);
                        return Err(err.into());
                    }
                };
                let a = self.alloc_attr();
                {
                    let attr = self.attr_mut_raw(a);
                    attr.name = name_slot;
                    attr.value = value_slot;
                }
                self.link_attr_last(idx, a);
            }
        }
        Ok(self.id_for(mapping[0]))
    }

    // ---- parser hooks ----

    pub(crate) fn set_span_name(&mut self, idx: u32, offset: usize, len: usize) {
        self.node_mut_raw(idx).name = TextSlot::Span {
            offset: offset as u32,
            len: len as u32,
        };
    }

    pub(crate) fn set_span_value(&mut self, idx: u32, offset: usize, len: usize) {
        self.node_mut_raw(idx).value = TextSlot::Span {
            offset: offset as u32,
            len: len as u32,
        };
    }

    pub(crate) fn add_span_attr(&mut self, node: u32, name: (usize, usize), value: (usize, usize)) {
        let a = self.alloc_attr();
        {
            let attr = self.attr_mut_raw(a);
            attr.name = TextSlot::Span {
                offset: name.0 as u32,
                len: name.1 as u32,
            };
            attr.value = TextSlot::Span {
                offset: value.0 as u32,
                len: value.1 as u32,
            };
        }
        self.link_attr_last(node, a);
    }
}

#[derive(Clone, Copy)]
enum Position {
    First,
    Last,
}

struct SnapNode {
    kind: NodeKind,
    name: Vec<u8>,
    value: Vec<u8>,
    attrs: Vec<(Vec<u8>, Vec<u8>)>,
    parent: Option<usize>,
}

impl Default for Document<'static> {
    fn default() -> Self {
        Document::new()
    }
}

impl fmt::Debug for Document<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.node_count())
            .finish()
    }
}

/// Iterator over direct children.
pub struct Children<'a, 'buf> {
    doc: &'a Document<'buf>,
    cur: u32,
}

impl Iterator for Children<'_, '_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.cur == NIL {
            return None;
        }
        let id = self.doc.id_for(self.cur);
        self.cur = self.doc.node_ref(self.cur).next_sibling;
        Some(id)
    }
}

/// Iterator over a subtree in document order, excluding the start node.
pub struct Descendants<'a, 'buf> {
    doc: &'a Document<'buf>,
    stack: Vec<u32>,
}

impl Iterator for Descendants<'_, '_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let idx = self.stack.pop()?;
        self.doc.push_children_reversed(idx, &mut self.stack);
        Some(self.doc.id_for(idx))
    }
}

/// Iterator over a node's attributes in list order.
pub struct Attributes<'a, 'buf> {
    doc: &'a Document<'buf>,
    cur: u32,
}

impl Iterator for Attributes<'_, '_> {
    type Item = AttrId;

    fn next(&mut self) -> Option<AttrId> {
        if self.cur == NIL {
            return None;
        }
        let id = self.doc.attr_id_for(self.cur);
        self.cur = self.doc.attr_ref(self.cur).next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_sample() -> (Document<'static>, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let top = doc.append_child(root, NodeKind::Element).unwrap();
        doc.set_name(top, "top").unwrap();
        (doc, top)
    }

    #[test]
    fn new_document_has_only_a_root() {
        let doc = Document::new();
        assert_eq!(doc.kind(doc.root()), Some(NodeKind::Document));
        assert_eq!(doc.node_count(), 1);
        assert!(doc.first_child(doc.root()).is_none());
    }

    #[test]
    fn append_and_navigate() {
        let (mut doc, top) = build_sample();
        let a = doc.append_child(top, NodeKind::Element).unwrap();
        let b = doc.append_child(top, NodeKind::Element).unwrap();
        doc.set_name(a, "a").unwrap();
        doc.set_name(b, "b").unwrap();

        assert_eq!(doc.first_child(top), Some(a));
        assert_eq!(doc.last_child(top), Some(b));
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.prev_sibling(b), Some(a));
        assert_eq!(doc.parent(a), Some(top));
        let names: Vec<&str> = doc.children(top).map(|c| doc.name(c)).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn insert_before_and_after_keep_order() {
        let (mut doc, top) = build_sample();
        let b = doc.append_child(top, NodeKind::Element).unwrap();
        doc.set_name(b, "b").unwrap();
        let a = doc.insert_child_before(top, NodeKind::Element, b).unwrap();
        doc.set_name(a, "a").unwrap();
        let c = doc.insert_child_after(top, NodeKind::Element, b).unwrap();
        doc.set_name(c, "c").unwrap();

        let names: Vec<&str> = doc.children(top).map(|n| doc.name(n)).collect();
        assert_eq!(names, ["a", "b", "c"]);
        // Backward links agree with forward order.
        assert_eq!(doc.prev_sibling(c), Some(b));
        assert_eq!(doc.prev_sibling(b), Some(a));
        assert!(doc.prev_sibling(a).is_none());
    }

    #[test]
    fn removal_staleness_and_slot_reuse() {
        let (mut doc, top) = build_sample();
        let child = doc.append_child(top, NodeKind::Element).unwrap();
        let grandchild = doc.append_child(child, NodeKind::Text).unwrap();

        doc.remove_child(top, child).unwrap();
        assert!(!doc.is_valid(child));
        assert!(!doc.is_valid(grandchild));
        assert_eq!(doc.kind(child), None);
        assert_eq!(doc.name(child), "");

        // A recycled slot gets a new generation, so the old handle stays dead.
        let fresh = doc.append_child(top, NodeKind::Element).unwrap();
        assert!(doc.is_valid(fresh));
        assert!(!doc.is_valid(child));
    }

    #[test]
    fn kind_rules_are_enforced() {
        let (mut doc, top) = build_sample();
        let text = doc.append_child(top, NodeKind::Text).unwrap();

        assert_eq!(
            doc.append_child(text, NodeKind::Element),
            Err(DomError::NotAContainer)
        );
        assert_eq!(doc.set_name(text, "x"), Err(DomError::NameNotSupported));
        assert_eq!(doc.set_value(top, "x"), Err(DomError::ValueNotSupported));
        assert_eq!(
            doc.append_child(top, NodeKind::Document),
            Err(DomError::KindNotAllowed)
        );
        assert_eq!(
            doc.append_child(top, NodeKind::Declaration),
            Err(DomError::KindNotAllowed)
        );
        assert_eq!(
            doc.append_attribute(text, "k", "v"),
            Err(DomError::AttributesNotSupported)
        );
    }

    #[test]
    fn attributes_link_and_unlink() {
        let (mut doc, top) = build_sample();
        let a = doc.append_attribute(top, "a", "1").unwrap();
        let b = doc.append_attribute(top, "b", "2").unwrap();
        let c = doc.append_attribute(top, "c", "3").unwrap();

        let names: Vec<&str> = doc.attributes(top).map(|x| doc.attr_name(x)).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(doc.attribute(top, "b"), Some(b));
        assert_eq!(doc.attr_value(b), "2");

        doc.remove_attribute(top, b).unwrap();
        let names: Vec<&str> = doc.attributes(top).map(|x| doc.attr_name(x)).collect();
        assert_eq!(names, ["a", "c"]);
        assert_eq!(doc.attr_value(b), "");
        assert_eq!(doc.set_attr_value(b, "9"), Err(DomError::InvalidHandle));
        let _ = (a, c);
    }

    #[test]
    fn long_names_round_trip_through_the_arena() {
        let (mut doc, top) = build_sample();
        let long = "a".repeat(100);
        doc.set_name(top, &long).unwrap();
        assert_eq!(doc.name(top), long);
        doc.set_name(top, "short").unwrap();
        assert_eq!(doc.name(top), "short");
    }

    #[test]
    fn deep_copy_duplicates_subtree() {
        let (mut doc, top) = build_sample();
        let child = doc.append_child(top, NodeKind::Element).unwrap();
        doc.set_name(child, "item").unwrap();
        doc.append_attribute(child, "k", "v").unwrap();
        let text = doc.append_child(child, NodeKind::Text).unwrap();
        doc.set_value(text, "payload").unwrap();

        let copy = doc.append_copy(top, child).unwrap();
        assert_ne!(copy, child);
        assert_eq!(doc.name(copy), "item");
        let attr = doc.attribute(copy, "k").unwrap();
        assert_eq!(doc.attr_value(attr), "v");
        assert_eq!(doc.child_value(copy), "payload");
        // The original is untouched.
        assert_eq!(doc.child_value(child), "payload");
    }

    #[test]
    fn cross_document_copy() {
        let (mut src, src_top) = build_sample();
        let item = src.append_child(src_top, NodeKind::Element).unwrap();
        src.set_name(item, "imported").unwrap();

        let (mut dst, dst_top) = build_sample();
        let copy = dst.append_copy_from(dst_top, &src, item).unwrap();
        assert_eq!(dst.name(copy), "imported");
        assert!(src.is_valid(item));
    }

    #[test]
    fn move_rejects_own_subtree() {
        let (mut doc, top) = build_sample();
        let outer = doc.append_child(top, NodeKind::Element).unwrap();
        let inner = doc.append_child(outer, NodeKind::Element).unwrap();

        assert_eq!(doc.append_move(inner, outer), Err(DomError::MoveIntoSubtree));
        assert_eq!(doc.append_move(outer, outer), Err(DomError::MoveIntoSubtree));

        // A legal move reparents without copying.
        let other = doc.append_child(top, NodeKind::Element).unwrap();
        let moved = doc.append_move(other, inner).unwrap();
        assert_eq!(moved, inner);
        assert_eq!(doc.parent(inner), Some(other));
        assert!(doc.first_child(outer).is_none());
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let (mut doc, top) = build_sample();
        let a = doc.append_child(top, NodeKind::Element).unwrap();
        doc.set_name(a, "a").unwrap();
        let a1 = doc.append_child(a, NodeKind::Element).unwrap();
        doc.set_name(a1, "a1").unwrap();
        let b = doc.append_child(top, NodeKind::Element).unwrap();
        doc.set_name(b, "b").unwrap();

        let names: Vec<&str> = doc.descendants(top).map(|n| doc.name(n)).collect();
        assert_eq!(names, ["a", "a1", "b"]);
    }
}
