//! XPath 1.0 query engine: lexer, parser, compiler, and evaluator.
//!
//! Expressions compile to a reusable [`Query`]. [`Document::evaluate`]
//! compiles through a per-thread LRU cache so repeated expression strings
//! skip recompilation.

mod axes;
mod compiler;
mod error;
mod eval;
mod functions;
mod lexer;
mod parser;
mod value;

pub use error::XPathError;
pub use value::{Value, XPathItem};

use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;

use lru::LruCache;

use crate::dom::{Document, NodeId};
use compiler::CompiledExpr;
use eval::{Engine, EvalContext};

/// A compiled query, reusable across documents and evaluations.
#[derive(Debug, Clone)]
pub struct Query {
    compiled: CompiledExpr,
}

impl Query {
    /// Compile an expression. Unknown functions and arity mistakes are
    /// reported here, not at evaluation time.
    pub fn compile(text: &str) -> Result<Query, XPathError> {
        let expr = parser::parse(text)?;
        let compiled = compiler::compile(&expr)?;
        Ok(Query { compiled })
    }

    /// Evaluate against `context` with position 1 of 1.
    pub fn evaluate(&self, doc: &Document<'_>, context: NodeId) -> Result<Value, XPathError> {
        self.evaluate_from(doc, XPathItem::node(context))
    }

    /// Evaluate with an arbitrary item as the context, so attribute items
    /// work as starting points too.
    pub fn evaluate_from(&self, doc: &Document<'_>, item: XPathItem) -> Result<Value, XPathError> {
        let engine = Engine::new(doc);
        let ctx = EvalContext {
            engine: &engine,
            item,
            position: 1,
            size: 1,
        };
        eval::evaluate(&self.compiled, &ctx)
    }

    /// Evaluate and require a node-set result.
    pub fn select_nodes(
        &self,
        doc: &Document<'_>,
        context: NodeId,
    ) -> Result<Vec<XPathItem>, XPathError> {
        match self.evaluate(doc, context)? {
            Value::Nodes(items) => Ok(items),
            _ => Err(XPathError::NotANodeSet),
        }
    }
}

const CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => unreachable!(),
};

thread_local! {
    static QUERY_CACHE: RefCell<LruCache<String, Rc<Query>>> =
        RefCell::new(LruCache::new(CACHE_CAPACITY));
}

impl Document<'_> {
    /// Evaluate an expression with `context` as the context node. Compiled
    /// queries are cached per thread.
    pub fn evaluate(&self, expr: &str, context: NodeId) -> Result<Value, XPathError> {
        self.evaluate_from(expr, XPathItem::node(context))
    }

    /// Evaluate with an arbitrary context item, including attribute items
    /// taken from an earlier node-set result.
    pub fn evaluate_from(&self, expr: &str, item: XPathItem) -> Result<Value, XPathError> {
        let query = QUERY_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            if let Some(query) = cache.get(expr) {
                return Ok(Rc::clone(query));
            }
            let query = Rc::new(Query::compile(expr)?);
            cache.put(expr.to_string(), Rc::clone(&query));
            Ok(query)
        })?;
        query.evaluate_from(self, item)
    }

    /// Evaluate and require a node-set, in document order.
    pub fn select_nodes(
        &self,
        expr: &str,
        context: NodeId,
    ) -> Result<Vec<XPathItem>, XPathError> {
        match self.evaluate(expr, context)? {
            Value::Nodes(items) => Ok(items),
            _ => Err(XPathError::NotANodeSet),
        }
    }

    /// First node selected by the expression, if any.
    pub fn select_node(
        &self,
        expr: &str,
        context: NodeId,
    ) -> Result<Option<XPathItem>, XPathError> {
        Ok(self.select_nodes(expr, context)?.into_iter().next())
    }
}
