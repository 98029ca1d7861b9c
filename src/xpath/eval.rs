//! Query evaluator: a stack machine over compiled ops.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::dom::Document;
use crate::xpath::axes;
use crate::xpath::compiler::{CompiledExpr, CompiledStep, Op};
use crate::xpath::error::XPathError;
use crate::xpath::functions;
use crate::xpath::parser::{AddOp, EqOp, MulOp, RelOp};
use crate::xpath::value::{item_string_value, parse_number, Value, XPathItem};

/// Shared evaluation state: the document plus a lazily built document-order
/// index. The index is computed once per evaluation and reused by every
/// sort, then discarded, so tree mutations between evaluations are safe.
pub(crate) struct Engine<'d, 'buf> {
    doc: &'d Document<'buf>,
    ranks: RefCell<Option<HashMap<XPathItem, (usize, usize)>>>,
}

impl<'d, 'buf> Engine<'d, 'buf> {
    pub(crate) fn new(doc: &'d Document<'buf>) -> Engine<'d, 'buf> {
        Engine {
            doc,
            ranks: RefCell::new(None),
        }
    }

    /// Sort items into document order, attributes after their element in
    /// list order, and drop duplicates.
    fn sort_unique(&self, items: &mut Vec<XPathItem>) {
        let mut seen = HashSet::with_capacity(items.len());
        items.retain(|item| seen.insert(*item));
        if items.len() < 2 {
            return;
        }
        {
            let mut ranks = self.ranks.borrow_mut();
            if ranks.is_none() {
                let mut map = HashMap::new();
                let root = self.doc.root();
                let mut counter = 0usize;
                for node in std::iter::once(root).chain(self.doc.descendants(root)) {
                    map.insert(XPathItem::node(node), (counter, 0));
                    for (i, attr) in self.doc.attributes(node).enumerate() {
                        map.insert(XPathItem::attribute(node, attr), (counter, i + 1));
                    }
                    counter += 1;
                }
                *ranks = Some(map);
            }
        }
        let ranks = self.ranks.borrow();
        if let Some(map) = ranks.as_ref() {
            items.sort_unstable_by_key(|item| {
                map.get(item).copied().unwrap_or((usize::MAX, usize::MAX))
            });
        }
    }
}

/// The context a subexpression sees: one item of the context node-set and
/// its position within it.
pub(crate) struct EvalContext<'e, 'd, 'buf> {
    pub engine: &'e Engine<'d, 'buf>,
    pub item: XPathItem,
    pub position: usize,
    pub size: usize,
}

impl<'d, 'buf> EvalContext<'_, 'd, 'buf> {
    pub(crate) fn doc(&self) -> &'d Document<'buf> {
        self.engine.doc
    }
}

pub(crate) fn evaluate(
    expr: &CompiledExpr,
    ctx: &EvalContext<'_, '_, '_>,
) -> Result<Value, XPathError> {
    let doc = ctx.doc();
    let mut stack: Vec<Value> = Vec::new();
    for op in &expr.ops {
        match op {
            Op::Number(n) => stack.push(Value::Number(*n)),
            Op::Literal(s) => stack.push(Value::String(s.clone())),
            Op::Root => stack.push(Value::Nodes(vec![XPathItem::node(doc.root())])),
            Op::Context => stack.push(Value::Nodes(vec![ctx.item])),
            Op::Navigate(step) => {
                let items = pop_nodes(&mut stack)?;
                stack.push(Value::Nodes(navigate(ctx, items, step)?));
            }
            Op::FilterPredicate(pred) => {
                let items = pop_nodes(&mut stack)?;
                stack.push(Value::Nodes(apply_predicate(ctx, items, pred)?));
            }
            Op::Union => {
                let mut b = pop_nodes(&mut stack)?;
                let mut a = pop_nodes(&mut stack)?;
                a.append(&mut b);
                ctx.engine.sort_unique(&mut a);
                stack.push(Value::Nodes(a));
            }
            Op::Or => {
                let b = pop(&mut stack);
                let a = pop(&mut stack);
                stack.push(Value::Boolean(a.boolean() || b.boolean()));
            }
            Op::And => {
                let b = pop(&mut stack);
                let a = pop(&mut stack);
                stack.push(Value::Boolean(a.boolean() && b.boolean()));
            }
            Op::Equality(op) => {
                let b = pop(&mut stack);
                let a = pop(&mut stack);
                stack.push(Value::Boolean(compare_equality(doc, *op, &a, &b)));
            }
            Op::Relational(op) => {
                let b = pop(&mut stack);
                let a = pop(&mut stack);
                stack.push(Value::Boolean(compare_relational(doc, *op, &a, &b)));
            }
            Op::Additive(op) => {
                let b = pop(&mut stack).number(doc);
                let a = pop(&mut stack).number(doc);
                stack.push(Value::Number(match op {
                    AddOp::Add => a + b,
                    AddOp::Subtract => a - b,
                }));
            }
            Op::Multiplicative(op) => {
                let b = pop(&mut stack).number(doc);
                let a = pop(&mut stack).number(doc);
                stack.push(Value::Number(match op {
                    MulOp::Multiply => a * b,
                    MulOp::Divide => a / b,
                    MulOp::Modulo => a % b,
                }));
            }
            Op::Negate => {
                let a = pop(&mut stack).number(doc);
                stack.push(Value::Number(-a));
            }
            Op::Call(func, argc) => {
                let mut args = Vec::with_capacity(*argc);
                for _ in 0..*argc {
                    args.push(pop(&mut stack));
                }
                args.reverse();
                stack.push(functions::call(*func, args, ctx)?);
            }
        }
    }
    Ok(pop(&mut stack))
}

fn pop(stack: &mut Vec<Value>) -> Value {
    match stack.pop() {
        Some(v) => v,
        // The compiler emits operands before every operator.
        None => unreachable!(),
    }
}

fn pop_nodes(stack: &mut Vec<Value>) -> Result<Vec<XPathItem>, XPathError> {
    match pop(stack) {
        Value::Nodes(items) => Ok(items),
        _ => Err(XPathError::NotANodeSet),
    }
}

/// One location step: walk the axis from each input item, apply the step's
/// predicates within each per-item sequence, then merge in document order.
fn navigate(
    ctx: &EvalContext<'_, '_, '_>,
    items: Vec<XPathItem>,
    step: &CompiledStep,
) -> Result<Vec<XPathItem>, XPathError> {
    let mut result = Vec::new();
    for item in items {
        let mut seq = axes::navigate(ctx.doc(), item, step.axis, &step.test);
        for pred in &step.predicates {
            seq = apply_predicate(ctx, seq, pred)?;
        }
        result.extend(seq);
    }
    ctx.engine.sort_unique(&mut result);
    Ok(result)
}

/// Keep the items a predicate accepts. A numeric predicate is a position
/// test; anything else coerces to boolean.
fn apply_predicate(
    ctx: &EvalContext<'_, '_, '_>,
    items: Vec<XPathItem>,
    pred: &CompiledExpr,
) -> Result<Vec<XPathItem>, XPathError> {
    let size = items.len();
    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let sub = EvalContext {
            engine: ctx.engine,
            item,
            position: i + 1,
            size,
        };
        let keep = match evaluate(pred, &sub)? {
            Value::Number(n) => (i + 1) as f64 == n,
            other => other.boolean(),
        };
        if keep {
            out.push(item);
        }
    }
    Ok(out)
}

// Equality follows the node-set rules: comparisons against a node-set are
// existential over the nodes' string values.
fn compare_equality(doc: &Document<'_>, op: EqOp, a: &Value, b: &Value) -> bool {
    let ne = op == EqOp::Ne;
    match (a, b) {
        (Value::Nodes(xs), Value::Nodes(ys)) => {
            let ys: Vec<String> = ys.iter().map(|i| item_string_value(doc, *i)).collect();
            xs.iter().any(|x| {
                let sx = item_string_value(doc, *x);
                ys.iter().any(|sy| (sx == *sy) != ne)
            })
        }
        (Value::Nodes(xs), other) | (other, Value::Nodes(xs)) => match other {
            Value::Boolean(b) => (!xs.is_empty() == *b) != ne,
            Value::Number(n) => xs
                .iter()
                .any(|x| (parse_number(&item_string_value(doc, *x)) == *n) != ne),
            Value::String(s) => xs.iter().any(|x| (item_string_value(doc, *x) == *s) != ne),
            Value::Nodes(_) => false,
        },
        _ => {
            let eq = if matches!(a, Value::Boolean(_)) || matches!(b, Value::Boolean(_)) {
                a.boolean() == b.boolean()
            } else if matches!(a, Value::Number(_)) || matches!(b, Value::Number(_)) {
                a.number(doc) == b.number(doc)
            } else {
                a.string(doc) == b.string(doc)
            };
            eq != ne
        }
    }
}

// Relational comparison is always numeric; against a node-set it is
// existential over the nodes' numeric values.
fn compare_relational(doc: &Document<'_>, op: RelOp, a: &Value, b: &Value) -> bool {
    let cmp = |x: f64, y: f64| match op {
        RelOp::Lt => x < y,
        RelOp::Le => x <= y,
        RelOp::Gt => x > y,
        RelOp::Ge => x >= y,
    };
    let num = |item: &XPathItem| parse_number(&item_string_value(doc, *item));
    match (a, b) {
        (Value::Nodes(xs), Value::Nodes(ys)) => xs
            .iter()
            .any(|x| ys.iter().any(|y| cmp(num(x), num(y)))),
        (Value::Nodes(xs), other) => {
            let rhs = other.number(doc);
            xs.iter().any(|x| cmp(num(x), rhs))
        }
        (other, Value::Nodes(ys)) => {
            let lhs = other.number(doc);
            ys.iter().any(|y| cmp(lhs, num(y)))
        }
        _ => cmp(a.number(doc), b.number(doc)),
    }
}
