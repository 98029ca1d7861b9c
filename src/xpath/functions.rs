//! The core function library.
//!
//! Names and arities are checked at compile time by [`resolve`]; [`call`]
//! receives already-evaluated arguments plus the evaluation context for
//! the zero-argument defaults (`string()`, `number()`, `position()`, ...).

use crate::xpath::error::XPathError;
use crate::xpath::eval::EvalContext;
use crate::xpath::value::{item_string_value, parse_number, Value, XPathItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Position,
    Last,
    Count,
    LocalName,
    NamespaceUri,
    Name,
    String,
    Concat,
    StartsWith,
    Contains,
    SubstringBefore,
    SubstringAfter,
    Substring,
    StringLength,
    NormalizeSpace,
    Translate,
    Boolean,
    Not,
    True,
    False,
    Lang,
    Number,
    Sum,
    Floor,
    Ceiling,
    Round,
}

pub(crate) fn resolve(name: &str, argc: usize) -> Result<Function, XPathError> {
    let (func, min, max) = match name {
        "position" => (Function::Position, 0, 0),
        "last" => (Function::Last, 0, 0),
        "count" => (Function::Count, 1, 1),
        "local-name" => (Function::LocalName, 0, 1),
        "namespace-uri" => (Function::NamespaceUri, 0, 1),
        "name" => (Function::Name, 0, 1),
        "string" => (Function::String, 0, 1),
        "concat" => (Function::Concat, 2, usize::MAX),
        "starts-with" => (Function::StartsWith, 2, 2),
        "contains" => (Function::Contains, 2, 2),
        "substring-before" => (Function::SubstringBefore, 2, 2),
        "substring-after" => (Function::SubstringAfter, 2, 2),
        "substring" => (Function::Substring, 2, 3),
        "string-length" => (Function::StringLength, 0, 1),
        "normalize-space" => (Function::NormalizeSpace, 0, 1),
        "translate" => (Function::Translate, 3, 3),
        "boolean" => (Function::Boolean, 1, 1),
        "not" => (Function::Not, 1, 1),
        "true" => (Function::True, 0, 0),
        "false" => (Function::False, 0, 0),
        "lang" => (Function::Lang, 1, 1),
        "number" => (Function::Number, 0, 1),
        "sum" => (Function::Sum, 1, 1),
        "floor" => (Function::Floor, 1, 1),
        "ceiling" => (Function::Ceiling, 1, 1),
        "round" => (Function::Round, 1, 1),
        _ => {
            return Err(XPathError::UnknownFunction {
                name: name.to_string(),
            })
        }
    };
    if argc < min || argc > max {
        return Err(XPathError::WrongArity {
            name: name.to_string(),
        });
    }
    Ok(func)
}

pub(crate) fn call(
    func: Function,
    args: Vec<Value>,
    ctx: &EvalContext<'_, '_, '_>,
) -> Result<Value, XPathError> {
    let doc = ctx.doc();
    let result = match func {
        Function::Position => Value::Number(ctx.position as f64),
        Function::Last => Value::Number(ctx.size as f64),
        Function::Count => match &args[0] {
            Value::Nodes(items) => Value::Number(items.len() as f64),
            _ => return Err(XPathError::NotANodeSet),
        },
        Function::LocalName => {
            let name = subject_name(ctx, &args)?;
            let local = match name.split_once(':') {
                Some((_, local)) => local.to_string(),
                None => name,
            };
            Value::String(local)
        }
        // Namespace declarations are not tracked; every node's URI is "".
        Function::NamespaceUri => {
            subject_name(ctx, &args)?;
            Value::String(String::new())
        }
        Function::Name => Value::String(subject_name(ctx, &args)?),
        Function::String => Value::String(subject_string(ctx, &args)),
        Function::Concat => {
            let mut out = String::new();
            for arg in &args {
                out.push_str(&arg.string(doc));
            }
            Value::String(out)
        }
        Function::StartsWith => {
            let a = args[0].string(doc);
            let b = args[1].string(doc);
            Value::Boolean(a.starts_with(&b))
        }
        Function::Contains => {
            let a = args[0].string(doc);
            let b = args[1].string(doc);
            Value::Boolean(a.contains(&b))
        }
        Function::SubstringBefore => {
            let a = args[0].string(doc);
            let b = args[1].string(doc);
            Value::String(match a.find(&b) {
                Some(i) => a[..i].to_string(),
                None => String::new(),
            })
        }
        Function::SubstringAfter => {
            let a = args[0].string(doc);
            let b = args[1].string(doc);
            Value::String(match a.find(&b) {
                Some(i) => a[i + b.len()..].to_string(),
                None => String::new(),
            })
        }
        Function::Substring => {
            let s = args[0].string(doc);
            let start = round_half_up(args[1].number(doc));
            let end = if args.len() == 3 {
                start + round_half_up(args[2].number(doc))
            } else {
                f64::INFINITY
            };
            // One-based character positions; NaN bounds select nothing.
            let out: String = s
                .chars()
                .enumerate()
                .filter(|(i, _)| {
                    let pos = (i + 1) as f64;
                    pos >= start && pos < end
                })
                .map(|(_, c)| c)
                .collect();
            Value::String(out)
        }
        Function::StringLength => {
            let s = subject_string(ctx, &args);
            Value::Number(s.chars().count() as f64)
        }
        Function::NormalizeSpace => {
            let s = subject_string(ctx, &args);
            Value::String(s.split_whitespace().collect::<Vec<_>>().join(" "))
        }
        Function::Translate => {
            let s = args[0].string(doc);
            let from: Vec<char> = args[1].string(doc).chars().collect();
            let to: Vec<char> = args[2].string(doc).chars().collect();
            let out: String = s
                .chars()
                .filter_map(|c| match from.iter().position(|&f| f == c) {
                    Some(i) => to.get(i).copied(),
                    None => Some(c),
                })
                .collect();
            Value::String(out)
        }
        Function::Boolean => Value::Boolean(args[0].boolean()),
        Function::Not => Value::Boolean(!args[0].boolean()),
        Function::True => Value::Boolean(true),
        Function::False => Value::Boolean(false),
        Function::Lang => {
            let want = args[0].string(doc).to_ascii_lowercase();
            let mut cur = Some(ctx.item.node);
            let mut found = false;
            while let Some(n) = cur {
                if let Some(attr) = doc.attribute(n, "xml:lang") {
                    let lang = doc.attr_value(attr).to_ascii_lowercase();
                    found = lang == want || lang.starts_with(&format!("{want}-"));
                    break;
                }
                cur = doc.parent(n);
            }
            Value::Boolean(found)
        }
        Function::Number => {
            let n = match args.first() {
                Some(v) => v.number(doc),
                None => parse_number(&item_string_value(doc, ctx.item)),
            };
            Value::Number(n)
        }
        Function::Sum => match &args[0] {
            Value::Nodes(items) => {
                let sum = items
                    .iter()
                    .map(|i| parse_number(&item_string_value(doc, *i)))
                    .sum();
                Value::Number(sum)
            }
            _ => return Err(XPathError::NotANodeSet),
        },
        Function::Floor => Value::Number(args[0].number(doc).floor()),
        Function::Ceiling => Value::Number(args[0].number(doc).ceil()),
        Function::Round => Value::Number(round_half_up(args[0].number(doc))),
    };
    Ok(result)
}

/// Name of the context item or of the first node of a node-set argument.
fn subject_name(
    ctx: &EvalContext<'_, '_, '_>,
    args: &[Value],
) -> Result<String, XPathError> {
    let doc = ctx.doc();
    let item = match args.first() {
        None => Some(ctx.item),
        Some(Value::Nodes(items)) => items.first().copied(),
        Some(_) => return Err(XPathError::NotANodeSet),
    };
    Ok(match item {
        Some(XPathItem {
            attr: Some(attr), ..
        }) => doc.attr_name(attr).to_string(),
        Some(XPathItem { node, .. }) => doc.name(node).to_string(),
        None => String::new(),
    })
}

/// `string()`-style default: the argument, or the context item's string
/// value when absent.
fn subject_string(ctx: &EvalContext<'_, '_, '_>, args: &[Value]) -> String {
    match args.first() {
        Some(v) => v.string(ctx.doc()),
        None => item_string_value(ctx.doc(), ctx.item),
    }
}

/// `round()` semantics: half rounds toward positive infinity. NaN and the
/// infinities pass through.
fn round_half_up(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}
