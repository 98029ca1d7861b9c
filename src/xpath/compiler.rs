//! Query compiler: expression tree to a linear op sequence.
//!
//! The evaluator is a stack machine; each op pops its operands and pushes
//! one value. Function names and arities are resolved here so evaluation
//! never sees an unknown call.

use crate::xpath::error::XPathError;
use crate::xpath::functions::{self, Function};
use crate::xpath::parser::{AddOp, Axis, EqOp, Expr, MulOp, NodeTest, PathStart, RelOp, Step};

#[derive(Debug, Clone)]
pub(crate) struct CompiledExpr {
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledStep {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<CompiledExpr>,
}

#[derive(Debug, Clone)]
pub(crate) enum Op {
    Number(f64),
    Literal(String),
    /// Push the node-set holding the document root.
    Root,
    /// Push the node-set holding the context item.
    Context,
    /// Pop a node-set, walk one step from each member, push the merged
    /// result in document order.
    Navigate(CompiledStep),
    /// Pop a node-set, keep members satisfying the predicate.
    FilterPredicate(CompiledExpr),
    /// Pop two node-sets, push their union.
    Union,
    Or,
    And,
    Equality(EqOp),
    Relational(RelOp),
    Additive(AddOp),
    Multiplicative(MulOp),
    Negate,
    /// Pop `argc` arguments, push the function result.
    Call(Function, usize),
}

pub(crate) fn compile(expr: &Expr) -> Result<CompiledExpr, XPathError> {
    let mut ops = Vec::new();
    emit(expr, &mut ops)?;
    Ok(CompiledExpr { ops })
}

fn emit(expr: &Expr, ops: &mut Vec<Op>) -> Result<(), XPathError> {
    match expr {
        Expr::Number(n) => ops.push(Op::Number(*n)),
        Expr::Literal(s) => ops.push(Op::Literal(s.clone())),
        Expr::Or(a, b) => {
            emit(a, ops)?;
            emit(b, ops)?;
            ops.push(Op::Or);
        }
        Expr::And(a, b) => {
            emit(a, ops)?;
            emit(b, ops)?;
            ops.push(Op::And);
        }
        Expr::Equality(op, a, b) => {
            emit(a, ops)?;
            emit(b, ops)?;
            ops.push(Op::Equality(*op));
        }
        Expr::Relational(op, a, b) => {
            emit(a, ops)?;
            emit(b, ops)?;
            ops.push(Op::Relational(*op));
        }
        Expr::Additive(op, a, b) => {
            emit(a, ops)?;
            emit(b, ops)?;
            ops.push(Op::Additive(*op));
        }
        Expr::Multiplicative(op, a, b) => {
            emit(a, ops)?;
            emit(b, ops)?;
            ops.push(Op::Multiplicative(*op));
        }
        Expr::Negate(a) => {
            emit(a, ops)?;
            ops.push(Op::Negate);
        }
        Expr::Union(a, b) => {
            emit(a, ops)?;
            emit(b, ops)?;
            ops.push(Op::Union);
        }
        Expr::Function(name, args) => {
            let func = functions::resolve(name, args.len())?;
            for arg in args {
                emit(arg, ops)?;
            }
            ops.push(Op::Call(func, args.len()));
        }
        Expr::Path { start, steps } => {
            ops.push(match start {
                PathStart::Root => Op::Root,
                PathStart::Context => Op::Context,
            });
            for step in steps {
                ops.push(Op::Navigate(compile_step(step)?));
            }
        }
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            emit(primary, ops)?;
            for pred in predicates {
                ops.push(Op::FilterPredicate(compile(pred)?));
            }
            for step in steps {
                ops.push(Op::Navigate(compile_step(step)?));
            }
        }
    }
    Ok(())
}

fn compile_step(step: &Step) -> Result<CompiledStep, XPathError> {
    let mut predicates = Vec::with_capacity(step.predicates.len());
    for pred in &step.predicates {
        predicates.push(compile(pred)?);
    }
    Ok(CompiledStep {
        axis: step.axis,
        test: step.test.clone(),
        predicates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpath::parser::parse;

    #[test]
    fn unknown_functions_fail_at_compile_time() {
        let expr = parse("nonsense(1)").unwrap();
        assert!(matches!(
            compile(&expr),
            Err(XPathError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn arity_is_checked_at_compile_time() {
        let expr = parse("count()").unwrap();
        assert!(matches!(compile(&expr), Err(XPathError::WrongArity { .. })));
        let expr = parse("concat('a')").unwrap();
        assert!(matches!(compile(&expr), Err(XPathError::WrongArity { .. })));
    }

    #[test]
    fn paths_compile_to_navigate_chains() {
        let expr = parse("/a/b[1]").unwrap();
        let compiled = compile(&expr).unwrap();
        assert!(matches!(compiled.ops[0], Op::Root));
        assert!(matches!(compiled.ops[1], Op::Navigate(_)));
        match &compiled.ops[2] {
            Op::Navigate(step) => assert_eq!(step.predicates.len(), 1),
            other => panic!("unexpected op: {other:?}"),
        }
    }
}
