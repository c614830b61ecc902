//! Formula evaluator
//!
//! Evaluates formula ASTs to produce values.

use crate::ast::{BinaryOperator, Expr, Rounding, UnaryOperator};
use crate::error::{EvalResult, EvaluationError};
use crate::functions::{fn_len, fn_sum, Function};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use worksheets_core::{Uuid, Value};

/// Context for formula evaluation
///
/// Implemented by worksheets: field lookup by name, and access to the
/// worksheets that reference fields point at.
pub trait EvaluationContext {
    /// Current value of the named field, or `None` if no such field exists
    fn field_value(&self, name: &str) -> Option<&Value>;

    /// Worksheet with the given identity, if it is reachable from this one
    fn resolve(&self, id: Uuid) -> Option<&dyn EvaluationContext>;
}

/// Evaluate a formula expression
pub fn evaluate(expr: &Expr, ctx: &dyn EvaluationContext) -> EvalResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Selector(path) => evaluate_selector(path, ctx),

        Expr::Unary { op, operand } => evaluate_unary_op(*op, operand, ctx),

        Expr::Binary {
            op,
            left,
            right,
            rounding,
        } => {
            let value = evaluate_binary_op(*op, left, right, ctx)?;
            match (rounding, value) {
                (Some(rounding), Value::Number(n)) => Ok(Value::Number(round(n, *rounding))),
                (_, value) => Ok(value),
            }
        }

        Expr::Call { function, args } => evaluate_function(*function, args, ctx),

        Expr::Return(inner) => evaluate(inner, ctx),

        Expr::External => Err(EvaluationError::ExternalField),
    }
}

/// Round to exactly `rounding.scale` fractional digits
fn round(n: Decimal, rounding: Rounding) -> Decimal {
    let mut rounded = n.round_dp_with_strategy(rounding.scale, rounding.mode.strategy());
    rounded.rescale(rounding.scale);
    rounded
}

/// Walk a selector path, dereferencing reference fields between segments
fn evaluate_selector(path: &[String], ctx: &dyn EvaluationContext) -> EvalResult<Value> {
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| EvaluationError::UndefinedReference(String::new()))?;

    let mut current = ctx;
    let mut value = current
        .field_value(first)
        .ok_or_else(|| EvaluationError::UndefinedReference(first.clone()))?;

    for (i, segment) in rest.iter().enumerate() {
        current = match value {
            Value::Ref(id) => current
                .resolve(*id)
                .ok_or(EvaluationError::DanglingReference(*id))?,
            Value::Undefined => {
                return Err(EvaluationError::NullReference(path[..=i].join(".")));
            }
            other => {
                return Err(EvaluationError::mismatch(format!(
                    "cannot select '{}' through {} '{}'",
                    segment,
                    other.kind(),
                    path[..=i].join(".")
                )));
            }
        };

        value = current
            .field_value(segment)
            .ok_or_else(|| EvaluationError::UndefinedReference(path[..=i + 1].join(".")))?;
    }

    Ok(value.clone())
}

/// Evaluate a unary operation
fn evaluate_unary_op(
    op: UnaryOperator,
    operand: &Expr,
    ctx: &dyn EvaluationContext,
) -> EvalResult<Value> {
    let value = evaluate(operand, ctx)?;

    match (op, value) {
        (_, Value::Undefined) => Ok(Value::Undefined),
        (UnaryOperator::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOperator::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (op, other) => Err(EvaluationError::mismatch(format!(
            "cannot apply '{}' to {}",
            op,
            other.kind()
        ))),
    }
}

/// Evaluate a binary operation
fn evaluate_binary_op(
    op: BinaryOperator,
    left: &Expr,
    right: &Expr,
    ctx: &dyn EvaluationContext,
) -> EvalResult<Value> {
    match op {
        BinaryOperator::And | BinaryOperator::Or => {
            return evaluate_logical_op(op, left, right, ctx);
        }
        _ => {}
    }

    // Evaluate operands first
    let left_val = evaluate(left, ctx)?;
    let right_val = evaluate(right, ctx)?;

    match op {
        // Arithmetic operators
        BinaryOperator::Add => match (&left_val, &right_val) {
            (Value::Text(l), Value::Text(r)) => Ok(Value::Text(format!("{}{}", l, r))),
            _ => arithmetic(op, &left_val, &right_val, Decimal::checked_add),
        },
        BinaryOperator::Subtract => arithmetic(op, &left_val, &right_val, Decimal::checked_sub),
        BinaryOperator::Multiply => arithmetic(op, &left_val, &right_val, Decimal::checked_mul),
        BinaryOperator::Divide => {
            if let Value::Number(r) = &right_val {
                if r.is_zero() && !left_val.is_undefined() {
                    return Err(EvaluationError::DivisionByZero);
                }
            }
            arithmetic(op, &left_val, &right_val, Decimal::checked_div)
        }

        // Structural equality is total
        BinaryOperator::Equal => Ok(Value::Bool(left_val == right_val)),
        BinaryOperator::NotEqual => Ok(Value::Bool(left_val != right_val)),

        // Ordering
        BinaryOperator::LessThan => compare(op, &left_val, &right_val, Ordering::is_lt),
        BinaryOperator::LessEqual => compare(op, &left_val, &right_val, Ordering::is_le),
        BinaryOperator::GreaterThan => compare(op, &left_val, &right_val, Ordering::is_gt),
        BinaryOperator::GreaterEqual => compare(op, &left_val, &right_val, Ordering::is_ge),

        BinaryOperator::And | BinaryOperator::Or => unreachable!("handled above"),
    }
}

fn arithmetic(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    apply: fn(Decimal, Decimal) -> Option<Decimal>,
) -> EvalResult<Value> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => apply(*l, *r)
            .map(Value::Number)
            .ok_or(EvaluationError::Overflow),
        (Value::Undefined, Value::Number(_) | Value::Undefined)
        | (Value::Number(_), Value::Undefined) => Ok(Value::Undefined),
        _ => Err(mismatch(op, left, right)),
    }
}

fn compare(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    test: fn(Ordering) -> bool,
) -> EvalResult<Value> {
    let ordering = match (left, right) {
        (Value::Undefined, _) | (_, Value::Undefined) => return Ok(Value::Undefined),
        (Value::Number(l), Value::Number(r)) => l.cmp(r),
        (Value::Text(l), Value::Text(r)) => l.cmp(r),
        _ => return Err(mismatch(op, left, right)),
    };
    Ok(Value::Bool(test(ordering)))
}

/// `&&` and `||`, short-circuiting on a decisive left operand
fn evaluate_logical_op(
    op: BinaryOperator,
    left: &Expr,
    right: &Expr,
    ctx: &dyn EvaluationContext,
) -> EvalResult<Value> {
    let decisive = op == BinaryOperator::Or;

    let left_val = evaluate(left, ctx)?;
    match left_val {
        Value::Bool(b) if b == decisive => return Ok(Value::Bool(b)),
        Value::Bool(_) | Value::Undefined => {}
        ref other => {
            return Err(EvaluationError::mismatch(format!(
                "'{}' expects bool operands, got {}",
                op,
                other.kind()
            )))
        }
    }

    let right_val = evaluate(right, ctx)?;
    match (&left_val, &right_val) {
        (_, Value::Bool(b)) if *b == decisive => Ok(Value::Bool(*b)),
        (Value::Bool(_), Value::Bool(b)) => Ok(Value::Bool(*b)),
        (_, Value::Bool(_) | Value::Undefined) => Ok(Value::Undefined),
        _ => Err(mismatch(op, &left_val, &right_val)),
    }
}

/// Evaluate a function call
fn evaluate_function(
    function: Function,
    args: &[Expr],
    ctx: &dyn EvaluationContext,
) -> EvalResult<Value> {
    function.check_arity(args.len())?;

    match function {
        Function::Len => fn_len(&evaluate(&args[0], ctx)?),
        Function::Sum => fn_sum(&evaluate(&args[0], ctx)?),
        Function::If => match evaluate(&args[0], ctx)? {
            Value::Bool(true) => evaluate(&args[1], ctx),
            Value::Bool(false) => evaluate(&args[2], ctx),
            Value::Undefined => Ok(Value::Undefined),
            other => Err(EvaluationError::mismatch(format!(
                "if expects a bool condition, got {}",
                other.kind()
            ))),
        },
    }
}

fn mismatch(op: BinaryOperator, left: &Value, right: &Value) -> EvaluationError {
    EvaluationError::mismatch(format!(
        "cannot apply '{}' to {} and {}",
        op,
        left.kind(),
        right.kind()
    ))
}
