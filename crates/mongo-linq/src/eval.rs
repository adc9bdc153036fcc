//! Direct evaluation of expression trees.
//!
//! Used twice: the partial evaluator folds row-independent subtrees with no
//! row at all, and [`Projector`](crate::Projector) shapes decoded rows.

use std::cmp::Ordering;

use mongo_bson::{Bson, Document};

use crate::error::{QueryError, Result};
use crate::expr::{BinaryOp, Expr, Method, UnaryOp};

/// Evaluates `expr`. Parameters, fields and row fields read from `row`;
/// without a row they are an evaluation error.
pub fn evaluate(expr: &Expr, row: Option<&Document>) -> Result<Bson> {
    match expr {
        Expr::Constant(value) => Ok(value.clone()),
        Expr::Parameter(name) => row
            .map(|r| Bson::Document(r.clone()))
            .ok_or_else(|| QueryError::Evaluation(format!("parameter {name} is not bound to a row"))),
        Expr::RowField(path) => lookup(row, path),
        Expr::Field(field) => lookup(row, &field.name),
        Expr::Member { expression, member } => member_of(evaluate(expression, row)?, member),
        Expr::Binary { op, left, right } => binary(*op, left, right, row),
        Expr::Unary { op, operand } => unary(*op, evaluate(operand, row)?),
        Expr::Call {
            method,
            object,
            arguments,
        } => call(method, object.as_deref(), arguments, row),
        Expr::New(fields) => {
            let mut document = Document::with_capacity(fields.len());
            for (name, value) in fields {
                document.insert(name.clone(), evaluate(value, row)?);
            }
            Ok(Bson::Document(document))
        }
        other => Err(QueryError::not_supported(format!(
            "{} expressions cannot be evaluated",
            other.kind()
        ))),
    }
}

fn lookup(row: Option<&Document>, path: &str) -> Result<Bson> {
    let row = row.ok_or_else(|| QueryError::Evaluation(format!("field {path} read without a row")))?;
    Ok(row.get_path(path).cloned().unwrap_or(Bson::Null))
}

fn length(len: usize) -> Bson {
    i32::try_from(len)
        .map(Bson::Int32)
        .unwrap_or_else(|_| Bson::Int64(len as i64))
}

fn member_of(value: Bson, member: &str) -> Result<Bson> {
    match (value, member) {
        (Bson::Document(mut document), _) => Ok(document.remove(member).unwrap_or(Bson::Null)),
        (Bson::String(s), "Length") => Ok(length(s.chars().count())),
        (Bson::Array(items), "Length" | "Count") => Ok(length(items.len())),
        (other, _) => Err(QueryError::Evaluation(format!(
            "{:?} value has no member {member}",
            other.element_type()
        ))),
    }
}

fn truth(value: &Bson) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| QueryError::Evaluation(format!("expected a boolean, found {:?}", value.element_type())))
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, row: Option<&Document>) -> Result<Bson> {
    match op {
        BinaryOp::And | BinaryOp::AndAlso => {
            if !truth(&evaluate(left, row)?)? {
                return Ok(Bson::Boolean(false));
            }
            Ok(Bson::Boolean(truth(&evaluate(right, row)?)?))
        }
        BinaryOp::Or | BinaryOp::OrElse => {
            if truth(&evaluate(left, row)?)? {
                return Ok(Bson::Boolean(true));
            }
            Ok(Bson::Boolean(truth(&evaluate(right, row)?)?))
        }
        BinaryOp::Coalesce => match evaluate(left, row)? {
            Bson::Null => evaluate(right, row),
            value => Ok(value),
        },
        _ => {
            let l = evaluate(left, row)?;
            let r = evaluate(right, row)?;
            apply(op, l, r)
        }
    }
}

/// Applies a non-short-circuit operator to two evaluated operands.
pub(crate) fn apply(op: BinaryOp, l: Bson, r: Bson) -> Result<Bson> {
    match op {
        BinaryOp::Equal => Ok(Bson::Boolean(values_equal(&l, &r))),
        BinaryOp::NotEqual => Ok(Bson::Boolean(!values_equal(&l, &r))),
        BinaryOp::GreaterThan => compare(&l, &r).map(|o| Bson::Boolean(o == Ordering::Greater)),
        BinaryOp::GreaterThanOrEqual => compare(&l, &r).map(|o| Bson::Boolean(o != Ordering::Less)),
        BinaryOp::LessThan => compare(&l, &r).map(|o| Bson::Boolean(o == Ordering::Less)),
        BinaryOp::LessThanOrEqual => compare(&l, &r).map(|o| Bson::Boolean(o != Ordering::Greater)),
        BinaryOp::Add if matches!(l, Bson::String(_)) || matches!(r, Bson::String(_)) => {
            Ok(Bson::String(format!("{}{}", text(&l), text(&r))))
        }
        BinaryOp::ExclusiveOr if matches!(l, Bson::Boolean(_)) => Ok(Bson::Boolean(truth(&l)? ^ truth(&r)?)),
        _ => arithmetic(op, &l, &r),
    }
}

/// String form used by concatenation; null concatenates as empty.
fn text(value: &Bson) -> String {
    match value {
        Bson::Null => String::new(),
        Bson::String(s) => s.clone(),
        Bson::Int32(v) => v.to_string(),
        Bson::Int64(v) => v.to_string(),
        Bson::Double(v) => v.to_string(),
        Bson::Boolean(v) => v.to_string(),
        Bson::ObjectId(id) => id.to_hex(),
        other => format!("{other:?}"),
    }
}

fn values_equal(l: &Bson, r: &Bson) -> bool {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => l == r,
    }
}

fn compare(l: &Bson, r: &Bson) -> Result<Ordering> {
    let ordering = match (l, r) {
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        _ => match (l.as_i64(), r.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => l.as_f64().zip(r.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
        },
    };
    ordering.ok_or_else(|| {
        QueryError::Evaluation(format!(
            "cannot compare {:?} with {:?}",
            l.element_type(),
            r.element_type()
        ))
    })
}

fn overflow(op: BinaryOp) -> QueryError {
    QueryError::Evaluation(format!("{op} overflowed"))
}

fn integer_op(op: BinaryOp, a: i64, b: i64) -> Result<i64> {
    let shift = || u32::try_from(b).map_err(|_| QueryError::Evaluation(format!("invalid shift amount {b}")));
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
            return Err(QueryError::Evaluation("division by zero".into()));
        }
        BinaryOp::Divide => a.checked_div(b),
        BinaryOp::Modulo => a.checked_rem(b),
        BinaryOp::ExclusiveOr => Some(a ^ b),
        BinaryOp::LeftShift => a.checked_shl(shift()?),
        BinaryOp::RightShift => a.checked_shr(shift()?),
        other => {
            return Err(QueryError::not_supported(format!("The operation {other} is not supported.")));
        }
    };
    result.ok_or_else(|| overflow(op))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<f64> {
    Ok(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        other => {
            return Err(QueryError::not_supported(format!("The operation {other} is not supported.")));
        }
    })
}

/// Int32 operands stay Int32, Int64 widens, any double makes a double.
fn arithmetic(op: BinaryOp, l: &Bson, r: &Bson) -> Result<Bson> {
    match (l, r) {
        (Bson::Int32(a), Bson::Int32(b)) => {
            let value = integer_op(op, i64::from(*a), i64::from(*b))?;
            i32::try_from(value).map(Bson::Int32).map_err(|_| overflow(op))
        }
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let (a, b) = l.as_i64().zip(r.as_i64()).ok_or_else(|| overflow(op))?;
            integer_op(op, a, b).map(Bson::Int64)
        }
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => float_op(op, a, b).map(Bson::Double),
            _ => Err(QueryError::Evaluation(format!(
                "{op} is not defined for {:?} and {:?}",
                l.element_type(),
                r.element_type()
            ))),
        },
    }
}

fn unary(op: UnaryOp, value: Bson) -> Result<Bson> {
    match (op, value) {
        (UnaryOp::Not, Bson::Boolean(b)) => Ok(Bson::Boolean(!b)),
        (UnaryOp::Negate, Bson::Int32(v)) => v.checked_neg().map(Bson::Int32).ok_or_else(|| {
            QueryError::Evaluation("Negate overflowed".into())
        }),
        (UnaryOp::Negate, Bson::Int64(v)) => v.checked_neg().map(Bson::Int64).ok_or_else(|| {
            QueryError::Evaluation("Negate overflowed".into())
        }),
        (UnaryOp::Negate, Bson::Double(v)) => Ok(Bson::Double(-v)),
        (op, other) => Err(QueryError::Evaluation(format!(
            "{op} is not defined for {:?}",
            other.element_type()
        ))),
    }
}

fn string_argument(method: &Method, value: &Bson) -> Result<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| QueryError::Evaluation(format!("{method} expects a string argument")))
}

fn call(method: &Method, object: Option<&Expr>, arguments: &[Expr], row: Option<&Document>) -> Result<Bson> {
    let args = arguments
        .iter()
        .map(|a| evaluate(a, row))
        .collect::<Result<Vec<_>>>()?;
    match (method, object, args.as_slice()) {
        (Method::StartsWith | Method::EndsWith | Method::Contains, Some(object), [value]) => {
            let target = string_argument(method, &evaluate(object, row)?)?;
            let value = string_argument(method, value)?;
            let found = match method {
                Method::StartsWith => target.starts_with(&value),
                Method::EndsWith => target.ends_with(&value),
                _ => target.contains(&value),
            };
            Ok(Bson::Boolean(found))
        }
        (Method::IsMatch, None, [input, pattern]) => {
            let input = string_argument(method, input)?;
            let pattern = string_argument(method, pattern)?;
            let regex = regex::Regex::new(&pattern).map_err(|e| QueryError::Evaluation(e.to_string()))?;
            Ok(Bson::Boolean(regex.is_match(&input)))
        }
        (Method::Count, None, [Bson::Array(items)]) => Ok(length(items.len())),
        _ => Err(QueryError::not_supported(format!("The method {method} is not supported."))),
    }
}
