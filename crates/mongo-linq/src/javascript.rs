//! Rendering of bound expressions as JavaScript source.

use std::fmt;

use mongo_bson::Bson;

use crate::error::{QueryError, Result};
use crate::expr::{BinaryOp, Expr, Method, UnaryOp};

/// Generated JavaScript source, as sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaScript(pub String);

impl JavaScript {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JavaScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<JavaScript> for Bson {
    fn from(js: JavaScript) -> Self {
        Bson::JavaScriptCode(js.0)
    }
}

/// Renders field references as `this.<name>`, so the output is meant to run
/// with a document as the receiver (map functions, `$where`).
#[derive(Debug, Default)]
pub struct JavascriptFormatter {
    js: String,
}

impl JavascriptFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(&mut self, expr: &Expr) -> Result<String> {
        self.js.clear();
        self.visit(expr)?;
        Ok(std::mem::take(&mut self.js))
    }

    fn visit(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Binary { op, left, right } => {
                let symbol = operator_symbol(*op)?;
                self.js.push('(');
                self.visit(left)?;
                self.js.push_str(symbol);
                self.visit(right)?;
                self.js.push(')');
            }
            Expr::Constant(value) => {
                let literal = constant_literal(value)?;
                self.js.push_str(&literal);
            }
            Expr::Field(field) => {
                self.js.push_str(&format!("this.{}", field.name));
            }
            Expr::Member { expression, member } => match member.as_str() {
                "Length" | "Count" => {
                    self.visit(expression)?;
                    self.js.push_str(".length");
                }
                _ => {
                    return Err(QueryError::not_supported(format!(
                        "The member {member} is not supported."
                    )))
                }
            },
            Expr::Call {
                method,
                object,
                arguments,
            } => self.visit_call(method, object.as_deref(), arguments)?,
            Expr::Unary { op: UnaryOp::Not, operand } => {
                self.js.push_str("!(");
                self.visit(operand)?;
                self.js.push(')');
            }
            Expr::Unary { op, .. } => {
                return Err(QueryError::not_supported(format!(
                    "The unary operator {op} is not supported."
                )))
            }
            other => {
                return Err(QueryError::not_supported(format!(
                    "The expression {} is not supported.",
                    other.kind()
                )))
            }
        }
        Ok(())
    }

    fn visit_call(&mut self, method: &Method, object: Option<&Expr>, arguments: &[Expr]) -> Result<()> {
        match method {
            Method::Count => match arguments {
                [source] => {
                    self.visit(source)?;
                    self.js.push_str(".length");
                    Ok(())
                }
                _ => Err(QueryError::not_supported(
                    "The method Count with a predicate is not supported for field.",
                )),
            },
            Method::StartsWith | Method::EndsWith | Method::Contains => {
                let field = object
                    .filter(|o| o.as_field().is_some())
                    .ok_or_else(|| field_required(method))?;
                let value = regex_literal(&escape_regex(constant_string(arguments.first())?));
                let pattern = match method {
                    Method::StartsWith => format!("^{value}"),
                    Method::EndsWith => format!("{value}$"),
                    _ => value,
                };
                self.js.push_str(&format!("/{pattern}/.test("));
                self.visit(field)?;
                self.js.push(')');
                Ok(())
            }
            Method::IsMatch => {
                if object.is_some() {
                    return Err(QueryError::invalid("Only the static Regex.IsMatch is supported."));
                }
                let field = arguments
                    .first()
                    .filter(|a| a.as_field().is_some())
                    .ok_or_else(|| field_required(method))?;
                let pattern = regex_literal(constant_string(arguments.get(1))?);
                self.js.push_str(&format!("/{pattern}/.test("));
                self.visit(field)?;
                self.js.push(')');
                Ok(())
            }
            Method::Other(name) => Err(QueryError::not_supported(format!(
                "The method {name} is not supported."
            ))),
        }
    }
}

fn operator_symbol(op: BinaryOp) -> Result<&'static str> {
    Ok(match op {
        BinaryOp::Equal => " === ",
        BinaryOp::NotEqual => " != ",
        BinaryOp::GreaterThan => " > ",
        BinaryOp::GreaterThanOrEqual => " >= ",
        BinaryOp::LessThan => " < ",
        BinaryOp::LessThanOrEqual => " <= ",
        BinaryOp::Modulo => " % ",
        BinaryOp::And | BinaryOp::AndAlso => " && ",
        BinaryOp::Or | BinaryOp::OrElse | BinaryOp::Coalesce => " || ",
        BinaryOp::Add => " + ",
        BinaryOp::Subtract => " - ",
        BinaryOp::Multiply => " * ",
        BinaryOp::Divide => " / ",
        BinaryOp::ExclusiveOr => " ^ ",
        BinaryOp::LeftShift => " << ",
        BinaryOp::RightShift => " >> ",
    })
}

fn constant_literal(value: &Bson) -> Result<String> {
    Ok(match value {
        Bson::Null => "null".to_owned(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) if n.is_finite() => n.to_string(),
        Bson::String(s) => serde_json::to_string(s).map_err(|e| QueryError::Evaluation(e.to_string()))?,
        other => {
            return Err(QueryError::not_supported(format!(
                "The constant of type {:?} is not supported.",
                other.element_type()
            )))
        }
    })
}

fn constant_string(expr: Option<&Expr>) -> Result<&str> {
    expr.and_then(Expr::as_constant)
        .and_then(Bson::as_str)
        .ok_or_else(|| QueryError::invalid("Expression must be a constant."))
}

pub(crate) fn field_required(method: &Method) -> QueryError {
    QueryError::invalid(format!(
        "The mongo field must be the operator for a string operation of type {method}."
    ))
}

pub(crate) fn escape_regex(value: &str) -> String {
    regex::escape(value)
}

/// Escapes the delimiter of a `/…/` literal.
fn regex_literal(pattern: impl AsRef<str>) -> String {
    pattern.as_ref().replace('/', "\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn js(expr: &Expr) -> Result<String> {
        JavascriptFormatter::new().format(expr)
    }

    #[test]
    fn binary_operators_are_parenthesized() {
        let expr = Expr::field("t0", "Age").gt(21).and(Expr::field("t0", "Name").equal("Jack"));
        assert_eq!(js(&expr).unwrap(), r#"((this.Age > 21) && (this.Name === "Jack"))"#);
    }

    #[test]
    fn lengths_and_counts() {
        assert_eq!(js(&Expr::field("t0", "Tags").length()).unwrap(), "this.Tags.length");
        assert_eq!(js(&Expr::field("t0", "Tags").count()).unwrap(), "this.Tags.length");
        let err = js(&Expr::field("t0", "Tags").member("Capacity")).unwrap_err();
        assert_eq!(err.to_string(), "The member Capacity is not supported.");
    }

    #[test]
    fn string_predicates_render_regex_tests() {
        assert_eq!(
            js(&Expr::field("t0", "Name").starts_with("J.")).unwrap(),
            r"/^J\./.test(this.Name)"
        );
        assert_eq!(
            js(&Expr::is_match(Expr::field("t0", "Path"), "^a/b")).unwrap(),
            r"/^a\/b/.test(this.Path)"
        );
        assert_eq!(js(&!Expr::field("t0", "Active")).unwrap(), "!(this.Active)");
    }

    #[test]
    fn unsupported_shapes_name_the_offender() {
        let err = js(&Expr::call("Trim", Some(Expr::field("t0", "Name")), vec![])).unwrap_err();
        assert_eq!(err.to_string(), "The method Trim is not supported.");
        let err = js(&-Expr::field("t0", "Age")).unwrap_err();
        assert_eq!(err.to_string(), "The unary operator Negate is not supported.");
        let err = js(&Expr::from("x").starts_with("y")).unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }
}
