//! DynamoDB expression strings.
//!
//! Condition, update and projection expressions with `#name` and `:value`
//! placeholders are parsed into an AST and then lowered into the model's
//! [`Condition`] and [`UpdateAction`] trees, which every other part of the
//! adapter consumes. Forms outside the supported operator subset (`size()`,
//! `attribute_type()`, path-to-path comparisons, arithmetic,
//! `if_not_exists`, `DELETE`) are rejected during lowering.

pub mod ast;
pub mod parser;

use std::collections::HashMap;

use dynamongo_model::{AttributePath, AttributeValue, CompareOp, Condition, PathElement, UpdateAction};

pub use ast::{Expr, Operand, UpdateExpr};
pub use parser::ExpressionError;

use self::ast::{FunctionName, LogicalOp, SetValue};
use crate::error::{AdapterError, AdapterResult};

/// Substitutions for `#name` placeholders, keyed with the `#`.
pub type ExpressionNames = HashMap<String, String>;

/// Substitutions for `:value` placeholders, keyed with the `:`.
pub type ExpressionValues = HashMap<String, AttributeValue>;

/// Parses a condition expression into a condition tree.
///
/// ```
/// use std::collections::HashMap;
/// use dynamongo_core::expression::parse_condition;
/// use dynamongo_model::{AttributeValue, Path};
///
/// let names = HashMap::from([("#s".to_owned(), "status".to_owned())]);
/// let values = HashMap::from([(":s".to_owned(), AttributeValue::from("open"))]);
/// let cond = parse_condition("#s = :s", &names, &values).unwrap();
/// assert_eq!(cond, Path::new("status").eq("open"));
/// ```
pub fn parse_condition(
    input: &str,
    names: &ExpressionNames,
    values: &ExpressionValues,
) -> AdapterResult<Condition> {
    let expr = parser::parse_condition_expr(input)?;
    Lowering { names, values }.condition(expr)
}

/// Parses an update expression into update actions, in clause order.
pub fn parse_update(
    input: &str,
    names: &ExpressionNames,
    values: &ExpressionValues,
) -> AdapterResult<Vec<UpdateAction>> {
    let update = parser::parse_update_expr(input)?;
    Lowering { names, values }.update(update)
}

/// Parses a projection expression into caller paths.
pub fn parse_projection(input: &str, names: &ExpressionNames) -> AdapterResult<Vec<AttributePath>> {
    let values = ExpressionValues::new();
    let lowering = Lowering {
        names,
        values: &values,
    };
    parser::parse_projection_expr(input)?
        .into_iter()
        .map(|p| lowering.path(p))
        .collect()
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

struct Lowering<'a> {
    names: &'a ExpressionNames,
    values: &'a ExpressionValues,
}

impl Lowering<'_> {
    fn path(&self, path: AttributePath) -> AdapterResult<AttributePath> {
        let elements = path
            .elements
            .into_iter()
            .map(|e| match e {
                PathElement::Attribute(name) if name.starts_with('#') => self
                    .names
                    .get(&name)
                    .map(|n| PathElement::Attribute(n.clone()))
                    .ok_or(ExpressionError::UnresolvedName { name }),
                other => Ok(other),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AttributePath { elements })
    }

    fn value(&self, name: &str) -> AdapterResult<AttributeValue> {
        let key = format!(":{name}");
        match self.values.get(&key) {
            Some(v) => Ok(v.clone()),
            None => Err(ExpressionError::UnresolvedValue { name: key }.into()),
        }
    }

    fn literal(&self, operand: Operand, operation: &str) -> AdapterResult<AttributeValue> {
        match operand {
            Operand::Value(name) => self.value(&name),
            Operand::Path(path) => Err(AdapterError::unsupported(
                operation,
                format!("expected a value, found path {path}"),
            )),
            Operand::Size(_) => Err(AdapterError::unsupported("size", "size() is not supported")),
        }
    }

    fn target(&self, operand: Operand, operation: &str) -> AdapterResult<AttributePath> {
        match operand {
            Operand::Path(path) => self.path(path),
            Operand::Value(name) => Err(AdapterError::unsupported(
                operation,
                format!("expected an attribute path, found :{name}"),
            )),
            Operand::Size(_) => Err(AdapterError::unsupported("size", "size() is not supported")),
        }
    }

    fn condition(&self, expr: Expr) -> AdapterResult<Condition> {
        match expr {
            Expr::Compare { left, op, right } => self.compare(left, op, right),
            Expr::Between { value, low, high } => Ok(Condition::Between {
                path: self.target(value, "BETWEEN")?,
                low: self.literal(low, "BETWEEN")?,
                high: self.literal(high, "BETWEEN")?,
            }),
            Expr::In { value, list } => Ok(Condition::In {
                path: self.target(value, "IN")?,
                values: list
                    .into_iter()
                    .map(|o| self.literal(o, "IN"))
                    .collect::<AdapterResult<_>>()?,
            }),
            Expr::Logical { op, left, right } => {
                let left = self.condition(*left)?;
                let right = self.condition(*right)?;
                Ok(match op {
                    LogicalOp::And => Condition::and([left, right]),
                    LogicalOp::Or => Condition::or([left, right]),
                })
            }
            Expr::Not(inner) => Ok(!self.condition(*inner)?),
            Expr::Function { name, args } => self.function(name, args),
        }
    }

    fn compare(&self, left: Operand, op: CompareOp, right: Operand) -> AdapterResult<Condition> {
        let operator = op.to_string();
        match (left, right) {
            (Operand::Size(_), _) | (_, Operand::Size(_)) => {
                Err(AdapterError::unsupported("size", "size() is not supported"))
            }
            (Operand::Path(path), Operand::Value(name)) => Ok(Condition::Compare {
                path: self.path(path)?,
                op,
                value: self.value(&name)?,
            }),
            (Operand::Value(name), Operand::Path(path)) => Ok(Condition::Compare {
                path: self.path(path)?,
                op: flip(op),
                value: self.value(&name)?,
            }),
            (Operand::Path(_), Operand::Path(_)) => Err(AdapterError::unsupported(
                operator,
                "path-to-path comparisons are not supported",
            )),
            (Operand::Value(_), Operand::Value(_)) => Err(AdapterError::unsupported(
                operator,
                "a comparison needs an attribute path",
            )),
        }
    }

    fn function(&self, name: FunctionName, args: Vec<Operand>) -> AdapterResult<Condition> {
        let arity = match name {
            FunctionName::AttributeExists | FunctionName::AttributeNotExists => 1,
            FunctionName::AttributeType => {
                return Err(AdapterError::unsupported(
                    name.to_string(),
                    "attribute_type() is not supported",
                ));
            }
            FunctionName::BeginsWith | FunctionName::Contains => 2,
        };
        if args.len() != arity {
            return Err(ExpressionError::InvalidOperand {
                operation: name.to_string(),
                message: format!("expected {arity} arguments, got {}", args.len()),
            }
            .into());
        }
        let operation = name.to_string();
        let mut args = args.into_iter();
        let (Some(first), second) = (args.next(), args.next()) else {
            return Err(ExpressionError::UnexpectedEof.into());
        };
        let path = self.target(first, &operation)?;
        let operand = |o: Option<Operand>| match o {
            Some(o) => self.literal(o, &operation),
            None => Err(ExpressionError::UnexpectedEof.into()),
        };
        Ok(match name {
            FunctionName::AttributeExists => Condition::Exists(path),
            FunctionName::AttributeNotExists => Condition::NotExists(path),
            FunctionName::BeginsWith => Condition::BeginsWith {
                path,
                prefix: operand(second)?,
            },
            FunctionName::Contains | FunctionName::AttributeType => Condition::Contains {
                path,
                value: operand(second)?,
            },
        })
    }

    fn update(&self, update: UpdateExpr) -> AdapterResult<Vec<UpdateAction>> {
        if let Some((path, _)) = update.delete_actions.first() {
            return Err(AdapterError::unsupported(
                "DELETE",
                format!("DELETE on {path} is not supported"),
            ));
        }
        let mut actions = Vec::new();
        for set in update.set_actions {
            let path = self.path(set.path)?;
            actions.push(self.set(path, set.value)?);
        }
        for path in update.remove_paths {
            actions.push(UpdateAction::Remove {
                path: self.path(path)?,
            });
        }
        for (path, operand) in update.add_actions {
            actions.push(UpdateAction::Add {
                path: self.path(path)?,
                delta: self.literal(operand, "ADD")?,
            });
        }
        Ok(actions)
    }

    fn set(&self, path: AttributePath, value: SetValue) -> AdapterResult<UpdateAction> {
        match value {
            SetValue::Operand(operand) => Ok(UpdateAction::Set {
                value: self.literal(operand, "SET")?,
                path,
            }),
            SetValue::ListAppend(first, second) => {
                let (source, literal, prepend) = match (first, second) {
                    (Operand::Path(p), Operand::Value(v)) => (p, v, false),
                    (Operand::Value(v), Operand::Path(p)) => (p, v, true),
                    _ => {
                        return Err(AdapterError::unsupported(
                            "list_append",
                            "list_append needs the target path and one list value",
                        ));
                    }
                };
                if self.path(source)? != path {
                    return Err(AdapterError::unsupported(
                        "list_append",
                        "list_append must read the path it assigns",
                    ));
                }
                let values = match self.value(&literal)? {
                    AttributeValue::L(values) => values,
                    other => {
                        return Err(AdapterError::validation(format!(
                            "list_append operand must be a list, got {}",
                            other.type_descriptor()
                        )));
                    }
                };
                Ok(UpdateAction::ListAppend {
                    path,
                    values,
                    prepend,
                })
            }
            SetValue::Plus(..) | SetValue::Minus(..) => Err(AdapterError::unsupported(
                "SET",
                "arithmetic in SET is not supported; use ADD",
            )),
            SetValue::IfNotExists(..) => Err(AdapterError::unsupported(
                "if_not_exists",
                "if_not_exists is not supported",
            )),
        }
    }
}

/// The operator with its operands swapped: `:v < a` is `a > :v`.
fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Le => CompareOp::Ge,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Ge => CompareOp::Le,
        other => other,
    }
}
