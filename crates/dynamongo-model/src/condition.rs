//! Condition trees.
//!
//! A [`Condition`] is the key-value side of a predicate: comparison,
//! `begins_with`, `between`, `contains`, `IN`, existence checks, and the
//! logical combinators. Conditions are built either with the [`Path`]
//! builder or by parsing an expression string in the adapter crate.
//!
//! ```
//! use dynamongo_model::{AttributeValue, Path};
//!
//! let cond = Path::new("status").eq("active")
//!     & Path::new("age").between(AttributeValue::n(18), AttributeValue::n(65))
//!     & !Path::new("deleted_at").exists();
//! assert_eq!(cond.leaf_count(), 3);
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use crate::attribute_value::AttributeValue;
use crate::error::ModelError;
use crate::path::AttributePath;

/// Maximum number of operands accepted by `IN`.
pub const MAX_IN_OPERANDS: usize = 100;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Whether the operator orders values (everything except `=` and `<>`).
    #[must_use]
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// A condition tree over caller attribute paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `path op value`
    Compare {
        /// Left-hand path.
        path: AttributePath,
        /// Operator.
        op: CompareOp,
        /// Literal operand.
        value: AttributeValue,
    },
    /// `path BETWEEN low AND high`, inclusive on both ends.
    Between {
        /// Path.
        path: AttributePath,
        /// Lower bound.
        low: AttributeValue,
        /// Upper bound.
        high: AttributeValue,
    },
    /// `begins_with(path, prefix)`
    BeginsWith {
        /// Path.
        path: AttributePath,
        /// Prefix literal (S or B).
        prefix: AttributeValue,
    },
    /// `contains(path, value)`
    Contains {
        /// Path.
        path: AttributePath,
        /// Substring or element.
        value: AttributeValue,
    },
    /// `path IN (v1, v2, ...)`
    In {
        /// Path.
        path: AttributePath,
        /// Candidate values.
        values: Vec<AttributeValue>,
    },
    /// `attribute_exists(path)`
    Exists(AttributePath),
    /// `attribute_not_exists(path)`
    NotExists(AttributePath),
    /// Every child holds.
    And(Vec<Condition>),
    /// At least one child holds.
    Or(Vec<Condition>),
    /// The child does not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// Conjunction of `conditions`, flattening nested `And`s.
    #[must_use]
    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut out = Vec::new();
        for c in conditions {
            match c {
                Self::And(children) => out.extend(children),
                other => out.push(other),
            }
        }
        Self::And(out)
    }

    /// Disjunction of `conditions`, flattening nested `Or`s.
    #[must_use]
    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut out = Vec::new();
        for c in conditions {
            match c {
                Self::Or(children) => out.extend(children),
                other => out.push(other),
            }
        }
        Self::Or(out)
    }

    /// Number of leaf predicates in the tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::And(children) | Self::Or(children) => {
                children.iter().map(Self::leaf_count).sum()
            }
            Self::Not(inner) => inner.leaf_count(),
            _ => 1,
        }
    }

    /// Visits every path referenced by the tree.
    pub fn for_each_path<'a>(&'a self, f: &mut impl FnMut(&'a AttributePath)) {
        match self {
            Self::Compare { path, .. }
            | Self::Between { path, .. }
            | Self::BeginsWith { path, .. }
            | Self::Contains { path, .. }
            | Self::In { path, .. }
            | Self::Exists(path)
            | Self::NotExists(path) => f(path),
            Self::And(children) | Self::Or(children) => {
                for c in children {
                    c.for_each_path(f);
                }
            }
            Self::Not(inner) => inner.for_each_path(f),
        }
    }
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Self) -> Self::Output {
        Condition::and([self, rhs])
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Self) -> Self::Output {
        Condition::or([self, rhs])
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Self::Output {
        match self {
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { path, op, value } => write!(f, "{path} {op} {value}"),
            Self::Between { path, low, high } => write!(f, "{path} BETWEEN {low} AND {high}"),
            Self::BeginsWith { path, prefix } => write!(f, "begins_with({path}, {prefix})"),
            Self::Contains { path, value } => write!(f, "contains({path}, {value})"),
            Self::In { path, values } => {
                write!(f, "{path} IN (")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
            Self::Exists(path) => write!(f, "attribute_exists({path})"),
            Self::NotExists(path) => write!(f, "attribute_not_exists({path})"),
            Self::And(children) => write_joined(f, children, " AND "),
            Self::Or(children) => write_joined(f, children, " OR "),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Condition], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, c) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{c}")?;
    }
    f.write_str(")")
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Fluent builder for conditions and update actions on one attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(AttributePath);

impl Path {
    /// A top-level attribute.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(AttributePath::attribute(name))
    }

    /// Parses `a.b[0]` notation.
    pub fn parse(path: &str) -> Result<Self, ModelError> {
        AttributePath::parse(path).map(Self)
    }

    /// Descends into a map key.
    #[must_use]
    pub fn key(self, name: impl Into<String>) -> Self {
        Self(self.0.key(name))
    }

    /// Descends into a list element.
    #[must_use]
    pub fn index(self, idx: usize) -> Self {
        Self(self.0.index(idx))
    }

    /// The underlying path.
    #[must_use]
    pub fn path(&self) -> &AttributePath {
        &self.0
    }

    /// Consumes the builder, returning the path.
    #[must_use]
    pub fn into_path(self) -> AttributePath {
        self.0
    }

    fn compare(self, op: CompareOp, value: impl Into<AttributeValue>) -> Condition {
        Condition::Compare {
            path: self.0,
            op,
            value: value.into(),
        }
    }

    /// `path = value`
    #[must_use]
    pub fn eq(self, value: impl Into<AttributeValue>) -> Condition {
        self.compare(CompareOp::Eq, value)
    }

    /// `path <> value`
    #[must_use]
    pub fn ne(self, value: impl Into<AttributeValue>) -> Condition {
        self.compare(CompareOp::Ne, value)
    }

    /// `path < value`
    #[must_use]
    pub fn lt(self, value: impl Into<AttributeValue>) -> Condition {
        self.compare(CompareOp::Lt, value)
    }

    /// `path <= value`
    #[must_use]
    pub fn le(self, value: impl Into<AttributeValue>) -> Condition {
        self.compare(CompareOp::Le, value)
    }

    /// `path > value`
    #[must_use]
    pub fn gt(self, value: impl Into<AttributeValue>) -> Condition {
        self.compare(CompareOp::Gt, value)
    }

    /// `path >= value`
    #[must_use]
    pub fn ge(self, value: impl Into<AttributeValue>) -> Condition {
        self.compare(CompareOp::Ge, value)
    }

    /// `path BETWEEN low AND high`
    #[must_use]
    pub fn between(
        self,
        low: impl Into<AttributeValue>,
        high: impl Into<AttributeValue>,
    ) -> Condition {
        Condition::Between {
            path: self.0,
            low: low.into(),
            high: high.into(),
        }
    }

    /// `begins_with(path, prefix)`
    #[must_use]
    pub fn begins_with(self, prefix: impl Into<AttributeValue>) -> Condition {
        Condition::BeginsWith {
            path: self.0,
            prefix: prefix.into(),
        }
    }

    /// `contains(path, value)`
    #[must_use]
    pub fn contains(self, value: impl Into<AttributeValue>) -> Condition {
        Condition::Contains {
            path: self.0,
            value: value.into(),
        }
    }

    /// `path IN (values...)`
    #[must_use]
    pub fn is_in<V: Into<AttributeValue>>(self, values: impl IntoIterator<Item = V>) -> Condition {
        Condition::In {
            path: self.0,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `attribute_exists(path)`
    #[must_use]
    pub fn exists(self) -> Condition {
        Condition::Exists(self.0)
    }

    /// `attribute_not_exists(path)`
    #[must_use]
    pub fn does_not_exist(self) -> Condition {
        Condition::NotExists(self.0)
    }
}

impl From<AttributePath> for Path {
    fn from(path: AttributePath) -> Self {
        Self(path)
    }
}
