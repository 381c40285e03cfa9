//! AST for DynamoDB expression strings.
//!
//! Paths keep `#name` placeholders as attribute elements with the `#` prefix
//! and `:value` references as bare names; both are substituted when the AST
//! is lowered into model conditions and update actions.

use std::fmt;

use dynamongo_model::{AttributePath, CompareOp};

/// Condition, filter or key-condition expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `left op right`
    Compare {
        /// Left-hand operand.
        left: Operand,
        /// Operator.
        op: CompareOp,
        /// Right-hand operand.
        right: Operand,
    },
    /// `value BETWEEN low AND high`
    Between {
        /// Tested operand.
        value: Operand,
        /// Lower bound.
        low: Operand,
        /// Upper bound.
        high: Operand,
    },
    /// `value IN (list...)`
    In {
        /// Tested operand.
        value: Operand,
        /// Candidates.
        list: Vec<Operand>,
    },
    /// `left AND right` / `left OR right`
    Logical {
        /// Operator.
        op: LogicalOp,
        /// Left-hand expression.
        left: Box<Expr>,
        /// Right-hand expression.
        right: Box<Expr>,
    },
    /// `NOT expr`
    Not(Box<Expr>),
    /// `function(args...)`
    Function {
        /// Function name.
        name: FunctionName,
        /// Arguments.
        args: Vec<Operand>,
    },
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `AND`
    And,
    /// `OR`
    Or,
}

/// Condition functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    /// `attribute_exists(path)`
    AttributeExists,
    /// `attribute_not_exists(path)`
    AttributeNotExists,
    /// `attribute_type(path, type)`
    AttributeType,
    /// `begins_with(path, prefix)`
    BeginsWith,
    /// `contains(path, operand)`
    Contains,
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AttributeExists => "attribute_exists",
            Self::AttributeNotExists => "attribute_not_exists",
            Self::AttributeType => "attribute_type",
            Self::BeginsWith => "begins_with",
            Self::Contains => "contains",
        })
    }
}

/// A value producer.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Attribute path, possibly with `#name` elements.
    Path(AttributePath),
    /// `:name` reference, without the colon.
    Value(String),
    /// `size(path)`
    Size(AttributePath),
}

/// Parsed update expression, grouped by clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateExpr {
    /// `SET path = value`
    pub set_actions: Vec<SetAction>,
    /// `REMOVE path`
    pub remove_paths: Vec<AttributePath>,
    /// `ADD path value`
    pub add_actions: Vec<(AttributePath, Operand)>,
    /// `DELETE path value`
    pub delete_actions: Vec<(AttributePath, Operand)>,
}

impl UpdateExpr {
    /// Whether no clause carries an action.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set_actions.is_empty()
            && self.remove_paths.is_empty()
            && self.add_actions.is_empty()
            && self.delete_actions.is_empty()
    }
}

/// `path = value`
#[derive(Debug, Clone, PartialEq)]
pub struct SetAction {
    /// Target.
    pub path: AttributePath,
    /// Right-hand side.
    pub value: SetValue,
}

/// Right-hand side of a SET action.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    /// Plain operand.
    Operand(Operand),
    /// `a + b`
    Plus(Operand, Operand),
    /// `a - b`
    Minus(Operand, Operand),
    /// `if_not_exists(path, operand)`
    IfNotExists(AttributePath, Operand),
    /// `list_append(a, b)`
    ListAppend(Operand, Operand),
}
