//! Lexer and recursive-descent parser for DynamoDB expression strings.
//!
//! Keywords and function names match case-insensitively.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use dynamongo_model::{AttributePath, CompareOp, PathElement};

use super::ast::{Expr, FunctionName, LogicalOp, Operand, SetAction, SetValue, UpdateExpr};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced while parsing or lowering an expression string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// An unexpected token was encountered.
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
    },
    /// The expression ended prematurely.
    #[error("unexpected end of expression")]
    UnexpectedEof,
    /// A `#name` placeholder has no substitution.
    #[error("unresolved expression attribute name: {name}")]
    UnresolvedName {
        /// The placeholder, with its `#`.
        name: String,
    },
    /// A `:value` placeholder has no substitution.
    #[error("unresolved expression attribute value: {name}")]
    UnresolvedValue {
        /// The placeholder, with its `:`.
        name: String,
    },
    /// An operand is invalid for the given operation.
    #[error("invalid operand for {operation}: {message}")]
    InvalidOperand {
        /// The operation.
        operation: String,
        /// Explanation.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    NamePlaceholder(String),
    ValuePlaceholder(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    And,
    Or,
    Not,
    Between,
    In,
    Set,
    Remove,
    Add,
    Delete,
    AttributeExists,
    AttributeNotExists,
    AttributeType,
    BeginsWith,
    Contains,
    Size,
    IfNotExists,
    ListAppend,
    Number(usize),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "identifier '{s}'"),
            Self::NamePlaceholder(s) => write!(f, "#{s}"),
            Self::ValuePlaceholder(s) => write!(f, ":{s}"),
            Self::Eq => f.write_str("'='"),
            Self::Ne => f.write_str("'<>'"),
            Self::Lt => f.write_str("'<'"),
            Self::Le => f.write_str("'<='"),
            Self::Gt => f.write_str("'>'"),
            Self::Ge => f.write_str("'>='"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Dot => f.write_str("'.'"),
            Self::Comma => f.write_str("','"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Not => f.write_str("NOT"),
            Self::Between => f.write_str("BETWEEN"),
            Self::In => f.write_str("IN"),
            Self::Set => f.write_str("SET"),
            Self::Remove => f.write_str("REMOVE"),
            Self::Add => f.write_str("ADD"),
            Self::Delete => f.write_str("DELETE"),
            Self::AttributeExists => f.write_str("attribute_exists"),
            Self::AttributeNotExists => f.write_str("attribute_not_exists"),
            Self::AttributeType => f.write_str("attribute_type"),
            Self::BeginsWith => f.write_str("begins_with"),
            Self::Contains => f.write_str("contains"),
            Self::Size => f.write_str("size"),
            Self::IfNotExists => f.write_str("if_not_exists"),
            Self::ListAppend => f.write_str("list_append"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Eof => f.write_str("EOF"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn single(&mut self, tok: Token) -> Token {
        self.chars.next();
        tok
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        while self.chars.peek().is_some_and(char::is_ascii_whitespace) {
            self.chars.next();
        }
        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };
        Ok(match ch {
            '#' => {
                self.chars.next();
                Token::NamePlaceholder(self.placeholder('#')?)
            }
            ':' => {
                self.chars.next();
                Token::ValuePlaceholder(self.placeholder(':')?)
            }
            '=' => self.single(Token::Eq),
            '<' => {
                self.chars.next();
                match self.chars.peek() {
                    Some('=') => self.single(Token::Le),
                    Some('>') => self.single(Token::Ne),
                    _ => Token::Lt,
                }
            }
            '>' => {
                self.chars.next();
                if self.chars.peek() == Some(&'=') {
                    self.single(Token::Ge)
                } else {
                    Token::Gt
                }
            }
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '.' => self.single(Token::Dot),
            ',' => self.single(Token::Comma),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            c if c.is_ascii_digit() => self.number()?,
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
            _ => {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "valid token".to_owned(),
                    found: format!("'{ch}'"),
                });
            }
        })
    }

    fn ident_chars(&mut self) -> String {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    fn placeholder(&mut self, sigil: char) -> Result<String, ExpressionError> {
        let name = self.ident_chars();
        if name.is_empty() {
            return Err(ExpressionError::UnexpectedToken {
                expected: format!("placeholder name after '{sigil}'"),
                found: "empty".to_owned(),
            });
        }
        Ok(name)
    }

    fn number(&mut self) -> Result<Token, ExpressionError> {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            s.push(c);
            self.chars.next();
        }
        s.parse()
            .map(Token::Number)
            .map_err(|_| ExpressionError::InvalidOperand {
                operation: "list index".to_owned(),
                message: format!("'{s}' is not a valid index"),
            })
    }

    fn identifier_or_keyword(&mut self) -> Token {
        let ident = self.ident_chars();
        match ident.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "between" => Token::Between,
            "in" => Token::In,
            "set" => Token::Set,
            "remove" => Token::Remove,
            "add" => Token::Add,
            "delete" => Token::Delete,
            "attribute_exists" => Token::AttributeExists,
            "attribute_not_exists" => Token::AttributeNotExists,
            "attribute_type" => Token::AttributeType,
            "begins_with" => Token::BeginsWith,
            "contains" => Token::Contains,
            "size" => Token::Size,
            "if_not_exists" => Token::IfNotExists,
            "list_append" => Token::ListAppend,
            _ => Token::Identifier(ident),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            tokens: Lexer::new(input).tokenize()?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        let tok = self.advance();
        if tok == *expected {
            Ok(())
        } else if tok == Token::Eof {
            Err(ExpressionError::UnexpectedEof)
        } else {
            Err(ExpressionError::UnexpectedToken {
                expected: expected.to_string(),
                found: tok.to_string(),
            })
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn finish(&self) -> Result<(), ExpressionError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken {
                expected: "end of expression".to_owned(),
                found: self.peek().to_string(),
            })
        }
    }

    fn comma_separated<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<Vec<T>, ExpressionError> {
        let mut out = vec![item(self)?];
        while matches!(self.peek(), Token::Comma) {
            self.advance();
            out.push(item(self)?);
        }
        Ok(out)
    }

    // -- conditions (OR < AND < NOT < primary) ------------------------------

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Token::Or) {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.not_expr()?;
        while matches!(self.peek(), Token::And) {
            self.advance();
            let right = self.not_expr()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ExpressionError> {
        if matches!(self.peek(), Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.primary_expr()
    }

    fn primary_expr(&mut self) -> Result<Expr, ExpressionError> {
        if matches!(self.peek(), Token::LParen) {
            self.advance();
            let expr = self.or_expr()?;
            self.expect(&Token::RParen)?;
            return Ok(expr);
        }
        let function = match self.peek() {
            Token::AttributeExists => Some(FunctionName::AttributeExists),
            Token::AttributeNotExists => Some(FunctionName::AttributeNotExists),
            Token::AttributeType => Some(FunctionName::AttributeType),
            Token::BeginsWith => Some(FunctionName::BeginsWith),
            Token::Contains => Some(FunctionName::Contains),
            _ => None,
        };
        if let Some(name) = function {
            self.advance();
            self.expect(&Token::LParen)?;
            let args = self.comma_separated(Self::operand)?;
            self.expect(&Token::RParen)?;
            return Ok(Expr::Function { name, args });
        }
        let left = self.operand()?;
        self.postfix_expr(left)
    }

    fn postfix_expr(&mut self, left: Operand) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            Token::Between => {
                self.advance();
                let low = self.operand()?;
                self.expect(&Token::And)?;
                let high = self.operand()?;
                return Ok(Expr::Between {
                    value: left,
                    low,
                    high,
                });
            }
            Token::In => {
                self.advance();
                self.expect(&Token::LParen)?;
                let list = self.comma_separated(Self::operand)?;
                self.expect(&Token::RParen)?;
                return Ok(Expr::In { value: left, list });
            }
            Token::Eof => return Err(ExpressionError::UnexpectedEof),
            other => {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "comparison operator, BETWEEN, or IN".to_owned(),
                    found: other.to_string(),
                });
            }
        };
        self.advance();
        let right = self.operand()?;
        Ok(Expr::Compare { left, op, right })
    }

    // -- operands and paths -------------------------------------------------

    fn operand(&mut self) -> Result<Operand, ExpressionError> {
        match self.peek() {
            Token::ValuePlaceholder(_) => match self.advance() {
                Token::ValuePlaceholder(name) => Ok(Operand::Value(name)),
                _ => Err(ExpressionError::UnexpectedEof),
            },
            Token::Size => {
                self.advance();
                self.expect(&Token::LParen)?;
                let path = self.attribute_path()?;
                self.expect(&Token::RParen)?;
                Ok(Operand::Size(path))
            }
            _ => self.attribute_path().map(Operand::Path),
        }
    }

    fn attribute_path(&mut self) -> Result<AttributePath, ExpressionError> {
        let mut elements = vec![self.path_name()?];
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    elements.push(self.path_name()?);
                }
                Token::LBracket => {
                    self.advance();
                    let idx = match self.advance() {
                        Token::Number(idx) => idx,
                        other => {
                            return Err(ExpressionError::UnexpectedToken {
                                expected: "list index".to_owned(),
                                found: other.to_string(),
                            });
                        }
                    };
                    self.expect(&Token::RBracket)?;
                    elements.push(PathElement::Index(idx));
                }
                _ => return Ok(AttributePath { elements }),
            }
        }
    }

    fn path_name(&mut self) -> Result<PathElement, ExpressionError> {
        match self.advance() {
            Token::Identifier(name) => Ok(PathElement::Attribute(name)),
            Token::NamePlaceholder(name) => Ok(PathElement::Attribute(format!("#{name}"))),
            Token::Eof => Err(ExpressionError::UnexpectedEof),
            other => Err(ExpressionError::UnexpectedToken {
                expected: "attribute name or #name".to_owned(),
                found: other.to_string(),
            }),
        }
    }

    // -- update clauses -----------------------------------------------------

    fn update_expr(&mut self) -> Result<UpdateExpr, ExpressionError> {
        let mut update = UpdateExpr::default();
        while !self.at_end() {
            match self.advance() {
                Token::Set => {
                    let actions = self.comma_separated(Self::set_action)?;
                    update.set_actions.extend(actions);
                }
                Token::Remove => {
                    let paths = self.comma_separated(Self::attribute_path)?;
                    update.remove_paths.extend(paths);
                }
                Token::Add => {
                    let actions = self.comma_separated(Self::path_and_operand)?;
                    update.add_actions.extend(actions);
                }
                Token::Delete => {
                    let actions = self.comma_separated(Self::path_and_operand)?;
                    update.delete_actions.extend(actions);
                }
                other => {
                    return Err(ExpressionError::UnexpectedToken {
                        expected: "SET, REMOVE, ADD, or DELETE".to_owned(),
                        found: other.to_string(),
                    });
                }
            }
        }
        Ok(update)
    }

    fn set_action(&mut self) -> Result<SetAction, ExpressionError> {
        let path = self.attribute_path()?;
        self.expect(&Token::Eq)?;
        let value = self.set_value()?;
        Ok(SetAction { path, value })
    }

    fn set_value(&mut self) -> Result<SetValue, ExpressionError> {
        match self.peek() {
            Token::IfNotExists => {
                self.advance();
                self.expect(&Token::LParen)?;
                let path = self.attribute_path()?;
                self.expect(&Token::Comma)?;
                let default = self.operand()?;
                self.expect(&Token::RParen)?;
                return Ok(SetValue::IfNotExists(path, default));
            }
            Token::ListAppend => {
                self.advance();
                self.expect(&Token::LParen)?;
                let first = self.operand()?;
                self.expect(&Token::Comma)?;
                let second = self.operand()?;
                self.expect(&Token::RParen)?;
                return Ok(SetValue::ListAppend(first, second));
            }
            _ => {}
        }
        let first = self.operand()?;
        match self.peek() {
            Token::Plus => {
                self.advance();
                Ok(SetValue::Plus(first, self.operand()?))
            }
            Token::Minus => {
                self.advance();
                Ok(SetValue::Minus(first, self.operand()?))
            }
            _ => Ok(SetValue::Operand(first)),
        }
    }

    fn path_and_operand(&mut self) -> Result<(AttributePath, Operand), ExpressionError> {
        let path = self.attribute_path()?;
        let value = self.operand()?;
        Ok((path, value))
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parses a condition, filter or key-condition expression.
pub fn parse_condition_expr(input: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.or_expr()?;
    parser.finish()?;
    Ok(expr)
}

/// Parses an update expression. An expression without any action is an
/// error.
pub fn parse_update_expr(input: &str) -> Result<UpdateExpr, ExpressionError> {
    let mut parser = Parser::new(input)?;
    let update = parser.update_expr()?;
    if update.is_empty() {
        return Err(ExpressionError::UnexpectedToken {
            expected: "SET, REMOVE, ADD, or DELETE".to_owned(),
            found: "empty update expression".to_owned(),
        });
    }
    Ok(update)
}

/// Parses a projection expression (comma-separated paths).
pub fn parse_projection_expr(input: &str) -> Result<Vec<AttributePath>, ExpressionError> {
    let mut parser = Parser::new(input)?;
    let paths = parser.comma_separated(Parser::attribute_path)?;
    parser.finish()?;
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_simple_comparison() {
        let expr = parse_condition_expr("#name = :val").unwrap();
        match expr {
            Expr::Compare { left, op, right } => {
                assert_eq!(left, Operand::Path(AttributePath::attribute("#name")));
                assert_eq!(op, CompareOp::Eq);
                assert_eq!(right, Operand::Value("val".to_owned()));
            }
            other => panic!("expected Compare, got {other:?}"),
        }
    }

    #[test]
    fn test_should_bind_and_tighter_than_or() {
        let expr = parse_condition_expr("a = :a OR b = :b AND c = :c").unwrap();
        match expr {
            Expr::Logical { op, right, .. } => {
                assert_eq!(op, LogicalOp::Or);
                assert!(matches!(*right, Expr::Logical { op: LogicalOp::And, .. }));
            }
            other => panic!("expected OR at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_should_parse_keywords_case_insensitively() {
        let expr = parse_condition_expr("age between :lo and :hi").unwrap();
        assert!(matches!(expr, Expr::Between { .. }));
        let expr = parse_condition_expr("NOT Attribute_Exists(x)").unwrap();
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn test_should_parse_nested_paths() {
        let expr = parse_condition_expr("a.#b[2].c >= :v").unwrap();
        let Expr::Compare {
            left: Operand::Path(path),
            ..
        } = expr
        else {
            panic!("expected path comparison");
        };
        assert_eq!(path.to_string(), "a.#b[2].c");
    }

    #[test]
    fn test_should_parse_in_list() {
        let expr = parse_condition_expr("status IN (:a, :b, :c)").unwrap();
        let Expr::In { list, .. } = expr else {
            panic!("expected IN");
        };
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_should_parse_size_operand() {
        let expr = parse_condition_expr("size(tags) > :n").unwrap();
        assert!(matches!(
            expr,
            Expr::Compare {
                left: Operand::Size(_),
                ..
            }
        ));
    }

    #[test]
    fn test_should_reject_trailing_tokens() {
        assert!(parse_condition_expr("a = :a b").is_err());
        assert_eq!(
            parse_condition_expr("a ="),
            Err(ExpressionError::UnexpectedEof)
        );
        assert!(parse_condition_expr("a = :a)").is_err());
        assert!(parse_condition_expr("a = ?").is_err());
    }

    #[test]
    fn test_should_parse_update_clauses() {
        let update = parse_update_expr(
            "SET a = :a, b = list_append(b, :l) REMOVE c, d[1] ADD n :one DELETE s :x",
        )
        .unwrap();
        assert_eq!(update.set_actions.len(), 2);
        assert!(matches!(
            update.set_actions[1].value,
            SetValue::ListAppend(_, _)
        ));
        assert_eq!(update.remove_paths.len(), 2);
        assert_eq!(update.add_actions.len(), 1);
        assert_eq!(update.delete_actions.len(), 1);
    }

    #[test]
    fn test_should_parse_arithmetic_and_if_not_exists() {
        let update = parse_update_expr("SET n = n + :one, m = if_not_exists(m, :zero)").unwrap();
        assert!(matches!(update.set_actions[0].value, SetValue::Plus(_, _)));
        assert!(matches!(
            update.set_actions[1].value,
            SetValue::IfNotExists(_, _)
        ));
    }

    #[test]
    fn test_should_reject_empty_update() {
        assert!(parse_update_expr("").is_err());
        assert!(parse_update_expr("   ").is_err());
        assert!(parse_update_expr("UPSERT a = :a").is_err());
    }

    #[test]
    fn test_should_parse_projection() {
        let paths = parse_projection_expr("pk, #n, list[0].x").unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[2].to_string(), "list[0].x");
        assert!(parse_projection_expr("pk,").is_err());
    }
}
