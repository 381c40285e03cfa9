//! Attribute paths.
//!
//! A path addresses a location that may be nested inside an item, e.g.
//! `address.lines[1]` or `metrics.daily[0].count`. Paths written by callers
//! use caller-visible attribute names; the adapter rewrites them to storage
//! names before they reach the document store.

use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// A document path consisting of one or more elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    /// The path elements in order. The first element is always an attribute.
    pub elements: Vec<PathElement>,
}

/// A single element in an attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    /// A named attribute or map key.
    Attribute(String),
    /// A list index dereference (e.g. `[0]`).
    Index(usize),
}

impl AttributePath {
    /// A single top-level attribute.
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            elements: vec![PathElement::Attribute(name.into())],
        }
    }

    /// Parses `a.b[2].c` notation.
    pub fn parse(input: &str) -> Result<Self, ModelError> {
        let invalid = |reason: &str| ModelError::InvalidPath {
            path: input.to_owned(),
            reason: reason.to_owned(),
        };

        let mut elements = Vec::new();
        let mut chars = input.chars().peekable();
        let mut name = String::new();
        let mut expect_name = true;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if expect_name && name.is_empty() {
                        return Err(invalid("empty attribute name"));
                    }
                    if !name.is_empty() {
                        elements.push(PathElement::Attribute(std::mem::take(&mut name)));
                    }
                    expect_name = true;
                }
                '[' => {
                    if !name.is_empty() {
                        elements.push(PathElement::Attribute(std::mem::take(&mut name)));
                    } else if elements.is_empty() || expect_name {
                        return Err(invalid("index must follow an attribute"));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            Some(_) => return Err(invalid("list index must be a number")),
                            None => return Err(invalid("unterminated list index")),
                        }
                    }
                    let idx = digits
                        .parse::<usize>()
                        .map_err(|_| invalid("list index must be a number"))?;
                    elements.push(PathElement::Index(idx));
                    expect_name = false;
                    if let Some(next) = chars.peek() {
                        if *next != '.' && *next != '[' {
                            return Err(invalid("expected '.' or '[' after list index"));
                        }
                    }
                }
                ']' => return Err(invalid("unbalanced ']'")),
                other => {
                    name.push(other);
                    expect_name = false;
                }
            }
        }

        if !name.is_empty() {
            elements.push(PathElement::Attribute(name));
        } else if expect_name {
            return Err(invalid("empty attribute name"));
        }
        if !matches!(elements.first(), Some(PathElement::Attribute(_))) {
            return Err(invalid("path must start with an attribute"));
        }
        Ok(Self { elements })
    }

    /// Appends a map key.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.elements.push(PathElement::Attribute(name.into()));
        self
    }

    /// Appends a list index.
    #[must_use]
    pub fn index(mut self, idx: usize) -> Self {
        self.elements.push(PathElement::Index(idx));
        self
    }

    /// The top-level attribute name.
    #[must_use]
    pub fn root(&self) -> &str {
        match self.elements.first() {
            Some(PathElement::Attribute(name)) => name,
            _ => "",
        }
    }

    /// Returns `true` if the path is a single top-level attribute.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.elements.len() == 1
    }

    /// Number of list index elements in the path.
    #[must_use]
    pub fn index_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|e| matches!(e, PathElement::Index(_)))
            .count()
    }

    /// Returns `true` if `self` equals `other` or addresses a location inside it.
    #[must_use]
    pub fn starts_with(&self, other: &AttributePath) -> bool {
        self.elements.len() >= other.elements.len()
            && self.elements[..other.elements.len()] == other.elements[..]
    }

    /// Returns `true` if one of the paths contains the other.
    #[must_use]
    pub fn overlaps(&self, other: &AttributePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// The dotted form used by document stores: `a.b[2].c` becomes `a.b.2.c`.
    #[must_use]
    pub fn to_dotted(&self) -> String {
        let parts: Vec<String> = self
            .elements
            .iter()
            .map(|e| match e {
                PathElement::Attribute(name) => name.clone(),
                PathElement::Index(idx) => idx.to_string(),
            })
            .collect();
        parts.join(".")
    }
}

impl FromStr for AttributePath {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, elem) in self.elements.iter().enumerate() {
            match elem {
                PathElement::Attribute(name) => {
                    if i > 0 {
                        write!(f, ".{name}")?;
                    } else {
                        write!(f, "{name}")?;
                    }
                }
                PathElement::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}
