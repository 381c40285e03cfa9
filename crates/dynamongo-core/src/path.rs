//! Path resolution.
//!
//! Caller paths name attributes by their caller-visible names; stored
//! documents use storage names. [`PathResolver`] rewrites the former into a
//! [`StoragePath`], following declared aliases through typed maps, and
//! [`StoragePath`] reads and writes the addressed location of an item.

use std::collections::HashMap;
use std::fmt;

use dynamongo_model::{
    AttributeKind, AttributePath, AttributeSchema, AttributeValue, Item, ModelSchema, PathElement,
};

use crate::codec::is_bookkeeping_field;
use crate::error::{AdapterError, AdapterResult};

/// A path expressed in storage names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath(AttributePath);

impl StoragePath {
    /// Wraps a path already expressed in storage names.
    #[must_use]
    pub fn new(path: AttributePath) -> Self {
        Self(path)
    }

    /// A top-level storage attribute.
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self(AttributePath::attribute(name))
    }

    /// The underlying path.
    #[must_use]
    pub fn path(&self) -> &AttributePath {
        &self.0
    }

    /// Top-level storage name.
    #[must_use]
    pub fn root(&self) -> &str {
        self.0.root()
    }

    /// The dotted native field name, e.g. `a.b.2.c`.
    #[must_use]
    pub fn to_field(&self) -> String {
        self.0.to_dotted()
    }

    /// Whether the path has no list index.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.0.index_count() == 0
    }

    /// Whether the path has exactly one list index, in last position.
    #[must_use]
    pub fn is_tail_indexed(&self) -> bool {
        self.0.index_count() == 1 && matches!(self.0.elements.last(), Some(PathElement::Index(_)))
    }

    /// The path without its last element.
    #[must_use]
    pub fn parent(&self) -> Option<StoragePath> {
        let n = self.0.elements.len();
        (n > 1).then(|| {
            Self(AttributePath {
                elements: self.0.elements[..n - 1].to_vec(),
            })
        })
    }

    /// Reads the addressed value. A missing leaf is `None`; a missing or
    /// mistyped intermediate segment is [`AdapterError::UnresolvedPath`].
    pub fn get<'a>(&self, item: &'a Item) -> AdapterResult<Option<&'a AttributeValue>> {
        let (head, rest) = self.split()?;
        let Some(mut current) = item.get(head) else {
            return if rest.is_empty() {
                Ok(None)
            } else {
                Err(AdapterError::unresolved(&self.0))
            };
        };
        for (i, element) in rest.iter().enumerate() {
            let next = match (element, current) {
                (PathElement::Attribute(key), AttributeValue::M(map)) => map.get(key),
                (PathElement::Index(idx), AttributeValue::L(list)) => list.get(*idx),
                _ => return Err(AdapterError::unresolved(&self.0)),
            };
            match next {
                Some(value) => current = value,
                None if i + 1 == rest.len() => return Ok(None),
                None => return Err(AdapterError::unresolved(&self.0)),
            }
        }
        Ok(Some(current))
    }

    /// Existence lookup: `None` when any segment is missing or mistyped.
    #[must_use]
    pub fn lookup<'a>(&self, item: &'a Item) -> Option<&'a AttributeValue> {
        self.get(item).ok().flatten()
    }

    /// Writes `value` at the path, creating intermediate maps. An index past
    /// the end of a list appends.
    pub fn set(&self, item: &mut Item, value: AttributeValue) -> AdapterResult<()> {
        let (head, rest) = self.split()?;
        let Some((first, tail)) = rest.split_first() else {
            item.insert(head.to_owned(), value);
            return Ok(());
        };
        if !item.contains_key(head) {
            if !matches!(first, PathElement::Attribute(_)) {
                return Err(AdapterError::unresolved(&self.0));
            }
            item.insert(head.to_owned(), AttributeValue::M(HashMap::new()));
        }
        let slot = item
            .get_mut(head)
            .ok_or_else(|| AdapterError::unresolved(&self.0))?;
        set_in_value(slot, first, tail, value).map_err(|()| AdapterError::unresolved(&self.0))
    }

    /// Removes the addressed value, shifting later list elements down.
    /// Returns the removed value.
    pub fn remove(&self, item: &mut Item) -> Option<AttributeValue> {
        let (head, rest) = self.split().ok()?;
        let Some((last, parents)) = rest.split_last() else {
            return item.remove(head);
        };
        let mut current = item.get_mut(head)?;
        for element in parents {
            current = match (element, current) {
                (PathElement::Attribute(key), AttributeValue::M(map)) => map.get_mut(key)?,
                (PathElement::Index(idx), AttributeValue::L(list)) => list.get_mut(*idx)?,
                _ => return None,
            };
        }
        match (last, current) {
            (PathElement::Attribute(key), AttributeValue::M(map)) => map.remove(key),
            (PathElement::Index(idx), AttributeValue::L(list)) if *idx < list.len() => {
                Some(list.remove(*idx))
            }
            _ => None,
        }
    }

    fn split(&self) -> AdapterResult<(&str, &[PathElement])> {
        match self.0.elements.split_first() {
            Some((PathElement::Attribute(head), rest)) => Ok((head, rest)),
            _ => Err(AdapterError::unresolved(&self.0)),
        }
    }
}

fn set_in_value(
    target: &mut AttributeValue,
    element: &PathElement,
    rest: &[PathElement],
    value: AttributeValue,
) -> Result<(), ()> {
    let slot = match (element, target) {
        (PathElement::Attribute(key), AttributeValue::M(map)) => {
            if rest.is_empty() {
                map.insert(key.clone(), value);
                return Ok(());
            }
            if !map.contains_key(key) {
                if !matches!(rest.first(), Some(PathElement::Attribute(_))) {
                    return Err(());
                }
                map.insert(key.clone(), AttributeValue::M(HashMap::new()));
            }
            map.get_mut(key).ok_or(())?
        }
        (PathElement::Index(idx), AttributeValue::L(list)) => {
            if rest.is_empty() {
                if *idx < list.len() {
                    list[*idx] = value;
                } else {
                    list.push(value);
                }
                return Ok(());
            }
            list.get_mut(*idx).ok_or(())?
        }
        _ => return Err(()),
    };
    match rest.split_first() {
        Some((next, tail)) => set_in_value(slot, next, tail, value),
        None => Err(()),
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Rewrites caller paths into storage paths under a schema.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    schema: &'a ModelSchema,
    strict: bool,
}

impl<'a> PathResolver<'a> {
    /// A resolver for `schema`. With `strict` off, undeclared top-level names
    /// pass through even when the schema does not allow them.
    #[must_use]
    pub fn new(schema: &'a ModelSchema, strict: bool) -> Self {
        Self { schema, strict }
    }

    /// The schema paths resolve against.
    #[must_use]
    pub fn schema(&self) -> &'a ModelSchema {
        self.schema
    }

    /// Resolves a caller path.
    pub fn resolve(&self, path: &AttributePath) -> AdapterResult<StoragePath> {
        let root = path.root();
        if root.is_empty() || is_bookkeeping_field(root) {
            return Err(AdapterError::unresolved(path));
        }
        let declared = self
            .schema
            .attribute(root)
            .or_else(|| self.schema.attribute_by_storage(root));
        if declared.is_none() && self.strict && !self.schema.allow_undeclared {
            return Err(AdapterError::unresolved(path));
        }

        let mut elements = Vec::with_capacity(path.elements.len());
        elements.push(PathElement::Attribute(
            declared.map_or(root, AttributeSchema::storage_name).to_owned(),
        ));
        let mut current = declared;
        for element in &path.elements[1..] {
            match element {
                PathElement::Attribute(name) => {
                    let field = current.and_then(|a| a.field(name).or_else(|| a.field_by_storage(name)));
                    elements.push(PathElement::Attribute(
                        field.map_or(name.as_str(), AttributeSchema::storage_name).to_owned(),
                    ));
                    current = field;
                }
                PathElement::Index(idx) => {
                    elements.push(PathElement::Index(*idx));
                    current = None;
                }
            }
        }
        Ok(StoragePath(AttributePath { elements }))
    }

    /// Resolves a path written as `a.b[2].c` or in native dotted form
    /// `a.b.2.c`, where numeric segments after the first are list indices.
    pub fn resolve_str(&self, path: &str) -> AdapterResult<StoragePath> {
        let parsed = if path.contains('[') {
            AttributePath::parse(path)?
        } else {
            let mut elements = Vec::new();
            for (i, segment) in path.split('.').enumerate() {
                if segment.is_empty() {
                    return Err(AdapterError::unresolved(path));
                }
                match segment.parse::<usize>() {
                    Ok(idx) if i > 0 => elements.push(PathElement::Index(idx)),
                    _ => elements.push(PathElement::Attribute(segment.to_owned())),
                }
            }
            AttributePath { elements }
        };
        self.resolve(&parsed)
    }

    /// The declared attribute addressed by a storage path, if every segment
    /// goes through declared typed maps.
    #[must_use]
    pub fn attribute_of(&self, path: &StoragePath) -> Option<&'a AttributeSchema> {
        let mut current = self.schema.attribute_by_storage(path.root())?;
        for element in &path.0.elements[1..] {
            match element {
                PathElement::Attribute(name) => current = current.field_by_storage(name)?,
                PathElement::Index(_) => return None,
            }
        }
        Some(current)
    }

    /// Declared kind at a storage path; `Dynamic` when undeclared.
    #[must_use]
    pub fn kind_of(&self, path: &StoragePath) -> AttributeKind {
        self.attribute_of(path)
            .map_or(AttributeKind::Dynamic, |a| a.kind)
    }
}
