//! Pagination cursors.
//!
//! A cursor is the key of the last item of a page, stamped with the table,
//! index and direction it was produced for. The token is URL-safe base64 of
//! a small JSON object:
//!
//! ```text
//! {"v":1,"t":"orders","i":"by_customer","f":true,"k":{"pk":{"S":"o1"}}}
//! ```

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dynamongo_docstore::{Document, NativeValue, SortDirection};
use dynamongo_model::{AttributeValue, Item};
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult};

/// Current token version.
pub const CURSOR_VERSION: u32 = 1;

/// What a cursor must match to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorScope {
    /// Table the page was read from.
    pub table: String,
    /// Index queried, if any.
    pub index: Option<String>,
    /// Scan direction.
    pub forward: bool,
    /// Attributes identifying an item's position: the table keys plus the
    /// index keys.
    pub key_attributes: Vec<String>,
}

/// A decoded resume point.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    /// Table the page was read from.
    pub table: String,
    /// Index queried, if any.
    pub index: Option<String>,
    /// Scan direction.
    pub forward: bool,
    /// Key attributes of the last item returned.
    pub key: Item,
}

#[derive(Serialize, Deserialize)]
struct Token {
    v: u32,
    t: String,
    i: Option<String>,
    f: bool,
    k: HashMap<String, AttributeValue>,
}

impl Cursor {
    /// The cursor positioned after `item`.
    pub fn from_item(item: &Item, scope: &CursorScope) -> AdapterResult<Self> {
        let key = scope
            .key_attributes
            .iter()
            .map(|name| {
                item.get(name)
                    .map(|v| (name.clone(), v.clone()))
                    .ok_or_else(|| {
                        AdapterError::validation(format!(
                            "item has no key attribute '{name}' to build a cursor from"
                        ))
                    })
            })
            .collect::<AdapterResult<Item>>()?;
        Ok(Self {
            table: scope.table.clone(),
            index: scope.index.clone(),
            forward: scope.forward,
            key,
        })
    }

    /// The opaque token.
    pub fn encode(&self) -> AdapterResult<String> {
        let token = Token {
            v: CURSOR_VERSION,
            t: self.table.clone(),
            i: self.index.clone(),
            f: self.forward,
            k: self.key.clone(),
        };
        let json = serde_json::to_vec(&token)
            .map_err(|e| AdapterError::codec(format!("cannot serialize cursor: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Parses `token` and checks it belongs to `scope`.
    pub fn decode(token: &str, scope: &CursorScope) -> AdapterResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| AdapterError::invalid_cursor("token is not valid base64"))?;
        let token: Token = serde_json::from_slice(&bytes)
            .map_err(|_| AdapterError::invalid_cursor("token is not a cursor"))?;

        if token.v != CURSOR_VERSION {
            return Err(AdapterError::invalid_cursor(format!(
                "unsupported cursor version {}",
                token.v
            )));
        }
        if token.t != scope.table {
            return Err(AdapterError::invalid_cursor(format!(
                "cursor belongs to table '{}'",
                token.t
            )));
        }
        if token.i != scope.index {
            return Err(AdapterError::invalid_cursor("cursor belongs to a different index"));
        }
        if token.f != scope.forward {
            return Err(AdapterError::invalid_cursor("cursor was issued for the other direction"));
        }
        if let Some(missing) = scope.key_attributes.iter().find(|k| !token.k.contains_key(*k)) {
            return Err(AdapterError::invalid_cursor(format!(
                "cursor lacks key attribute '{missing}'"
            )));
        }
        if let Some(bad) = token.k.iter().find(|(_, v)| !v.is_scalar_key()) {
            return Err(AdapterError::invalid_cursor(format!(
                "cursor key '{}' is not a scalar key value",
                bad.0
            )));
        }

        Ok(Self {
            table: token.t,
            index: token.i,
            forward: token.f,
            key: token.k,
        })
    }
}

/// Predicate selecting documents strictly after `position` in the order
/// given by the sort fields:
/// `$or[{f1 op v1}, {f1: v1, f2 op v2}, ...]`, where op is `$gt` for an
/// ascending field and `$lt` for a descending one.
#[must_use]
pub fn strictly_after(position: &[(String, SortDirection, NativeValue)]) -> Document {
    let branches: Vec<NativeValue> = (0..position.len())
        .map(|i| {
            let mut branch = Document::new();
            for (field, _, value) in &position[..i] {
                branch.insert(field.clone(), NativeValue::Document(eq(value)));
            }
            let (field, direction, value) = &position[i];
            let op = match direction {
                SortDirection::Ascending => "$gt",
                SortDirection::Descending => "$lt",
            };
            let mut cmp = Document::new();
            cmp.insert(op.to_owned(), value.clone());
            branch.insert(field.clone(), NativeValue::Document(cmp));
            NativeValue::Document(branch)
        })
        .collect();
    let mut filter = Document::new();
    filter.insert("$or".to_owned(), NativeValue::Array(branches));
    filter
}

fn eq(value: &NativeValue) -> Document {
    let mut doc = Document::new();
    doc.insert("$eq".to_owned(), value.clone());
    doc
}
