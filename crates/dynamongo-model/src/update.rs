//! Update actions.

use std::fmt;

use crate::attribute_value::AttributeValue;
use crate::condition::Path;
use crate::path::AttributePath;

/// One mutation of an update request.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// `SET path = value`
    Set {
        /// Target path.
        path: AttributePath,
        /// New value.
        value: AttributeValue,
    },
    /// `SET path = list_append(path, values)`, or the prepend form
    /// `list_append(values, path)`.
    ListAppend {
        /// Target list.
        path: AttributePath,
        /// Elements to add.
        values: Vec<AttributeValue>,
        /// Insert at the front instead of the back.
        prepend: bool,
    },
    /// `REMOVE path`
    Remove {
        /// Target path.
        path: AttributePath,
    },
    /// `ADD path delta`: numeric increment or set union.
    Add {
        /// Target path.
        path: AttributePath,
        /// Number or set.
        delta: AttributeValue,
    },
}

impl UpdateAction {
    /// The path the action writes.
    #[must_use]
    pub fn path(&self) -> &AttributePath {
        match self {
            Self::Set { path, .. }
            | Self::ListAppend { path, .. }
            | Self::Remove { path }
            | Self::Add { path, .. } => path,
        }
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { path, value } => write!(f, "SET {path} = {value}"),
            Self::ListAppend {
                path,
                values,
                prepend,
            } => {
                if *prepend {
                    write!(f, "SET {path} = list_append([{} items], {path})", values.len())
                } else {
                    write!(f, "SET {path} = list_append({path}, [{} items])", values.len())
                }
            }
            Self::Remove { path } => write!(f, "REMOVE {path}"),
            Self::Add { path, delta } => write!(f, "ADD {path} {delta}"),
        }
    }
}

impl Path {
    /// `SET path = value`
    #[must_use]
    pub fn set(self, value: impl Into<AttributeValue>) -> UpdateAction {
        UpdateAction::Set {
            path: self.into_path(),
            value: value.into(),
        }
    }

    /// `REMOVE path`
    #[must_use]
    pub fn remove(self) -> UpdateAction {
        UpdateAction::Remove {
            path: self.into_path(),
        }
    }

    /// `ADD path delta`
    #[must_use]
    pub fn add(self, delta: impl Into<AttributeValue>) -> UpdateAction {
        UpdateAction::Add {
            path: self.into_path(),
            delta: delta.into(),
        }
    }

    /// `SET path = list_append(path, values)`
    #[must_use]
    pub fn append(self, values: Vec<AttributeValue>) -> UpdateAction {
        UpdateAction::ListAppend {
            path: self.into_path(),
            values,
            prepend: false,
        }
    }

    /// `SET path = list_append(values, path)`
    #[must_use]
    pub fn prepend(self, values: Vec<AttributeValue>) -> UpdateAction {
        UpdateAction::ListAppend {
            path: self.into_path(),
            values,
            prepend: true,
        }
    }
}
