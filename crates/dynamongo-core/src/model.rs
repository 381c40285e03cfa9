//! Typed entities.

use dynamongo_model::{Item, ModelSchema};

use crate::error::AdapterResult;

/// An entity stored in one table.
///
/// ```
/// use std::sync::LazyLock;
///
/// use dynamongo_core::{AdapterError, AdapterResult, Model};
/// use dynamongo_model::{AttributeKind, AttributeSchema, AttributeValue, Item, ModelSchema};
///
/// struct User {
///     id: String,
///     name: String,
/// }
///
/// static USERS: LazyLock<ModelSchema> = LazyLock::new(|| {
///     ModelSchema::new("users", AttributeSchema::new("id", AttributeKind::String))
///         .with_attribute(AttributeSchema::new("name", AttributeKind::String))
/// });
///
/// impl Model for User {
///     fn schema() -> &'static ModelSchema {
///         &USERS
///     }
///
///     fn to_item(&self) -> Item {
///         Item::from([
///             ("id".to_owned(), AttributeValue::from(self.id.as_str())),
///             ("name".to_owned(), AttributeValue::from(self.name.as_str())),
///         ])
///     }
///
///     fn from_item(item: Item) -> AdapterResult<Self> {
///         let text = |key: &str| {
///             item.get(key)
///                 .and_then(AttributeValue::as_s)
///                 .map(str::to_owned)
///                 .ok_or_else(|| AdapterError::Validation { message: format!("missing {key}") })
///         };
///         Ok(Self { id: text("id")?, name: text("name")? })
///     }
/// }
///
/// let user = User { id: "u1".into(), name: "ada".into() };
/// assert_eq!(User::from_item(user.to_item()).unwrap().name, "ada");
/// ```
pub trait Model: Sized {
    /// Schema of the table the entity lives in.
    fn schema() -> &'static ModelSchema;

    /// The entity as an item, keyed by storage names.
    fn to_item(&self) -> Item;

    /// Rebuilds the entity from a stored item.
    fn from_item(item: Item) -> AdapterResult<Self>;

    /// The primary key of the entity.
    fn key(&self) -> Item {
        let schema = Self::schema();
        let mut item = self.to_item();
        item.retain(|name, _| schema.key_attributes().contains(&name.as_str()));
        item
    }
}
