use crate::error::Result;
use crate::value::Value;

/// A record type the mapper can persist.
///
/// Field access goes through the names registered in the entity's
/// [`EntityMetadata`](crate::EntityMetadata). New instances start from
/// `Default` and are populated one column at a time.
///
/// ```
/// use entitydb::{Entity, Error, Result, Value};
///
/// #[derive(Debug, Default, Clone)]
/// struct Customer {
///     id: Option<i64>,
///     first_name: String,
/// }
///
/// impl Entity for Customer {
///     fn field(&self, name: &str) -> Option<Value> {
///         match name {
///             "id" => Some(self.id.into()),
///             "first_name" => Some(self.first_name.clone().into()),
///             _ => None,
///         }
///     }
///
///     fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
///         match name {
///             "id" => self.id = value.decode(name)?,
///             "first_name" => self.first_name = value.decode(name)?,
///             _ => return Err(Error::mapping(name, "unknown field")),
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Entity: Default + Clone + Send + Sync + 'static {
    /// Reads a field by name. `None` means the field does not exist.
    fn field(&self, name: &str) -> Option<Value>;

    /// Writes a field by name.
    fn set_field(&mut self, name: &str, value: Value) -> Result<()>;
}
