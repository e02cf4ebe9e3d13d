//! Typed field descriptors and path builders.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;

use super::expr::PathExpr;

/// A named member of `P` whose stored value has type `C`.
///
/// Descriptors are usually declared with [`record_fields!`](crate::record_fields)
/// as associated constants of the record type. For optional members declare
/// the inner type, so that paths can continue through it.
pub struct Field<P, C> {
    name: &'static str,
    _marker: PhantomData<fn(P) -> C>,
}

impl<P, C> Field<P, C> {
    /// Declares a field stored under `name`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the stored member name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Starts a path at `P` through this field.
    pub fn path(self) -> FieldPath<P, C> {
        FieldPath::root().then(self)
    }

    /// Continues through a member of `C`.
    pub fn then<D>(self, next: Field<C, D>) -> FieldPath<P, D> {
        self.path().then(next)
    }
}

impl<P, C: Collection> Field<P, C> {
    /// Descends into the collection, keeping the path from the root.
    pub fn member(self) -> FieldPath<P, C::Element> {
        self.path().member()
    }

    /// Descends into the collection, restarting the path at the element.
    pub fn relative(self) -> FieldPath<P, C::Element> {
        self.path().relative()
    }
}

impl<P, C> Clone for Field<P, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, C> Copy for Field<P, C> {}

impl<P, C> fmt::Debug for Field<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

/// A typed member chain starting at record `R` and ending at a value of `T`.
///
/// # Examples
///
/// ```
/// use recordgate::path::{Field, FieldPath};
///
/// struct Person;
/// struct Address;
/// struct Child;
///
/// const ADDRESS: Field<Person, Address> = Field::new("Address");
/// const CITY: Field<Address, String> = Field::new("City");
/// const CHILDREN: Field<Person, Vec<Child>> = Field::new("Children");
/// const LAST_NAME: Field<Child, String> = Field::new("LastName");
///
/// assert_eq!(ADDRESS.then(CITY).resolve(), "Address.City");
/// assert_eq!(CHILDREN.member().then(LAST_NAME).resolve(), "Children.LastName");
/// assert_eq!(CHILDREN.relative().then(LAST_NAME).resolve(), "LastName");
/// assert_eq!(FieldPath::<Person, Person>::root().resolve(), "");
/// ```
pub struct FieldPath<R, T> {
    expr: PathExpr,
    _marker: PhantomData<fn(R) -> T>,
}

impl<R> FieldPath<R, R> {
    /// The record itself.
    pub fn root() -> Self {
        Self::from_expr(PathExpr::parameter())
    }
}

impl<R, T> FieldPath<R, T> {
    fn from_expr(expr: PathExpr) -> Self {
        Self {
            expr,
            _marker: PhantomData,
        }
    }

    /// Continues through a member of `T`.
    pub fn then<C>(self, field: Field<T, C>) -> FieldPath<R, C> {
        FieldPath::from_expr(self.expr.member(field.name))
    }

    /// Returns the underlying expression tree.
    pub fn expr(&self) -> &PathExpr {
        &self.expr
    }

    /// Consumes the path, returning the expression tree.
    pub fn into_expr(self) -> PathExpr {
        self.expr
    }

    /// Resolves to a dot path.
    pub fn resolve(&self) -> String {
        self.expr.resolve()
    }
}

impl<R, T: Collection> FieldPath<R, T> {
    /// Descends into the collection, keeping the path from the root.
    pub fn member(self) -> FieldPath<R, T::Element> {
        FieldPath::from_expr(self.expr.absolute())
    }

    /// Descends into the collection, restarting the path at the element.
    pub fn relative(self) -> FieldPath<R, T::Element> {
        FieldPath::from_expr(self.expr.relative())
    }
}

impl<R, T> Clone for FieldPath<R, T> {
    fn clone(&self) -> Self {
        Self::from_expr(self.expr.clone())
    }
}

impl<R, T> fmt::Debug for FieldPath<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldPath").field(&self.resolve()).finish()
    }
}

/// Stored sequences whose elements can be addressed by a path.
pub trait Collection {
    /// The element type.
    type Element;
}

impl<T> Collection for Vec<T> {
    type Element = T;
}

impl<T> Collection for VecDeque<T> {
    type Element = T;
}

impl<T> Collection for BTreeSet<T> {
    type Element = T;
}

impl<T, S> Collection for HashSet<T, S> {
    type Element = T;
}

impl<T, const N: usize> Collection for [T; N] {
    type Element = T;
}

impl<C: Collection> Collection for Option<C> {
    type Element = C::Element;
}

/// Anything that names a field in a query or update.
///
/// Implemented for string slices (used verbatim), single [`Field`]s,
/// [`FieldPath`]s and raw [`PathExpr`] trees. An empty result means
/// "not a field path"; builders reject it.
pub trait IntoFieldName {
    /// Converts into a dot path.
    fn into_field_name(self) -> String;
}

impl IntoFieldName for &str {
    fn into_field_name(self) -> String {
        self.to_string()
    }
}

impl IntoFieldName for String {
    fn into_field_name(self) -> String {
        self
    }
}

impl IntoFieldName for &String {
    fn into_field_name(self) -> String {
        self.clone()
    }
}

impl<P, C> IntoFieldName for Field<P, C> {
    fn into_field_name(self) -> String {
        self.name.to_string()
    }
}

impl<R, T> IntoFieldName for FieldPath<R, T> {
    fn into_field_name(self) -> String {
        self.resolve()
    }
}

impl<R, T> IntoFieldName for &FieldPath<R, T> {
    fn into_field_name(self) -> String {
        self.resolve()
    }
}

impl IntoFieldName for PathExpr {
    fn into_field_name(self) -> String {
        self.resolve()
    }
}

impl IntoFieldName for &PathExpr {
    fn into_field_name(self) -> String {
        self.resolve()
    }
}

/// Declares typed field descriptors as associated constants.
///
/// ```
/// use recordgate::record_fields;
///
/// struct Address { city: String }
/// struct Person { address: Address, tags: Vec<String> }
///
/// record_fields! {
///     Person {
///         ADDRESS: Address => "Address",
///         TAGS: Vec<String> => "Tags",
///     }
///     Address {
///         CITY: String => "City",
///     }
/// }
///
/// assert_eq!(Person::ADDRESS.then(Address::CITY).resolve(), "Address.City");
/// ```
#[macro_export]
macro_rules! record_fields {
    ($( $owner:ty { $( $konst:ident : $ty:ty => $name:literal ),* $(,)? } )*) => {
        $(
            #[allow(dead_code)]
            impl $owner {
                $(
                    pub const $konst: $crate::path::Field<$owner, $ty> =
                        $crate::path::Field::new($name);
                )*
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Person;
    struct Address;
    struct Child;

    const ADDRESS: Field<Person, Address> = Field::new("Address");
    const CITY: Field<Address, String> = Field::new("City");
    const CHILDREN: Field<Person, Vec<Child>> = Field::new("Children");
    const NICKNAMES: Field<Person, Option<Vec<String>>> = Field::new("Nicknames");
    const LAST_NAME: Field<Child, String> = Field::new("LastName");

    #[test]
    fn test_typed_paths() {
        assert_eq!(ADDRESS.then(CITY).resolve(), "Address.City");
        assert_eq!(
            CHILDREN.member().then(LAST_NAME).resolve(),
            "Children.LastName"
        );
        assert_eq!(CHILDREN.relative().then(LAST_NAME).resolve(), "LastName");
    }

    #[test]
    fn test_optional_collection_descends() {
        let path = NICKNAMES.member();
        assert_eq!(path.resolve(), "Nicknames");
    }

    #[test]
    fn test_into_field_name() {
        assert_eq!("Raw.Path".into_field_name(), "Raw.Path");
        assert_eq!(CITY.into_field_name(), "City");
        let path = ADDRESS.then(CITY);
        assert_eq!((&path).into_field_name(), "Address.City");
        assert_eq!(PathExpr::constant(1).into_field_name(), "");
    }

    #[test]
    fn test_debug_shows_resolved_path() {
        let path = ADDRESS.then(CITY);
        assert_eq!(format!("{:?}", path), "FieldPath(\"Address.City\")");
        assert_eq!(format!("{:?}", CITY), "Field(\"City\")");
    }
}
