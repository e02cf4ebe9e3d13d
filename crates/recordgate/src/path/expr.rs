//! Member-path expression trees and their resolution to dot paths.

use std::borrow::Cow;

use serde_json::Value;

/// A member-access expression over a record.
///
/// Trees are built from the [`PathExpr::parameter`] root by chaining
/// [`member`](PathExpr::member) accesses, optionally interspersed with the
/// two collection markers:
///
/// - [`absolute`](PathExpr::absolute) descends into a collection while keeping
///   the path accumulated from the root (`Children.LastName`).
/// - [`relative`](PathExpr::relative) descends into a collection and restarts
///   the path at the element (`LastName`), which is what an `$elemMatch`
///   clause expects.
///
/// # Examples
///
/// ```
/// use recordgate::path::{PathExpr, resolve};
///
/// let city = PathExpr::parameter().member("Address").member("City");
/// assert_eq!(resolve(&city), "Address.City");
///
/// let absolute = PathExpr::parameter().member("Children").absolute().member("LastName");
/// assert_eq!(resolve(&absolute), "Children.LastName");
///
/// let relative = PathExpr::parameter().member("Children").relative().member("LastName");
/// assert_eq!(resolve(&relative), "LastName");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum PathExpr {
    /// The record itself (the lambda parameter).
    Parameter,
    /// A constant value; never a field path.
    Constant(Value),
    /// Access of a named member on the target expression.
    Member {
        target: Box<PathExpr>,
        name: Cow<'static, str>,
    },
    /// Descend into a collection keeping the accumulated path.
    Absolute(Box<PathExpr>),
    /// Descend into a collection discarding the accumulated path.
    Relative(Box<PathExpr>),
}

impl PathExpr {
    /// The root of every member chain.
    pub fn parameter() -> Self {
        PathExpr::Parameter
    }

    /// A constant expression.
    pub fn constant(value: impl Into<Value>) -> Self {
        PathExpr::Constant(value.into())
    }

    /// Accesses `name` on this expression.
    pub fn member(self, name: impl Into<Cow<'static, str>>) -> Self {
        PathExpr::Member {
            target: Box::new(self),
            name: name.into(),
        }
    }

    /// Descends into a collection, keeping the path from the root.
    pub fn absolute(self) -> Self {
        PathExpr::Absolute(Box::new(self))
    }

    /// Descends into a collection, restarting the path at the element.
    pub fn relative(self) -> Self {
        PathExpr::Relative(Box::new(self))
    }

    /// Resolves this expression. See [`resolve`].
    pub fn resolve(&self) -> String {
        resolve(self)
    }
}

/// Resolves an expression to its dot-separated field path.
///
/// Returns the empty string when the tree is not a member chain rooted at
/// the parameter (for example a constant). Resolution never fails and never
/// evaluates anything; it only inspects the tree shape.
pub fn resolve(expr: &PathExpr) -> String {
    resolve_chain(expr).unwrap_or_default()
}

fn resolve_chain(expr: &PathExpr) -> Option<String> {
    match expr {
        PathExpr::Parameter => Some(String::new()),
        PathExpr::Constant(_) => None,
        PathExpr::Member { target, name } => {
            let parent = resolve_chain(target)?;
            if parent.is_empty() {
                Some(name.to_string())
            } else {
                Some(format!("{}.{}", parent, name))
            }
        }
        PathExpr::Absolute(inner) => resolve_chain(inner),
        PathExpr::Relative(inner) => {
            // The prefix is dropped, but it still has to be a member chain.
            resolve_chain(inner).map(|_| String::new())
        }
    }
}
