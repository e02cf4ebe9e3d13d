//! Field-path resolution.
//!
//! Queries against a schemaless store name fields by dot-separated paths.
//! Rather than hardcoding those strings, callers describe the member chain
//! with typed [`Field`] descriptors and let the resolver produce the path:
//!
//! - [`PathExpr`] is the expression tree and [`resolve`] turns it into a path.
//! - [`Field`] and [`FieldPath`] build trees with compile-time checking that
//!   each hop is a member of the previous type.
//! - [`FieldPath::member`] and [`FieldPath::relative`] cover the two ways of
//!   stepping into a collection of sub-documents.

mod expr;
mod typed;

pub use expr::{PathExpr, resolve};
pub use typed::{Collection, Field, FieldPath, IntoFieldName};
