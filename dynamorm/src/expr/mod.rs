//! The expression compiler: translates a typed [`Predicate`] tree into
//! the store's wire expression syntax.

mod compiler;
mod predicate;

pub use compiler::{compile, CompiledExpression};
pub use predicate::Predicate;
