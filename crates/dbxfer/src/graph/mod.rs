//! Dependency resolution.
//!
//! Rows are ordered so that a row is inserted after every row it references.
//! References that close a cycle are written as NULL first and patched by a
//! later update ("fix-up"). Tables are ordered the same way for export.

pub mod digraph;
pub mod resolver;
pub mod rows;

pub use digraph::Digraph;
pub use resolver::{DependencyResolver, FixUp, LoadPlan, NodeState, TableGroup};
pub use rows::{Edge, RowGraph};
