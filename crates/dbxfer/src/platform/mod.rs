//! Platform implementations.
//!
//! Real database drivers implement [`Platform`](crate::core::Platform)
//! outside this crate. The in-memory platform here behaves like a database
//! with immediate constraint checking and is what tests and offline tools
//! load into.

pub mod memory;

pub use memory::{MemoryPlatform, WriteOp};
