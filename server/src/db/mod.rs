//! In-memory storage for named collections.

mod collections;

pub use collections::*;
