//! Request handlers for collection records.

mod records;

pub use records::*;
