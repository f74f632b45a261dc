//! File system operations module
//!
//! Attribute-preserving copies used to stage inputs into scratch
//! and to bring results back to the submission directory.

mod operations;

pub use operations::*;
