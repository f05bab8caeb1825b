//! Pure data types and render helpers, free of I/O.

pub mod format;
pub mod model;
