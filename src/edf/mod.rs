//! EDF file reading (cross-platform)
//!
//! Every file the device writes is European Data Format, optionally
//! gzip-compressed. [`EdfReader`] parses them lazily; the [`Dialect`] type
//! parameter decides how forgiving the signal-header interpretation is.

pub mod annotations;
pub mod dialect;
pub mod format;
pub mod reader;

pub use annotations::{Annotation, EventKind};
pub use dialect::{Dialect, PhysicalRange, StandardDialect, UnitResolution};
pub use format::Header;
pub use reader::{EdfReader, peek_header};

#[cfg(test)]
mod tests;
