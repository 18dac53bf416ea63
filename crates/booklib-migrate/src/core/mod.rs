//! Core abstractions for the paginated copy.
//!
//! - [`value`]: scalar field values
//! - [`record`]: records, cursors and pages
//! - [`traits`]: reader, writer and progress seams used by the orchestrator

pub mod record;
pub mod traits;
pub mod value;

pub use record::{Cursor, Page, Record};
pub use traits::{BatchWriter, LogProgress, PageReader, ProgressReporter};
pub use value::SqlValue;
