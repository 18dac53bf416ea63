//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL reader and writer over scoped sessions
//! - [`memory`]: in-process tables implementing the same traits
//! - [`common`]: shared utilities (TLS)

pub mod common;
pub mod memory;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use memory::{MemorySource, MemoryTarget};
pub use postgres::{PostgresDialect, PostgresReader, PostgresWriter};
