//! PostgreSQL driver.
//!
//! - [`PgSession`]: one connection with a scoped lifetime
//! - [`PostgresDialect`]: SQL text for paging, inserting and counting
//! - [`PostgresReader`]: [`PageReader`](crate::core::PageReader) over a session
//! - [`PostgresWriter`]: [`BatchWriter`](crate::core::BatchWriter) over a session

mod dialect;
mod reader;
mod session;
mod writer;

pub use dialect::PostgresDialect;
pub use reader::PostgresReader;
pub use session::{PgSession, SessionRole};
pub use writer::PostgresWriter;
