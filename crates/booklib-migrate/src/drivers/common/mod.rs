//! Utilities shared by the database drivers.
//!
//! - [`tls`]: TLS configuration for PostgreSQL sessions

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
