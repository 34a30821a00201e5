//! Database connection pooling and schema definitions.

pub mod connection;
pub mod schema;

pub use connection::Database;
