// ABOUTME: PostgreSQL utilities module
// ABOUTME: Exports connection management and extension discovery

pub mod connection;
pub mod extensions;

pub use connection::{connect, connect_to_database, connect_with_retry};
pub use extensions::{create_extension_sql, get_installed_extensions, Extension};
