// ABOUTME: Catalog metadata layer answering what each dumpable object looks like
// ABOUTME: Introspection fills an in-memory snapshot that the analyzer and emitters read

pub mod introspect;
pub mod model;
pub mod snapshot;
pub mod type_cache;

pub use introspect::{
    check_server_version, list_databases, load_globals, pin_search_path, Introspector,
};
pub use model::*;
pub use snapshot::{CatalogError, CatalogSnapshot};
pub use type_cache::TypeCache;
