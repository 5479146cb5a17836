// ABOUTME: Dependency-ordered schema and data export
// ABOUTME: Exports the exporter, its options, emitters, cursor reader and output sinks

pub mod acl;
pub mod cursor;
pub mod deferred;
pub mod emit;
pub mod exporter;
pub mod format;
pub mod options;
pub mod script;
pub mod selection;
pub mod sink;

pub use cursor::{DataSource, ExportCursor, MemoryDataSource, PgDataSource};
pub use deferred::{DeferredKind, DeferredQueue, DeferredStatement};
pub use exporter::{write_globals, DatabaseDump, DumpStats, Exporter};
pub use format::{formatter_for, CopyFormatter, InsertFormatter, Row, RowFormatter, TableMetadata};
pub use options::{DumpOptions, DumpScope, InsertFormat};
pub use script::ScriptWriter;
pub use selection::{resolve_selection, Selection};
pub use sink::{Compression, Framing, OutputSink};
