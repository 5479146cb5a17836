// ABOUTME: Resumable chunked import of csv, tsv, json and xml uploads
// ABOUTME: Exports the chunk processor, session stores and import targets

pub mod decompress;
pub mod detect;
pub mod log;
pub mod parser;
pub mod processor;
pub mod request;
pub mod session;
pub mod store;
pub mod target;

pub use log::{LogEntry, LogLevel};
pub use processor::{sha256_hex, ChunkProcessor, ChunkResponse, ImportProgress, STALL_LIMIT};
pub use request::{ByteaEncoding, ChunkRequest, ImportOptions};
pub use session::{DataFormat, FormatChoice, ImportSession, ImportState};
pub use store::{spawn_sweeper, MemorySessionStore, SessionStore};
pub use target::{
    ImportTarget, MemoryTarget, PgImportTarget, PgTargetProvider, TargetColumn, TargetProvider,
};
