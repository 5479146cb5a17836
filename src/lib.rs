// ABOUTME: Library module for postgres-porter
// ABOUTME: Exports the dump pipeline, the chunked importer and their shared plumbing

pub mod catalog;
pub mod commands;
pub mod config;
pub mod dump;
pub mod error;
pub mod graph;
pub mod import;
pub mod postgres;
pub mod server;
pub mod utils;
