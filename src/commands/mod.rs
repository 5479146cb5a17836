// ABOUTME: Command implementations behind the CLI subcommands
// ABOUTME: Exports dump, import and serve commands

pub mod dump;
pub mod import;
pub mod serve;

pub use dump::dump;
pub use import::import;
pub use serve::serve;
