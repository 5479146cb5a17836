// ABOUTME: CLI entry point for postgres-porter
// ABOUTME: Parses commands and routes to the dump, import and serve handlers

use clap::{Args, Parser, Subcommand};
use postgres_porter::commands;
use postgres_porter::dump::{Compression, DumpOptions, DumpScope, InsertFormat};
use postgres_porter::import::{ByteaEncoding, FormatChoice, ImportOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "postgres-porter")]
#[command(
    about = "Dependency-ordered PostgreSQL dumps and resumable chunked imports",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct DumpArgs {
    /// Dump roles, tablespaces and every database on the server
    #[arg(long)]
    server: bool,
    /// Only these schemas (comma-separated)
    #[arg(long, value_delimiter = ',')]
    schemas: Vec<String>,
    /// Only these objects (format: schema.name, comma-separated)
    #[arg(long, value_delimiter = ',')]
    objects: Vec<String>,
    /// Pull in what the selected objects depend on
    #[arg(long)]
    include_dependencies: bool,
    /// Emit DROP ... IF EXISTS ... CASCADE before each create
    #[arg(long)]
    clean: bool,
    #[arg(long)]
    if_not_exists: bool,
    #[arg(long, conflicts_with = "structure_only")]
    data_only: bool,
    #[arg(long)]
    structure_only: bool,
    /// Rows per cursor fetch (computed from row width when omitted)
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long, value_enum, default_value_t = InsertFormat::Copy)]
    insert_format: InsertFormat,
    /// Leave out COMMENT ON statements
    #[arg(long)]
    no_comments: bool,
    #[arg(long)]
    create_database: bool,
    #[arg(long)]
    create_schema: bool,
    /// Skip the SET statements at the top of each database section
    #[arg(long)]
    no_preliminaries: bool,
    /// Wrap each database section in BEGIN/COMMIT
    #[arg(long)]
    single_transaction: bool,
    /// Read without a REPEATABLE READ snapshot
    #[arg(long)]
    no_consistent: bool,
}

impl DumpArgs {
    fn into_options(self) -> DumpOptions {
        DumpOptions {
            scope: if self.server {
                DumpScope::Server
            } else {
                DumpScope::Database
            },
            schemas: self.schemas,
            clean: self.clean,
            if_not_exists: self.if_not_exists,
            data_only: self.data_only,
            structure_only: self.structure_only,
            batch_size: self.batch_size,
            insert_format: self.insert_format,
            include_comments: !self.no_comments,
            objects: self.objects,
            include_dependencies: self.include_dependencies,
            add_create_database: self.create_database,
            add_create_schema: self.create_schema,
            suppress_preliminaries: self.no_preliminaries,
            single_transaction: self.single_transaction,
            consistent: !self.no_consistent,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a dependency-ordered SQL script of a database or server
    Dump {
        #[arg(long)]
        source: String,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Compression::Plain)]
        compression: Compression,
        #[command(flatten)]
        args: DumpArgs,
    },
    /// Load a csv, tsv, json or xml file into a table in resumable chunks
    Import {
        #[arg(long)]
        target: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long, default_value = "public")]
        schema: String,
        /// auto, csv, tsv, json or xml
        #[arg(long, default_value = "auto")]
        format: String,
        /// First record names the columns
        #[arg(long)]
        header: bool,
        /// Unquoted values loaded as NULL (repeatable)
        #[arg(long = "null")]
        nulls: Vec<String>,
        /// Truncate the table before the first row
        #[arg(long)]
        truncate: bool,
        /// raw, hex or base64
        #[arg(long, default_value = "raw")]
        bytea_encoding: String,
        #[arg(long, default_value_t = commands::import::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
    /// Serve the chunked import endpoint over HTTP
    Serve {
        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override listen_addr from the configuration
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so a dump can be written to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dump {
            source,
            output,
            compression,
            args,
        } => {
            commands::dump(&source, args.into_options(), compression, output.as_deref()).await?;
        }
        Commands::Import {
            target,
            file,
            table,
            schema,
            format,
            header,
            nulls,
            truncate,
            bytea_encoding,
            chunk_size,
        } => {
            let mut options = ImportOptions::new(&schema, &table);
            options.format = format
                .parse::<FormatChoice>()
                .map_err(anyhow::Error::msg)?;
            options.use_header = header;
            options.allowed_nulls = nulls;
            options.truncate = truncate;
            options.bytea_encoding = bytea_encoding
                .parse::<ByteaEncoding>()
                .map_err(anyhow::Error::msg)?;
            commands::import(&target, &file, options, chunk_size).await?;
        }
        Commands::Serve { config, listen } => {
            commands::serve(config.as_deref(), listen).await?;
        }
    }

    Ok(())
}
