use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use book_indexer::commands::{self, IngestOptions};
use book_indexer::{Dependencies, IndexerConfig, IndexingError};

#[derive(Parser, Debug)]
#[command(name = "book-indexer")]
#[command(about = "Extract, chunk, embed and index EPUB books", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// OpenSearch URL (overrides OPENSEARCH_URL)
    #[arg(long, global = true)]
    opensearch_url: Option<String>,

    /// Name of the book metadata index (overrides BOOKS_INDEX)
    #[arg(long, global = true)]
    books_index: Option<String>,

    /// Name of the chunk index (overrides CONTENT_INDEX)
    #[arg(long, global = true)]
    content_index: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the books and book_content indices
    InitIndices {
        /// Leave existing indices and their documents untouched
        #[arg(long)]
        keep_existing: bool,

        /// Directory holding books.json and/or book_content.json mappings
        #[arg(long)]
        mappings_dir: Option<PathBuf>,
    },
    /// Load an NDJSON bulk file
    Bulk {
        file: PathBuf,

        /// Send every document to this index instead of the one in the file
        #[arg(long)]
        index: Option<String>,
    },
    /// Add embedding vectors to the documents of an NDJSON bulk file
    EmbedFromNdjson {
        file: PathBuf,

        /// Document field holding the text to embed, e.g. `text`
        #[arg(long)]
        source_field: String,

        /// Document field receiving the vector, e.g. `text_vector`
        #[arg(long)]
        target_field: String,

        /// Write here instead of rewriting the input in place
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extract raw EPUBs into Book Record JSON
    Extract {
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Chunk parsed Book Records into NDJSON bulk files
    Convert {
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Run extraction, chunking, embedding and loading end to end
    Ingest {
        #[arg(long, default_value = "")]
        prefix: String,

        /// Skip the bulk load; NDJSON files are written instead
        #[arg(long)]
        no_load: bool,

        /// Also write the NDJSON files when loading
        #[arg(long)]
        ndjson: bool,

        /// Index chunks without vectors even when EMBEDDING_URL is set
        #[arg(long)]
        no_embed: bool,
    },
}

impl Cli {
    fn apply(&self, config: &mut IndexerConfig) {
        if let Some(url) = &self.opensearch_url {
            config.opensearch_url = url.clone();
        }
        if let Some(books) = &self.books_index {
            config.indices.books = books.clone();
        }
        if let Some(content) = &self.content_index {
            config.indices.content = content.clone();
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_report<T: Serialize>(report: &T) -> Result<(), IndexingError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| IndexingError::config(format!("Cannot encode report: {}", e)))?;
    println!("{}", json);
    Ok(())
}

async fn run(cli: Cli) -> Result<bool, IndexingError> {
    let mut config = IndexerConfig::from_env()?;
    cli.apply(&mut config);
    let deps = Dependencies::new(config)?;

    let cancel = deps.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, finishing in-flight work");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::InitIndices {
            keep_existing,
            mappings_dir,
        } => {
            let report = commands::init_indices(&deps, keep_existing, mappings_dir.as_deref()).await?;
            print_report(&report)?;
            Ok(true)
        }
        Commands::Bulk { file, index } => {
            let summary = commands::bulk(&deps, &file, index).await?;
            print_report(&summary)?;
            Ok(summary.failed == 0 && !summary.cancelled)
        }
        Commands::EmbedFromNdjson {
            file,
            source_field,
            target_field,
            output,
        } => {
            let report =
                commands::embed_from_ndjson(&deps, &file, &source_field, &target_field, output)
                    .await?;
            print_report(&report)?;
            Ok(true)
        }
        Commands::Extract { prefix } => {
            let summary = commands::extract(&deps, &prefix).await?;
            print_report(&summary)?;
            Ok(summary.is_success())
        }
        Commands::Convert { prefix } => {
            let summary = commands::convert(&deps, &prefix).await?;
            print_report(&summary)?;
            Ok(summary.is_success())
        }
        Commands::Ingest {
            prefix,
            no_load,
            ndjson,
            no_embed,
        } => {
            let options = IngestOptions {
                prefix,
                load: !no_load,
                ndjson,
                embed: !no_embed,
            };
            let summary = commands::ingest(&deps, options).await?;
            print_report(&summary)?;
            Ok(summary.is_success() && summary.documents_failed == 0)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    info!(command = ?cli.command, "Starting book indexer");

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            warn!("Finished with failures, see the report");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Book indexer failed");
            eprintln!("Error: {}", e);

            let mut source = e.source();
            while let Some(err) = source {
                eprintln!("  Caused by: {}", err);
                source = err.source();
            }
            ExitCode::FAILURE
        }
    }
}
