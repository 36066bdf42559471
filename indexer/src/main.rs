use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use retriever_core::assemble::SnippetView;
use retriever_core::persist::{load_or_build, IndexOrigin};
use retriever_core::toc::write_toc_files;
use retriever_core::{Retriever, RetrieverConfig};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query the BM25 chunk index", long_about = None)]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the persisted index from the source directory
    Build {
        /// Override the source directory
        #[arg(long)]
        input: Option<PathBuf>,
        /// Override the index file path
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rank chunks for a query and print the top results
    Query {
        query: String,
        #[arg(long, default_value_t = 100)]
        top_k: usize,
        /// Print whole snippets instead of their first and last 100 characters
        #[arg(long, default_value_t = false)]
        full_text: bool,
        /// Rebuild the index before querying
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
    /// Write a `<name>_toc.md` table of contents next to every document
    Toc {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let mut config = RetrieverConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Build { input, output } => {
            if let Some(input) = input { config.source_dir = input; }
            if let Some(output) = output { config.index_path = output; }
            build_index(&config)
        }
        Commands::Query { query, top_k, full_text, refresh } => {
            let retriever = Retriever::open(&config, refresh)?;
            let view = if full_text { SnippetView::Full } else { SnippetView::Abbreviated };
            println!("{}", retriever.top_k(&query, top_k, view));
            Ok(())
        }
        Commands::Toc { dir } => {
            let dir = dir.unwrap_or_else(|| config.source_dir.clone());
            let written = write_toc_files(&dir, &config.extensions)?;
            tracing::info!(count = written.len(), dir = %dir.display(), "tables of contents written");
            Ok(())
        }
    }
}

fn build_index(config: &RetrieverConfig) -> Result<()> {
    let outcome = load_or_build(config, true)
        .with_context(|| format!("building index from {}", config.source_dir.display()))?;
    let index = &outcome.index;
    if let IndexOrigin::Built { skipped } = &outcome.origin {
        for file in skipped {
            tracing::warn!(file = %file.path.display(), reason = %file.reason, "skipped during build");
        }
    }
    tracing::info!(
        output = %config.index_path.display(),
        num_chunks = index.document_count(),
        num_terms = index.document_frequency().len(),
        avgdl = index.average_chunk_length(),
        "index build complete"
    );
    Ok(())
}
