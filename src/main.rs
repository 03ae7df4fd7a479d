//! CLI entry point for ragsearch.
//!
//! Indexes text files paragraph by paragraph into an archive and answers
//! semantic queries against it.

use anyhow::{Context, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use indicatif::{ProgressBar, ProgressStyle};
use ragsearch::config::CONFIG_DIR;
use ragsearch::{FastEmbedEmbedder, Rag, Settings};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Incremental semantic search over text files
#[derive(Parser)]
#[command(
    name = "ragsearch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Incremental semantic search over text files",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Set up .ragsearch directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Add text files to the archive, one entry per paragraph
    Index {
        /// Files to index
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Archive to update (created if missing)
        #[arg(short, long, default_value = ".ragsearch/index.tar.gz")]
        archive: PathBuf,

        /// Group the paragraphs are stored under
        #[arg(short, long, default_value = "")]
        group: String,

        /// Start from an empty archive instead of extending the existing one
        #[arg(long)]
        fresh: bool,
    },

    /// Find the closest paragraphs to a query
    Search {
        query: String,

        #[arg(short, long, default_value = ".ragsearch/index.tar.gz")]
        archive: PathBuf,

        /// Number of results
        #[arg(short = 'k', long, default_value_t = 5)]
        limit: usize,

        /// Group to search in
        #[arg(short, long, default_value = "")]
        group: String,

        /// Return matching chunks instead of whole paragraphs
        #[arg(long)]
        chunks: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show archive contents per group
    Stats {
        #[arg(short, long, default_value = ".ragsearch/index.tar.gz")]
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct SearchHit {
    rank: usize,
    distance: f32,
    text: String,
}

#[derive(Debug, Serialize)]
struct ArchiveStats {
    archive: PathBuf,
    search_method: String,
    items: usize,
    chunks: usize,
    groups: Vec<GroupStats>,
}

#[derive(Debug, Serialize)]
struct GroupStats {
    name: String,
    items: usize,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RAGSEARCH_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => {
            Settings::load_from(path).with_context(|| format!("loading configuration from {}", path.display()))
        }
        None => Settings::load().context("loading configuration"),
    }
}

fn open_rag(settings: &Settings) -> anyhow::Result<Rag<FastEmbedEmbedder>> {
    let embedder = FastEmbedEmbedder::new(&settings.embedding.model, settings.embedding.show_download_progress)
        .with_context(|| format!("loading embedding model {}", settings.embedding.model))?;
    Ok(Rag::from_settings(Arc::new(embedder), settings)?)
}

fn create_progress_bar(total: u64, message: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Non-empty paragraphs of `text`, separated by blank lines.
fn paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}

async fn run_index(
    settings: &Settings,
    files: &[PathBuf],
    archive: &Path,
    group: &str,
    fresh: bool,
) -> anyhow::Result<()> {
    let mut inputs = Vec::with_capacity(files.len());
    for file in files {
        let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        inputs.push((file, paragraphs(&text)));
    }
    let total: usize = inputs.iter().map(|(_, p)| p.len()).sum();

    let mut rag = open_rag(settings)?;
    if !fresh && rag.load(archive)? {
        tracing::info!("extending archive with {} existing items", rag.count());
    }

    let start = Instant::now();
    let pb = create_progress_bar(total as u64, "embedding paragraphs")?;
    for (file, paragraphs) in &inputs {
        pb.set_message(file.display().to_string());
        for paragraph in paragraphs {
            rag.add(paragraph, group)
                .await
                .with_context(|| format!("indexing a paragraph of {}", file.display()))?;
            pb.inc(1);
        }
    }
    pb.finish_and_clear();

    rag.save(archive)?;
    println!(
        "Indexed {total} paragraphs from {} files in {:.2?} ({} items, {} chunks in archive)",
        inputs.len(),
        start.elapsed(),
        rag.count(),
        rag.chunk_count()
    );
    Ok(())
}

async fn run_search(
    settings: &Settings,
    query: &str,
    archive: &Path,
    limit: usize,
    group: &str,
    chunks: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut rag = open_rag(settings)?;
    if !rag.load(archive)? {
        bail!(
            "No archive found at {}\nSuggestion: Run 'ragsearch index <files>' first",
            archive.display()
        );
    }
    if chunks {
        rag.set_return_chunks(true);
    }

    let (texts, distances) = rag.search(query, limit, group).await?;
    let hits: Vec<SearchHit> = texts
        .into_iter()
        .zip(distances)
        .enumerate()
        .map(|(i, (text, distance))| SearchHit {
            rank: i + 1,
            distance,
            text,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results for '{query}'");
    }
    for hit in &hits {
        println!("{}. [{:.4}] {}", hit.rank, hit.distance, hit.text);
    }
    Ok(())
}

fn run_stats(settings: &Settings, archive: &Path, json: bool) -> anyhow::Result<()> {
    let mut rag = open_rag(settings)?;
    if !rag.load(archive)? {
        bail!("No archive found at {}", archive.display());
    }

    let stats = ArchiveStats {
        archive: archive.to_path_buf(),
        search_method: rag.search_method().to_string(),
        items: rag.count(),
        chunks: rag.chunk_count(),
        groups: rag
            .group_counts()
            .into_iter()
            .map(|(name, items)| GroupStats { name, items })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Archive: {}", stats.archive.display());
    println!("Search method: {}", stats.search_method);
    println!("Items: {} ({} chunks)", stats.items, stats.chunks);
    for group in &stats.groups {
        let name = if group.name.is_empty() { "(default)" } else { &group.name };
        println!("  {name}: {}", group.items);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let settings = || -> anyhow::Result<Settings> {
        let settings = load_settings(cli.config.as_deref())?;
        if settings.debug {
            tracing::debug!("settings: {settings:?}");
        }
        Ok(settings)
    };

    match &cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(".", *force)?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
        }
        Commands::Config => {
            let settings = settings()?;
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
            if !Path::new(CONFIG_DIR).is_dir() {
                eprintln!("No {CONFIG_DIR} directory found; showing defaults and environment overrides");
            }
        }
        Commands::Index {
            files,
            archive,
            group,
            fresh,
        } => run_index(&settings()?, files, archive, group, *fresh).await?,
        Commands::Search {
            query,
            archive,
            limit,
            group,
            chunks,
            json,
        } => run_search(&settings()?, query, archive, *limit, group, *chunks, *json).await?,
        Commands::Stats { archive, json } => run_stats(&settings()?, archive, *json)?,
    }
    Ok(())
}
