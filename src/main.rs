//! # Site Search CLI (`sitesearch`)
//!
//! ## Usage
//!
//! ```bash
//! sitesearch --config ./config/sitesearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sitesearch init` | Create the SQLite database and run schema migrations |
//! | `sitesearch index` | Crawl and index every configured site |
//! | `sitesearch index-page <url>` | Re-index a single page |
//! | `sitesearch search "<query>"` | Search the index |
//! | `sitesearch stats` | Print per-site index statistics |
//! | `sitesearch serve` | Start the HTTP API |
//!
//! Diagnostics are logged to stderr; set `RUST_LOG` (e.g. `RUST_LOG=site_search=debug`)
//! to change the level.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use site_search::app::App;
use site_search::{config, indexing, migrate, search, server, stats};

/// Site Search: crawls configured web sites, builds a lemmatized inverted
/// index and answers ranked full-text queries.
#[derive(Parser)]
#[command(name = "sitesearch", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sitesearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Crawl every configured site and rebuild its index.
    ///
    /// Waits until all sites finish. Ctrl-C stops the crawl; interrupted
    /// sites are marked FAILED.
    Index,

    /// Fetch one page (no link following) and replace its index entries.
    IndexPage {
        /// Absolute URL of a page on one of the configured sites.
        url: String,
    },

    /// Search the index.
    Search {
        /// The search query string.
        query: String,

        /// Restrict results to one configured site (root URL).
        #[arg(long)]
        site: Option<String>,

        /// Number of ranked results to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print index statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index => {
            let app = App::open(cfg).await?;
            indexing::run_index(&app).await?;
        }
        Commands::IndexPage { url } => {
            let app = App::open(cfg).await?;
            indexing::run_index_page(&app, &url).await?;
        }
        Commands::Search {
            query,
            site,
            offset,
            limit,
        } => {
            let app = App::open(cfg).await?;
            search::run_search(&app, &query, site.as_deref(), offset, limit).await?;
        }
        Commands::Stats => {
            let app = App::open(cfg).await?;
            stats::run_stats(&app).await?;
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
    }

    Ok(())
}
