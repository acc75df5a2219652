use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::catalog::EntityKind;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create (or migrate) the catalog database.
    Init(InitArgs),
    /// Collect book page URLs from paginated listing pages.
    Collect(CollectArgs),
    /// Import books from scraped pages or pre-extracted records.
    Import(ImportArgs),
    /// Resolve one name to its catalog row, merging duplicates.
    Resolve(ResolveArgs),
    /// Merge every duplicated name of one or all entity kinds.
    Dedupe(DedupeArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Catalog SQLite database path.
    #[arg(long)]
    pub db: String,
}

#[derive(Debug, Args)]
pub struct CollectArgs {
    /// Listing URL template; `{page}` is replaced by the page number.
    #[arg(long)]
    pub listing_url: String,

    /// Number of listing pages to visit, starting at 1.
    #[arg(long, default_value_t = 1)]
    pub pages: u32,

    /// Regex a link must match to count as a book page.
    #[arg(long)]
    pub link_pattern: String,

    /// Output file (one URL per line). Must not exist.
    #[arg(long)]
    pub out: String,

    /// Per-request timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("input").required(true).args(["urls", "records"])))]
pub struct ImportArgs {
    /// Catalog SQLite database path.
    #[arg(long)]
    pub db: String,

    /// Newline-delimited book page URLs to fetch and extract.
    #[arg(long)]
    pub urls: Option<String>,

    /// JSONL file of already extracted candidate records.
    #[arg(long)]
    pub records: Option<String>,

    /// YAML config file.
    #[arg(long)]
    pub config: Option<String>,

    /// Publisher to skip (repeatable). Added to the configured list.
    #[arg(long)]
    pub exclude_publisher: Vec<String>,

    /// Drop the built-in publisher exclusion list.
    #[arg(long, default_value_t = false)]
    pub no_default_exclusions: bool,

    /// Tag stored as the book source.
    #[arg(long)]
    pub source: Option<String>,

    /// Extractor program: reads page HTML on stdin, gets the URL as last
    /// argument, prints a candidate JSON object.
    #[arg(long)]
    pub extractor_bin: Option<String>,

    /// Extra argument passed to the extractor before the URL (repeatable).
    #[arg(long, allow_hyphen_values = true)]
    pub extractor_arg: Vec<String>,

    /// Page fetch timeout.
    #[arg(long)]
    pub page_timeout_secs: Option<u64>,

    /// Cover image fetch timeout.
    #[arg(long)]
    pub cover_timeout_secs: Option<u64>,

    /// Write one JSON line per candidate to this path. Must not exist.
    #[arg(long)]
    pub report: Option<String>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Catalog SQLite database path.
    #[arg(long)]
    pub db: String,

    #[arg(long, value_enum)]
    pub kind: EntityKind,

    #[arg(long)]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct DedupeArgs {
    /// Catalog SQLite database path.
    #[arg(long)]
    pub db: String,

    /// Entity kind to heal. All kinds when omitted.
    #[arg(long, value_enum)]
    pub kind: Option<EntityKind>,
}
