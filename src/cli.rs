//! Command-line interface definitions.
//!
//! Every option can be provided as a flag or through the environment
//! variable named next to it, so the binary can run unchanged from a
//! scheduled CI job that only sets environment variables.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the papers feed generator.
///
/// # Examples
///
/// ```sh
/// # Defaults: crawl huggingface.co/papers, translate to zh-CN, write docs/feed.xml
/// hf_papers_rss
///
/// # Two target languages, wider worker pool
/// TARGET_LANGUAGES=zh-CN,es hf_papers_rss --max-workers 8
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Listing page to crawl
    #[arg(long, env = "BASE_URL", default_value = "https://huggingface.co/papers")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout: u64,

    /// Maximum number of papers taken from the listing
    #[arg(long, env = "MAX_PAPERS", default_value_t = 100)]
    pub max_papers: usize,

    /// Attempts per network or translation call
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: usize,

    /// Number of papers processed concurrently
    #[arg(long, env = "MAX_WORKERS", default_value_t = 5)]
    pub max_workers: usize,

    /// Base delay in seconds for the linear fetch backoff
    #[arg(long, env = "RETRY_DELAY", default_value_t = 2)]
    pub retry_delay: u64,

    /// Fixed delay in seconds between translation attempts
    #[arg(long, env = "TRANSLATE_RETRY_DELAY", default_value_t = 10)]
    pub translate_retry_delay: u64,

    /// Path of the incremental cache file
    #[arg(long, env = "PROCESSED_PAPERS_FILE", default_value = ".processed_papers.json")]
    pub cache_file: PathBuf,

    /// Maximum number of papers kept in the cache
    #[arg(long, env = "MAX_PROCESSED_RECORDS", default_value_t = 500)]
    pub cache_capacity: usize,

    /// Cache format version; a mismatch discards the cache
    #[arg(long, env = "CACHE_VERSION", default_value_t = 1)]
    pub cache_version: u32,

    /// Target languages, comma separated
    #[arg(long, env = "TARGET_LANGUAGES", default_value = "zh-CN", value_delimiter = ',')]
    pub target_languages: Vec<String>,

    /// Class-name substrings that together mark the affiliation span
    #[arg(long, env = "AFFILIATION_CLASS_MARKERS", default_value = "truncate,font-medium", value_delimiter = ',')]
    pub affiliation_markers: Vec<String>,

    /// Translation endpoint
    #[arg(long, env = "TRANSLATE_ENDPOINT", default_value = "https://translate.googleapis.com/translate_a/single")]
    pub translate_endpoint: String,

    /// Feed title
    #[arg(long, env = "RSS_TITLE", default_value = "Hugging Face Papers RSS")]
    pub rss_title: String,

    /// Feed description
    #[arg(long, env = "RSS_DESCRIPTION", default_value = "Latest AI research papers from Hugging Face")]
    pub rss_description: String,

    /// Public URL of the feed itself (atom:link rel="self")
    #[arg(long, env = "RSS_FEED_URL", default_value = "https://your-username.github.io/hf-papers-rss/feed.xml")]
    pub rss_feed_url: String,

    /// Where the feed is written
    #[arg(short, long, env = "OUTPUT_FILE", default_value = "docs/feed.xml")]
    pub output: PathBuf,

    /// Optional log file receiving the same events as stderr
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}
