//! # HF Papers RSS
//!
//! Crawls the Hugging Face daily papers listing, enriches each paper from its
//! detail page, translates the synopses and publishes the result as an RSS
//! feed. Papers seen on earlier runs are restored from a local cache instead
//! of being fetched and translated again.
//!
//! ## Usage
//!
//! ```sh
//! hf_papers_rss --output docs/feed.xml --target-languages zh-CN,es
//! ```
//!
//! ## Architecture
//!
//! 1. **Listing**: fetch the listing page and extract one record per paper
//! 2. **Split**: restore cached papers, queue the rest
//! 3. **Processing**: detail page + translation, `MAX_WORKERS` at a time
//! 4. **Cache**: merge, prune to capacity, persist
//! 5. **Output**: render and write the RSS document

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cache;
mod cli;
mod config;
mod errors;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod translate;
mod utils;

use api::HttpFetcher;
use cache::CacheStore;
use cli::Cli;
use config::Config;
use outputs::rss;
use pipeline::Pipeline;
use translate::GoogleTranslator;
use utils::ensure_parent_dir;

/// stderr always; `log_file` additionally, without ANSI colors.
fn init_tracing(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tfmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tfmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    init_tracing(args.log_file.as_deref())?;

    let start_time = std::time::Instant::now();
    info!("hf_papers_rss starting up");
    debug!(?args, "Parsed CLI arguments");

    let config = match Config::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        base_url = %config.base_url,
        languages = ?config.target_languages,
        workers = config.max_workers,
        cache = %config.cache_file.display(),
        output = %config.output.display(),
        "Configuration loaded"
    );

    // Early check: ensure the feed directory is writable before crawling
    if let Err(e) = ensure_parent_dir(&config.output).await {
        error!(
            path = %config.output.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let fetcher = HttpFetcher::new(config.request_timeout)?;
    let translator = GoogleTranslator::new(fetcher.client().clone(), config.translate_endpoint.clone());
    let mut cache = CacheStore::load(&config.cache_file, config.cache_version, config.cache_capacity).await;
    let cached_before = cache.len();
    if cache.is_empty() {
        info!("Cache is empty; every listed paper will be fetched and translated");
    }

    let pipeline = Pipeline::new(&config, fetcher, translator);
    let papers = match pipeline.run(&mut cache).await {
        Ok(papers) => papers,
        Err(e) => {
            error!(error = %e, "Run aborted");
            return Err(e.into());
        }
    };

    let xml = rss::render_feed(&papers, &config, Utc::now())?;
    rss::write_feed(&config.output, &xml).await?;

    let failed = papers.iter().filter(|p| p.is_failed()).count();
    let elapsed = start_time.elapsed();
    let avg_secs = elapsed.as_secs_f64() / papers.len().max(1) as f64;
    info!(
        papers = papers.len(),
        failed,
        feed_bytes = xml.len(),
        avg_secs_per_paper = avg_secs,
        cached_before,
        cached_after = cache.len(),
        feed = %config.output.display(),
        elapsed_secs = elapsed.as_secs_f64(),
        "Run complete"
    );

    Ok(())
}
