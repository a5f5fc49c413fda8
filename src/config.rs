//! Run configuration.
//!
//! A [`Config`] is built once from the parsed [`Cli`] and handed by
//! reference to every component.

use crate::cli::Cli;
use crate::errors::ConfigError;
use crate::scrapers::listing::AffiliationMatcher;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub max_papers: usize,
    pub max_retries: usize,
    pub max_workers: usize,
    pub retry_delay: Duration,
    pub translate_retry_delay: Duration,
    pub translate_endpoint: String,
    pub cache_file: PathBuf,
    pub cache_capacity: usize,
    pub cache_version: u32,
    pub target_languages: Vec<String>,
    pub affiliation: AffiliationMatcher,
    pub feed: FeedConfig,
    pub output: PathBuf,
}

/// Channel-level metadata for the generated feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub title: String,
    pub description: String,
    pub self_url: String,
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let base_url = Url::parse(&cli.base_url).map_err(|source| ConfigError::BaseUrl {
            url: cli.base_url.clone(),
            source,
        })?;
        if cli.max_workers == 0 {
            return Err(ConfigError::Zero("max_workers"));
        }
        if cli.max_retries == 0 {
            return Err(ConfigError::Zero("max_retries"));
        }
        if cli.cache_capacity == 0 {
            return Err(ConfigError::Zero("cache_capacity"));
        }

        let target_languages = cli
            .target_languages
            .iter()
            .map(|lang| lang.trim())
            .filter(|lang| !lang.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(cli.request_timeout),
            max_papers: cli.max_papers,
            max_retries: cli.max_retries,
            max_workers: cli.max_workers,
            retry_delay: Duration::from_secs(cli.retry_delay),
            translate_retry_delay: Duration::from_secs(cli.translate_retry_delay),
            translate_endpoint: cli.translate_endpoint,
            cache_file: cli.cache_file,
            cache_capacity: cli.cache_capacity,
            cache_version: cli.cache_version,
            target_languages,
            affiliation: AffiliationMatcher::new(cli.affiliation_markers),
            feed: FeedConfig {
                title: cli.rss_title,
                description: cli.rss_description,
                self_url: cli.rss_feed_url,
            },
            output: cli.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_config_from_defaults() {
        let config = Config::try_from(Cli::parse_from(["hf_papers_rss"])).unwrap();
        assert_eq!(config.base_url.as_str(), "https://huggingface.co/papers");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.target_languages, vec!["zh-CN"]);
        assert!(config.affiliation.matches("truncate font-medium text-gray"));
    }

    #[test]
    fn test_blank_languages_are_dropped() {
        let cli = Cli::parse_from(["hf_papers_rss", "--target-languages", " es , ,fr"]);
        let config = Config::try_from(cli).unwrap();
        assert_eq!(config.target_languages, vec!["es", "fr"]);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let cli = Cli::parse_from(["hf_papers_rss", "--base-url", "not a url"]);
        assert!(matches!(
            Config::try_from(cli),
            Err(ConfigError::BaseUrl { .. })
        ));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let cli = Cli::parse_from(["hf_papers_rss", "--max-workers", "0"]);
        assert!(matches!(
            Config::try_from(cli),
            Err(ConfigError::Zero("max_workers"))
        ));
    }
}
