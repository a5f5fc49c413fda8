//! Run orchestration: listing → split → dispatch → collect → reassemble → persist.
//!
//! The listing fetch is a barrier before any per-paper work. Papers already
//! in the cache are restored without network access; fresh papers go
//! through the detail enricher and the translation stage on a bounded
//! number of concurrent tasks. Results land in a slot vector indexed by
//! listing position, so completion order never reorders the feed. The
//! cache is only written after every task has finished.

use crate::api::{Fetch, RetryFetch};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::errors::PipelineError;
use crate::models::{Paper, RawRecord};
use crate::scrapers::{detail, listing};
use crate::translate::{Translate, Translator};
use crate::utils::truncate_for_log;
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, instrument, warn};

/// How a listing record will be materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    /// Restored from the cache, first-seen time included.
    Cached(Paper),
    /// Needs enrichment and translation; carries its assigned `pub_date`.
    Fresh(RawRecord, DateTime<Utc>),
}

/// Partition records by cache membership and assign publication times.
///
/// Fresh records get `base_time + position` seconds, so their relative
/// listing order survives concurrent processing. Cached records keep the
/// first-seen time stored with their entry.
pub fn split(records: Vec<RawRecord>, cache: &CacheStore, base_time: DateTime<Utc>) -> Vec<Planned> {
    records
        .into_iter()
        .enumerate()
        .map(|(position, record)| match cache.lookup(&record.url) {
            Some(entry) => Planned::Cached(Paper::from(entry)),
            None => {
                let offset = Duration::seconds(i64::try_from(position).unwrap_or(i64::MAX));
                Planned::Fresh(record, base_time + offset)
            }
        })
        .collect()
}

/// One feed-generation run over a listing page.
///
/// Owns the retry-wrapped fetch and translation collaborators; the cache is
/// borrowed per [`Pipeline::run`].
pub struct Pipeline<'a, F, T> {
    config: &'a Config,
    fetcher: RetryFetch<F>,
    translator: Translator<T>,
}

impl<'a, F: Fetch, T: Translate> Pipeline<'a, F, T> {
    /// Wrap the raw collaborators with the configured retry policies.
    ///
    /// # Arguments
    ///
    /// * `config` - Run configuration; `max_retries`, `retry_delay` and
    ///   `translate_retry_delay` shape the retry wrappers
    /// * `fetcher` - Page fetcher used for the listing and every detail page
    /// * `backend` - Translation backend called once per synopsis and language
    pub fn new(config: &'a Config, fetcher: F, backend: T) -> Self {
        Self {
            config,
            fetcher: RetryFetch::new(fetcher, config.max_retries, config.retry_delay),
            translator: Translator::new(backend, config.max_retries, config.translate_retry_delay),
        }
    }

    /// Execute one run and return the papers newest-first.
    ///
    /// The cache is consulted read-only until every paper is final, then
    /// merged, pruned and written.
    ///
    /// # Returns
    ///
    /// Every listed paper, including degraded ones carrying an error marker.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ListingUnavailable`] when the listing cannot be
    /// fetched, [`PipelineError::NoRecords`] when it yields no papers. The
    /// cache is left untouched in both cases.
    #[instrument(level = "info", skip_all, fields(base_url = %self.config.base_url))]
    pub async fn run(&self, cache: &mut CacheStore) -> Result<Vec<Paper>, PipelineError> {
        info!(
            timeout = ?self.config.request_timeout,
            max_papers = self.config.max_papers,
            workers = self.config.max_workers,
            cached = cache.len(),
            "Scraping papers"
        );

        let records = self.fetch_listing().await?;

        let plan = split(records, cache, Utc::now());
        let fresh = plan.iter().filter(|p| matches!(p, Planned::Fresh(..))).count();
        info!(fresh, cached = plan.len() - fresh, "Split listing against cache");

        let mut papers = self.dispatch(plan).await;
        papers.reverse();

        self.persist(&papers, cache).await;
        Ok(papers)
    }

    /// Fetch and parse the listing; at most `max_papers` unique records.
    async fn fetch_listing(&self) -> Result<Vec<RawRecord>, PipelineError> {
        let base_url = self.config.base_url.as_str();
        let html = self
            .fetcher
            .fetch(base_url)
            .await
            .map_err(PipelineError::ListingUnavailable)?;

        let records: Vec<RawRecord> =
            listing::extract(&html, &self.config.base_url, &self.config.affiliation)
                .into_iter()
                .unique_by(|r| r.url.clone())
                .take(self.config.max_papers)
                .collect();

        info!(count = records.len(), "Found papers in listing");
        if records.is_empty() {
            return Err(PipelineError::NoRecords);
        }
        Ok(records)
    }

    /// Materialize every planned record, preserving listing order.
    async fn dispatch(&self, plan: Vec<Planned>) -> Vec<Paper> {
        let total = plan.len();
        let mut slots: Vec<Option<Paper>> = (0..total).map(|_| None).collect();
        let mut fresh = Vec::new();

        for (position, planned) in plan.into_iter().enumerate() {
            match planned {
                Planned::Cached(paper) => {
                    info!(index = position + 1, total, title = %truncate_for_log(&paper.title, 50), "Restored from cache");
                    slots[position] = Some(paper);
                }
                Planned::Fresh(record, pub_date) => fresh.push((position, record, pub_date)),
            }
        }

        let outcomes: Vec<(usize, Paper)> = stream::iter(fresh)
            .map(|(position, record, pub_date)| async move {
                let title = record.title.clone();
                let fallback = Paper::from_raw(record.clone(), pub_date);
                let paper = match AssertUnwindSafe(self.process(record, pub_date))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(paper)) => {
                        info!(index = position + 1, total, title = %truncate_for_log(&title, 50), "Completed");
                        paper
                    }
                    Ok(Err(e)) => {
                        error!(index = position + 1, total, title = %truncate_for_log(&title, 50), error = %e, "Failed");
                        let mut paper = fallback;
                        paper.mark_failed(&e.to_string());
                        paper
                    }
                    Err(_) => {
                        error!(index = position + 1, total, title = %truncate_for_log(&title, 50), "Worker panicked");
                        let mut paper = fallback;
                        paper.mark_failed("worker panicked");
                        paper
                    }
                };
                (position, paper)
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .collect()
            .await;

        for (position, paper) in outcomes {
            slots[position] = Some(paper);
        }

        let papers: Vec<Paper> = slots.into_iter().flatten().collect();
        info!(success = papers.len(), total, "Processed papers");
        papers
    }

    /// Enrich and translate one fresh record.
    #[instrument(level = "info", skip_all, fields(url = %record.url))]
    async fn process(&self, record: RawRecord, pub_date: DateTime<Utc>) -> Result<Paper, PipelineError> {
        let html = self.fetcher.fetch(&record.url).await?;
        let mut paper = Paper::from_raw(record, pub_date);
        paper.apply_details(detail::enrich(&html));

        info!(title = %truncate_for_log(&paper.title, 50), "Translating");
        let languages = &self.config.target_languages;
        paper.translations.descriptions = self
            .translator
            .translate_all(&paper.abstract_short, languages)
            .await;
        paper.translations.abstract_fulls = self
            .translator
            .translate_all(&paper.abstract_full, languages)
            .await;
        Ok(paper)
    }

    async fn persist(&self, papers: &[Paper], cache: &mut CacheStore) {
        cache.merge(papers, Utc::now());
        cache.prune();
        if let Err(e) = cache.persist().await {
            warn!(error = %e, "Failed to save paper cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::errors::{FetchError, TranslateError};
    use crate::outputs::rss::render_feed;
    use clap::Parser;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    const BASE: &str = "http://papers.test/papers";

    /// In-memory site: URL → (body, delay). Unknown URLs answer 404.
    #[derive(Default)]
    struct MockSite {
        pages: HashMap<String, (String, u64)>,
        panics_on: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockSite {
        fn page(mut self, url: &str, body: impl Into<String>, delay_ms: u64) -> Self {
            self.pages.insert(url.to_string(), (body.into(), delay_ms));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Fetch for MockSite {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.panics_on.as_deref() == Some(url) {
                panic!("simulated worker crash");
            }
            match self.pages.get(url) {
                Some((body, delay_ms)) => {
                    tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
                    Ok(body.clone())
                }
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    struct Uppercase;

    impl Translate for Uppercase {
        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, TranslateError> {
            Ok(text.to_uppercase())
        }
    }

    fn config(cache_file: &Path, workers: usize) -> Config {
        let cli = Cli::parse_from([
            "hf_papers_rss",
            "--base-url",
            BASE,
            "--retry-delay",
            "0",
            "--translate-retry-delay",
            "0",
            "--target-languages",
            "zh-CN",
            "--max-workers",
            &workers.to_string(),
            "--cache-file",
            cache_file.to_str().unwrap(),
        ]);
        Config::try_from(cli).unwrap()
    }

    fn listing(ids: &[&str]) -> String {
        let items: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<article><h3><a href="/papers/{id}">Paper {id}</a></h3>
<span class="truncate font-medium">Lab {id}</span></article>"#
                )
            })
            .collect();
        format!("<html><body>{items}</body></html>")
    }

    fn detail(id: &str) -> String {
        format!(
            r#"<html><body>
<div data-props="{{&quot;authors&quot;:[{{&quot;name&quot;:&quot;Ada {id}&quot;}},{{&quot;name&quot;:&quot;Alan {id}&quot;}},{{&quot;name&quot;:&quot;Grace {id}&quot;}}]}}"></div>
<a href="/papers/{id}">permalink</a>
<div class="pb-8 pr-4 md:pr-16">Summary of {id}.</div>
<h2>Abstract</h2>
<p>AI-generated summary</p>
<p>Full abstract of {id}.</p>
<h2>Community</h2>
</body></html>"#
        )
    }

    fn url(id: &str) -> String {
        format!("{BASE}/{id}")
    }

    #[tokio::test]
    async fn test_end_to_end_two_fresh_papers() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_path = tmp.path().join("cache.json");
        let config = config(&cache_path, 5);
        let site = MockSite::default()
            .page(BASE, listing(&["2501.00001", "2501.00002"]), 0)
            .page(&url("2501.00001"), detail("2501.00001"), 0)
            .page(&url("2501.00002"), detail("2501.00002"), 0);

        let mut cache = CacheStore::empty(&cache_path, 1, 500);
        let pipeline = Pipeline::new(&config, &site, Uppercase);
        let papers = pipeline.run(&mut cache).await.unwrap();

        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].url, url("2501.00002"));
        assert_eq!(papers[1].url, url("2501.00001"));
        assert!(papers[0].pub_date > papers[1].pub_date);

        for (paper, id) in papers.iter().zip(["2501.00002", "2501.00001"]) {
            assert_eq!(
                paper.authors,
                vec![format!("Ada {id}"), format!("Alan {id}"), format!("Grace {id}")]
            );
            assert_eq!(paper.institution, format!("Lab {id}"));
            assert_eq!(paper.abstract_full, format!("Full abstract of {id}."));
            let translated = &paper.translations.descriptions["zh-CN"];
            assert_eq!(translated, &paper.abstract_short.to_uppercase());
            assert_ne!(translated, &paper.abstract_short);
            assert_eq!(
                paper.arxiv.as_ref().map(|a| a.abs.clone()),
                Some(format!("https://arxiv.org/abs/{id}"))
            );
        }

        let xml = render_feed(&papers, &config, Utc::now()).unwrap();
        assert_eq!(xml.matches("<item>").count(), 2);
        let newer = xml.find("Paper 2501.00002").unwrap();
        let older = xml.find("Paper 2501.00001").unwrap();
        assert!(newer < older);
        assert!(xml.contains("SUMMARY OF 2501.00002."));

        let reloaded = CacheStore::load(&cache_path, 1, 500).await;
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn test_slow_tasks_do_not_reorder_output() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(&tmp.path().join("cache.json"), 4);
        let ids = ["1.1", "1.2", "1.3", "1.4", "1.5", "1.6"];
        let mut site = MockSite::default().page(BASE, listing(&ids), 0);
        for (i, id) in ids.iter().enumerate() {
            // Earlier positions finish last.
            site = site.page(&url(id), detail(id), ((ids.len() - i) * 15) as u64);
        }

        let mut cache = CacheStore::empty(tmp.path().join("cache.json"), 1, 500);
        let papers = Pipeline::new(&config, &site, Uppercase)
            .run(&mut cache)
            .await
            .unwrap();

        let order: Vec<String> = papers.iter().map(|p| p.url.clone()).collect();
        let expected: Vec<String> = ids.iter().rev().map(|id| url(id)).collect();
        assert_eq!(order, expected);
        assert_eq!(papers.last().unwrap().url, url("1.1"));
    }

    #[tokio::test]
    async fn test_cached_papers_skip_network_and_keep_first_seen() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_path = tmp.path().join("cache.json");
        let config = config(&cache_path, 2);

        let first_seen = Utc::now() - Duration::days(3);
        let mut known = Paper::from_raw(
            RawRecord {
                title: "Cached title".to_string(),
                url: url("9.1"),
                institution: "Old Lab".to_string(),
            },
            first_seen,
        );
        known.abstract_short = "cached summary".to_string();
        let mut cache = CacheStore::empty(&cache_path, 1, 500);
        cache.merge(&[known], first_seen);

        let site = MockSite::default()
            .page(BASE, listing(&["9.1", "9.2"]), 0)
            .page(&url("9.2"), detail("9.2"), 0);
        let papers = Pipeline::new(&config, &site, Uppercase)
            .run(&mut cache)
            .await
            .unwrap();

        assert!(!site.calls().contains(&url("9.1")));
        let cached = papers.iter().find(|p| p.url == url("9.1")).unwrap();
        assert_eq!(cached.title, "Cached title");
        assert_eq!(cached.abstract_short, "cached summary");
        assert_eq!(cached.pub_date.timestamp(), first_seen.timestamp());
        assert_eq!(cache.lookup(&url("9.1")).unwrap().title, "Cached title");
        assert!(cache.last_touched(&url("9.1")).unwrap() > first_seen);
    }

    #[tokio::test]
    async fn test_failed_detail_fetch_degrades_single_record() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(&tmp.path().join("cache.json"), 3);
        let site = MockSite::default()
            .page(BASE, listing(&["3.1", "3.2"]), 0)
            .page(&url("3.2"), detail("3.2"), 0);

        let mut cache = CacheStore::empty(tmp.path().join("cache.json"), 1, 500);
        let papers = Pipeline::new(&config, &site, Uppercase)
            .run(&mut cache)
            .await
            .unwrap();

        assert_eq!(papers.len(), 2);
        let failed = papers.iter().find(|p| p.url == url("3.1")).unwrap();
        assert!(failed.is_failed());
        assert_eq!(failed.abstract_full, failed.abstract_short);
        assert_eq!(failed.title, "Paper 3.1");
        assert!(failed.translations.descriptions.is_empty());
        // Retried up to the configured attempt count.
        let attempts = site.calls().iter().filter(|u| **u == url("3.1")).count();
        assert_eq!(attempts, config.max_retries);

        let ok = papers.iter().find(|p| p.url == url("3.2")).unwrap();
        assert_eq!(ok.abstract_short, "Summary of 3.2.");
    }

    #[tokio::test]
    async fn test_panicking_task_is_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(&tmp.path().join("cache.json"), 2);
        let mut site = MockSite::default()
            .page(BASE, listing(&["4.1", "4.2"]), 0)
            .page(&url("4.2"), detail("4.2"), 0);
        site.panics_on = Some(url("4.1"));

        let mut cache = CacheStore::empty(tmp.path().join("cache.json"), 1, 500);
        let papers = Pipeline::new(&config, &site, Uppercase)
            .run(&mut cache)
            .await
            .unwrap();

        assert_eq!(papers.len(), 2);
        assert_eq!(papers[1].abstract_short, "[Error: worker panicked]");
        assert_eq!(papers[0].abstract_short, "Summary of 4.2.");
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_run() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(&tmp.path().join("cache.json"), 2);
        let site = MockSite::default();

        let mut cache = CacheStore::empty(tmp.path().join("cache.json"), 1, 500);
        let err = Pipeline::new(&config, &site, Uppercase)
            .run(&mut cache)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ListingUnavailable(_)));
        assert_eq!(site.calls().len(), config.max_retries);
        assert!(!tmp.path().join("cache.json").exists());
    }

    #[tokio::test]
    async fn test_empty_listing_aborts_run() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(&tmp.path().join("cache.json"), 2);
        let site = MockSite::default().page(BASE, "<html><body>nothing</body></html>", 0);

        let mut cache = CacheStore::empty(tmp.path().join("cache.json"), 1, 500);
        let err = Pipeline::new(&config, &site, Uppercase)
            .run(&mut cache)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoRecords));
    }

    #[test]
    fn test_split_assigns_increasing_times_to_fresh_records() {
        let mut cache = CacheStore::empty("unused.json", 1, 10);
        let base = Utc::now();
        let known = RawRecord {
            title: "Known".to_string(),
            url: url("5.2"),
            institution: "N/A".to_string(),
        };
        let first_seen = base - Duration::hours(5);
        cache.merge(&[Paper::from_raw(known.clone(), first_seen)], first_seen);

        let records = vec![
            RawRecord { url: url("5.1"), ..known.clone() },
            known.clone(),
            RawRecord { url: url("5.3"), ..known.clone() },
        ];
        let plan = split(records, &cache, base);

        match (&plan[0], &plan[1], &plan[2]) {
            (Planned::Fresh(_, t0), Planned::Cached(p), Planned::Fresh(_, t2)) => {
                assert_eq!(*t0, base);
                assert_eq!(*t2, base + Duration::seconds(2));
                assert_eq!(p.pub_date, first_seen);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }
}
