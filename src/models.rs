//! Data models for papers at each stage of the pipeline.
//!
//! - [`RawRecord`]: what the listing extractor recovers for one entry
//! - [`PaperDetails`]: what the detail enricher recovers from a paper page
//! - [`Paper`]: the enriched record handed to the feed serializer
//! - [`CacheEntry`]: the persisted form of a [`Paper`], keyed by its URL
//!
//! Field names on [`CacheEntry`] are fixed by the on-disk cache format.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder used when a paper page has no extractable summary.
pub const NOT_AVAILABLE: &str = "[Not available]";

/// Placeholder used when a listing entry carries no affiliation.
pub const NO_AFFILIATION: &str = "N/A";

/// Fixed publication-date format used in the feed and the cache file.
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format a timestamp the way feed readers expect `pubDate`.
pub fn format_pub_date(ts: &DateTime<Utc>) -> String {
    ts.format(PUB_DATE_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_pub_date`].
pub fn parse_pub_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, PUB_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_rfc2822(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// Serde adapter storing a `DateTime<Utc>` as an RFC-822 style string.
pub mod pub_date_serde {
    use super::{format_pub_date, parse_pub_date};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_pub_date(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_pub_date(&raw).ok_or_else(|| D::Error::custom(format!("bad pub_date: {raw}")))
    }
}

/// One entry recovered from the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Paper title, whitespace-trimmed and never empty.
    pub title: String,
    /// Absolute URL of the paper page. This is the record's identity.
    pub url: String,
    /// Normalized affiliation label, or [`NO_AFFILIATION`].
    pub institution: String,
}

/// Cross-reference links derived from an arXiv identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivLinks {
    pub abs: String,
    pub pdf: String,
}

impl ArxivLinks {
    pub fn from_id(id: &str) -> Self {
        Self {
            abs: format!("https://arxiv.org/abs/{id}"),
            pdf: format!("https://arxiv.org/pdf/{id}.pdf"),
        }
    }
}

/// Secondary text pulled from a paper's detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperDetails {
    pub abstract_short: String,
    pub abstract_full: String,
    pub authors: Vec<String>,
    pub arxiv: Option<ArxivLinks>,
}

/// Translated variants of a paper's synopses, keyed by target language.
///
/// A language is missing from a map when its source text was empty or
/// [`NOT_AVAILABLE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translations {
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
    #[serde(default)]
    pub abstract_fulls: BTreeMap<String, String>,
}

/// A fully processed paper, ready for the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paper {
    pub title: String,
    pub url: String,
    pub institution: String,
    /// First-discovery time. Drives feed ordering.
    pub pub_date: DateTime<Utc>,
    pub abstract_short: String,
    /// Falls back to `abstract_short` when the page has no full abstract.
    pub abstract_full: String,
    pub authors: Vec<String>,
    pub arxiv: Option<ArxivLinks>,
    pub translations: Translations,
}

impl Paper {
    /// Start a paper from its listing record, before any enrichment.
    pub fn from_raw(raw: RawRecord, pub_date: DateTime<Utc>) -> Self {
        Self {
            title: raw.title,
            url: raw.url,
            institution: raw.institution,
            pub_date,
            abstract_short: String::new(),
            abstract_full: String::new(),
            authors: Vec::new(),
            arxiv: None,
            translations: Translations::default(),
        }
    }

    pub fn apply_details(&mut self, details: PaperDetails) {
        self.abstract_short = details.abstract_short;
        self.abstract_full = details.abstract_full;
        self.authors = details.authors;
        self.arxiv = details.arxiv;
    }

    /// Replace both synopses with an error marker, keeping the listing fields.
    pub fn mark_failed(&mut self, reason: &str) {
        let marker = format!("[Error: {reason}]");
        self.abstract_full = marker.clone();
        self.abstract_short = marker;
    }

    pub fn is_failed(&self) -> bool {
        self.abstract_short.starts_with("[Error: ")
    }
}

/// Persisted form of a [`Paper`].
///
/// `pub_date` is the first-seen timestamp; it is written once when the
/// entry is created and reused on every later cache hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub title: String,
    pub url: String,
    #[serde(default = "default_institution")]
    pub institution: String,
    #[serde(rename = "abstract", default)]
    pub abstract_full: String,
    #[serde(default)]
    pub abstract_short: String,
    #[serde(default)]
    pub arxiv_abs: Option<String>,
    #[serde(default)]
    pub arxiv_pdf: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(with = "pub_date_serde")]
    pub pub_date: DateTime<Utc>,
    #[serde(default)]
    pub translations: Translations,
}

fn default_institution() -> String {
    NO_AFFILIATION.to_string()
}

impl From<&Paper> for CacheEntry {
    fn from(paper: &Paper) -> Self {
        Self {
            title: paper.title.clone(),
            url: paper.url.clone(),
            institution: paper.institution.clone(),
            abstract_full: paper.abstract_full.clone(),
            abstract_short: paper.abstract_short.clone(),
            arxiv_abs: paper.arxiv.as_ref().map(|a| a.abs.clone()),
            arxiv_pdf: paper.arxiv.as_ref().map(|a| a.pdf.clone()),
            authors: paper.authors.clone(),
            pub_date: paper.pub_date,
            translations: paper.translations.clone(),
        }
    }
}

impl From<&CacheEntry> for Paper {
    fn from(entry: &CacheEntry) -> Self {
        let arxiv = match (&entry.arxiv_abs, &entry.arxiv_pdf) {
            (Some(abs), Some(pdf)) => Some(ArxivLinks {
                abs: abs.clone(),
                pdf: pdf.clone(),
            }),
            _ => None,
        };
        // Older writers stored "" for languages that were never translated.
        let non_empty = |map: &BTreeMap<String, String>| {
            map.iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        Self {
            title: entry.title.clone(),
            url: entry.url.clone(),
            institution: entry.institution.clone(),
            pub_date: entry.pub_date,
            abstract_short: entry.abstract_short.clone(),
            abstract_full: entry.abstract_full.clone(),
            authors: entry.authors.clone(),
            arxiv,
            translations: Translations {
                descriptions: non_empty(&entry.translations.descriptions),
                abstract_fulls: non_empty(&entry.translations.abstract_fulls),
            },
        }
    }
}
