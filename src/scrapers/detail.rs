//! Paper detail-page enricher.
//!
//! Pulls the AI summary, the full abstract, the first authors and the arXiv
//! identifier out of a paper page with pattern matching over the raw markup.
//! Every field has a fallback, so [`enrich`] never fails.

use crate::models::{ArxivLinks, NOT_AVAILABLE, PaperDetails};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, instrument};

/// Maximum number of author names kept per paper.
pub const MAX_AUTHORS: usize = 5;

static SHORT_SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="[^"]*pb-8 pr-4 md:pr-16[^"]*"[^>]*>(.*?)</div>"#).unwrap()
});
static ABSTRACT_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"<h2[^>]*>\s*Abstract\s*</h2>").unwrap());
static NEXT_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"<h2[\s>]").unwrap());
static PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<p(?:\s[^>]*)?>(.*?)</p>").unwrap());
static SUMMARY_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^AI-generated summary\s*").unwrap());
static AUTHORS_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?s)"authors":\s*\[(.*?)\]"#).unwrap());
static AUTHOR_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#""name":\s*"([^"]+)""#).unwrap());
static ARXIV_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"papers/(\d+\.\d+)").unwrap());

/// Extract everything the feed needs from one detail page.
///
/// # Arguments
///
/// * `markup` - The paper page as served
///
/// # Returns
///
/// A [`PaperDetails`] where every missing field has its fallback: the short
/// synopsis becomes [`NOT_AVAILABLE`], the full synopsis the short one,
/// authors an empty list and the arXiv links `None`.
#[instrument(level = "debug", skip_all, fields(bytes = markup.len()))]
pub fn enrich(markup: &str) -> PaperDetails {
    let abstract_short = short_summary(markup);
    let abstract_full = full_abstract(markup).unwrap_or_else(|| abstract_short.clone());
    let authors = authors(markup);
    let arxiv = arxiv_id(markup).map(|id| ArxivLinks::from_id(&id));

    debug!(
        authors = authors.len(),
        has_arxiv = arxiv.is_some(),
        has_full = abstract_full != abstract_short,
        "Enriched paper page"
    );

    PaperDetails {
        abstract_short,
        abstract_full,
        authors,
        arxiv,
    }
}

/// The AI summary block, or [`NOT_AVAILABLE`].
pub fn short_summary(markup: &str) -> String {
    SHORT_SUMMARY
        .captures(markup)
        .map(|c| strip_tags(&c[1]))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// The second paragraph under the "Abstract" heading.
///
/// The section runs from the heading to the next `<h2>`. `None` when the
/// heading is missing, no `<h2>` closes the section, or the section has
/// fewer than two paragraphs.
pub fn full_abstract(markup: &str) -> Option<String> {
    let heading = ABSTRACT_HEADING.find(markup)?;
    let rest = &markup[heading.end()..];
    let next = NEXT_HEADING.find(rest)?;
    let section = &rest[..next.start()];
    let second = PARAGRAPH.captures_iter(section).nth(1)?;
    let text = strip_tags(&second[1]);
    Some(SUMMARY_PREFIX.replace(&text, "").into_owned())
}

/// Up to [`MAX_AUTHORS`] names from the embedded `"authors": [...]` JSON.
pub fn authors(markup: &str) -> Vec<String> {
    let decoded = decode_common_entities(markup);
    let Some(array) = AUTHORS_ARRAY.captures(&decoded) else {
        return Vec::new();
    };
    AUTHOR_NAME
        .captures_iter(&array[1])
        .map(|c| c[1].to_string())
        .filter(|name| !name.is_empty())
        .take(MAX_AUTHORS)
        .collect()
}

/// The `<digits>.<digits>` identifier following a `papers/` path segment.
pub fn arxiv_id(markup: &str) -> Option<String> {
    ARXIV_ID.captures(markup).map(|c| c[1].to_string())
}

/// Drop all markup from an HTML fragment and trim the remaining text.
pub fn strip_tags(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    let text: String = parsed.root_element().text().collect();
    text.trim().to_string()
}

/// Undo the attribute-level escaping used for embedded JSON props.
fn decode_common_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
<div data-target="PaperPage" data-props="{&quot;paper&quot;:{&quot;id&quot;:&quot;2501.00001&quot;,&quot;authors&quot;:[{&quot;_id&quot;:&quot;a1&quot;,&quot;name&quot;:&quot;Ada Lovelace&quot;},{&quot;_id&quot;:&quot;a2&quot;,&quot;name&quot;:&quot;Alan Turing&quot;},{&quot;_id&quot;:&quot;a3&quot;,&quot;name&quot;:&quot;Grace Hopper&quot;}]}}"></div>
<a href="https://huggingface.co/papers/2501.00001">permalink</a>
<div class="pb-8 pr-4 md:pr-16"><span>Tiny models</span> scale <b>too</b>.</div>
<h2 class="text-xl">Abstract</h2>
<div><p class="label">AI-generated summary</p>
<p>AI-generated summary   We study <em>scaling</em> laws &amp; more.</p>
<p>Third paragraph.</p></div>
<h2>Community</h2>
<p>Not part of the abstract.</p>
</body></html>"#;

    #[test]
    fn test_enrich_full_page() {
        let details = enrich(PAGE);
        assert_eq!(details.abstract_short, "Tiny models scale too.");
        assert_eq!(details.abstract_full, "We study scaling laws & more.");
        assert_eq!(
            details.authors,
            vec!["Ada Lovelace", "Alan Turing", "Grace Hopper"]
        );
        let arxiv = details.arxiv.unwrap();
        assert_eq!(arxiv.abs, "https://arxiv.org/abs/2501.00001");
        assert_eq!(arxiv.pdf, "https://arxiv.org/pdf/2501.00001.pdf");
    }

    #[test]
    fn test_missing_summary_uses_sentinel() {
        let details = enrich("<html><body><p>nothing</p></body></html>");
        assert_eq!(details.abstract_short, NOT_AVAILABLE);
        assert_eq!(details.abstract_full, NOT_AVAILABLE);
        assert!(details.authors.is_empty());
        assert!(details.arxiv.is_none());
    }

    #[test]
    fn test_single_paragraph_falls_back_to_short_summary() {
        let page = r#"<div class="pb-8 pr-4 md:pr-16">Short one.</div>
<h2>Abstract</h2><p>Only a label</p><h2>Next</h2><p>later</p><p>later again</p>"#;
        let details = enrich(page);
        assert_eq!(details.abstract_full, "Short one.");
        assert_eq!(details.abstract_full, details.abstract_short);
    }

    #[test]
    fn test_unterminated_abstract_section_falls_back_to_summary() {
        let page = r#"<div class="pb-8 pr-4 md:pr-16">Short.</div><h2>Abstract</h2><p>label</p><p>Body.</p>"#;
        assert_eq!(full_abstract(page), None);
        let details = enrich(page);
        assert_eq!(details.abstract_full, "Short.");
        assert_eq!(details.abstract_short, "Short.");
    }

    #[test]
    fn test_path_and_pre_tags_are_not_paragraphs() {
        let page = r#"<h2>Abstract</h2><p>label</p><path d="M0"></path><pre>code</pre><p>Real.</p><h2>More</h2>"#;
        assert_eq!(full_abstract(page).as_deref(), Some("Real."));
    }

    #[test]
    fn test_authors_capped_at_five() {
        let names: Vec<String> = (1..=8).map(|i| format!(r#"{{"name": "Author {i}"}}"#)).collect();
        let page = format!(r#"<script>{{"authors": [{}]}}</script>"#, names.join(","));
        let authors = authors(&page);
        assert_eq!(authors.len(), MAX_AUTHORS);
        assert_eq!(authors[0], "Author 1");
        assert_eq!(authors[4], "Author 5");
    }

    #[test]
    fn test_arxiv_id_requires_papers_segment() {
        assert_eq!(arxiv_id("see /papers/2406.12345 now").as_deref(), Some("2406.12345"));
        assert_eq!(arxiv_id("version 2406.12345"), None);
    }

    #[test]
    fn test_strip_tags_trims_and_decodes() {
        assert_eq!(strip_tags("  <b>a</b> &amp; <i>b</i>\n"), "a & b");
    }
}
