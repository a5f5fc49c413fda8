//! Hugging Face papers listing extractor.
//!
//! [`ListingExtractor`] is a small state machine fed one tag or text event at
//! a time. [`extract`] parses the page with the HTML5 parser behind
//! `scraper` and replays the document into it in order.
//!
//! # Page Shape
//!
//! ```text
//! <article>
//!   <h3><a href="/papers/2501.00001">Title</a></h3>
//!   <span class="truncate font-medium">Affiliation</span>
//! </article>
//! ```

use crate::models::{NO_AFFILIATION, RawRecord};
use crate::utils::collapse_whitespace;
use scraper::{ElementRef, Html, Node};
use tracing::{debug, instrument};
use url::Url;

const ITEM_TAG: &str = "article";
const HEADING_TAG: &str = "h3";
const LINK_TAG: &str = "a";
const SPAN_TAG: &str = "span";

/// Decides whether a span's `class` attribute marks the affiliation label.
///
/// Every marker must appear as a substring of the class attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffiliationMatcher {
    markers: Vec<String>,
}

impl AffiliationMatcher {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let markers = markers
            .into_iter()
            .map(Into::into)
            .map(|m: String| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        Self { markers }
    }

    pub fn matches(&self, class: &str) -> bool {
        !self.markers.is_empty() && self.markers.iter().all(|m| class.contains(m.as_str()))
    }
}

impl Default for AffiliationMatcher {
    fn default() -> Self {
        Self::new(["truncate", "font-medium"])
    }
}

/// Normalize an affiliation label.
///
/// Whitespace runs collapse to one space; an empty result or a lone
/// separator glyph becomes [`NO_AFFILIATION`].
pub fn normalize_affiliation(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    match collapsed.as_str() {
        "" | "·" | "." => NO_AFFILIATION.to_string(),
        _ => collapsed,
    }
}

/// Where the extractor currently sits relative to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    OutsideItem,
    InItem,
    InHeading,
    InLink,
}

#[derive(Debug, Default)]
struct Scratch {
    url: Option<String>,
    title: Option<String>,
    title_buf: String,
    affiliation_buf: String,
}

/// A start tag as seen by the extractor: lowercase name plus attributes.
#[derive(Debug, Default)]
pub struct Tag {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Tag-event state machine recovering [`RawRecord`]s from the listing page.
///
/// Unbalanced end tags are ignored; an item missing its link or title is
/// dropped when the item closes.
#[derive(Debug)]
pub struct ListingExtractor<'a> {
    base: &'a Url,
    matcher: &'a AffiliationMatcher,
    state: State,
    /// Open span depth inside the affiliation span; zero when not inside one.
    affiliation_depth: usize,
    scratch: Scratch,
    records: Vec<RawRecord>,
}

impl<'a> ListingExtractor<'a> {
    pub fn new(base: &'a Url, matcher: &'a AffiliationMatcher) -> Self {
        Self {
            base,
            matcher,
            state: State::OutsideItem,
            affiliation_depth: 0,
            scratch: Scratch::default(),
            records: Vec::new(),
        }
    }

    pub fn start_tag(&mut self, tag: &Tag) {
        let name = tag.name.as_str();

        if name == ITEM_TAG {
            self.state = State::InItem;
            self.affiliation_depth = 0;
            self.scratch = Scratch::default();
            return;
        }

        match (self.state, name) {
            (State::InItem, HEADING_TAG) => {
                self.state = State::InHeading;
            }
            (State::InHeading, LINK_TAG) => {
                self.state = State::InLink;
                if let Some(href) = tag.attr("href").filter(|h| !h.is_empty()) {
                    match self.base.join(href) {
                        Ok(resolved) => self.scratch.url = Some(resolved.to_string()),
                        Err(e) => debug!(%href, error = %e, "Unresolvable paper link"),
                    }
                }
                self.scratch.title_buf.clear();
            }
            (State::InItem, SPAN_TAG) => {
                if self.affiliation_depth > 0 {
                    self.affiliation_depth += 1;
                } else if self.matcher.matches(tag.attr("class").unwrap_or_default()) {
                    self.affiliation_depth = 1;
                    self.scratch.affiliation_buf.clear();
                }
            }
            _ => {}
        }
    }

    pub fn end_tag(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            LINK_TAG if self.state == State::InLink => {
                self.finish_link();
                self.state = State::InHeading;
            }
            HEADING_TAG if matches!(self.state, State::InHeading | State::InLink) => {
                if self.state == State::InLink {
                    self.finish_link();
                }
                self.state = State::InItem;
            }
            SPAN_TAG if self.affiliation_depth > 0 => {
                self.affiliation_depth -= 1;
            }
            ITEM_TAG if self.state != State::OutsideItem => {
                self.finish_item();
            }
            _ => {}
        }
    }

    pub fn text(&mut self, data: &str) {
        if self.state == State::InLink {
            self.scratch.title_buf.push_str(data);
        }
        if self.affiliation_depth > 0 {
            self.scratch.affiliation_buf.push_str(data);
        }
    }

    pub fn finish(self) -> Vec<RawRecord> {
        self.records
    }

    fn finish_link(&mut self) {
        let title = self.scratch.title_buf.trim();
        if !title.is_empty() {
            self.scratch.title = Some(title.to_string());
        }
        self.scratch.title_buf.clear();
    }

    fn finish_item(&mut self) {
        let scratch = std::mem::take(&mut self.scratch);
        match (scratch.url, scratch.title) {
            (Some(url), Some(title)) if !url.is_empty() && !title.is_empty() => {
                self.records.push(RawRecord {
                    title,
                    url,
                    institution: normalize_affiliation(&scratch.affiliation_buf),
                });
            }
            (url, title) => {
                debug!(?url, ?title, "Dropping incomplete listing item");
            }
        }
        self.state = State::OutsideItem;
        self.affiliation_depth = 0;
    }
}

/// One step of the document walk.
enum Step<'a> {
    Enter(ElementRef<'a>),
    Text(&'a str),
    Leave(&'a str),
}

/// Extract all listing records from `markup`, in page order.
///
/// The page is tokenized by a full HTML5 parser, so bare `&` and `<` in text,
/// unclosed tags and stray end tags are handled the way a browser would.
/// The resulting document is replayed as start/text/end events into a
/// [`ListingExtractor`].
///
/// # Arguments
///
/// * `markup` - The listing page as served
/// * `base` - URL the relative paper links are resolved against
/// * `matcher` - Recognizes the affiliation span
///
/// # Returns
///
/// The records with a non-empty link and title, in document order. Never
/// fails; unusable items are skipped.
#[instrument(level = "info", skip_all, fields(bytes = markup.len()))]
pub fn extract(markup: &str, base: &Url, matcher: &AffiliationMatcher) -> Vec<RawRecord> {
    let document = Html::parse_document(markup);
    let mut extractor = ListingExtractor::new(base, matcher);

    // Explicit stack: deeply nested markup must not exhaust the call stack.
    let mut steps = vec![Step::Enter(document.root_element())];
    while let Some(step) = steps.pop() {
        match step {
            Step::Enter(element) => {
                let value = element.value();
                extractor.start_tag(&to_tag(value.name(), value.attrs()));
                steps.push(Step::Leave(value.name()));

                let children: Vec<_> = element.children().collect();
                for child in children.into_iter().rev() {
                    match child.value() {
                        Node::Text(text) => steps.push(Step::Text(&**text)),
                        Node::Element(_) => {
                            if let Some(child) = ElementRef::wrap(child) {
                                steps.push(Step::Enter(child));
                            }
                        }
                        _ => {}
                    }
                }
            }
            Step::Text(text) => extractor.text(text),
            Step::Leave(name) => extractor.end_tag(name),
        }
    }

    let records = extractor.finish();
    debug!(count = records.len(), "Extracted listing records");
    records
}

fn to_tag<'a>(name: &str, attrs: impl Iterator<Item = (&'a str, &'a str)>) -> Tag {
    attrs.fold(Tag::new(name), |tag, (key, value)| tag.with_attr(key, value))
}
