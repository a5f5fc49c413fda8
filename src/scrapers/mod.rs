//! Markup extraction for the papers site.
//!
//! The site is read in two phases:
//!
//! 1. **Listing**: [`listing::extract`] walks the daily listing page as a
//!    tag/text event stream and yields one record per paper card
//! 2. **Detail**: [`detail::enrich`] pattern-matches a single paper page for
//!    the summary, the abstract, the authors and the arXiv identifier
//!
//! Neither phase fails on malformed markup; missing fields fall back to
//! sentinel values.

pub mod detail;
pub mod listing;
