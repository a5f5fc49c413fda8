//! Feed output.
//!
//! - [`rss`]: renders the processed papers as an RSS 2.0 document with
//!   `content:encoded` bodies and writes it to disk
//!
//! # Output Structure
//!
//! ```text
//! docs/
//! └── feed.xml      # rewritten in full on every run
//! ```

pub mod rss;
