//! RSS 2.0 feed generation.
//!
//! # Output Structure
//!
//! ```text
//! <rss version="2.0" xmlns:atom=".." xmlns:content="..">
//!   <channel>
//!     <title/> <link/> <description/> <lastBuildDate/> <atom:link rel="self"/>
//!     <item>
//!       <title/> <link/> <description>CDATA</description>
//!       <content:encoded>CDATA</content:encoded>
//!       <pubDate/> <guid isPermaLink="true"/> <institution/>
//!       <arxivAbs/> <arxivPdf/>
//!     </item>
//!   </channel>
//! </rss>
//! ```
//!
//! Translated synopses are appended after their source paragraph, once per
//! configured language, and only when they differ from the source.

use crate::config::Config;
use crate::models::{NO_AFFILIATION, Paper, format_pub_date};
use crate::utils::ensure_parent_dir;
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// Render the whole feed document.
///
/// # Arguments
///
/// * `papers` - Items in feed order (newest first)
/// * `config` - Channel metadata, base URL and target languages
/// * `built_at` - Value of `lastBuildDate`
///
/// # Returns
///
/// The serialized RSS 2.0 document, UTF-8, ending in a newline.
///
/// # Errors
///
/// Only if the XML writer fails, which cannot happen for an in-memory buffer
/// in practice.
#[instrument(level = "info", skip_all, fields(items = papers.len()))]
pub fn render_feed(
    papers: &[Paper],
    config: &Config,
    built_at: DateTime<Utc>,
) -> Result<String, Box<dyn Error>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    rss.push_attribute(("xmlns:content", CONTENT_NS));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    text_element(&mut writer, "title", &config.feed.title)?;
    text_element(&mut writer, "link", config.base_url.as_str())?;
    text_element(&mut writer, "description", &config.feed.description)?;
    text_element(&mut writer, "lastBuildDate", &format_pub_date(&built_at))?;

    let mut self_link = BytesStart::new("atom:link");
    self_link.push_attribute(("href", config.feed.self_url.as_str()));
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("type", "application/rss+xml"));
    writer.write_event(Event::Empty(self_link))?;

    for paper in papers {
        write_item(&mut writer, paper, &config.target_languages)?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    let mut xml = String::from_utf8(writer.into_inner())?;
    xml.push('\n');
    info!(bytes = xml.len(), "Generated feed");
    Ok(xml)
}

fn write_item(
    writer: &mut Writer<Vec<u8>>,
    paper: &Paper,
    languages: &[String],
) -> Result<(), Box<dyn Error>> {
    writer.write_event(Event::Start(BytesStart::new("item")))?;

    text_element(writer, "title", &paper.title)?;
    text_element(writer, "link", &paper.url)?;
    cdata_element(writer, "description", &description_html(paper, languages))?;
    cdata_element(writer, "content:encoded", &content_html(paper, languages))?;
    text_element(writer, "pubDate", &format_pub_date(&paper.pub_date))?;

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", "true"));
    writer.write_event(Event::Start(guid))?;
    writer.write_event(Event::Text(BytesText::new(&paper.url)))?;
    writer.write_event(Event::End(BytesEnd::new("guid")))?;

    text_element(writer, "institution", &paper.institution)?;
    if let Some(arxiv) = &paper.arxiv {
        text_element(writer, "arxivAbs", &arxiv.abs)?;
        text_element(writer, "arxivPdf", &arxiv.pdf)?;
    }

    writer.write_event(Event::End(BytesEnd::new("item")))?;
    Ok(())
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), Box<dyn Error>> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn cdata_element(writer: &mut Writer<Vec<u8>>, name: &str, html: &str) -> Result<(), Box<dyn Error>> {
    // A literal "]]>" would terminate the section early.
    let safe = html.replace("]]>", "]]&gt;");
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::CData(BytesCData::new(safe.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Short-form block: affiliation and authors, arXiv links, AI summary.
pub fn description_html(paper: &Paper, languages: &[String]) -> String {
    let mut html = String::from("<div class=\"paper-content\">\n");
    push_header(&mut html, paper);
    push_section(
        &mut html,
        "AI summary",
        &paper.abstract_short,
        &paper.translations.descriptions,
        languages,
    );
    html.push_str("</div>");
    html
}

/// Full-form block: the short-form content followed by the full abstract.
pub fn content_html(paper: &Paper, languages: &[String]) -> String {
    let mut html = String::from("<div class=\"paper-content\">\n");
    push_header(&mut html, paper);
    push_section(
        &mut html,
        "AI summary",
        &paper.abstract_short,
        &paper.translations.descriptions,
        languages,
    );
    push_section(
        &mut html,
        "Abstract",
        &paper.abstract_full,
        &paper.translations.abstract_fulls,
        languages,
    );
    html.push_str("</div>");
    html
}

fn push_header(html: &mut String, paper: &Paper) {
    let mut parts = Vec::new();
    if !paper.institution.is_empty() && paper.institution != NO_AFFILIATION {
        parts.push(format!("Institution: {}", escape(paper.institution.as_str())));
    }
    if !paper.authors.is_empty() {
        let names: Vec<_> = paper.authors.iter().map(|a| escape(a.as_str())).collect();
        parts.push(format!("Authors: {}", names.join(", ")));
    }
    if !parts.is_empty() {
        html.push_str(&format!(
            "  <p style=\"color: #666; font-size: 0.9em;\">{}</p>\n",
            parts.join(" | ")
        ));
    }

    if let Some(arxiv) = &paper.arxiv {
        html.push_str("  <h3>arXiv Links</h3>\n");
        html.push_str(&format!(
            "  <p><a href=\"{}\">arXiv</a> | <a href=\"{}\">PDF</a></p>\n",
            escape(arxiv.abs.as_str()),
            escape(arxiv.pdf.as_str())
        ));
    }
}

fn push_section(
    html: &mut String,
    heading: &str,
    source: &str,
    translations: &BTreeMap<String, String>,
    languages: &[String],
) {
    html.push_str(&format!("  <h3>{heading}</h3>\n"));
    html.push_str(&format!("  <p>{}</p>\n", escape(source)));
    for lang in languages {
        if let Some(translated) = translations.get(lang) {
            if translated != source {
                html.push_str(&format!("  <p>{}</p>\n", escape(translated.as_str())));
            }
        }
    }
}

/// Write the rendered feed, creating parent directories as needed.
///
/// # Arguments
///
/// * `path` - Destination file; replaced in full
/// * `xml` - Output of [`render_feed`]
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_feed(path: &Path, xml: &str) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(path).await?;
    fs::write(path, xml).await?;
    info!(bytes = xml.len(), "Wrote feed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::models::{ArxivLinks, PaperDetails, RawRecord};
    use chrono::TimeZone;
    use clap::Parser;

    fn config() -> Config {
        Config::try_from(Cli::parse_from(["hf_papers_rss", "--target-languages", "es,fr"])).unwrap()
    }

    fn paper() -> Paper {
        let mut paper = Paper::from_raw(
            RawRecord {
                title: "Attention <Is> All".to_string(),
                url: "https://huggingface.co/papers/2501.00001".to_string(),
                institution: "Lab & Co".to_string(),
            },
            Utc.with_ymd_and_hms(2025, 5, 6, 14, 30, 0).unwrap(),
        );
        paper.apply_details(PaperDetails {
            abstract_short: "Short text".to_string(),
            abstract_full: "Full text".to_string(),
            authors: vec!["Ada".to_string(), "Alan".to_string()],
            arxiv: Some(ArxivLinks::from_id("2501.00001")),
        });
        paper.translations.descriptions.insert("es".to_string(), "Texto corto".to_string());
        paper.translations.descriptions.insert("fr".to_string(), "Short text".to_string());
        paper.translations.abstract_fulls.insert("es".to_string(), "Texto completo".to_string());
        paper
    }

    #[test]
    fn test_render_feed_channel_and_item() {
        let built = Utc.with_ymd_and_hms(2025, 5, 7, 0, 0, 0).unwrap();
        let xml = render_feed(&[paper()], &config(), built).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<title>Hugging Face Papers RSS</title>"));
        assert!(xml.contains("<link>https://huggingface.co/papers</link>"));
        assert!(xml.contains("<lastBuildDate>Wed, 07 May 2025 00:00:00 GMT</lastBuildDate>"));
        assert!(xml.contains("rel=\"self\""));
        assert!(xml.contains("<title>Attention &lt;Is&gt; All</title>"));
        assert!(xml.contains("<pubDate>Tue, 06 May 2025 14:30:00 GMT</pubDate>"));
        assert!(xml.contains(
            "<guid isPermaLink=\"true\">https://huggingface.co/papers/2501.00001</guid>"
        ));
        assert!(xml.contains("<institution>Lab &amp; Co</institution>"));
        assert!(xml.contains("<arxivPdf>https://arxiv.org/pdf/2501.00001.pdf</arxivPdf>"));
        assert_eq!(xml.matches("<item>").count(), 1);
    }

    #[test]
    fn test_translations_only_when_different() {
        let html = description_html(&paper(), &["es".to_string(), "fr".to_string()]);
        assert!(html.contains("<p>Texto corto</p>"));
        assert_eq!(html.matches("<p>Short text</p>").count(), 1);
        assert!(html.contains("Institution: Lab &amp; Co | Authors: Ada, Alan"));
        assert!(!html.contains("Full text"));
    }

    #[test]
    fn test_content_block_carries_full_abstract() {
        let html = content_html(&paper(), &["es".to_string()]);
        assert!(html.contains("<h3>Abstract</h3>\n  <p>Full text</p>\n  <p>Texto completo</p>"));
    }

    #[test]
    fn test_missing_affiliation_and_arxiv_are_omitted() {
        let mut p = paper();
        p.institution = NO_AFFILIATION.to_string();
        p.authors.clear();
        p.arxiv = None;
        let html = description_html(&p, &[]);
        assert!(!html.contains("Institution:"));
        assert!(!html.contains("arXiv Links"));

        let xml = render_feed(&[p], &config(), Utc::now()).unwrap();
        assert!(!xml.contains("<arxivAbs>"));
    }

    #[test]
    fn test_cdata_terminator_is_neutralized() {
        let mut p = paper();
        p.abstract_short = "a ]]> b".to_string();
        let xml = render_feed(&[p], &config(), Utc::now()).unwrap();
        assert!(!xml.contains("a ]]> b"));
    }

    #[tokio::test]
    async fn test_write_feed_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("docs/feed.xml");
        write_feed(&path, "<rss/>").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "<rss/>");
    }
}
