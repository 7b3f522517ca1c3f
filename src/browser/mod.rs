//! Browser capability seam for scraped sources
//!
//! Scrapers only see this small interface: navigate, detect a block page,
//! locate elements, read text. The shipped engine renders server HTML over
//! HTTP; tests substitute a fake session.

mod http;

pub use http::HttpBrowserEngine;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::error::Result;

/// A followable link found on the current page
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// Owned snippet of one matched element, for scoped lookups
#[derive(Debug, Clone)]
pub struct Fragment {
    html: String,
}

impl Fragment {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    /// Text of the first descendant matching a CSS selector
    pub fn first_text(&self, css: &str) -> Option<String> {
        let Ok(selector) = Selector::parse(css) else {
            return None;
        };
        let fragment = Html::parse_fragment(&self.html);
        fragment
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
    }

    /// Full text content of the snippet
    pub fn text(&self) -> String {
        let fragment = Html::parse_fragment(&self.html);
        fragment.root_element().text().collect::<String>().trim().to_string()
    }
}

/// One browsing session: a current document plus its client identity
#[async_trait]
pub trait BrowserPage: Send {
    /// Load a URL, replacing the current document
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Challenge/CAPTCHA marker present on the current document
    fn blocked(&self) -> bool;

    /// All links matching a CSS selector
    fn links(&self, css: &str) -> Vec<Link>;

    /// Trimmed text of the first element matching a CSS selector
    fn first_text(&self, css: &str) -> Option<String>;

    /// Text of the table cell following the cell whose text contains `label`
    fn label_value(&self, label: &str) -> Option<String>;

    /// Owned snippets of every element matching a CSS selector
    fn fragments(&self, css: &str) -> Vec<Fragment>;

    /// Whether any anchor on the page carries `label` in its text
    fn has_link_labelled(&self, label: &str) -> bool;
}

/// Opens sessions with a fresh client identity. Session setup failure is
/// fatal for the run that requested it.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn BrowserPage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_scoped_lookup() {
        let fragment = Fragment::new(
            r#"<div class="dirigeant"><a class="nom">Marie Dupont</a> <span class="fonction">Gérant</span></div>"#,
        );
        assert_eq!(fragment.first_text("a.nom").as_deref(), Some("Marie Dupont"));
        assert_eq!(fragment.first_text("span.fonction").as_deref(), Some("Gérant"));
        assert_eq!(fragment.first_text("span.missing"), None);
        assert_eq!(fragment.text(), "Marie Dupont Gérant");
    }
}
