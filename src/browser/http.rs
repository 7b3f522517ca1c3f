//! HTTP rendering engine
//!
//! Fetches server-rendered HTML with a randomized desktop identity and a
//! French locale, and answers lookups by parsing the current document.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::browser::{BrowserEngine, BrowserPage, Fragment, Link};
use crate::error::{AppError, Result};

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const BLOCK_SELECTOR: &str = "div.g-recaptcha";

/// Engine that renders pages over plain HTTP
pub struct HttpBrowserEngine;

impl HttpBrowserEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HttpBrowserEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserEngine for HttpBrowserEngine {
    async fn open_session(&self) -> Result<Box<dyn BrowserPage>> {
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("fr-FR,fr;q=0.9,en;q=0.5"));

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to build HTTP session: {}", e)))?;

        Ok(Box::new(HttpBrowserPage {
            client,
            html: String::new(),
        }))
    }
}

struct HttpBrowserPage {
    client: Client,
    html: String,
}

#[async_trait]
impl BrowserPage for HttpBrowserPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Browser(format!("GET {} returned {}", url, status)));
        }
        self.html = response.text().await?;
        Ok(())
    }

    fn blocked(&self) -> bool {
        let document = Html::parse_document(&self.html);
        match Selector::parse(BLOCK_SELECTOR) {
            Ok(selector) => document.select(&selector).next().is_some(),
            Err(_) => false,
        }
    }

    fn links(&self, css: &str) -> Vec<Link> {
        let Ok(selector) = Selector::parse(css) else {
            return Vec::new();
        };
        let document = Html::parse_document(&self.html);
        document
            .select(&selector)
            .filter_map(|el| {
                let href = el.value().attr("href")?.to_string();
                let text = el.text().collect::<String>().trim().to_string();
                Some(Link { href, text })
            })
            .collect()
    }

    fn first_text(&self, css: &str) -> Option<String> {
        let Ok(selector) = Selector::parse(css) else {
            return None;
        };
        let document = Html::parse_document(&self.html);
        document
            .select(&selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .find(|text| !text.is_empty())
    }

    fn label_value(&self, label: &str) -> Option<String> {
        let row_selector = Selector::parse("tr").ok()?;
        let cell_selector = Selector::parse("td, th").ok()?;
        let document = Html::parse_document(&self.html);

        for row in document.select(&row_selector) {
            let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
            for (i, cell) in cells.iter().enumerate() {
                let text: String = cell.text().collect();
                if !text.contains(label) {
                    continue;
                }
                if let Some(next) = cells.get(i + 1) {
                    let value = next.text().collect::<String>().trim().to_string();
                    if !value.is_empty() {
                        return Some(value);
                    }
                }
            }
        }
        None
    }

    fn fragments(&self, css: &str) -> Vec<Fragment> {
        let Ok(selector) = Selector::parse(css) else {
            return Vec::new();
        };
        let document = Html::parse_document(&self.html);
        document
            .select(&selector)
            .map(|el| Fragment::new(el.html()))
            .collect()
    }

    fn has_link_labelled(&self, label: &str) -> bool {
        let Ok(selector) = Selector::parse("a") else {
            return false;
        };
        let document = Html::parse_document(&self.html);
        document
            .select(&selector)
            .any(|el| el.text().collect::<String>().contains(label))
    }
}
