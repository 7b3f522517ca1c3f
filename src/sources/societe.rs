//! Société.com source adapter
//!
//! Browser-driven crawl of the public search: one result-list pass per
//! department collects company stubs, a second pass dereferences each stub to
//! its detail page. Client identity and request pacing are randomized and a
//! challenge page abandons the unit it appears on instead of failing the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rand::Rng;
use regex::Regex;
use url::Url;

use crate::browser::{BrowserEngine, BrowserPage};
use crate::db::CompanyStore;
use crate::error::Result;
use crate::ingest::dedup::{revenue_eligible, SirenIndex};
use crate::ingest::normalize::{clean_numeric, officer_line};
use crate::model::{CompanyStatus, NewCompany, Officer};
use crate::sources::{IDF_DEPARTMENTS, NAF_ACCOUNTING};
use crate::status::RunHandle;

const BASE_URL: &str = "https://www.societe.com";
const SEARCH_URL: &str = "https://www.societe.com/cgi-bin/search";
const MAX_PAGES_PER_DEPARTMENT: u32 = 5;
const MAX_OFFICERS: usize = 5;
const COOLDOWN_EVERY: u64 = 10;

/// Lightweight search hit: identifier, display name, detail link
struct CompanyStub {
    siren: String,
    name: String,
    url: String,
}

/// Ingestion run over the Société.com search
pub struct SocieteIngest {
    engine: Arc<dyn BrowserEngine>,
    store: Arc<dyn CompanyStore>,
    siren_re: Regex,
    capital_re: Regex,
    date_re: Regex,
    revenue_re: Regex,
    net_income_re: Regex,
}

impl SocieteIngest {
    pub fn new(engine: Arc<dyn BrowserEngine>, store: Arc<dyn CompanyStore>) -> Self {
        Self {
            engine,
            store,
            siren_re: Regex::new(r"/societe/[^/]+/(\d{9})")
                .expect("Failed to compile SIREN pattern"),
            capital_re: Regex::new(r"([\d\s]+)").expect("Failed to compile capital pattern"),
            date_re: Regex::new(r"(\d{2})-(\d{2})-(\d{4})")
                .expect("Failed to compile date pattern"),
            revenue_re: Regex::new(r"([\d\s]+)\s*(?:€|EUR)")
                .expect("Failed to compile revenue pattern"),
            net_income_re: Regex::new(r"(-?[\d\s]+)\s*(?:€|EUR)")
                .expect("Failed to compile net income pattern"),
        }
    }

    /// Crawl every department up to the page cap. Returns the final status
    /// message. Failing to open the browser session is fatal; everything
    /// after that degrades per page or per company.
    pub async fn run(&self, handle: &RunHandle) -> Result<String> {
        let mut page = self.engine.open_session().await?;
        let mut known = SirenIndex::load(self.store.as_ref())?;
        tracing::info!("Loaded {} known SIRENs", known.len());

        for (dept_index, dept) in IDF_DEPARTMENTS.iter().enumerate() {
            handle.set_message(format!("Crawling Société.com - department {}", dept));
            tracing::info!("Crawling department {}", dept);

            let mut page_num = 1u32;
            let mut has_next = true;

            while has_next && page_num <= MAX_PAGES_PER_DEPARTMENT {
                let (stubs, more) = self
                    .search_page(page.as_mut(), dept, page_num, &mut known, handle)
                    .await;
                has_next = more;

                for stub in stubs {
                    if let Some(new_total) =
                        self.visit_company(page.as_mut(), &stub, &mut known, handle).await
                    {
                        if new_total % COOLDOWN_EVERY == 0 {
                            tracing::info!("Cooling down after {} new companies", new_total);
                            random_delay(30.0, 60.0).await;
                        }
                    }
                }

                page_num += 1;
                handle.set_progress(((dept_index + 1) * 100 / IDF_DEPARTMENTS.len()) as u8);
            }
        }

        let (new, _) = handle.counters();
        Ok(format!("Done: {} new companies", new))
    }

    /// One result-list page: collected stubs plus whether a next page exists.
    /// Navigation failures and challenge pages yield zero results and stop
    /// pagination for the department.
    async fn search_page(
        &self,
        page: &mut dyn BrowserPage,
        department: &str,
        page_num: u32,
        known: &mut SirenIndex,
        handle: &RunHandle,
    ) -> (Vec<CompanyStub>, bool) {
        let url = format!(
            "{}?champs={}&naf={}&page={}",
            SEARCH_URL,
            urlencoding::encode(department),
            urlencoding::encode(NAF_ACCOUNTING),
            page_num
        );
        tracing::info!("Searching department {}, page {}", department, page_num);

        if let Err(e) = page.goto(&url).await {
            tracing::error!("Search navigation failed: {}", e);
            return (Vec::new(), false);
        }
        random_delay(1.0, 3.0).await;

        if page.blocked() {
            tracing::warn!("Challenge detected on department {} page {}", department, page_num);
            return (Vec::new(), false);
        }

        let mut stubs = Vec::new();
        for link in page.links("div#result-list a.txt-no-wrap") {
            if !link.href.contains("/societe/") {
                continue;
            }
            let Some(captures) = self.siren_re.captures(&link.href) else {
                continue;
            };
            let siren = captures[1].to_string();

            if known.contains(&siren) {
                handle.add_skipped(1);
                continue;
            }

            let name = link.text.trim().to_string();
            if name.is_empty() {
                tracing::warn!("Dropping result with empty name: {}", link.href);
                continue;
            }

            stubs.push(CompanyStub {
                siren,
                name,
                url: absolute_url(&link.href),
            });
        }

        let has_next = page.has_link_labelled("Suivant");
        (stubs, has_next)
    }

    /// Dereference one stub to its detail page and store the record.
    /// Returns the run's new-company total when this visit admitted one.
    async fn visit_company(
        &self,
        page: &mut dyn BrowserPage,
        stub: &CompanyStub,
        known: &mut SirenIndex,
        handle: &RunHandle,
    ) -> Option<u64> {
        tracing::info!("Scraping {}", stub.name);
        random_delay(2.0, 5.0).await;

        if let Err(e) = page.goto(&stub.url).await {
            tracing::error!("Detail navigation failed for {}: {}", stub.siren, e);
            return None;
        }

        if page.blocked() {
            tracing::warn!("Challenge on detail page, skipping {}", stub.siren);
            return None;
        }

        let company = self.extract_company(page, stub);

        if !revenue_eligible(company.annual_revenue) {
            return None;
        }

        match self.store.insert(&company) {
            Ok(_) => {
                known.insert(&company.siren);
                handle.add_new(1);
                tracing::info!("New company: {}", company.legal_name);
                let (new, _) = handle.counters();
                Some(new)
            }
            Err(e) => {
                tracing::error!("Failed to store {}: {}", company.siren, e);
                None
            }
        }
    }

    /// Best-effort field extraction: every lookup is independent, a missing
    /// field is null and never blocks the others.
    fn extract_company(&self, page: &dyn BrowserPage, stub: &CompanyStub) -> NewCompany {
        let share_capital = page
            .label_value("Capital social")
            .and_then(|text| capture_number(&self.capital_re, &text));

        let created_on = page
            .label_value("Date création entreprise")
            .and_then(|text| self.parse_creation_date(&text));

        let annual_revenue = page
            .label_value("Chiffre d'affaires")
            .and_then(|text| capture_number(&self.revenue_re, &text));

        let net_income = page
            .label_value("Résultat net")
            .and_then(|text| capture_number(&self.net_income_re, &text));

        let officers = extract_officers(page);
        let primary_officer = officers.first().map(officer_line);

        NewCompany {
            siren: stub.siren.clone(),
            siret_siege: page.label_value("SIRET (siège)"),
            legal_name: stub.name.clone(),
            legal_form: page.label_value("Forme juridique"),
            created_on,
            address: None,
            email: None,
            phone: None,
            vat_number: page.label_value("TVA"),
            annual_revenue,
            net_income,
            headcount: None,
            share_capital,
            naf_code: page.first_text("span.NAF"),
            naf_label: page.label_value("Activité"),
            primary_officer,
            officers,
            status: CompanyStatus::default(),
            source_url: Some(stub.url.clone()),
            last_scraped_at: Utc::now(),
        }
    }

    /// `DD-MM-YYYY` anywhere in the cell text
    fn parse_creation_date(&self, text: &str) -> Option<NaiveDate> {
        let captures = self.date_re.captures(text)?;
        let day = captures[1].parse().ok()?;
        let month = captures[2].parse().ok()?;
        let year = captures[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

fn capture_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text).and_then(|c| clean_numeric(&c[1]))
}

fn extract_officers(page: &dyn BrowserPage) -> Vec<Officer> {
    page.fragments("div.dirigeant")
        .iter()
        .take(MAX_OFFICERS)
        .filter_map(|block| {
            let name = block.first_text("a.nom")?;
            let role = block
                .first_text("span.fonction")
                .unwrap_or_else(|| "Dirigeant".to_string());
            Some(Officer {
                name,
                role: Some(role),
            })
        })
        .collect()
}

fn absolute_url(href: &str) -> String {
    Url::parse(BASE_URL)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("{}{}", BASE_URL, href))
}

async fn random_delay(min_secs: f64, max_secs: f64) {
    let seconds = rand::thread_rng().gen_range(min_secs..=max_secs);
    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
}
