//! Pappers API source adapter
//!
//! Walks the paginated company search one NAF × department pair at a time,
//! enriches each hit through the detail endpoint, then normalizes and stores
//! what the dedup and revenue filters admit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::db::CompanyStore;
use crate::error::{AppError, Result};
use crate::ingest::dedup::{revenue_eligible, SirenIndex};
use crate::ingest::normalize::{
    clean_date, flexible_number, format_address, normalize_siren, officer_line, InvalidRecord,
};
use crate::model::{CompanyStatus, NewCompany, Officer};
use crate::sources::{IDF_DEPARTMENTS, NAF_ACCOUNTING};
use crate::status::RunHandle;

const BASE_URL: &str = "https://api.pappers.fr/v2";
const PER_PAGE: u32 = 100;
const MIN_REVENUE_FILTER: u64 = 3_000_000;
const INTER_PAGE_DELAY: Duration = Duration::from_millis(500);

/// Pappers REST endpoints used by an ingestion run
#[async_trait]
pub trait PappersApi: Send + Sync {
    /// One page of `/recherche` results for a NAF × department pair
    async fn search(&self, naf: &str, department: &str, page: u32) -> Result<SearchPage>;

    /// Full `/entreprise` record for one SIREN
    async fn company_details(&self, siren: &str) -> Result<PappersCompany>;
}

/// One page of search results
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default, rename = "resultats")]
    pub results: Vec<PappersCompany>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page", rename = "par_page")]
    pub per_page: u64,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u64 {
    100
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PappersOfficer {
    pub prenom: Option<String>,
    pub nom: Option<String>,
    pub qualite: Option<String>,
}

impl PappersOfficer {
    fn full_name(&self) -> Option<String> {
        let name = format!(
            "{} {}",
            self.prenom.as_deref().unwrap_or(""),
            self.nom.as_deref().unwrap_or("")
        )
        .trim()
        .to_string();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// Raw company record in the Pappers wire shape.
///
/// Both `/recherche` results and `/entreprise` responses deserialize into it;
/// numeric fields tolerate number-or-string payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PappersCompany {
    pub siren: Option<String>,
    pub siret_siege: Option<String>,
    pub nom_entreprise: Option<String>,
    pub forme_juridique: Option<String>,
    pub date_creation: Option<String>,
    pub adresse_ligne_1: Option<String>,
    pub code_postal: Option<String>,
    pub ville: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
    pub numero_tva_intracommunautaire: Option<String>,
    #[serde(default, deserialize_with = "flexible_number")]
    pub chiffre_affaires: Option<f64>,
    #[serde(default, deserialize_with = "flexible_number")]
    pub resultat: Option<f64>,
    #[serde(default, deserialize_with = "flexible_number")]
    pub effectif: Option<f64>,
    #[serde(default, deserialize_with = "flexible_number")]
    pub capital: Option<f64>,
    pub code_naf: Option<String>,
    pub libelle_code_naf: Option<String>,
    #[serde(default)]
    pub representants: Vec<PappersOfficer>,
}

impl PappersCompany {
    /// Overlay a detail response onto this search record.
    ///
    /// A detail field wins whenever it carries a value; the officer list is
    /// replaced when the detail one is non-empty.
    pub fn merged_with(self, detail: PappersCompany) -> PappersCompany {
        PappersCompany {
            siren: detail.siren.or(self.siren),
            siret_siege: detail.siret_siege.or(self.siret_siege),
            nom_entreprise: detail.nom_entreprise.or(self.nom_entreprise),
            forme_juridique: detail.forme_juridique.or(self.forme_juridique),
            date_creation: detail.date_creation.or(self.date_creation),
            adresse_ligne_1: detail.adresse_ligne_1.or(self.adresse_ligne_1),
            code_postal: detail.code_postal.or(self.code_postal),
            ville: detail.ville.or(self.ville),
            email: detail.email.or(self.email),
            telephone: detail.telephone.or(self.telephone),
            numero_tva_intracommunautaire: detail
                .numero_tva_intracommunautaire
                .or(self.numero_tva_intracommunautaire),
            chiffre_affaires: detail.chiffre_affaires.or(self.chiffre_affaires),
            resultat: detail.resultat.or(self.resultat),
            effectif: detail.effectif.or(self.effectif),
            capital: detail.capital.or(self.capital),
            code_naf: detail.code_naf.or(self.code_naf),
            libelle_code_naf: detail.libelle_code_naf.or(self.libelle_code_naf),
            representants: if detail.representants.is_empty() {
                self.representants
            } else {
                detail.representants
            },
        }
    }

    /// Normalize into the canonical record shape
    pub fn into_company(
        self,
        now: DateTime<Utc>,
    ) -> std::result::Result<NewCompany, InvalidRecord> {
        let siren = self
            .siren
            .as_deref()
            .and_then(normalize_siren)
            .ok_or_else(|| InvalidRecord::new("missing or malformed SIREN"))?;

        let legal_name = self
            .nom_entreprise
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| InvalidRecord::new("missing company name"))?;

        let address = format_address(
            self.adresse_ligne_1.as_deref(),
            self.code_postal.as_deref(),
            self.ville.as_deref(),
        );

        let officers: Vec<Officer> = self
            .representants
            .iter()
            .filter_map(|rep| {
                rep.full_name().map(|name| Officer {
                    name,
                    role: rep
                        .qualite
                        .clone()
                        .map(|q| q.trim().to_string())
                        .filter(|q| !q.is_empty()),
                })
            })
            .collect();
        let primary_officer = officers.first().map(officer_line);

        let source_url = Some(format!("https://www.pappers.fr/entreprise/{}", siren));

        Ok(NewCompany {
            siren,
            siret_siege: non_empty(self.siret_siege),
            legal_name,
            legal_form: non_empty(self.forme_juridique),
            created_on: self.date_creation.as_deref().and_then(clean_date),
            address,
            email: non_empty(self.email),
            phone: non_empty(self.telephone),
            vat_number: non_empty(self.numero_tva_intracommunautaire),
            annual_revenue: self.chiffre_affaires,
            net_income: self.resultat,
            headcount: self.effectif.map(|e| e as i64),
            share_capital: self.capital,
            naf_code: non_empty(self.code_naf),
            naf_label: non_empty(self.libelle_code_naf),
            primary_officer,
            officers,
            status: CompanyStatus::default(),
            source_url,
            last_scraped_at: now,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// HTTP client for the public Pappers API
pub struct PappersHttpClient {
    client: Client,
    api_token: String,
}

impl PappersHttpClient {
    pub fn new(api_token: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            api_token,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Source(format!(
                "Pappers API returned {}: {}",
                status, body
            )));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PappersApi for PappersHttpClient {
    async fn search(&self, naf: &str, department: &str, page: u32) -> Result<SearchPage> {
        let query = [
            ("api_token", self.api_token.clone()),
            ("code_naf", naf.to_string()),
            ("departement", department.to_string()),
            ("page", page.to_string()),
            ("par_page", PER_PAGE.to_string()),
            ("precision", "standard".to_string()),
            ("entreprise_cessee", "false".to_string()),
            ("chiffre_affaires_min", MIN_REVENUE_FILTER.to_string()),
        ];

        self.get_json(&format!("{}/recherche", BASE_URL), &query).await
    }

    async fn company_details(&self, siren: &str) -> Result<PappersCompany> {
        let query = [
            ("api_token", self.api_token.clone()),
            ("siren", siren.to_string()),
        ];

        self.get_json(&format!("{}/entreprise", BASE_URL), &query).await
    }
}

/// Ingestion run over the Pappers API
pub struct PappersIngest {
    api: Arc<dyn PappersApi>,
    store: Arc<dyn CompanyStore>,
}

impl PappersIngest {
    pub fn new(api: Arc<dyn PappersApi>, store: Arc<dyn CompanyStore>) -> Self {
        Self { api, store }
    }

    /// Walk the full enumeration space. Returns the final status message.
    ///
    /// Quota exhaustion is fatal; any other page-level error abandons the
    /// current NAF × department pair and advances to the next.
    pub async fn run(&self, handle: &RunHandle) -> Result<String> {
        let mut known = SirenIndex::load(self.store.as_ref())?;
        tracing::info!("Loaded {} known SIRENs", known.len());

        for naf in [NAF_ACCOUNTING] {
            for (dept_index, dept) in IDF_DEPARTMENTS.iter().enumerate() {
                handle.set_message(format!("Searching {} - department {}", naf, dept));
                handle.set_progress((dept_index * 100 / IDF_DEPARTMENTS.len()) as u8);
                tracing::info!("Searching NAF {} in department {}", naf, dept);

                let mut page = 1u32;
                loop {
                    let search = match self.api.search(naf, dept, page).await {
                        Ok(search) => search,
                        Err(e) => {
                            tracing::error!(
                                "Search failed for NAF {} department {}: {}",
                                naf,
                                dept,
                                e
                            );
                            if e.to_string().to_lowercase().contains("quota") {
                                return Err(AppError::Source("API quota reached".to_string()));
                            }
                            break;
                        }
                    };

                    let total = search.total;
                    let per_page = search.per_page;

                    for record in search.results {
                        self.process_record(record, &mut known, handle).await;
                    }

                    if u64::from(page) * per_page >= total {
                        break;
                    }
                    page += 1;
                    tokio::time::sleep(INTER_PAGE_DELAY).await;
                }
            }
        }

        let (new, _) = handle.counters();
        Ok(format!("Done: {} new companies", new))
    }

    async fn process_record(
        &self,
        record: PappersCompany,
        known: &mut SirenIndex,
        handle: &RunHandle,
    ) {
        // Enrich through the detail endpoint before normalizing
        let record = match record.siren.clone().filter(|s| !s.is_empty()) {
            Some(siren) => match self.api.company_details(&siren).await {
                Ok(detail) => record.merged_with(detail),
                Err(e) => {
                    tracing::warn!("Detail fetch failed for SIREN {}: {}", siren, e);
                    record
                }
            },
            None => record,
        };

        let company = match record.into_company(Utc::now()) {
            Ok(company) => company,
            Err(reason) => {
                tracing::warn!("Dropping record: {}", reason);
                return;
            }
        };

        if known.contains(&company.siren) {
            handle.add_skipped(1);
            return;
        }

        if !revenue_eligible(company.annual_revenue) {
            return;
        }

        match self.store.insert(&company) {
            Ok(_) => {
                known.insert(&company.siren);
                handle.add_new(1);
                tracing::info!("New company: {}", company.legal_name);
            }
            Err(e) => {
                tracing::error!("Failed to store {}: {}", company.siren, e);
            }
        }
    }
}
