//! Canonical company record and related domain types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::ScoreBreakdown;

/// Pipeline workflow status of a prospect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyStatus {
    #[serde(rename = "to contact")]
    ToContact,
    #[serde(rename = "in discussion")]
    InDiscussion,
    #[serde(rename = "in negotiation")]
    InNegotiation,
    #[serde(rename = "deal signed")]
    DealSigned,
    #[serde(rename = "abandoned")]
    Abandoned,
}

impl CompanyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyStatus::ToContact => "to contact",
            CompanyStatus::InDiscussion => "in discussion",
            CompanyStatus::InNegotiation => "in negotiation",
            CompanyStatus::DealSigned => "deal signed",
            CompanyStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "to contact" => Some(CompanyStatus::ToContact),
            "in discussion" => Some(CompanyStatus::InDiscussion),
            "in negotiation" => Some(CompanyStatus::InNegotiation),
            "deal signed" => Some(CompanyStatus::DealSigned),
            "abandoned" => Some(CompanyStatus::Abandoned),
            _ => None,
        }
    }
}

impl Default for CompanyStatus {
    fn default() -> Self {
        CompanyStatus::ToContact
    }
}

impl std::fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Company officer (dirigeant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Officer {
    pub name: String,
    pub role: Option<String>,
}

/// Insertable company record produced by normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompany {
    pub siren: String,
    pub siret_siege: Option<String>,
    pub legal_name: String,
    pub legal_form: Option<String>,
    pub created_on: Option<NaiveDate>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub vat_number: Option<String>,
    pub annual_revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub headcount: Option<i64>,
    pub share_capital: Option<f64>,
    pub naf_code: Option<String>,
    pub naf_label: Option<String>,
    pub primary_officer: Option<String>,
    pub officers: Vec<Officer>,
    pub status: CompanyStatus,
    pub source_url: Option<String>,
    pub last_scraped_at: DateTime<Utc>,
}

/// Stored company record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub siren: String,
    pub siret_siege: Option<String>,
    pub legal_name: String,
    pub legal_form: Option<String>,
    pub created_on: Option<NaiveDate>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub vat_number: Option<String>,
    pub annual_revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub headcount: Option<i64>,
    pub share_capital: Option<f64>,
    pub naf_code: Option<String>,
    pub naf_label: Option<String>,
    pub primary_officer: Option<String>,
    pub officers: Vec<Officer>,
    pub status: CompanyStatus,
    pub source_url: Option<String>,
    pub prospection_score: Option<f64>,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub last_scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial workflow update applied to a stored company
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyPatch {
    pub legal_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub status: Option<CompanyStatus>,
    pub headcount: Option<i64>,
    pub share_capital: Option<f64>,
}

impl CompanyPatch {
    pub fn is_empty(&self) -> bool {
        self.legal_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.status.is_none()
            && self.headcount.is_none()
            && self.share_capital.is_none()
    }
}

/// List query over stored companies
#[derive(Debug, Clone, Default)]
pub struct CompanyFilter {
    pub min_revenue: Option<f64>,
    pub status: Option<CompanyStatus>,
    /// Substring match on the address line
    pub city: Option<String>,
    /// Substring match on legal name or SIREN
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Activity trail entry attached to a company
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub siren: String,
    pub action: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
