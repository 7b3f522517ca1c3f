//! Prospect scoring
//!
//! Two scorers share one output shape: a deterministic heuristic over stored
//! financials, and an AI scorer that falls back to the heuristic. Scoring
//! never fails.

pub mod ai;

pub use ai::AiScorer;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::Company;

pub const ACQUISITION_WEIGHT: f64 = 0.4;
pub const DISPOSAL_WEIGHT: f64 = 0.6;

/// Structured scoring result stored alongside the company
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Attractiveness as an acquisition target, 0..=100
    pub acquisition_score: f64,
    /// Likelihood the owners would sell, 0..=100
    pub disposal_score: f64,
    /// 0.4 x acquisition + 0.6 x disposal
    pub overall_score: f64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub positive_factors: Vec<String>,
    #[serde(default)]
    pub negative_factors: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score a company. Implementations never error; the AI path degrades to
    /// the deterministic result.
    async fn score(&self, company: &Company) -> ScoreBreakdown;
}

/// Deterministic scorer over stored financials
pub struct HeuristicScorer;

#[async_trait]
impl Scorer for HeuristicScorer {
    async fn score(&self, company: &Company) -> ScoreBreakdown {
        heuristic_score(company)
    }
}

/// Weighted adjustments from revenue, margin, headcount, age and capital.
/// Absent fields contribute no adjustment.
pub fn heuristic_score(company: &Company) -> ScoreBreakdown {
    let mut acquisition: f64 = 50.0;
    let mut disposal: f64 = 50.0;
    let mut positive_factors: Vec<String> = Vec::new();
    let mut negative_factors: Vec<String> = Vec::new();

    if let Some(revenue) = company.annual_revenue {
        if revenue > 25_000_000.0 {
            acquisition += 25.0;
            positive_factors.push("Revenue above €25M".to_string());
        } else if revenue > 15_000_000.0 {
            acquisition += 15.0;
            positive_factors.push("Revenue above €15M".to_string());
        } else if revenue < 5_000_000.0 {
            disposal += 20.0;
            negative_factors.push("Revenue below €5M".to_string());
        }

        if let Some(net_income) = company.net_income {
            if revenue > 0.0 && net_income != 0.0 {
                let margin = net_income / revenue * 100.0;
                if margin > 10.0 {
                    acquisition += 15.0;
                    positive_factors.push(format!("Strong net margin ({:.1}%)", margin));
                } else if margin < 2.0 {
                    disposal += 15.0;
                    negative_factors.push(format!("Weak net margin ({:.1}%)", margin));
                }
            }
        }
    }

    if let Some(headcount) = company.headcount {
        if headcount > 70 {
            acquisition += 10.0;
            positive_factors.push("Large workforce".to_string());
        } else if headcount > 0 && headcount < 15 {
            disposal += 10.0;
            negative_factors.push("Small team".to_string());
        }
    }

    if let Some(created_on) = company.created_on {
        let age_years = (Utc::now().date_naive() - created_on).num_days() as f64 / 365.0;
        if age_years > 20.0 {
            acquisition += 5.0;
            positive_factors.push("Established for over 20 years".to_string());
        } else if age_years < 5.0 {
            disposal += 10.0;
            negative_factors.push("Under 5 years old".to_string());
        }
    }

    if let Some(capital) = company.share_capital {
        if capital > 500_000.0 {
            acquisition += 5.0;
            positive_factors.push("Solid share capital".to_string());
        }
    }

    let acquisition = acquisition.clamp(0.0, 100.0);
    let disposal = disposal.clamp(0.0, 100.0);
    let overall = ACQUISITION_WEIGHT * acquisition + DISPOSAL_WEIGHT * disposal;

    let mut recommendations: Vec<String> = Vec::new();
    if overall > 75.0 {
        recommendations.push("Priority contact: strong acquisition profile".to_string());
    } else if overall > 60.0 {
        recommendations.push("Qualify the lead with a first call".to_string());
    }
    if company.email.is_none() && company.phone.is_none() {
        recommendations.push("Find contact details before outreach".to_string());
    }

    ScoreBreakdown {
        acquisition_score: acquisition,
        disposal_score: disposal,
        overall_score: overall,
        rationale: "Automatic scoring from stored financials".to_string(),
        positive_factors,
        negative_factors,
        recommendations,
    }
}
