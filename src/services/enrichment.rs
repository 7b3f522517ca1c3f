//! Enrichment Service
//!
//! Re-scores stored companies with the configured scorer. Either one company
//! targeted by SIREN, or every company above the revenue floor that is still
//! unscored or still above the score threshold.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::CompanyStore;
use crate::error::{AppError, Result};
use crate::model::Company;
use crate::scoring::Scorer;

const PAUSE_EVERY: usize = 10;
const PAUSE: Duration = Duration::from_secs(1);

fn default_min_revenue() -> f64 {
    10_000_000.0
}

fn default_min_score() -> f64 {
    70.0
}

/// Selection parameters for one enrichment run
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentParams {
    /// Revenue floor for batch selection
    #[serde(default = "default_min_revenue")]
    pub min_revenue: f64,
    /// Companies already scored below this are left alone
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Target a single company instead of a batch
    #[serde(default)]
    pub siren: Option<String>,
}

impl Default for EnrichmentParams {
    fn default() -> Self {
        Self {
            min_revenue: default_min_revenue(),
            min_score: default_min_score(),
            siren: None,
        }
    }
}

/// Result of one enrichment run
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentReport {
    pub success: bool,
    pub enriched: u64,
    pub processed: u64,
}

/// Scores companies and persists the results
pub struct EnrichmentService {
    store: Arc<dyn CompanyStore>,
    scorer: Arc<dyn Scorer>,
}

impl EnrichmentService {
    pub fn new(store: Arc<dyn CompanyStore>, scorer: Arc<dyn Scorer>) -> Self {
        Self { store, scorer }
    }

    /// Score the selected companies. Persistence failures are logged and
    /// counted out of `enriched`; they never abort the batch.
    pub async fn run(&self, params: EnrichmentParams) -> Result<EnrichmentReport> {
        let targets = self.select(&params)?;
        tracing::info!("Enriching {} companies", targets.len());

        let mut enriched: u64 = 0;
        for (index, company) in targets.iter().enumerate() {
            let breakdown = self.scorer.score(company).await;
            match self
                .store
                .set_score(&company.siren, breakdown.overall_score, &breakdown)
            {
                Ok(()) => {
                    tracing::info!(
                        "Scored {}: {:.1}",
                        company.legal_name,
                        breakdown.overall_score
                    );
                    enriched += 1;
                }
                Err(e) => {
                    tracing::warn!("Could not store score for {}: {}", company.siren, e);
                }
            }

            if (index + 1) % PAUSE_EVERY == 0 && index + 1 < targets.len() {
                tokio::time::sleep(PAUSE).await;
            }
        }

        Ok(EnrichmentReport {
            success: true,
            enriched,
            processed: targets.len() as u64,
        })
    }

    fn select(&self, params: &EnrichmentParams) -> Result<Vec<Company>> {
        match &params.siren {
            Some(siren) => {
                let company = self
                    .store
                    .get(siren)?
                    .ok_or_else(|| AppError::NotFound(format!("No company with SIREN {}", siren)))?;
                Ok(vec![company])
            }
            None => self
                .store
                .list_for_enrichment(params.min_revenue, params.min_score),
        }
    }
}
