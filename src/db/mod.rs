//! Record store
//!
//! The ingestion pipeline and services only see the `CompanyStore` trait; the
//! shipped implementation is SQLite.

pub mod sqlite;

use std::collections::HashSet;

pub use sqlite::SqliteDb;

use crate::error::Result;
use crate::model::{ActivityEntry, Company, CompanyFilter, CompanyPatch, NewCompany};
use crate::scoring::ScoreBreakdown;

/// Persistence boundary for canonical company records
pub trait CompanyStore: Send + Sync {
    /// All SIRENs currently stored; dedup snapshots load this once per run
    fn known_sirens(&self) -> Result<HashSet<String>>;

    fn count(&self) -> Result<u64>;

    fn insert(&self, company: &NewCompany) -> Result<()>;

    /// Insert a batch in one transaction. Callers chunk (bulk import uses 50).
    fn insert_batch(&self, companies: &[NewCompany]) -> Result<usize>;

    fn get(&self, siren: &str) -> Result<Option<Company>>;

    /// Filtered listing ordered by prospection score descending, nulls last.
    /// Pagination defaults to limit 100 when either limit or offset is set.
    fn list(&self, filter: &CompanyFilter) -> Result<Vec<Company>>;

    /// Apply a partial workflow update; false when the SIREN is unknown
    fn update(&self, siren: &str, patch: &CompanyPatch) -> Result<bool>;

    /// Overlay re-imported data onto an existing record (bulk import with
    /// update_existing): fields the import carries overwrite, absent fields
    /// and the workflow status keep their stored values; false when the
    /// SIREN is unknown
    fn update_imported(&self, siren: &str, company: &NewCompany) -> Result<bool>;

    fn delete(&self, siren: &str) -> Result<bool>;

    fn set_score(&self, siren: &str, overall: f64, breakdown: &ScoreBreakdown) -> Result<()>;

    /// Enrichment targets: revenue at or above the floor and either unscored
    /// or scored at/above the given score
    fn list_for_enrichment(&self, min_revenue: f64, min_score: f64) -> Result<Vec<Company>>;

    fn activity(&self, siren: &str, limit: u32) -> Result<Vec<ActivityEntry>>;
}
