//! SIREN dedup snapshot and revenue eligibility band

use std::collections::HashSet;

use crate::db::CompanyStore;
use crate::error::Result;

/// Revenue eligibility band for scraped records, bounds inclusive.
/// Bulk CSV import is exempt.
pub const REVENUE_FLOOR: f64 = 3_000_000.0;
pub const REVENUE_CEILING: f64 = 50_000_000.0;

/// A record with no revenue figure stays eligible; a present figure must lie
/// inside the band.
pub fn revenue_eligible(revenue: Option<f64>) -> bool {
    match revenue {
        Some(ca) => (REVENUE_FLOOR..=REVENUE_CEILING).contains(&ca),
        None => true,
    }
}

/// In-memory snapshot of every SIREN already stored, loaded once per run.
///
/// Inserts made by the run itself are added as they happen so a run never
/// re-inserts its own finds. Records admitted by a concurrent run after the
/// snapshot fall through to the store's UNIQUE constraint.
pub struct SirenIndex {
    known: HashSet<String>,
}

impl SirenIndex {
    pub fn load(store: &dyn CompanyStore) -> Result<Self> {
        Ok(Self {
            known: store.known_sirens()?,
        })
    }

    pub fn from_sirens<I, S>(sirens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: sirens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, siren: &str) -> bool {
        self.known.contains(siren)
    }

    pub fn insert(&mut self, siren: &str) {
        self.known.insert(siren.to_string());
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revenue_band_bounds_are_inclusive() {
        assert!(!revenue_eligible(Some(2_999_999.99)));
        assert!(revenue_eligible(Some(3_000_000.0)));
        assert!(revenue_eligible(Some(10_000_000.0)));
        assert!(revenue_eligible(Some(50_000_000.0)));
        assert!(!revenue_eligible(Some(50_000_000.01)));
    }

    #[test]
    fn test_absent_revenue_is_eligible() {
        assert!(revenue_eligible(None));
    }

    #[test]
    fn test_siren_index_tracks_run_inserts() {
        let mut index = SirenIndex::from_sirens(["123456789"]);
        assert!(index.contains("123456789"));
        assert!(!index.contains("987654321"));

        index.insert("987654321");
        assert!(index.contains("987654321"));
        assert_eq!(index.len(), 2);
    }
}
