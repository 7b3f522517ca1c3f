//! SQLite database module

mod activity;
mod companies;
mod migrations;

use std::collections::HashSet;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::db::CompanyStore;
use crate::error::Result;
use crate::model::{ActivityEntry, Company, CompanyFilter, CompanyPatch, NewCompany};
use crate::scoring::ScoreBreakdown;

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Create new SQLite database connection
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// In-memory database, used by tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }
}

impl CompanyStore for SqliteDb {
    fn known_sirens(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock();
        companies::known_sirens(&conn)
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        companies::count(&conn)
    }

    fn insert(&self, company: &NewCompany) -> Result<()> {
        let conn = self.conn.lock();
        companies::insert(&conn, company)
    }

    fn insert_batch(&self, batch: &[NewCompany]) -> Result<usize> {
        let mut conn = self.conn.lock();
        companies::insert_batch(&mut conn, batch)
    }

    fn get(&self, siren: &str) -> Result<Option<Company>> {
        let conn = self.conn.lock();
        companies::get(&conn, siren)
    }

    fn list(&self, filter: &CompanyFilter) -> Result<Vec<Company>> {
        let conn = self.conn.lock();
        companies::list(&conn, filter)
    }

    fn update(&self, siren: &str, patch: &CompanyPatch) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = companies::update_patch(&conn, siren, patch)?;
        if updated {
            if let Err(e) = activity::log_activity(&conn, siren, "update", None) {
                tracing::warn!("Failed to log update activity for {}: {}", siren, e);
            }
        }
        Ok(updated)
    }

    fn update_imported(&self, siren: &str, company: &NewCompany) -> Result<bool> {
        let conn = self.conn.lock();
        companies::update_imported(&conn, siren, company)
    }

    fn delete(&self, siren: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = companies::delete(&conn, siren)?;
        if deleted {
            if let Err(e) = activity::log_activity(&conn, siren, "delete", None) {
                tracing::warn!("Failed to log delete activity for {}: {}", siren, e);
            }
        }
        Ok(deleted)
    }

    fn set_score(&self, siren: &str, overall: f64, breakdown: &ScoreBreakdown) -> Result<()> {
        let conn = self.conn.lock();
        companies::set_score(&conn, siren, overall, breakdown)
    }

    fn list_for_enrichment(&self, min_revenue: f64, min_score: f64) -> Result<Vec<Company>> {
        let conn = self.conn.lock();
        companies::list_for_enrichment(&conn, min_revenue, min_score)
    }

    fn activity(&self, siren: &str, limit: u32) -> Result<Vec<ActivityEntry>> {
        let conn = self.conn.lock();
        activity::list_activity(&conn, siren, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompanyStatus;
    use chrono::Utc;

    fn sample(siren: &str, name: &str) -> NewCompany {
        NewCompany {
            siren: siren.to_string(),
            siret_siege: Some(format!("{}00012", siren)),
            legal_name: name.to_string(),
            legal_form: Some("SARL".to_string()),
            created_on: crate::ingest::normalize::clean_date("2005-03-15"),
            address: Some("12 rue de la Paix, 75002 Paris".to_string()),
            email: Some("contact@cabinet.fr".to_string()),
            phone: Some("+33 1 40 00 00 00".to_string()),
            vat_number: Some(format!("FR00{}", siren)),
            annual_revenue: Some(8_000_000.0),
            net_income: Some(600_000.0),
            headcount: Some(40),
            share_capital: Some(100_000.0),
            naf_code: Some("6920Z".to_string()),
            naf_label: Some("Activités comptables".to_string()),
            primary_officer: Some("Marie Dupont (Gérant)".to_string()),
            officers: vec![crate::model::Officer {
                name: "Marie Dupont".to_string(),
                role: Some("Gérant".to_string()),
            }],
            status: CompanyStatus::ToContact,
            source_url: Some(format!("https://www.pappers.fr/entreprise/{}", siren)),
            last_scraped_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let db = SqliteDb::in_memory().unwrap();
        db.insert(&sample("732829320", "Cabinet Martin")).unwrap();

        let company = db.get("732829320").unwrap().unwrap();
        assert_eq!(company.legal_name, "Cabinet Martin");
        assert_eq!(company.annual_revenue, Some(8_000_000.0));
        assert_eq!(company.headcount, Some(40));
        assert_eq!(company.status, CompanyStatus::ToContact);
        assert_eq!(company.officers.len(), 1);
        assert_eq!(company.officers[0].name, "Marie Dupont");
        assert_eq!(company.created_on.map(|d| d.to_string()), Some("2005-03-15".to_string()));
        assert!(company.prospection_score.is_none());

        assert!(db.get("999999999").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_siren_insert_fails() {
        let db = SqliteDb::in_memory().unwrap();
        db.insert(&sample("732829320", "Cabinet Martin")).unwrap();
        assert!(db.insert(&sample("732829320", "Cabinet Clone")).is_err());
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_known_sirens_snapshot() {
        let db = SqliteDb::in_memory().unwrap();
        db.insert(&sample("111111111", "A")).unwrap();
        db.insert(&sample("222222222", "B")).unwrap();

        let sirens = db.known_sirens().unwrap();
        assert_eq!(sirens.len(), 2);
        assert!(sirens.contains("111111111"));
        assert!(sirens.contains("222222222"));
    }

    #[test]
    fn test_insert_batch_is_transactional() {
        let db = SqliteDb::in_memory().unwrap();
        db.insert(&sample("333333333", "Existing")).unwrap();

        // second record collides, the whole chunk rolls back
        let batch = vec![sample("444444444", "New"), sample("333333333", "Dup")];
        assert!(db.insert_batch(&batch).is_err());
        assert_eq!(db.count().unwrap(), 1);

        let clean = vec![sample("444444444", "New"), sample("555555555", "Also new")];
        assert_eq!(db.insert_batch(&clean).unwrap(), 2);
        assert_eq!(db.count().unwrap(), 3);
    }

    #[test]
    fn test_list_filters_and_ordering() {
        let db = SqliteDb::in_memory().unwrap();
        let mut a = sample("111111111", "Cabinet Alpha");
        a.annual_revenue = Some(4_000_000.0);
        let mut b = sample("222222222", "Cabinet Beta");
        b.annual_revenue = Some(20_000_000.0);
        let mut c = sample("333333333", "Fiduciaire Gamma");
        c.annual_revenue = Some(30_000_000.0);
        db.insert(&a).unwrap();
        db.insert(&b).unwrap();
        db.insert(&c).unwrap();

        let breakdown = ScoreBreakdown::default();
        db.set_score("222222222", 80.0, &breakdown).unwrap();
        db.set_score("111111111", 60.0, &breakdown).unwrap();

        // scored rows first, descending, unscored last
        let all = db.list(&CompanyFilter::default()).unwrap();
        let sirens: Vec<&str> = all.iter().map(|c| c.siren.as_str()).collect();
        assert_eq!(sirens, vec!["222222222", "111111111", "333333333"]);

        let rich = db
            .list(&CompanyFilter {
                min_revenue: Some(10_000_000.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rich.len(), 2);

        let named = db
            .list(&CompanyFilter {
                search: Some("Fiduciaire".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].siren, "333333333");

        let paged = db
            .list(&CompanyFilter {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].siren, "111111111");
    }

    #[test]
    fn test_update_patch_and_activity_trail() {
        let db = SqliteDb::in_memory().unwrap();
        db.insert(&sample("732829320", "Cabinet Martin")).unwrap();

        let patch = CompanyPatch {
            status: Some(CompanyStatus::InDiscussion),
            email: Some("direction@cabinet.fr".to_string()),
            ..Default::default()
        };
        assert!(db.update("732829320", &patch).unwrap());
        assert!(!db.update("999999999", &patch).unwrap());

        let company = db.get("732829320").unwrap().unwrap();
        assert_eq!(company.status, CompanyStatus::InDiscussion);
        assert_eq!(company.email.as_deref(), Some("direction@cabinet.fr"));

        let trail = db.activity("732829320", 10).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "update");
    }

    #[test]
    fn test_update_imported_overlays_present_fields() {
        let db = SqliteDb::in_memory().unwrap();
        db.insert(&sample("732829320", "Cabinet Martin")).unwrap();
        db.update(
            "732829320",
            &CompanyPatch {
                status: Some(CompanyStatus::InNegotiation),
                ..CompanyPatch::default()
            },
        )
        .unwrap();

        // a sparse re-import: only name and revenue carried
        let mut fresh = sample("732829320", "Cabinet Martin & Associés");
        fresh.annual_revenue = Some(12_000_000.0);
        fresh.email = None;
        fresh.officers = Vec::new();
        assert!(db.update_imported("732829320", &fresh).unwrap());

        let company = db.get("732829320").unwrap().unwrap();
        assert_eq!(company.legal_name, "Cabinet Martin & Associés");
        assert_eq!(company.annual_revenue, Some(12_000_000.0));
        // absent fields and workflow state survive the re-import
        assert_eq!(company.email.as_deref(), Some("contact@cabinet.fr"));
        assert_eq!(company.officers.len(), 1);
        assert_eq!(company.status, CompanyStatus::InNegotiation);

        assert!(!db.update_imported("999999999", &fresh).unwrap());
    }

    #[test]
    fn test_delete_logs_activity() {
        let db = SqliteDb::in_memory().unwrap();
        db.insert(&sample("732829320", "Cabinet Martin")).unwrap();

        assert!(db.delete("732829320").unwrap());
        assert!(db.get("732829320").unwrap().is_none());
        assert!(!db.delete("732829320").unwrap());

        let trail = db.activity("732829320", 10).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "delete");
    }

    #[test]
    fn test_list_for_enrichment_selects_unscored_and_high_scored() {
        let db = SqliteDb::in_memory().unwrap();
        let mut unscored = sample("111111111", "Unscored");
        unscored.annual_revenue = Some(15_000_000.0);
        let mut low = sample("222222222", "Low score");
        low.annual_revenue = Some(15_000_000.0);
        let mut high = sample("333333333", "High score");
        high.annual_revenue = Some(15_000_000.0);
        let mut poor = sample("444444444", "Below revenue floor");
        poor.annual_revenue = Some(1_000_000.0);
        for company in [&unscored, &low, &high, &poor] {
            db.insert(company).unwrap();
        }
        let breakdown = ScoreBreakdown::default();
        db.set_score("222222222", 40.0, &breakdown).unwrap();
        db.set_score("333333333", 90.0, &breakdown).unwrap();

        let targets = db.list_for_enrichment(10_000_000.0, 70.0).unwrap();
        let sirens: Vec<&str> = targets.iter().map(|c| c.siren.as_str()).collect();
        assert!(sirens.contains(&"111111111"));
        assert!(sirens.contains(&"333333333"));
        assert!(!sirens.contains(&"222222222"));
        assert!(!sirens.contains(&"444444444"));
    }

    #[test]
    fn test_set_score_round_trips_breakdown() {
        let db = SqliteDb::in_memory().unwrap();
        db.insert(&sample("732829320", "Cabinet Martin")).unwrap();

        let breakdown = ScoreBreakdown {
            acquisition_score: 95.0,
            disposal_score: 50.0,
            overall_score: 68.0,
            rationale: "Revenue €8.0M, 40 employees".to_string(),
            positive_factors: vec!["Revenue above €15M".to_string()],
            negative_factors: vec![],
            recommendations: vec!["Qualify the lead".to_string()],
        };
        db.set_score("732829320", breakdown.overall_score, &breakdown).unwrap();

        let company = db.get("732829320").unwrap().unwrap();
        assert_eq!(company.prospection_score, Some(68.0));
        let stored = company.score_breakdown.unwrap();
        assert_eq!(stored.acquisition_score, 95.0);
        assert_eq!(stored.positive_factors, vec!["Revenue above €15M".to_string()]);

        assert!(db
            .set_score("999999999", 50.0, &ScoreBreakdown::default())
            .is_err());
    }
}
