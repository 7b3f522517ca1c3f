//! Bulk CSV import
//!
//! Decodes the uploaded file under a small encoding ladder, maps free-form
//! column headings onto the canonical record, and loads rows in batches.
//! Scraper eligibility rules do not apply here: bulk files are trusted lists,
//! only identity validation is enforced.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::db::CompanyStore;
use crate::error::{AppError, Result};
use crate::ingest::dedup::SirenIndex;
use crate::ingest::normalize::{clean_date, clean_numeric, normalize_siren};
use crate::model::{CompanyPatch, CompanyStatus, NewCompany};

const INSERT_CHUNK: usize = 50;

/// Outcome of one import call
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub success: bool,
    pub file_name: String,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub total_in_store: u64,
}

/// Canonical columns a CSV heading can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Siren,
    SiretSiege,
    LegalName,
    LegalForm,
    CreatedOn,
    Address,
    Email,
    Phone,
    VatNumber,
    AnnualRevenue,
    NetIncome,
    Headcount,
    ShareCapital,
    NafCode,
    NafLabel,
    PrimaryOfficer,
    Status,
}

/// Alias table applied after trim/lowercase/space→underscore normalization
fn canonical_column(heading: &str) -> Option<Column> {
    let key = heading.trim().to_lowercase().replace(' ', "_");
    match key.as_str() {
        "siren" => Some(Column::Siren),
        "siret" | "siret_siege" => Some(Column::SiretSiege),
        "nom" | "nom_entreprise" | "denomination" | "raison_sociale" => Some(Column::LegalName),
        "forme_juridique" => Some(Column::LegalForm),
        "date_creation" | "date_de_creation" => Some(Column::CreatedOn),
        "adresse" | "adresse_complete" => Some(Column::Address),
        "email" | "mail" => Some(Column::Email),
        "telephone" | "tel" => Some(Column::Phone),
        "numero_tva" | "tva" => Some(Column::VatNumber),
        "ca" | "chiffre_affaires" | "chiffre_d_affaires" => Some(Column::AnnualRevenue),
        "resultat" | "resultat_net" => Some(Column::NetIncome),
        "effectif" | "effectifs" => Some(Column::Headcount),
        "capital" | "capital_social" => Some(Column::ShareCapital),
        "code_naf" | "code_ape" | "naf" => Some(Column::NafCode),
        "activite" | "libelle_naf" => Some(Column::NafLabel),
        "dirigeant" | "dirigeants" | "gerant" | "president" => Some(Column::PrimaryOfficer),
        "statut" | "status" => Some(Column::Status),
        _ => None,
    }
}

/// Bulk loader for tabular company lists
pub struct CsvImporter {
    store: Arc<dyn CompanyStore>,
}

impl CsvImporter {
    pub fn new(store: Arc<dyn CompanyStore>) -> Self {
        Self { store }
    }

    /// Import a whole file. Invalid rows are counted skipped, never fatal;
    /// only an undecodable file or a store failure outside chunk inserts
    /// fails the call.
    pub fn import(
        &self,
        file_name: &str,
        bytes: &[u8],
        update_existing: bool,
    ) -> Result<ImportReport> {
        let text = decode(bytes)?;
        let mut reader = csv::Reader::from_reader(text.as_bytes());

        let columns: Vec<Option<Column>> = reader
            .headers()?
            .iter()
            .map(canonical_column)
            .collect();
        tracing::info!(
            "Importing {}: {} columns recognized",
            file_name,
            columns.iter().flatten().count()
        );

        let known = SirenIndex::load(self.store.as_ref())?;

        let mut to_insert: Vec<NewCompany> = Vec::new();
        let mut to_update: Vec<(NewCompany, Option<CompanyStatus>)> = Vec::new();
        let mut seen_in_file: HashSet<String> = HashSet::new();
        let mut skipped: u64 = 0;

        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Unreadable row: {}", e);
                    skipped += 1;
                    continue;
                }
            };

            let row = RowView {
                columns: &columns,
                record: &record,
            };

            let explicit_status = row.status();
            let Some(company) = row.into_company() else {
                skipped += 1;
                continue;
            };

            // a SIREN repeated within the file is a duplicate in both modes
            if !seen_in_file.insert(company.siren.clone()) {
                skipped += 1;
                continue;
            }

            if known.contains(&company.siren) {
                if update_existing {
                    to_update.push((company, explicit_status));
                } else {
                    skipped += 1;
                }
            } else {
                to_insert.push(company);
            }
        }

        let mut inserted: u64 = 0;
        for chunk in to_insert.chunks(INSERT_CHUNK) {
            match self.store.insert_batch(chunk) {
                Ok(n) => inserted += n as u64,
                Err(e) => {
                    tracing::error!("Batch insert failed ({} rows): {}", chunk.len(), e);
                }
            }
        }

        let mut updated: u64 = 0;
        for (company, explicit_status) in &to_update {
            match self.store.update_imported(&company.siren, company) {
                Ok(true) => {
                    updated += 1;
                    if let Some(status) = explicit_status {
                        self.apply_status(&company.siren, *status);
                    }
                }
                Ok(false) => {
                    tracing::warn!("Update target {} vanished", company.siren);
                }
                Err(e) => {
                    tracing::error!("Update failed for {}: {}", company.siren, e);
                }
            }
        }

        let total_in_store = self.store.count()?;
        tracing::info!(
            "Import {} done: {} inserted, {} updated, {} skipped",
            file_name,
            inserted,
            updated,
            skipped
        );

        Ok(ImportReport {
            success: true,
            file_name: file_name.to_string(),
            inserted,
            updated,
            skipped,
            total_in_store,
        })
    }

    fn apply_status(&self, siren: &str, status: CompanyStatus) {
        let patch = CompanyPatch {
            status: Some(status),
            ..CompanyPatch::default()
        };
        if let Err(e) = self.store.update(siren, &patch) {
            tracing::warn!("Could not set status for {}: {}", siren, e);
        }
    }
}

/// Decode under the encoding ladder: the first encoding that decodes without
/// errors and yields parseable CSV headers wins.
fn decode(bytes: &[u8]) -> Result<String> {
    for encoding in [encoding_rs::UTF_8, encoding_rs::WINDOWS_1252] {
        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            continue;
        }
        let mut probe = csv::Reader::from_reader(text.as_bytes());
        if probe.headers().is_ok() {
            return Ok(text.into_owned());
        }
    }
    Err(AppError::Decode(
        "CSV file could not be decoded".to_string(),
    ))
}

struct RowView<'a> {
    columns: &'a [Option<Column>],
    record: &'a csv::StringRecord,
}

impl RowView<'_> {
    fn text(&self, column: Column) -> Option<String> {
        let index = self
            .columns
            .iter()
            .position(|c| *c == Some(column))?;
        self.record
            .get(index)
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
            .map(str::to_string)
    }

    fn number(&self, column: Column) -> Option<f64> {
        self.text(column).as_deref().and_then(clean_numeric)
    }

    fn status(&self) -> Option<CompanyStatus> {
        self.text(Column::Status)
            .and_then(|s| CompanyStatus::parse(&s.to_lowercase()))
    }

    /// None when the identity fields fail validation
    fn into_company(&self) -> Option<NewCompany> {
        let raw_siren = self.text(Column::Siren)?;
        let Some(siren) = normalize_siren(&raw_siren) else {
            tracing::warn!("Invalid SIREN: {}", raw_siren);
            return None;
        };

        let Some(legal_name) = self.text(Column::LegalName) else {
            tracing::warn!("Missing name for SIREN {}", siren);
            return None;
        };

        let status = self.status().unwrap_or_default();

        Some(NewCompany {
            siren,
            siret_siege: self.text(Column::SiretSiege),
            legal_name,
            legal_form: self.text(Column::LegalForm),
            created_on: self
                .text(Column::CreatedOn)
                .as_deref()
                .and_then(clean_date),
            address: self.text(Column::Address),
            email: self.text(Column::Email),
            phone: self.text(Column::Phone),
            vat_number: self.text(Column::VatNumber),
            annual_revenue: self.number(Column::AnnualRevenue),
            net_income: self.number(Column::NetIncome),
            headcount: self.number(Column::Headcount).map(|h| h as i64),
            share_capital: self.number(Column::ShareCapital),
            naf_code: self.text(Column::NafCode),
            naf_label: self.text(Column::NafLabel),
            primary_officer: self.text(Column::PrimaryOfficer),
            officers: Vec::new(),
            status,
            source_url: None,
            last_scraped_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDb;

    fn importer() -> (CsvImporter, Arc<SqliteDb>) {
        let store = Arc::new(SqliteDb::in_memory().unwrap());
        (CsvImporter::new(store.clone()), store)
    }

    #[test]
    fn test_import_validates_and_counts() {
        let (importer, store) = importer();

        // one good row, one bad SIREN, one missing name
        let csv = "siren,nom,ca\n\
                   732829320,CABINET MARTIN,4000000\n\
                   12345,BAD SIREN,1000\n\
                   851234567,,2000\n";

        let report = importer.import("liste.csv", csv.as_bytes(), false).unwrap();
        assert!(report.success);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.total_in_store, 1);

        let company = store.get("732829320").unwrap().unwrap();
        assert_eq!(company.legal_name, "CABINET MARTIN");
        assert_eq!(company.annual_revenue, Some(4_000_000.0));
        assert_eq!(company.status, CompanyStatus::ToContact);
    }

    #[test]
    fn test_duplicate_rows_route_by_update_flag() {
        let (importer, store) = importer();

        let first = "siren,nom\n111111111,Original name\n";
        importer.import("first.csv", first.as_bytes(), false).unwrap();

        let second = "siren,nom,email\n\
                      111111111,Updated name,new@cabinet.fr\n\
                      222222222,Fresh company,\n";

        // without the flag the duplicate is skipped
        let report = importer.import("second.csv", second.as_bytes(), false).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            store.get("111111111").unwrap().unwrap().legal_name,
            "Original name"
        );

        // with the flag it overwrites the stored record
        let report = importer.import("second.csv", second.as_bytes(), true).unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.updated, 2);
        assert_eq!(report.skipped, 0);

        let company = store.get("111111111").unwrap().unwrap();
        assert_eq!(company.legal_name, "Updated name");
        assert_eq!(company.email.as_deref(), Some("new@cabinet.fr"));
    }

    #[test]
    fn test_update_moves_status_only_when_the_file_carries_one() {
        let (importer, store) = importer();
        importer
            .import("seed.csv", b"siren,nom\n111111111,Cabinet\n", false)
            .unwrap();
        store
            .update(
                "111111111",
                &CompanyPatch {
                    status: Some(CompanyStatus::InNegotiation),
                    ..CompanyPatch::default()
                },
            )
            .unwrap();

        // no statut column: the curated status survives
        importer
            .import("notes.csv", b"siren,nom,email\n111111111,Cabinet,c@c.fr\n", true)
            .unwrap();
        assert_eq!(
            store.get("111111111").unwrap().unwrap().status,
            CompanyStatus::InNegotiation
        );

        // an explicit statut moves it
        importer
            .import(
                "statuts.csv",
                b"siren,nom,statut\n111111111,Cabinet,abandoned\n",
                true,
            )
            .unwrap();
        assert_eq!(
            store.get("111111111").unwrap().unwrap().status,
            CompanyStatus::Abandoned
        );
    }

    #[test]
    fn test_three_row_file_under_both_modes() {
        let rows = "siren,nom\n\
                    732829320,Nouveau cabinet\n\
                    111111111,Cabinet connu\n\
                    12345,Cabinet invalide\n";

        for (update_existing, expected) in [(false, (1, 0, 2)), (true, (1, 1, 1))] {
            let (importer, _store) = importer();
            importer
                .import("seed.csv", b"siren,nom\n111111111,Cabinet connu\n", false)
                .unwrap();

            let report = importer.import("trois.csv", rows.as_bytes(), update_existing).unwrap();
            assert_eq!(
                (report.inserted, report.updated, report.skipped),
                expected,
                "update_existing={}",
                update_existing
            );
        }
    }

    #[test]
    fn test_repeated_new_siren_within_file_is_skipped() {
        let csv = "siren,nom\n\
                   111111111,First occurrence\n\
                   111111111,Second occurrence\n";

        // the update flag must not reroute an in-file repeat onto the row
        // the same import just inserted
        for update_existing in [false, true] {
            let (importer, store) = importer();

            let report = importer.import("dups.csv", csv.as_bytes(), update_existing).unwrap();
            assert_eq!(report.inserted, 1, "update_existing={}", update_existing);
            assert_eq!(report.updated, 0, "update_existing={}", update_existing);
            assert_eq!(report.skipped, 1, "update_existing={}", update_existing);
            assert_eq!(
                store.get("111111111").unwrap().unwrap().legal_name,
                "First occurrence"
            );
        }
    }

    #[test]
    fn test_stored_siren_repeated_in_file_updates_once() {
        let (importer, store) = importer();
        importer
            .import("seed.csv", b"siren,nom\n111111111,Stored name\n", false)
            .unwrap();

        let csv = "siren,nom\n\
                   111111111,First update\n\
                   111111111,Second update\n";

        let report = importer.import("dups.csv", csv.as_bytes(), true).unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            store.get("111111111").unwrap().unwrap().legal_name,
            "First update"
        );
    }

    #[test]
    fn test_windows_1252_fallback() {
        let (importer, store) = importer();

        // "Société Générale Comptabilité" with é as 0xE9, invalid UTF-8
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"siren,nom\n732829320,Soci");
        bytes.push(0xE9);
        bytes.extend_from_slice(b"t");
        bytes.push(0xE9);
        bytes.extend_from_slice(b" Martin\n");

        let report = importer.import("latin.csv", &bytes, false).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(
            store.get("732829320").unwrap().unwrap().legal_name,
            "Société Martin"
        );
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let (importer, store) = importer();

        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("siren,nom\n732829320,Cabinet à Paris\n".as_bytes());

        let report = importer.import("bom.csv", &bytes, false).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(
            store.get("732829320").unwrap().unwrap().legal_name,
            "Cabinet à Paris"
        );
    }

    #[test]
    fn test_header_aliases_and_coercions() {
        let (importer, store) = importer();

        let csv = "SIREN,Raison Sociale,Chiffre d affaires,Date Creation,Gerant,Effectif,Statut\n\
                   732829320,FIDU PLUS,\"3 500 000 €\",17/05/2003,Marie Dupont,25,in discussion\n";

        importer.import("alias.csv", csv.as_bytes(), false).unwrap();

        let company = store.get("732829320").unwrap().unwrap();
        assert_eq!(company.legal_name, "FIDU PLUS");
        assert_eq!(company.annual_revenue, Some(3_500_000.0));
        assert_eq!(
            company.created_on,
            chrono::NaiveDate::from_ymd_opt(2003, 5, 17)
        );
        assert_eq!(company.primary_officer.as_deref(), Some("Marie Dupont"));
        assert_eq!(company.headcount, Some(25));
        assert_eq!(company.status, CompanyStatus::InDiscussion);
    }

    #[test]
    fn test_no_revenue_band_for_bulk_import() {
        let (importer, store) = importer();

        let csv = "siren,nom,ca\n\
                   111111111,Tiny,100000\n\
                   222222222,Huge,90000000\n";

        let report = importer.import("band.csv", csv.as_bytes(), false).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_batches_of_fifty() {
        let (importer, store) = importer();

        let mut csv = String::from("siren,nom\n");
        for i in 0..120 {
            csv.push_str(&format!("{:09},Cabinet {}\n", 100_000_000 + i, i));
        }

        let report = importer.import("big.csv", csv.as_bytes(), false).unwrap();
        assert_eq!(report.inserted, 120);
        assert_eq!(store.count().unwrap(), 120);
    }
}
