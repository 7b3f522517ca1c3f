//! Company table queries

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};

use crate::error::{AppError, Result};
use crate::model::{Company, CompanyFilter, CompanyPatch, CompanyStatus, NewCompany};
use crate::scoring::ScoreBreakdown;

const COMPANY_COLUMNS: &str = "id, siren, siret_siege, legal_name, legal_form, created_on, \
     address, email, phone, vat_number, annual_revenue, net_income, headcount, share_capital, \
     naf_code, naf_label, primary_officer, officers, status, source_url, prospection_score, \
     score_breakdown, last_scraped_at, created_at, updated_at";

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    // sqlite datetime('now') default
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    Utc::now()
}

fn map_company(row: &rusqlite::Row<'_>) -> rusqlite::Result<Company> {
    let created_on: Option<String> = row.get(5)?;
    let officers_json: String = row.get(17)?;
    let status_raw: String = row.get(18)?;
    let breakdown_json: Option<String> = row.get(21)?;
    let last_scraped_at: String = row.get(22)?;
    let created_at: String = row.get(23)?;
    let updated_at: String = row.get(24)?;

    Ok(Company {
        id: row.get(0)?,
        siren: row.get(1)?,
        siret_siege: row.get(2)?,
        legal_name: row.get(3)?,
        legal_form: row.get(4)?,
        created_on: created_on
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
        address: row.get(6)?,
        email: row.get(7)?,
        phone: row.get(8)?,
        vat_number: row.get(9)?,
        annual_revenue: row.get(10)?,
        net_income: row.get(11)?,
        headcount: row.get(12)?,
        share_capital: row.get(13)?,
        naf_code: row.get(14)?,
        naf_label: row.get(15)?,
        primary_officer: row.get(16)?,
        officers: serde_json::from_str(&officers_json).unwrap_or_default(),
        status: CompanyStatus::parse(&status_raw).unwrap_or_default(),
        source_url: row.get(19)?,
        prospection_score: row.get(20)?,
        score_breakdown: breakdown_json.as_deref().and_then(|s| serde_json::from_str(s).ok()),
        last_scraped_at: parse_timestamp(&last_scraped_at),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

const INSERT_SQL: &str = "INSERT INTO companies (siren, siret_siege, legal_name, legal_form, \
     created_on, address, email, phone, vat_number, annual_revenue, net_income, headcount, \
     share_capital, naf_code, naf_label, primary_officer, officers, status, source_url, \
     last_scraped_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)";

/// Insert a single company
pub fn insert(conn: &Connection, company: &NewCompany) -> Result<()> {
    let officers = serde_json::to_string(&company.officers)?;
    conn.execute(
        INSERT_SQL,
        params![
            company.siren,
            company.siret_siege,
            company.legal_name,
            company.legal_form,
            company.created_on.map(|d| d.to_string()),
            company.address,
            company.email,
            company.phone,
            company.vat_number,
            company.annual_revenue,
            company.net_income,
            company.headcount,
            company.share_capital,
            company.naf_code,
            company.naf_label,
            company.primary_officer,
            officers,
            company.status.as_str(),
            company.source_url,
            company.last_scraped_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Insert a batch of companies in one transaction (prepared statement reuse)
pub fn insert_batch(conn: &mut Connection, companies: &[NewCompany]) -> Result<usize> {
    let tx = conn.transaction()?;

    {
        let mut stmt = tx.prepare(INSERT_SQL)?;
        for company in companies {
            let officers = serde_json::to_string(&company.officers)?;
            stmt.execute(params![
                company.siren,
                company.siret_siege,
                company.legal_name,
                company.legal_form,
                company.created_on.map(|d| d.to_string()),
                company.address,
                company.email,
                company.phone,
                company.vat_number,
                company.annual_revenue,
                company.net_income,
                company.headcount,
                company.share_capital,
                company.naf_code,
                company.naf_label,
                company.primary_officer,
                officers,
                company.status.as_str(),
                company.source_url,
                company.last_scraped_at.to_rfc3339(),
            ])?;
        }
    }

    tx.commit()?;
    Ok(companies.len())
}

/// All stored SIRENs (dedup snapshot source)
pub fn known_sirens(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT siren FROM companies")?;
    let sirens = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(sirens)
}

pub fn count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM companies", [], |row| row.get(0))?;
    Ok(count as u64)
}

pub fn get(conn: &Connection, siren: &str) -> Result<Option<Company>> {
    let sql = format!("SELECT {} FROM companies WHERE siren = ?1", COMPANY_COLUMNS);
    let company = conn
        .query_row(&sql, params![siren], map_company)
        .optional()?;
    Ok(company)
}

/// Filtered listing ordered by prospection score descending, nulls last
pub fn list(conn: &Connection, filter: &CompanyFilter) -> Result<Vec<Company>> {
    let mut sql = format!("SELECT {} FROM companies", COMPANY_COLUMNS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(min_revenue) = filter.min_revenue {
        clauses.push("annual_revenue >= ?");
        values.push(Box::new(min_revenue));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(Box::new(status.as_str().to_string()));
    }
    if let Some(city) = &filter.city {
        clauses.push("address LIKE ?");
        values.push(Box::new(format!("%{}%", city)));
    }
    if let Some(search) = &filter.search {
        clauses.push("(legal_name LIKE ? OR siren LIKE ?)");
        let pattern = format!("%{}%", search);
        values.push(Box::new(pattern.clone()));
        values.push(Box::new(pattern));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY prospection_score IS NULL, prospection_score DESC, id");

    if filter.limit.is_some() || filter.offset.is_some() {
        let limit = filter.limit.unwrap_or(100);
        let offset = filter.offset.unwrap_or(0);
        sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
    }

    let mut stmt = conn.prepare(&sql)?;
    let companies = stmt
        .query_map(params_from_iter(values.iter().map(|v| v.as_ref())), map_company)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(companies)
}

/// Apply a partial workflow update
pub fn update_patch(conn: &Connection, siren: &str, patch: &CompanyPatch) -> Result<bool> {
    if patch.is_empty() {
        return Ok(get(conn, siren)?.is_some());
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(legal_name) = &patch.legal_name {
        sets.push("legal_name = ?");
        values.push(Box::new(legal_name.clone()));
    }
    if let Some(email) = &patch.email {
        sets.push("email = ?");
        values.push(Box::new(email.clone()));
    }
    if let Some(phone) = &patch.phone {
        sets.push("phone = ?");
        values.push(Box::new(phone.clone()));
    }
    if let Some(address) = &patch.address {
        sets.push("address = ?");
        values.push(Box::new(address.clone()));
    }
    if let Some(status) = patch.status {
        sets.push("status = ?");
        values.push(Box::new(status.as_str().to_string()));
    }
    if let Some(headcount) = patch.headcount {
        sets.push("headcount = ?");
        values.push(Box::new(headcount));
    }
    if let Some(share_capital) = patch.share_capital {
        sets.push("share_capital = ?");
        values.push(Box::new(share_capital));
    }
    sets.push("updated_at = datetime('now')");

    let sql = format!("UPDATE companies SET {} WHERE siren = ?", sets.join(", "));
    values.push(Box::new(siren.to_string()));

    let affected = conn.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
    Ok(affected > 0)
}

/// Overlay re-imported data onto an existing record. Fields the import did
/// not carry keep their stored values; the workflow status is never touched
/// here (callers apply explicit status changes through `update`).
pub fn update_imported(conn: &Connection, siren: &str, company: &NewCompany) -> Result<bool> {
    let officers = if company.officers.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&company.officers)?)
    };
    let affected = conn.execute(
        "UPDATE companies SET \
         siret_siege = COALESCE(?1, siret_siege), \
         legal_name = ?2, \
         legal_form = COALESCE(?3, legal_form), \
         created_on = COALESCE(?4, created_on), \
         address = COALESCE(?5, address), \
         email = COALESCE(?6, email), \
         phone = COALESCE(?7, phone), \
         vat_number = COALESCE(?8, vat_number), \
         annual_revenue = COALESCE(?9, annual_revenue), \
         net_income = COALESCE(?10, net_income), \
         headcount = COALESCE(?11, headcount), \
         share_capital = COALESCE(?12, share_capital), \
         naf_code = COALESCE(?13, naf_code), \
         naf_label = COALESCE(?14, naf_label), \
         primary_officer = COALESCE(?15, primary_officer), \
         officers = COALESCE(?16, officers), \
         source_url = COALESCE(?17, source_url), \
         last_scraped_at = ?18, updated_at = datetime('now') \
         WHERE siren = ?19",
        params![
            company.siret_siege,
            company.legal_name,
            company.legal_form,
            company.created_on.map(|d| d.to_string()),
            company.address,
            company.email,
            company.phone,
            company.vat_number,
            company.annual_revenue,
            company.net_income,
            company.headcount,
            company.share_capital,
            company.naf_code,
            company.naf_label,
            company.primary_officer,
            officers,
            company.source_url,
            company.last_scraped_at.to_rfc3339(),
            siren,
        ],
    )?;
    Ok(affected > 0)
}

pub fn delete(conn: &Connection, siren: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM companies WHERE siren = ?1", params![siren])?;
    Ok(affected > 0)
}

pub fn set_score(
    conn: &Connection,
    siren: &str,
    overall: f64,
    breakdown: &ScoreBreakdown,
) -> Result<()> {
    let breakdown_json = serde_json::to_string(breakdown)?;
    let affected = conn.execute(
        "UPDATE companies SET prospection_score = ?1, score_breakdown = ?2, \
         updated_at = datetime('now') WHERE siren = ?3",
        params![overall, breakdown_json, siren],
    )?;
    if affected == 0 {
        return Err(AppError::NotFound(format!("company {}", siren)));
    }
    Ok(())
}

/// Enrichment targets: revenue at or above the floor, unscored or still above
/// the score threshold
pub fn list_for_enrichment(
    conn: &Connection,
    min_revenue: f64,
    min_score: f64,
) -> Result<Vec<Company>> {
    let sql = format!(
        "SELECT {} FROM companies \
         WHERE annual_revenue >= ?1 AND (prospection_score IS NULL OR prospection_score >= ?2) \
         ORDER BY annual_revenue DESC",
        COMPANY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let companies = stmt
        .query_map(params![min_revenue, min_score], map_company)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(companies)
}
