//! Activity trail queries

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::model::ActivityEntry;

pub fn log_activity(
    conn: &Connection,
    siren: &str,
    action: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let details_json = details.map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO activity_logs (siren, action, details) VALUES (?1, ?2, ?3)",
        params![siren, action, details_json],
    )?;
    Ok(())
}

pub fn list_activity(conn: &Connection, siren: &str, limit: u32) -> Result<Vec<ActivityEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, siren, action, details, created_at FROM activity_logs \
         WHERE siren = ?1 ORDER BY id DESC LIMIT ?2",
    )?;

    let entries = stmt
        .query_map(params![siren, limit], |row| {
            let details: Option<String> = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok(ActivityEntry {
                id: row.get(0)?,
                siren: row.get(1)?,
                action: row.get(2)?,
                details: details.as_deref().and_then(|d| serde_json::from_str(d).ok()),
                created_at: super::companies::parse_timestamp(&created_at),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}
