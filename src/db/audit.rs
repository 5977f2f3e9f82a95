use rusqlite::params;

use super::*;

impl AggregateDb {
    // =========================================================================
    // Cluster filter audit
    // =========================================================================

    /// Insert or replace the audit record for one cluster. Keyed by
    /// canonical name; a re-run overwrites every field of the prior record.
    pub fn upsert_filter_audit(&self, audit: &DbFilterAudit) -> Result<(), DbError> {
        self.conn_ref().execute(
            "INSERT INTO cluster_filter_audit (
                canonical_name, role_description, confidence, is_relevant,
                reasoning, filtered, threshold, filter_version, filtered_at,
                updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(canonical_name) DO UPDATE SET
                role_description = excluded.role_description,
                confidence = excluded.confidence,
                is_relevant = excluded.is_relevant,
                reasoning = excluded.reasoning,
                filtered = excluded.filtered,
                threshold = excluded.threshold,
                filter_version = excluded.filter_version,
                filtered_at = excluded.filtered_at,
                updated_at = excluded.updated_at",
            params![
                audit.canonical_name,
                audit.role_description,
                audit.confidence,
                audit.is_relevant as i32,
                audit.reasoning,
                audit.filtered as i32,
                audit.threshold,
                audit.filter_version,
                audit.filtered_at,
                audit.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch the audit record for one cluster, if any.
    pub fn get_filter_audit(
        &self,
        canonical_name: &str,
    ) -> Result<Option<DbFilterAudit>, DbError> {
        let mut stmt = self.conn_ref().prepare(
            "SELECT canonical_name, role_description, confidence, is_relevant,
                    reasoning, filtered, threshold, filter_version, filtered_at,
                    updated_at
             FROM cluster_filter_audit
             WHERE canonical_name = ?1",
        )?;

        let mut rows = stmt.query_map(params![canonical_name], map_audit_row)?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

fn map_audit_row(row: &rusqlite::Row) -> rusqlite::Result<DbFilterAudit> {
    Ok(DbFilterAudit {
        canonical_name: row.get(0)?,
        role_description: row.get(1)?,
        confidence: row.get(2)?,
        is_relevant: row.get::<_, i32>(3)? != 0,
        reasoning: row.get(4)?,
        filtered: row.get::<_, i32>(5)? != 0,
        threshold: row.get(6)?,
        filter_version: row.get(7)?,
        filtered_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
