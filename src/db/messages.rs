use std::collections::HashMap;

use super::*;

impl AggregateDb {
    // =========================================================================
    // Enriched message reads
    // =========================================================================

    /// Load every completed message with its extraction rows, ordered by
    /// delivery date. Messages that never finished enrichment are excluded;
    /// the insertion order of the result drives cluster formation downstream.
    pub fn get_enriched_messages(&self) -> Result<Vec<EnrichedMessage>, DbError> {
        let messages = {
            let mut stmt = self.conn_ref().prepare(
                "SELECT id, msg_id, subject, delivery_date
                 FROM messages
                 WHERE enrichment_status = 'completed'
                 ORDER BY delivery_date",
            )?;
            let rows = stmt.query_map([], map_message_row)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            items
        };

        let mut extraction_map: HashMap<i64, HashMap<String, DbExtraction>> = HashMap::new();
        {
            let mut stmt = self.conn_ref().prepare(
                "SELECT e.message_id, e.task_name, e.extraction_json, e.confidence
                 FROM extractions e
                 JOIN messages m ON m.id = e.message_id
                 WHERE m.enrichment_status = 'completed'",
            )?;
            let rows = stmt.query_map([], map_extraction_row)?;
            for row in rows {
                let extraction = row?;
                extraction_map
                    .entry(extraction.message_id)
                    .or_default()
                    .insert(extraction.task_name.clone(), extraction);
            }
        }

        Ok(messages
            .into_iter()
            .map(|message| {
                let extractions = extraction_map.remove(&message.id).unwrap_or_default();
                EnrichedMessage {
                    message,
                    extractions,
                }
            })
            .collect())
    }

    /// Count completed messages without loading them.
    pub fn count_completed_messages(&self) -> Result<i64, DbError> {
        let count = self.conn_ref().query_row(
            "SELECT COUNT(*) FROM messages WHERE enrichment_status = 'completed'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_message_row(row: &rusqlite::Row) -> rusqlite::Result<DbMessage> {
    Ok(DbMessage {
        id: row.get(0)?,
        msg_id: row.get(1)?,
        subject: row.get(2)?,
        delivery_date: row.get(3)?,
    })
}

fn map_extraction_row(row: &rusqlite::Row) -> rusqlite::Result<DbExtraction> {
    Ok(DbExtraction {
        message_id: row.get(0)?,
        task_name: row.get(1)?,
        extraction_json: row.get(2)?,
        confidence: row.get(3)?,
    })
}
