use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};

use super::Store;
use super::types::{OutputRecord, OutputType, decode_ts, encode_ts, now};

const OUTPUT_COLUMNS: &str = "id, run_id, output_type, content, timestamp, created_at";

fn output_from_row(row: &Row<'_>) -> rusqlite::Result<OutputRecord> {
    let raw_type: String = row.get(2)?;
    let output_type = OutputType::from_type(&raw_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown output type '{}'", raw_type).into(),
        )
    })?;
    Ok(OutputRecord {
        id: row.get(0)?,
        run_id: row.get(1)?,
        output_type,
        content: row.get(3)?,
        timestamp: decode_ts(4, &row.get::<_, String>(4)?)?,
        created_at: decode_ts(5, &row.get::<_, String>(5)?)?,
    })
}

impl Store {
    pub async fn insert_output(
        &self,
        run_id: i64,
        output_type: OutputType,
        content: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<OutputRecord> {
        let db = self.conn().await?;
        let created_at = now();
        let timestamp = timestamp.unwrap_or(created_at);
        db.execute(
            "INSERT INTO agent_outputs (run_id, output_type, content, timestamp, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                output_type.as_str(),
                content,
                encode_ts(&timestamp),
                encode_ts(&created_at)
            ],
        )?;
        let id = db.last_insert_rowid();
        let rec = db.query_row(
            &format!("SELECT {OUTPUT_COLUMNS} FROM agent_outputs WHERE id = ?1"),
            params![id],
            output_from_row,
        )?;
        Ok(rec)
    }

    /// Display order: timestamp ascending, ties by id.
    pub async fn list_outputs(&self, run_id: i64) -> Result<Vec<OutputRecord>> {
        let db = self.conn().await?;
        let mut stmt = db.prepare(&format!(
            "SELECT {OUTPUT_COLUMNS} FROM agent_outputs WHERE run_id = ?1
             ORDER BY timestamp ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![run_id], output_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Stream order: outputs with id greater than `after_id`, ascending id.
    pub async fn list_outputs_after(&self, run_id: i64, after_id: i64) -> Result<Vec<OutputRecord>> {
        let db = self.conn().await?;
        let mut stmt = db.prepare(&format!(
            "SELECT {OUTPUT_COLUMNS} FROM agent_outputs WHERE run_id = ?1 AND id > ?2
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![run_id, after_id], output_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
