use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use super::types::{RunRecord, RunStatus, RunStatusWrite, decode_opt_ts, decode_ts, encode_ts, now};

const RUN_COLUMNS: &str =
    "id, agent_id, input_text, status, started_at, completed_at, created_at, updated_at";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let raw_status: String = row.get(3)?;
    let status = RunStatus::from_status(&raw_status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown run status '{}'", raw_status).into(),
        )
    })?;
    Ok(RunRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        input_text: row.get(2)?,
        status,
        started_at: decode_opt_ts(4, row.get(4)?)?,
        completed_at: decode_opt_ts(5, row.get(5)?)?,
        created_at: decode_ts(6, &row.get::<_, String>(6)?)?,
        updated_at: decode_ts(7, &row.get::<_, String>(7)?)?,
    })
}

impl Store {
    /// Inserts a `pending` run. The caller is responsible for checking the
    /// agent; the foreign key only guards against dangling references.
    pub async fn insert_run(&self, agent_id: i64, input_text: &str) -> Result<RunRecord> {
        let db = self.conn().await?;
        let ts = encode_ts(&now());
        db.execute(
            "INSERT INTO agent_runs (agent_id, input_text, status, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?3)",
            params![agent_id, input_text, ts],
        )?;
        let id = db.last_insert_rowid();
        let rec = db.query_row(
            &format!("SELECT {RUN_COLUMNS} FROM agent_runs WHERE id = ?1"),
            params![id],
            run_from_row,
        )?;
        Ok(rec)
    }

    pub async fn get_run(&self, id: i64) -> Result<Option<RunRecord>> {
        let db = self.conn().await?;
        let rec = db
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM agent_runs WHERE id = ?1 LIMIT 1"),
                params![id],
                run_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    /// Newest first. Runs created within the same microsecond fall back to id.
    pub async fn list_runs(&self, agent_id: Option<i64>) -> Result<Vec<RunRecord>> {
        let db = self.conn().await?;
        let mut out = Vec::new();
        match agent_id {
            Some(agent_id) => {
                let mut stmt = db.prepare(&format!(
                    "SELECT {RUN_COLUMNS} FROM agent_runs WHERE agent_id = ?1
                     ORDER BY created_at DESC, id DESC"
                ))?;
                let rows = stmt.query_map(params![agent_id], run_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = db.prepare(&format!(
                    "SELECT {RUN_COLUMNS} FROM agent_runs ORDER BY created_at DESC, id DESC"
                ))?;
                let rows = stmt.query_map([], run_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    /// Reads the run, lets `decide` pick the status write from that row, and
    /// applies it while still holding the connection. Returns the stored row
    /// before and after the write, or `None` when the run does not exist.
    /// An `Err` from `decide` aborts without writing.
    pub async fn update_run_with<F, E>(
        &self,
        id: i64,
        decide: F,
    ) -> std::result::Result<Option<(RunRecord, RunRecord)>, E>
    where
        F: FnOnce(&RunRecord) -> std::result::Result<RunStatusWrite, E>,
        E: From<anyhow::Error>,
    {
        let db = self.conn().await?;
        let Some(current) = db
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM agent_runs WHERE id = ?1"),
                params![id],
                run_from_row,
            )
            .optional()
            .map_err(anyhow::Error::from)?
        else {
            return Ok(None);
        };

        let write = decide(&current)?;
        db.execute(
            "UPDATE agent_runs
             SET status = ?1, started_at = ?2, completed_at = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                write.status.as_str(),
                write.started_at.as_ref().map(encode_ts),
                write.completed_at.as_ref().map(encode_ts),
                encode_ts(&now()),
                id
            ],
        )
        .map_err(anyhow::Error::from)?;

        let updated = db
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM agent_runs WHERE id = ?1"),
                params![id],
                run_from_row,
            )
            .map_err(anyhow::Error::from)?;
        Ok(Some((current, updated)))
    }
}
