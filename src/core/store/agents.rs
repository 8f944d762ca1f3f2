use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use super::types::{AgentPatch, AgentRecord, NewAgent, decode_ts, encode_ts, now};

const AGENT_COLUMNS: &str =
    "id, name, description, role, goal, backstory, is_active, created_at, updated_at";

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    Ok(AgentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        role: row.get(3)?,
        goal: row.get(4)?,
        backstory: row.get(5)?,
        is_active: row.get(6)?,
        created_at: decode_ts(7, &row.get::<_, String>(7)?)?,
        updated_at: decode_ts(8, &row.get::<_, String>(8)?)?,
    })
}

impl Store {
    pub async fn insert_agent(&self, agent: &NewAgent) -> Result<AgentRecord> {
        let db = self.conn().await?;
        let ts = encode_ts(&now());
        db.execute(
            "INSERT INTO agents (name, description, role, goal, backstory, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                agent.name,
                agent.description,
                agent.role,
                agent.goal,
                agent.backstory,
                agent.is_active,
                ts
            ],
        )?;
        let id = db.last_insert_rowid();
        let rec = db.query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            params![id],
            agent_from_row,
        )?;
        Ok(rec)
    }

    pub async fn get_agent(&self, id: i64) -> Result<Option<AgentRecord>> {
        let db = self.conn().await?;
        let rec = db
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1 LIMIT 1"),
                params![id],
                agent_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub async fn list_agents(&self, include_inactive: bool) -> Result<Vec<AgentRecord>> {
        let db = self.conn().await?;
        let sql = if include_inactive {
            format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY id ASC")
        } else {
            format!("SELECT {AGENT_COLUMNS} FROM agents WHERE is_active = 1 ORDER BY id ASC")
        };
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map([], agent_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Applies the supplied fields and bumps `updated_at`. `None` when the
    /// agent does not exist.
    pub async fn update_agent(&self, id: i64, patch: &AgentPatch) -> Result<Option<AgentRecord>> {
        let db = self.conn().await?;
        let Some(current) = db
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
                params![id],
                agent_from_row,
            )
            .optional()?
        else {
            return Ok(None);
        };

        let name = patch.name.clone().unwrap_or(current.name);
        let description = match &patch.description {
            Some(value) => value.clone(),
            None => current.description,
        };
        let role = patch.role.clone().unwrap_or(current.role);
        let goal = patch.goal.clone().unwrap_or(current.goal);
        let backstory = patch.backstory.clone().unwrap_or(current.backstory);
        let is_active = patch.is_active.unwrap_or(current.is_active);

        db.execute(
            "UPDATE agents
             SET name = ?1, description = ?2, role = ?3, goal = ?4, backstory = ?5, is_active = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                name,
                description,
                role,
                goal,
                backstory,
                is_active,
                encode_ts(&now()),
                id
            ],
        )?;

        let rec = db.query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            params![id],
            agent_from_row,
        )?;
        Ok(Some(rec))
    }
}
