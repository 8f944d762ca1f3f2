mod agents;
mod outputs;
mod runs;
pub mod types;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::core::lifecycle::LifecycleComponent;
use crate::platform::{NativePlatform, Platform};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS agents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        role TEXT NOT NULL,
        goal TEXT NOT NULL,
        backstory TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS agent_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id INTEGER NOT NULL REFERENCES agents(id),
        input_text TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('pending', 'running', 'completed', 'failed')),
        started_at TEXT,
        completed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS agent_outputs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER NOT NULL REFERENCES agent_runs(id),
        output_type TEXT NOT NULL CHECK (output_type IN ('log', 'result', 'error')),
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_agent_runs_agent_created ON agent_runs(agent_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_agent_outputs_run_id ON agent_outputs(run_id, id)",
];

/// Store path that keeps everything in process memory.
pub const IN_MEMORY: &str = ":memory:";

/// SQLite-backed storage for agents, runs and outputs.
///
/// Cloning is cheap; all clones share one connection. The connection is
/// released by [`Store::close`], after which every call fails.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Option<Connection>>>,
}

impl Store {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if db_path == Path::new(IN_MEMORY) {
            info!("Opened in-memory run store");
            return Self::open_in_memory();
        }
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await?;
            NativePlatform::restrict_dir_permissions(parent);
        }

        let db = Connection::open(db_path)?;
        NativePlatform::restrict_file_permissions(db_path);
        info!("Opened run store at {}", db_path.display());
        Self::with_connection(db)
    }

    fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.pragma_update(None, "foreign_keys", "ON")?;
        for stmt in SCHEMA {
            db.execute(stmt, [])?;
        }
        Ok(Self {
            db: Arc::new(Mutex::new(Some(db))),
        })
    }

    pub async fn close(&self) -> Result<()> {
        let mut slot = self.db.lock().await;
        if let Some(db) = slot.take() {
            db.close().map_err(|(_, e)| anyhow!(e))?;
            info!("Run store closed");
        }
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.db.lock().await.is_some()
    }

    async fn conn(&self) -> Result<MappedMutexGuard<'_, Connection>> {
        let guard = self.db.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| anyhow!("run store is closed"))
    }
}

#[async_trait]
impl LifecycleComponent for Store {
    async fn on_shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.close().await {
            warn!("Failed to close run store cleanly: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> Store {
    Store::open(IN_MEMORY).await.expect("open in-memory store")
}
