//! Durable run storage
//!
//! Runs and their step checkpoints live in SQLite through sqlx, so a run
//! outlives the actor that started it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rsc_core::{Error, Result};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::run::{RunStatus, StatusUpdate, WorkflowRun};

/// Persistence for runs and step checkpoints
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new run; an existing run id is a `UserInput` error
    async fn insert_run(&self, run: &WorkflowRun) -> Result<()>;

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>>;

    async fn set_status(&self, run_id: &str, status: RunStatus, update: StatusUpdate) -> Result<()>;

    /// Record one step's output; re-recording a step replaces it
    async fn save_step(&self, run_id: &str, step_id: &str, output: &Value) -> Result<()>;

    async fn load_steps(&self, run_id: &str) -> Result<HashMap<String, Value>>;

    /// Runs currently in any of `statuses`, oldest first
    async fn runs_with_status(&self, statuses: &[RunStatus]) -> Result<Vec<WorkflowRun>>;
}

fn db_err(e: sqlx::Error) -> Error {
    Error::storage(e.to_string())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::storage(format!("Bad timestamp '{}': {}", raw, e)))
}

fn parse_json(raw: Option<String>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(&s)).transpose().map_err(Error::from)
}

/// SQLite-backed run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// URL format: `sqlite:///path/to/db.sqlite?mode=rwc` or `sqlite::memory:`
    pub async fn new(url: &str) -> Result<Self> {
        info!("Initializing SQLite run store: {}", url);

        // Every connection to `:memory:` is its own database; keep exactly one alive.
        let options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(url).await.map_err(db_err)?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// In-memory store for tests
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing run store schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_runs (
                run_id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                args TEXT NOT NULL,
                output TEXT,
                error TEXT,
                suspended_step TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_steps (
                run_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                output TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (run_id, step_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_workflow ON workflow_runs(workflow_id)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_status ON workflow_runs(status)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    fn row_to_run(row: &SqliteRow) -> Result<WorkflowRun> {
        let status: String = row.try_get("status").map_err(db_err)?;
        let args: String = row.try_get("args").map_err(db_err)?;
        let created_at: String = row.try_get("created_at").map_err(db_err)?;
        let updated_at: String = row.try_get("updated_at").map_err(db_err)?;
        Ok(WorkflowRun {
            workflow_id: row.try_get("workflow_id").map_err(db_err)?,
            run_id: row.try_get("run_id").map_err(db_err)?,
            status: status.parse()?,
            args: serde_json::from_str(&args)?,
            output: parse_json(row.try_get("output").map_err(db_err)?)?,
            error: row.try_get("error").map_err(db_err)?,
            suspended_step: row.try_get("suspended_step").map_err(db_err)?,
            created_at: parse_time(&created_at)?,
            updated_at: parse_time(&updated_at)?,
        })
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn insert_run(&self, run: &WorkflowRun) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO workflow_runs
                (run_id, workflow_id, status, args, output, error, suspended_step, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.workflow_id)
        .bind(run.status.as_str())
        .bind(serde_json::to_string(&run.args)?)
        .bind(run.output.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&run.error)
        .bind(&run.suspended_step)
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(run_id = %run.run_id, workflow_id = %run.workflow_id, "Inserted run");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(Error::user_input(
                format!("Run {} already exists", run.run_id),
            )),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>> {
        let row = sqlx::query("SELECT * FROM workflow_runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::row_to_run).transpose()
    }

    async fn set_status(&self, run_id: &str, status: RunStatus, update: StatusUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = ?, output = ?, error = ?, suspended_step = ?, updated_at = ?
            WHERE run_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(update.output.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&update.error)
        .bind(&update.suspended_step)
        .bind(Utc::now().to_rfc3339())
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Run {}", run_id)));
        }
        debug!(run_id = %run_id, status = %status, "Run status updated");
        Ok(())
    }

    async fn save_step(&self, run_id: &str, step_id: &str, output: &Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_steps (run_id, step_id, output, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(run_id, step_id) DO UPDATE SET
                output = excluded.output,
                created_at = excluded.created_at
            "#,
        )
        .bind(run_id)
        .bind(step_id)
        .bind(serde_json::to_string(output)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_steps(&self, run_id: &str) -> Result<HashMap<String, Value>> {
        let rows = sqlx::query("SELECT step_id, output FROM workflow_steps WHERE run_id = ?")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut steps = HashMap::with_capacity(rows.len());
        for row in rows {
            let step_id: String = row.try_get("step_id").map_err(db_err)?;
            let output: String = row.try_get("output").map_err(db_err)?;
            steps.insert(step_id, serde_json::from_str(&output)?);
        }
        Ok(steps)
    }

    async fn runs_with_status(&self, statuses: &[RunStatus]) -> Result<Vec<WorkflowRun>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM workflow_runs WHERE status IN ({}) ORDER BY created_at",
            vec!["?"; statuses.len()].join(", ")
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(Self::row_to_run).collect()
    }
}
