//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database. Structured fields are stored as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub topic: String,
    pub status: String,
    pub current_stage: Option<String>,
    pub config_json: String,
    pub stages_json: String,
    pub outcome_json: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            topic: row.get("topic")?,
            status: row.get("status")?,
            current_stage: row.get("current_stage")?,
            config_json: row.get("config_json")?,
            stages_json: row.get("stages_json")?,
            outcome_json: row.get("outcome_json")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a job row, replacing every column of an existing row with the same id
/// except `created_at`.
pub fn upsert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, topic, status, current_stage, config_json, stages_json,
             outcome_json, error, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                topic=excluded.topic, status=excluded.status,
                current_stage=excluded.current_stage, config_json=excluded.config_json,
                stages_json=excluded.stages_json, outcome_json=excluded.outcome_json,
                error=excluded.error, updated_at=excluded.updated_at,
                completed_at=excluded.completed_at",
            params![
                job.id,
                job.topic,
                job.status,
                job.current_stage,
                job.config_json,
                job.stages_json,
                job.outcome_json,
                job.error,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries jobs newest first, returning (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;

        let (total, rows) = match filter.status {
            Some(ref status) => {
                let total: u64 = conn.query_row(
                    "SELECT COUNT(*) FROM jobs WHERE status = ?1",
                    params![status],
                    |r| r.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT * FROM jobs WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![status, limit, offset], JobRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                (total, rows)
            }
            None => {
                let total: u64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
                let mut stmt = conn
                    .prepare("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ?1 OFFSET ?2")?;
                let rows = stmt
                    .query_map(params![limit, offset], JobRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                (total, rows)
            }
        };

        Ok((rows, total))
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Deletes finished jobs completed before `cutoff` (RFC 3339). Returns the
/// number of rows removed.
pub fn delete_finished_before(db: &Database, cutoff: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM jobs WHERE completed_at IS NOT NULL AND completed_at < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    })
}
