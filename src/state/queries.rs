// Database CRUD operations
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::db::{DbConnection, DbResult};
use super::models::{Artifact, ArtifactKind, Run, RunOutcome, RunStatus, RunWithArtifacts};
use crate::composition::InputKind;

const RUN_COLUMNS: &str = "id, created_at, input_type, input_sha256, input_bytes, status, error, \
                           key, tempo, note_count, duration_seconds";

const ARTIFACT_COLUMNS: &str = "id, run_id, kind, path, sha256, bytes";

// ==================== ROW MAPPING ====================

fn conversion_error(
    column: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err.into())
}

fn uuid_at(row: &Row, column: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&row.get::<_, String>(column)?).map_err(|e| conversion_error(column, e))
}

fn timestamp_at(row: &Row, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    row.get::<_, String>(column)?
        .parse::<DateTime<Utc>>()
        .map_err(|e| conversion_error(column, e))
}

fn run_from_row(row: &Row) -> rusqlite::Result<Run> {
    let input_type = row.get::<_, String>(2)?;

    Ok(Run {
        id: uuid_at(row, 0)?,
        created_at: timestamp_at(row, 1)?,
        input_type: InputKind::from_str_opt(&input_type)
            .ok_or_else(|| conversion_error(2, format!("unknown input type {:?}", input_type)))?,
        input_sha256: row.get(3)?,
        input_bytes: row.get(4)?,
        status: RunStatus::from_string(&row.get::<_, String>(5)?),
        error: row.get(6)?,
        key: row.get(7)?,
        tempo: row.get(8)?,
        note_count: row.get(9)?,
        duration_seconds: row.get(10)?,
    })
}

fn artifact_from_row(row: &Row) -> rusqlite::Result<Artifact> {
    let kind = row.get::<_, String>(2)?;

    Ok(Artifact {
        id: uuid_at(row, 0)?,
        run_id: uuid_at(row, 1)?,
        kind: ArtifactKind::from_string(&kind)
            .ok_or_else(|| conversion_error(2, format!("unknown artifact kind {:?}", kind)))?,
        path: row.get(3)?,
        sha256: row.get(4)?,
        bytes: row.get(5)?,
    })
}

// ==================== RUN QUERIES ====================

/// Create a new pending run for one pipeline input
pub fn create_run(
    db: &DbConnection,
    input_type: InputKind,
    input_sha256: String,
    input_bytes: i64,
) -> DbResult<Run> {
    let run = Run {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        input_type,
        input_sha256,
        input_bytes,
        status: RunStatus::Pending,
        error: None,
        key: None,
        tempo: None,
        note_count: None,
        duration_seconds: None,
    };

    let conn = db.lock()?;
    conn.execute(
        "INSERT INTO runs (id, created_at, input_type, input_sha256, input_bytes, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run.id.to_string(),
            run.created_at.to_rfc3339(),
            run.input_type.as_str(),
            run.input_sha256,
            run.input_bytes,
            run.status.as_str(),
        ],
    )?;

    Ok(run)
}

/// Get a run by ID
pub fn get_run(db: &DbConnection, id: &Uuid) -> DbResult<Option<Run>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(&format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS))?;

    match stmt.query_row([id.to_string()], run_from_row) {
        Ok(run) => Ok(Some(run)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List the most recent runs, newest first
pub fn list_runs(db: &DbConnection, limit: u32) -> DbResult<Vec<Run>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM runs ORDER BY created_at DESC LIMIT ?1",
        RUN_COLUMNS
    ))?;

    let runs = stmt
        .query_map([limit], run_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

/// Update run status
pub fn update_run_status(db: &DbConnection, run_id: &Uuid, status: RunStatus) -> DbResult<()> {
    let conn = db.lock()?;
    conn.execute(
        "UPDATE runs SET status = ?1 WHERE id = ?2",
        params![status.as_str(), run_id.to_string()],
    )?;
    Ok(())
}

/// Mark a run complete and record what it produced
pub fn complete_run(db: &DbConnection, run_id: &Uuid, outcome: &RunOutcome) -> DbResult<()> {
    let conn = db.lock()?;
    conn.execute(
        "UPDATE runs
         SET status = ?1, error = NULL, key = ?2, tempo = ?3, note_count = ?4, duration_seconds = ?5
         WHERE id = ?6",
        params![
            RunStatus::Complete.as_str(),
            outcome.key,
            outcome.tempo,
            outcome.note_count,
            outcome.duration_seconds,
            run_id.to_string(),
        ],
    )?;
    Ok(())
}

/// Mark a run failed with its user-facing message
pub fn fail_run(db: &DbConnection, run_id: &Uuid, error: &str) -> DbResult<()> {
    let conn = db.lock()?;
    conn.execute(
        "UPDATE runs SET status = ?1, error = ?2 WHERE id = ?3",
        params![RunStatus::Failed.as_str(), error, run_id.to_string()],
    )?;
    Ok(())
}

// ==================== ARTIFACT QUERIES ====================

/// Create a new artifact
pub fn create_artifact(
    db: &DbConnection,
    run_id: Uuid,
    kind: ArtifactKind,
    path: String,
    sha256: String,
    bytes: i64,
) -> DbResult<Artifact> {
    let artifact = Artifact {
        id: Uuid::new_v4(),
        run_id,
        kind,
        path,
        sha256,
        bytes,
    };

    let conn = db.lock()?;
    conn.execute(
        "INSERT INTO artifacts (id, run_id, kind, path, sha256, bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            artifact.id.to_string(),
            artifact.run_id.to_string(),
            artifact.kind.as_str(),
            artifact.path,
            artifact.sha256,
            artifact.bytes,
        ],
    )?;

    Ok(artifact)
}

/// Get all artifacts for a run
pub fn get_artifacts_for_run(db: &DbConnection, run_id: &Uuid) -> DbResult<Vec<Artifact>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM artifacts WHERE run_id = ?1 ORDER BY rowid",
        ARTIFACT_COLUMNS
    ))?;

    let artifacts = stmt
        .query_map([run_id.to_string()], artifact_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(artifacts)
}

/// Get a run with all its artifacts
pub fn get_run_with_artifacts(
    db: &DbConnection,
    run_id: &Uuid,
) -> DbResult<Option<RunWithArtifacts>> {
    let run = match get_run(db, run_id)? {
        Some(r) => r,
        None => return Ok(None),
    };

    let artifacts = get_artifacts_for_run(db, run_id)?;

    Ok(Some(RunWithArtifacts { run, artifacts }))
}
