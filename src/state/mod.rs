// State management module
// Run ledger persistence (SQLite) and artifact files on disk

pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{init_db, open_in_memory, DbConnection, DbError};
pub use models::{Artifact, ArtifactKind, Run, RunOutcome, RunStatus, RunWithArtifacts};
pub use queries::{
    complete_run, create_artifact, create_run, fail_run, get_artifacts_for_run, get_run,
    get_run_with_artifacts, list_runs, update_run_status,
};
pub use storage::{calculate_sha256, database_path, resolve_data_dir, store_file, StorageError};
