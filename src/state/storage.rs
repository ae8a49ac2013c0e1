// File system operations for storing run artifacts
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

const APP_DIR_NAME: &str = "echodepict";

/// Resolve and create the data directory.
///
/// An explicit directory wins; otherwise the platform data dir is used.
pub fn resolve_data_dir(configured: Option<&Path>) -> StorageResult<PathBuf> {
    let data_dir = match configured {
        Some(dir) => dir.to_path_buf(),
        None => dirs::data_dir()
            .ok_or(StorageError::NoAppDataDir)?
            .join(APP_DIR_NAME),
    };
    fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

/// Path of the run ledger database inside `data_dir`
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("echodepict.db")
}

/// Get the directory for a specific run
pub fn get_run_dir(data_dir: &Path, run_id: &Uuid) -> StorageResult<PathBuf> {
    let run_dir = data_dir.join("runs").join(run_id.to_string());
    fs::create_dir_all(&run_dir)?;
    Ok(run_dir)
}

/// Store a file in the run directory and return its path and SHA256 hash
pub fn store_file(
    data_dir: &Path,
    run_id: &Uuid,
    filename: &str,
    data: &[u8],
) -> StorageResult<(PathBuf, String)> {
    let file_path = get_run_dir(data_dir, run_id)?.join(filename);
    let mut file = fs::File::create(&file_path)?;
    file.write_all(data)?;

    Ok((file_path, calculate_sha256(data)))
}

/// Read a file from disk
pub fn read_file(path: &Path) -> StorageResult<Vec<u8>> {
    Ok(fs::read(path)?)
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
