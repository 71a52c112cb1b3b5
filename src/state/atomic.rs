//! Atomic File Writes
//!
//! New content is written to a temporary file in the target's directory,
//! synced, then renamed over the target, so readers never observe a
//! partially written document.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", file_name, std::process::id(), unique))
}

/// Replace `path` with `content` via temp-file-then-rename
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path_for(path);
    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result?;
    Ok(())
}

/// Write `content` unless the file already holds exactly these bytes
///
/// Returns whether the file was written. Skipping keeps timestamps stable
/// for idempotent re-runs.
pub async fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    match fs::read(path).await {
        Ok(existing) if existing == content.as_bytes() => {
            debug!("Unchanged, skipping write: {}", path.display());
            return Ok(false);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        // Unreadable files are simply rewritten
        Err(e) => debug!("Could not read {}: {}", path.display(), e),
    }

    write_atomic(path, content.as_bytes()).await?;
    Ok(true)
}

/// Pretty JSON with sorted object keys and a trailing newline
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    // serde_json::Value maps are ordered by key
    let value = serde_json::to_value(value)?;
    let mut out = serde_json::to_string_pretty(&value)?;
    out.push('\n');
    Ok(out)
}

/// Serialize `value` as canonical JSON and replace `path` atomically
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = to_canonical_json(value)?;
    write_atomic(path, content.as_bytes()).await
}

/// Serialize `value` as canonical JSON, writing only when it changed
pub async fn write_json_if_changed<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    let content = to_canonical_json(value)?;
    write_if_changed(path, &content).await
}

/// Read a JSON document, treating a missing file as `T::default()`
pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Remove a file, treating a missing file as success
pub async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
