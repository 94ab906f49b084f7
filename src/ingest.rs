// src/ingest.rs

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Container extension given to every stored upload.
const UPLOAD_EXTENSION: &str = "mp4";

/// Write an uploaded video verbatim under `upload_dir` and return its path.
///
/// No container or codec validation happens here; a malformed upload surfaces
/// later as a detector or video reader failure. Files are never cleaned up.
pub fn save_upload(bytes: &[u8], upload_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(upload_dir)
        .with_context(|| format!("Failed to create upload dir {}", upload_dir.display()))?;

    let path = upload_dir.join(format!("{}.{}", uuid::Uuid::new_v4(), UPLOAD_EXTENSION));
    fs::write(&path, bytes)
        .with_context(|| format!("Failed to write upload {}", path.display()))?;

    info!("Stored upload ({} bytes) at {}", bytes.len(), path.display());
    Ok(path)
}
