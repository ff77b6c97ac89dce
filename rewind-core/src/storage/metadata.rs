use std::fs;
use std::path::{Path, PathBuf};

use crate::models::artifact::ArtifactMetadata;
use crate::models::error::CaptureError;

/// Path of the JSON sidecar that describes `artifact_path`.
pub fn metadata_path(artifact_path: &Path) -> PathBuf {
    let mut name = artifact_path.as_os_str().to_owned();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// Write artifact metadata as `{artifact_path}.metadata.json`.
pub fn write_metadata(metadata: &ArtifactMetadata, artifact_path: &Path) -> Result<(), CaptureError> {
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(metadata_path(artifact_path), json)
        .map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read the sidecar written by `write_metadata`.
pub fn read_metadata(artifact_path: &Path) -> Result<ArtifactMetadata, CaptureError> {
    let json = fs::read_to_string(metadata_path(artifact_path))
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json)
        .map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))
}
