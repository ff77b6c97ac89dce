use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Where a finalized artifact lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

impl ArtifactLocation {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::File(path) => Some(path),
            Self::Memory(_) => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::File(_) => None,
            Self::Memory(bytes) => Some(bytes),
        }
    }
}

/// A durable result of a recording or snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub label: Option<String>,
    pub location: ArtifactLocation,
    pub duration_secs: f64,
    /// PCM payload bytes, excluding any container header.
    pub byte_count: u64,
    /// SHA-256 hex digest of the stored artifact.
    pub checksum: String,
    pub created_at: String,
}

impl Artifact {
    pub fn metadata(&self) -> ArtifactMetadata {
        ArtifactMetadata {
            id: self.id.clone(),
            label: self.label.clone(),
            file_path: self
                .location
                .path()
                .map(|p| p.to_string_lossy().into_owned()),
            duration_secs: self.duration_secs,
            byte_count: self.byte_count,
            checksum: self.checksum.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Serializable description of an artifact, stored as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub id: String,
    pub label: Option<String>,
    pub file_path: Option<String>,
    pub duration_secs: f64,
    pub byte_count: u64,
    pub checksum: String,
    pub created_at: String,
}
