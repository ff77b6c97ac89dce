use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::artifact::{Artifact, ArtifactLocation};
use crate::models::audio_models::PcmFormat;
use crate::models::error::CaptureError;
use crate::processing::wav_format;
use crate::traits::stream_sink::{SinkFactory, SinkKind, SinkRequest, StreamSink};

use super::{hex_encode, metadata};

/// Streaming WAV file sink.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header, sizes patched on finalize]
/// [raw 16-bit PCM data...]
/// ```
///
/// Bytes go to a hidden `.part` file in the output directory. `finalize`
/// patches the header, syncs, and renames the file to its visible name;
/// `abort`, a failed finalize, or dropping the sink removes the part file.
pub struct WavFileSink {
    directory: PathBuf,
    file_stem: String,
    temp_path: PathBuf,
    file: Option<BufWriter<File>>,
    format: PcmFormat,
    label: Option<String>,
    data_bytes: u64,
    finished: bool,
}

impl WavFileSink {
    /// Create the part file and write a placeholder header.
    pub fn create(
        directory: &Path,
        file_stem: &str,
        format: PcmFormat,
        label: Option<String>,
    ) -> Result<Self, CaptureError> {
        fs::create_dir_all(directory)
            .map_err(|e| CaptureError::SinkOpenFailed(format!("failed to create directory: {}", e)))?;

        let temp_path = directory.join(format!(".{}.wav.part", uuid::Uuid::new_v4()));
        let file = File::create(&temp_path)
            .map_err(|e| CaptureError::SinkOpenFailed(format!("failed to create file: {}", e)))?;

        let mut sink = Self {
            directory: directory.to_path_buf(),
            file_stem: file_stem.to_string(),
            temp_path,
            file: Some(BufWriter::new(file)),
            format,
            label,
            data_bytes: 0,
            finished: false,
        };

        let header = wav_format::header(&format, 0);
        sink.write_raw(&header)
            .map_err(|e| CaptureError::SinkOpenFailed(format!("failed to write header: {}", e)))?;
        Ok(sink)
    }

    /// Path of the in-progress part file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    fn write_raw(&mut self, data: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file is not open"))?;
        file.write_all(data)
    }

    fn commit(&mut self) -> Result<Artifact, CaptureError> {
        let writer = self
            .file
            .take()
            .ok_or_else(|| CaptureError::SinkFinalizeFailed("file is not open".into()))?;

        if let Err(e) = patch_header(writer, self.data_bytes as u32) {
            self.discard();
            return Err(CaptureError::SinkFinalizeFailed(format!("failed to patch header: {}", e)));
        }

        let final_path = unique_path(&self.directory, &self.file_stem);
        if let Err(e) = fs::rename(&self.temp_path, &final_path) {
            self.discard();
            return Err(CaptureError::SinkFinalizeFailed(format!("failed to move recording into place: {}", e)));
        }

        let checksum = match sha256_file(&final_path) {
            Ok(checksum) => checksum,
            Err(e) => {
                fs::remove_file(&final_path).ok();
                return Err(e);
            }
        };

        let artifact = Artifact {
            id: uuid::Uuid::new_v4().to_string(),
            label: self.label.clone(),
            location: ArtifactLocation::File(final_path.clone()),
            duration_secs: self.format.seconds_for_bytes(self.data_bytes),
            byte_count: self.data_bytes,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        if let Err(e) = metadata::write_metadata(&artifact.metadata(), &final_path) {
            log::warn!("Artifact {} saved without metadata: {}", final_path.display(), e);
        }

        log::info!(
            "Saved {} ({:.1}s, {} bytes)",
            final_path.display(),
            artifact.duration_secs,
            artifact.byte_count
        );
        Ok(artifact)
    }

    fn discard(&mut self) {
        self.file = None;
        if let Err(e) = fs::remove_file(&self.temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Could not delete {}: {}", self.temp_path.display(), e);
            }
        }
    }
}

impl StreamSink for WavFileSink {
    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        if self.data_bytes + data.len() as u64 > wav_format::MAX_DATA_SIZE {
            return Err(CaptureError::SinkWriteFailed("WAV size limit reached".into()));
        }
        self.write_raw(data)
            .map_err(|e| CaptureError::SinkWriteFailed(format!("write failed: {}", e)))?;
        self.data_bytes += data.len() as u64;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<Artifact, CaptureError> {
        let result = self.commit();
        self.finished = true;
        result
    }

    fn abort(mut self: Box<Self>) {
        self.discard();
        self.finished = true;
    }

    fn bytes_written(&self) -> u64 {
        self.data_bytes
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if !self.finished {
            self.discard();
        }
    }
}

/// Opens WAV sinks in a fixed output directory.
///
/// File names are `{label}_{local timestamp}.wav`, with the label sanitized
/// and a numeric suffix added on collision.
#[derive(Debug, Clone)]
pub struct WavSinkFactory {
    output_directory: PathBuf,
}

impl WavSinkFactory {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }
}

impl SinkFactory for WavSinkFactory {
    fn open(&self, request: &SinkRequest) -> Result<Box<dyn StreamSink>, CaptureError> {
        let default_name = match request.kind {
            SinkKind::Recording => "Recording",
            SinkKind::Snapshot => "Snapshot",
        };
        let name = request
            .label
            .as_deref()
            .filter(|label| !label.trim().is_empty())
            .unwrap_or(default_name);
        let stem = format!(
            "{}_{}",
            sanitize_file_name(name),
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );

        let sink = WavFileSink::create(&self.output_directory, &stem, request.format, request.label.clone())?;
        log::debug!("Writing {:?} to {}", request.kind, sink.temp_path().display());
        Ok(Box::new(sink))
    }
}

/// Replace everything except ASCII letters, digits, `.` and `-` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

fn unique_path(directory: &Path, stem: &str) -> PathBuf {
    let mut candidate = directory.join(format!("{}.wav", stem));
    let mut n = 1;
    while candidate.exists() {
        candidate = directory.join(format!("{}-{}.wav", stem, n));
        n += 1;
    }
    candidate
}

fn patch_header(writer: BufWriter<File>, data_size: u32) -> io::Result<()> {
    let mut file = writer.into_inner().map_err(|e| e.into_error())?;
    file.seek(SeekFrom::Start(wav_format::RIFF_SIZE_OFFSET))?;
    file.write_all(&wav_format::riff_size(data_size).to_le_bytes())?;
    file.seek(SeekFrom::Start(wav_format::DATA_SIZE_OFFSET))?;
    file.write_all(&data_size.to_le_bytes())?;
    file.sync_all()
}

/// SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::SinkFinalizeFailed(format!("failed to open file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| CaptureError::SinkFinalizeFailed(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&hasher.finalize()))
}
