//! Conversion job model
//!
//! A [`ConversionJob`] lives for one `POST /api/convert` request and walks
//! `Receiving -> Decoding -> Writing -> Converting -> Succeeded | Failed`.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Suffix of every generated clip name
pub const OUTPUT_SUFFIX: &str = "converted.mp4";

/// Standard alphabet, padding optional
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Request decoding errors, all reported as 400
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertRequestError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing data")]
    MissingField,

    #[error("Invalid data URI")]
    InvalidDataUri,

    #[error("Invalid base64 payload")]
    InvalidBase64,

    #[error("Invalid filename")]
    InvalidFilename,
}

/// Body of `POST /api/convert`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertRequest {
    /// `data:<mime>;base64,<payload>`
    #[serde(default)]
    pub data: Option<String>,
    /// Client-side name of the image
    #[serde(default)]
    pub filename: Option<String>,
}

impl ConvertRequest {
    /// Parse a raw body. Both fields must be present and non-empty.
    pub fn from_slice(body: &[u8]) -> Result<Self, ConvertRequestError> {
        let request: ConvertRequest = serde_json::from_slice(body)
            .map_err(|e| ConvertRequestError::InvalidJson(e.to_string()))?;

        let has = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.is_empty());
        if !has(&request.data) || !has(&request.filename) {
            return Err(ConvertRequestError::MissingField);
        }

        Ok(request)
    }
}

/// A parsed `data:<mime>;base64,<payload>` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime: &'a str,
    pub payload: &'a str,
}

impl<'a> DataUri<'a> {
    /// Split a data URI into MIME type and base64 payload.
    ///
    /// The MIME part extends to the last `;base64,` marker; both parts must
    /// be non-empty and the URI must sit on a single line.
    pub fn parse(uri: &'a str) -> Result<Self, ConvertRequestError> {
        const MARKER: &str = ";base64,";

        if uri.contains(['\n', '\r']) {
            return Err(ConvertRequestError::InvalidDataUri);
        }
        let rest = uri
            .strip_prefix("data:")
            .ok_or(ConvertRequestError::InvalidDataUri)?;

        // Greedy MIME match: prefer the last marker that still leaves a payload.
        let split = rest
            .rmatch_indices(MARKER)
            .map(|(idx, _)| idx)
            .find(|&idx| idx > 0 && idx + MARKER.len() < rest.len())
            .ok_or(ConvertRequestError::InvalidDataUri)?;

        Ok(Self {
            mime: &rest[..split],
            payload: &rest[split + MARKER.len()..],
        })
    }

    /// Decode the payload bytes
    pub fn decode(&self) -> Result<Vec<u8>, ConvertRequestError> {
        LENIENT_BASE64
            .decode(self.payload)
            .map_err(|_| ConvertRequestError::InvalidBase64)
    }
}

/// Reduce a client filename to its final component.
///
/// Both `/` and `\` count as separators; trailing separators are ignored.
pub fn sanitize_filename(name: &str) -> Result<String, ConvertRequestError> {
    let trimmed = name.trim_end_matches(['/', '\\']);
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or("");

    if base.is_empty() || base.contains('\0') {
        return Err(ConvertRequestError::InvalidFilename);
    }
    Ok(base.to_string())
}

/// Millisecond timestamps that never repeat within one process.
///
/// Each call returns `max(now_ms, previous + 1)`, so names built from it
/// keep the `<millis>-...` shape without colliding.
#[derive(Debug, Default)]
pub struct JobClock {
    last: AtomicU64,
}

impl JobClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unique timestamp
    pub fn next_millis(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous + 1);
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }
}

/// Conversion job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Body still arriving
    Receiving,
    /// Parsing JSON and the data URI
    Decoding,
    /// Persisting the decoded image
    Writing,
    /// Encoder process running
    Converting,
    /// Encoder exited 0
    Succeeded,
    /// Encoder exited non-zero or could not run
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Receiving => "receiving",
            JobStatus::Decoding => "decoding",
            JobStatus::Writing => "writing",
            JobStatus::Converting => "converting",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One image-to-clip conversion
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub status: JobStatus,
    /// Decoded image bytes
    pub input: Vec<u8>,
    /// Client filename reduced to its base name
    pub original_name: String,
    /// `<millis>-<original_name>`
    pub input_name: String,
    /// `<millis>-converted.mp4`
    pub output_name: String,
    /// Encoder exit code, `None` until it exits (or if killed by a signal)
    pub exit_code: Option<i32>,
    /// Captured encoder stderr
    pub stderr: String,
}

impl ConversionJob {
    /// Start a job in the `Receiving` state
    pub fn receiving() -> Self {
        Self {
            status: JobStatus::Receiving,
            input: Vec::new(),
            original_name: String::new(),
            input_name: String::new(),
            output_name: String::new(),
            exit_code: None,
            stderr: String::new(),
        }
    }

    /// Decode a complete request body. No side effects happen here.
    pub fn decode(&mut self, body: &[u8]) -> Result<(), ConvertRequestError> {
        self.status = JobStatus::Decoding;

        let request = ConvertRequest::from_slice(body)?;
        let data = request.data.unwrap_or_default();
        let filename = request.filename.unwrap_or_default();

        let uri = DataUri::parse(&data)?;
        self.input = uri.decode()?;
        self.original_name = sanitize_filename(&filename)?;
        Ok(())
    }

    /// Assign unique input and output names
    pub fn assign_names(&mut self, clock: &JobClock) {
        self.status = JobStatus::Writing;
        self.input_name = format!("{}-{}", clock.next_millis(), self.original_name);
        self.output_name = format!("{}-{}", clock.next_millis(), OUTPUT_SUFFIX);
    }

    /// Path of the decoded image under `outputs_dir`
    pub fn input_path(&self, outputs_dir: &Path) -> PathBuf {
        outputs_dir.join(&self.input_name)
    }

    /// Path of the clip under `outputs_dir`
    pub fn output_path(&self, outputs_dir: &Path) -> PathBuf {
        outputs_dir.join(&self.output_name)
    }

    /// Public URL of the clip
    pub fn output_url(&self) -> String {
        format!("/{}/{}", super::OUTPUTS_DIR, self.output_name)
    }

    pub fn start_converting(&mut self) {
        self.status = JobStatus::Converting;
    }

    /// Record the encoder's exit
    pub fn finish(&mut self, exit_code: Option<i32>, stderr: String) {
        self.exit_code = exit_code;
        self.stderr = stderr;
        self.status = if exit_code == Some(0) {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
    }

    /// Mark failed without an exit code (spawn or storage failure)
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.stderr = reason.into();
        self.status = JobStatus::Failed;
    }
}
