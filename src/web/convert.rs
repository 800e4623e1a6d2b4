//! Image-to-clip conversion
//!
//! Decodes the uploaded image, writes it under `outputs/`, and runs ffmpeg
//! to produce a 3 second H.264 clip with a short fade in and out.
//! On success the uploaded image is removed; on failure it is kept for
//! diagnosis and the encoder's stderr is logged, never returned.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::job::{ConversionJob, JobClock, JobStatus};
use super::metrics::MetricsCollector;
use super::routes::AppError;
use super::worker::AdmissionGate;

/// Clip length in seconds
const CLIP_SECONDS: &str = "3";

/// Fade in at 0s, fade out at 2.7s, dimensions rounded down to even
const VIDEO_FILTER: &str =
    "fade=t=in:st=0:d=0.3,fade=t=out:st=2.7:d=0.3,scale=trunc(iw/2)*2:trunc(ih/2)*2";

/// Result of one encoder run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when killed by a signal or by the timeout
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The external encoder invocation
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill the encoder if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the program resolves on `PATH` (or as a path)
    pub fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// Fixed argument list for turning `input` into `output`
    pub fn args(input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loop".into(), "1".into(), "-i".into()];
        args.push(input.into());
        args.extend(
            [
                "-t",
                CLIP_SECONDS,
                "-vf",
                VIDEO_FILTER,
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output.into());
        args
    }

    /// Run the encoder and wait for it to exit, capturing stderr only.
    ///
    /// Fails only if the process cannot be spawned or waited on.
    pub async fn run(&self, input: &Path, output: &Path) -> io::Result<ProcessOutcome> {
        let child = tokio::process::Command::new(&self.program)
            .args(Self::args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result?,
                Err(_) => {
                    // Dropping the wait future kills the child.
                    return Ok(ProcessOutcome {
                        exit_code: None,
                        stderr: format!("encoder killed after {:?}", limit),
                        timed_out: true,
                    });
                }
            },
            None => wait.await?,
        };

        Ok(ProcessOutcome {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        })
    }
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new(super::DEFAULT_FFMPEG)
    }
}

/// Runs conversion jobs against the outputs directory
#[derive(Debug)]
pub struct Converter {
    outputs_dir: PathBuf,
    ffmpeg: FfmpegCommand,
    clock: JobClock,
    gate: AdmissionGate,
    metrics: Arc<MetricsCollector>,
}

impl Converter {
    pub fn new(
        outputs_dir: impl Into<PathBuf>,
        ffmpeg: FfmpegCommand,
        gate: AdmissionGate,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            outputs_dir: outputs_dir.into(),
            ffmpeg,
            clock: JobClock::new(),
            gate,
            metrics,
        }
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    pub fn ffmpeg(&self) -> &FfmpegCommand {
        &self.ffmpeg
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Convert a complete request body, returning the succeeded job.
    ///
    /// Decoding happens inline; everything from writing the input onwards
    /// runs in its own task so a disconnecting client cannot interrupt the
    /// encoder or the cleanup that follows it.
    pub async fn convert(self: &Arc<Self>, body: &[u8]) -> Result<ConversionJob, AppError> {
        let mut job = ConversionJob::receiving();
        if let Err(e) = job.decode(body) {
            self.metrics.record_bad_request();
            tracing::warn!("rejected conversion request: {}", e);
            return Err(e.into());
        }
        job.assign_names(&self.clock);

        let converter = Arc::clone(self);
        tokio::spawn(async move { converter.write_and_encode(job).await })
            .await
            .map_err(|e| {
                tracing::error!("conversion task aborted: {}", e);
                AppError::ConversionFailed
            })?
    }

    async fn write_and_encode(&self, mut job: ConversionJob) -> Result<ConversionJob, AppError> {
        let input_path = job.input_path(&self.outputs_dir);
        let output_path = job.output_path(&self.outputs_dir);

        let input = std::mem::take(&mut job.input);
        if let Err(e) = self.persist_input(&input, &input_path).await {
            tracing::error!("failed to write {}: {}", input_path.display(), e);
            job.fail(e.to_string());
            return Err(AppError::ConversionFailed);
        }
        drop(input);

        let _admission = self.gate.admit().await;
        job.start_converting();
        self.metrics.record_conversion_started();
        let started = Instant::now();

        match self.ffmpeg.run(&input_path, &output_path).await {
            Ok(outcome) => job.finish(outcome.exit_code, outcome.stderr),
            Err(e) => job.fail(format!(
                "failed to run {}: {}",
                self.ffmpeg.program().display(),
                e
            )),
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if job.status == JobStatus::Succeeded {
            self.metrics.record_conversion_succeeded(elapsed_ms);
            if let Err(e) = tokio::fs::remove_file(&input_path).await {
                tracing::debug!("could not remove {}: {}", input_path.display(), e);
            }
            tracing::info!(
                output = %job.output_name,
                elapsed_ms,
                "conversion succeeded"
            );
            Ok(job)
        } else {
            self.metrics.record_conversion_failed(elapsed_ms);
            tracing::error!(
                input = %input_path.display(),
                exit_code = ?job.exit_code,
                "ffmpeg failed: {}",
                job.stderr
            );
            Err(AppError::ConversionFailed)
        }
    }

    async fn persist_input(&self, bytes: &[u8], path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.outputs_dir).await?;
        tokio::fs::write(path, bytes).await
    }
}
