use std::process::Stdio;

use checker_core::{FailureKind, Resolution};
use engine_logging::engine_debug;
use serde_json::Value;
use tokio::process::Command;
use url::Url;

use crate::{FrameInfo, ProbeError};

// Two seconds of input, so a stream joined mid-GOP still reaches a decodable frame.
const FIRST_FRAME_WINDOW: &str = "%+2";

/// Opens a stream, decodes its first video frame and closes it again.
///
/// Implementations must release whatever they opened when the returned future
/// is dropped, since callers enforce their time budget by dropping it.
#[async_trait::async_trait]
pub trait StreamOpener: Send + Sync {
    async fn first_frame(&self, url: &Url) -> Result<FrameInfo, ProbeError>;
}

/// [`StreamOpener`] backed by an `ffprobe` child process.
#[derive(Debug, Clone)]
pub struct FfprobeOpener {
    program: String,
}

impl FfprobeOpener {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, url: &Url) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_error",
            "-select_streams",
            "v:0",
            "-read_intervals",
            FIRST_FRAME_WINDOW,
            "-show_entries",
            "frame=width,height:stream=codec_type,width,height",
            url.as_str(),
        ]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for FfprobeOpener {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait::async_trait]
impl StreamOpener for FfprobeOpener {
    async fn first_frame(&self, url: &Url) -> Result<FrameInfo, ProbeError> {
        engine_debug!("ffprobe {}", url);
        let output = self.command(url).output().await.map_err(|err| {
            ProbeError::new(
                FailureKind::Connection,
                format!("failed to run {}: {}", self.program, err),
            )
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_report(&stdout, &stderr)
    }
}

/// Classify an ffprobe JSON report.
fn parse_report(stdout: &str, stderr: &str) -> Result<FrameInfo, ProbeError> {
    if stdout.trim().is_empty() {
        let message = stderr.trim();
        let message = if message.is_empty() {
            "ffprobe produced no output"
        } else {
            message
        };
        return Err(ProbeError::new(FailureKind::Connection, message));
    }

    let report: Value = serde_json::from_str(stdout).map_err(|err| {
        ProbeError::new(
            FailureKind::Decode,
            format!("unreadable ffprobe report: {err}"),
        )
    })?;

    if let Some(error) = report.get("error") {
        let message = error
            .get("string")
            .and_then(Value::as_str)
            .unwrap_or("ffprobe reported an error");
        return Err(ProbeError::new(FailureKind::Connection, message));
    }

    let frames = report
        .get("frames")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let Some(frame) = frames.first() else {
        let has_video = report
            .get("streams")
            .and_then(Value::as_array)
            .is_some_and(|streams| !streams.is_empty());
        let message = if has_video {
            "video stream present but no frame decoded"
        } else {
            "no video stream"
        };
        return Err(ProbeError::new(FailureKind::Decode, message));
    };

    Ok(FrameInfo {
        resolution: dimensions(frame)
            .or_else(|| {
                report
                    .get("streams")
                    .and_then(Value::as_array)
                    .and_then(|streams| streams.first())
                    .and_then(dimensions)
            })
            .unwrap_or(Resolution::Unknown),
    })
}

fn dimensions(entry: &Value) -> Option<Resolution> {
    let width = entry.get("width").and_then(Value::as_u64)?;
    let height = entry.get("height").and_then(Value::as_u64)?;
    if width == 0 || height == 0 {
        return None;
    }
    Some(Resolution::new(
        u32::try_from(width).ok()?,
        u32::try_from(height).ok()?,
    ))
}
