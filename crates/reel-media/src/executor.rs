//! Transform executor.
//!
//! Runs one compiled plan through the ffmpeg binary, translating its stderr
//! into [`ProgressEvent`]s on a per-job channel. The executor never touches
//! the job registry; whoever holds the receiving end folds the events.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::mpsc;
use tracing::{debug, Instrument};

use reel_models::{
    JobId, MergeOptions, Operation, ProgressEvent, SilentInput, TransformRequest, ValidationError,
};

use crate::command::resolve_binary;
use crate::error::{MediaError, MediaResult};
use crate::filters::build_plan;
use crate::logging::JobLogger;
use crate::probe::probe_media;
use crate::progress::{ProgressGate, ProgressParser, Timeline};

/// Stderr lines kept for the failure diagnostic.
pub const STDERR_TAIL_LINES: usize = 40;

/// Status of the terminal success event.
pub const COMPLETE_STATUS: &str = "Complete!";

/// Engine run duration histogram, labeled by operation and outcome.
pub const ENGINE_DURATION_METRIC: &str = "reel_engine_duration_seconds";

/// Engine binaries and supervision limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// ffmpeg binary, bare name or path
    pub ffmpeg_path: String,
    /// ffprobe binary, used to probe merge inputs
    pub ffprobe_path: String,
    /// Kill the engine after this many seconds
    pub timeout_secs: Option<u64>,
    /// Root for per-job workspaces (OS temp dir when unset)
    pub work_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            timeout_secs: None,
            work_root: None,
        }
    }
}

impl EngineConfig {
    /// Load from `FFMPEG_PATH`, `FFPROBE_PATH`, `ENGINE_TIMEOUT_SECS`, `REEL_TEMP_DIR`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            timeout_secs: std::env::var("ENGINE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0),
            work_root: std::env::var("REEL_TEMP_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Lifecycle of one transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TransformState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformState::Queued => "queued",
            TransformState::Running => "running",
            TransformState::Succeeded => "succeeded",
            TransformState::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: TransformState) -> bool {
        use TransformState::*;
        matches!(
            (self, next),
            (Queued, Running) | (Queued, Failed) | (Running, Succeeded) | (Running, Failed)
        )
    }
}

impl std::fmt::Display for TransformState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks one job's state and refuses illegal transitions.
#[derive(Debug)]
struct StateTracker {
    state: TransformState,
    logger: JobLogger,
}

impl StateTracker {
    fn new(logger: JobLogger) -> Self {
        Self {
            state: TransformState::Queued,
            logger,
        }
    }

    fn advance(&mut self, next: TransformState) {
        if self.state.can_transition_to(next) {
            debug!(job_id = %self.logger.job_id(), from = %self.state, to = %next, "Transform state change");
            self.state = next;
        } else {
            self.logger.log_warning(&format!(
                "ignored illegal transition {} -> {}",
                self.state, next
            ));
        }
    }

    fn fail<T>(&mut self, err: MediaError) -> MediaResult<T> {
        self.advance(TransformState::Failed);
        self.logger.log_error(&err.user_message());
        Err(err)
    }
}

/// Runs transforms. Cheap to clone; holds configuration only.
#[derive(Debug, Clone, Default)]
pub struct TransformExecutor {
    config: EngineConfig,
}

impl TransformExecutor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `request`, writing the result to `output`.
    ///
    /// Emits `(0, start status)` once the engine is spawned, then strictly
    /// increasing percentages in `1..=99`, then a single `Completed` event
    /// after the output file has been verified. A closed receiver is not an
    /// error; the engine still runs to completion.
    pub async fn execute(
        &self,
        job_id: &JobId,
        request: TransformRequest,
        output: &Path,
        events: mpsc::Sender<ProgressEvent>,
    ) -> MediaResult<PathBuf> {
        let kind = request.operation().kind();
        let logger = JobLogger::new(job_id, kind);
        let span = logger.span();
        self.run(request, output, events, logger)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        request: TransformRequest,
        output: &Path,
        events: mpsc::Sender<ProgressEvent>,
        logger: JobLogger,
    ) -> MediaResult<PathBuf> {
        let mut state = StateTracker::new(logger.clone());
        let kind = request.operation().kind();

        if let Some(missing) = missing_input(&request).await {
            return state.fail(MediaError::FileNotFound(missing));
        }

        let ffmpeg = match resolve_binary(&self.config.ffmpeg_path) {
            Ok(path) => path,
            Err(e) => return state.fail(e),
        };

        let request = match request.operation() {
            Operation::Merge(options) if options.silent_inputs.is_empty() => {
                let options = match self.probe_merge_inputs(request.inputs(), &logger).await {
                    Ok(options) => options,
                    Err(e) => return state.fail(e),
                };
                match request.with_operation(Operation::Merge(options)) {
                    Ok(request) => request,
                    Err(e) => return state.fail(e.into()),
                }
            }
            _ => request,
        };

        let plan = build_plan(&request);
        let args = plan.command(output).build_args();
        debug!(job_id = %logger.job_id(), "Running FFmpeg: {} {}", ffmpeg.display(), args.join(" "));

        let started = Instant::now();
        let mut child = match Command::new(&ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return state.fail(e.into()),
        };

        state.advance(TransformState::Running);
        logger.log_start(plan.start_status);
        let _ = events
            .send(ProgressEvent::progress(0, plan.start_status))
            .await;

        let Some(stderr) = child.stderr.take() else {
            return state.fail(MediaError::ffmpeg_failed(
                "FFmpeg stderr was not captured",
                None,
                None,
            ));
        };
        let pump = tokio::spawn(
            pump_stderr(
                stderr,
                plan.timeline,
                plan.progress_label,
                events.clone(),
                logger.clone(),
            )
            .in_current_span(),
        );

        let wait = match self.config.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    logger.log_warning(&format!("FFmpeg timed out after {secs} seconds, killing process"));
                    let _ = child.kill().await;
                    pump.abort();
                    record_duration(kind.as_str(), "timeout", started);
                    return state.fail(MediaError::Timeout(secs));
                }
            },
            None => child.wait().await,
        };

        let tail = match pump.await {
            Ok(tail) => tail,
            Err(e) => {
                logger.log_warning(&format!("stderr reader did not finish: {e}"));
                VecDeque::new()
            }
        };

        let status = match wait {
            Ok(status) => status,
            Err(e) => {
                record_duration(kind.as_str(), "failed", started);
                return state.fail(e.into());
            }
        };

        if !status.success() {
            record_duration(kind.as_str(), "failed", started);
            let stderr = tail.into_iter().collect::<Vec<_>>().join("\n");
            tracing::error!(job_id = %logger.job_id(), exit_code = ?status.code(), "FFmpeg stderr tail:\n{}", stderr);
            return state.fail(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(stderr),
                status.code(),
            ));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                record_duration(kind.as_str(), "failed", started);
                return state.fail(MediaError::OutputMissing(output.to_path_buf()));
            }
        }

        record_duration(kind.as_str(), "succeeded", started);
        state.advance(TransformState::Succeeded);
        let _ = events.send(ProgressEvent::completed(COMPLETE_STATUS)).await;
        logger.log_completion(&format!(
            "{} in {:.1}s",
            output.display(),
            started.elapsed().as_secs_f64()
        ));

        Ok(output.to_path_buf())
    }

    /// Find merge inputs without audio so the graph can synthesize silence.
    ///
    /// Inputs that cannot be probed are assumed to carry audio. A silent
    /// input without a known duration is rejected: its filler track would
    /// never end and concat would wait on it forever.
    async fn probe_merge_inputs(
        &self,
        inputs: &[PathBuf],
        logger: &JobLogger,
    ) -> MediaResult<MergeOptions> {
        let ffprobe = match resolve_binary(&self.config.ffprobe_path) {
            Ok(path) => path,
            Err(e) => {
                logger.log_warning(&format!("{e}; assuming every merge input has audio"));
                return Ok(MergeOptions::default());
            }
        };

        let mut silent_inputs = Vec::new();
        for (index, path) in inputs.iter().enumerate() {
            match probe_media(&ffprobe, path).await {
                Ok(info) if !info.has_audio => {
                    debug!(job_id = %logger.job_id(), index, duration = ?info.duration, "Merge input has no audio");
                    let Some(duration_secs) = info.duration else {
                        return Err(ValidationError::invalid_option(
                            "files",
                            format!(
                                "merge input {} has no audio track and no readable duration",
                                index + 1
                            ),
                        )
                        .into());
                    };
                    silent_inputs.push(SilentInput {
                        index,
                        duration_secs,
                    });
                }
                Ok(_) => {}
                Err(e) => logger.log_warning(&format!(
                    "could not probe merge input {index}, assuming audio: {e}"
                )),
            }
        }

        Ok(MergeOptions { silent_inputs })
    }
}

/// Drain the engine's stderr, forwarding progress and keeping a tail for diagnostics.
async fn pump_stderr(
    stderr: ChildStderr,
    timeline: Timeline,
    label: &'static str,
    events: mpsc::Sender<ProgressEvent>,
    logger: JobLogger,
) -> VecDeque<String> {
    let mut reader = BufReader::new(stderr);
    let mut parser = ProgressParser::new(timeline);
    let mut gate = ProgressGate::new();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(job_id = %logger.job_id(), "Stopped reading FFmpeg stderr: {}", e);
                break;
            }
        }

        let chunk = String::from_utf8_lossy(&buf);
        // Classic stats lines are separated by carriage returns.
        for line in chunk.split(['\r', '\n']).filter(|l| !l.trim().is_empty()) {
            if let Some(percent) = parser.feed(line).and_then(|p| gate.admit(p)) {
                let status = format!("{label}: {percent}%");
                logger.log_progress(percent, &status);
                let _ = events.send(ProgressEvent::progress(percent, status)).await;
            }

            if !is_progress_key(line) {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.trim_end().to_string());
            }
        }
    }

    tail
}

/// `key=value` lines of `-progress` output carry no diagnostic value.
fn is_progress_key(line: &str) -> bool {
    match line.trim().split_once('=') {
        Some((key, value)) => {
            !key.is_empty()
                && key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
                && !value.contains(' ')
        }
        None => false,
    }
}

async fn missing_input(request: &TransformRequest) -> Option<PathBuf> {
    let mut paths: Vec<&Path> = request.inputs().iter().map(PathBuf::as_path).collect();
    if let Operation::RemoveBackground(reel_models::RemoveBackgroundMode::ChromaKey(options)) =
        request.operation()
    {
        if let reel_models::Background::Image(image) = &options.background {
            paths.push(image);
        }
    }

    for path in paths {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Some(path.to_path_buf());
        }
    }
    None
}

fn record_duration(operation: &'static str, outcome: &'static str, started: Instant) {
    metrics::histogram!(ENGINE_DURATION_METRIC, "operation" => operation, "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use TransformState::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Failed));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Succeeded));
    }

    #[test]
    fn test_progress_key_detection() {
        assert!(is_progress_key("out_time_us=1000"));
        assert!(is_progress_key("progress=continue"));
        assert!(is_progress_key("stream_0_0_q=28.0"));
        assert!(!is_progress_key("Stream specifier ':a' matches no streams."));
        assert!(!is_progress_key("[aac @ 0x1] Too many bits=12 per frame"));
        assert!(!is_progress_key("frame=  120 fps=30 time=00:00:05.00 bitrate=419.4kbits/s"));
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_spawn() {
        let request = TransformRequest::new(
            Operation::CleanAudio,
            vec![PathBuf::from("/no/such/input.mp4")],
        )
        .unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let executor = TransformExecutor::default();
        let id = JobId::parse("clean_missing").unwrap();

        let err = executor
            .execute(&id, request, Path::new("/tmp/never.mp4"), tx)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_engine_binary() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"x").unwrap();
        let request = TransformRequest::new(Operation::Enhance, vec![input]).unwrap();

        let executor = TransformExecutor::new(EngineConfig {
            ffmpeg_path: "reel-no-such-ffmpeg-binary".to_string(),
            ..Default::default()
        });
        let (tx, _rx) = mpsc::channel(8);
        let id = JobId::parse("enhance_nobin").unwrap();
        let err = executor
            .execute(&id, request, &dir.path().join("out.mp4"), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FfmpegNotFound(_)));
    }
}
