//! FFmpeg command builder and runner for stream-copy remuxing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::RemuxProgress;

/// Builder for FFmpeg invocations.
///
/// The input is a free-form specifier rather than a path so the `bluray:`
/// pseudo-protocol can address a disc directory.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input specifier (path or protocol URL)
    input: String,
    /// Output file path
    output: PathBuf,
    /// Arguments placed before -i
    input_args: Vec<String>,
    /// Arguments placed after -i
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// FFmpeg log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.into(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Stream-copy remux of one disc title into an MKV container.
    ///
    /// All streams are mapped and copied verbatim; no re-encoding happens.
    pub fn remux_title(source_root: &Path, playlist_number: u32, output: impl AsRef<Path>) -> Self {
        Self::new(format!("bluray:{}", source_root.display()), output)
            .input_arg("-playlist")
            .input_arg(playlist_number.to_string())
            .output_args(["-map", "0", "-c", "copy"])
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the FFmpeg log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Output path the command writes to.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // machine-readable progress on stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.clone());
        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Attach a cancellation signal; flipping it to `true` kills the process.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Kill the process after this many seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command, invoking `progress_callback` on every progress
    /// block FFmpeg emits.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(RemuxProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
        let mut reader = BufReader::new(stderr).lines();

        let progress_handle = tokio::spawn(async move {
            let mut current = RemuxProgress::default();
            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(progress) = parse_progress_line(&line, &mut current) {
                    progress_callback(progress);
                }
            }
        });

        let result = self.wait_for_completion(&mut child).await;
        let _ = progress_handle.await;
        result
    }

    /// Wait for the child, racing cancellation and the timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        enum Interrupt {
            Cancelled,
            TimedOut(u64),
        }

        let mut cancel_rx = self.cancel_rx.clone();
        let timeout_secs = self.timeout_secs;
        let deadline = timeout_secs.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));

        let interrupt = {
            let cancelled = async {
                match cancel_rx.as_mut() {
                    Some(rx) => loop {
                        if *rx.borrow() {
                            return;
                        }
                        if rx.changed().await.is_err() {
                            // sender dropped without cancelling
                            std::future::pending::<()>().await;
                        }
                    },
                    None => std::future::pending().await,
                }
            };

            let timed_out = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    return if status.success() {
                        Ok(())
                    } else {
                        Err(MediaError::ffmpeg_failed(
                            "FFmpeg exited with non-zero status",
                            None,
                            status.code(),
                        ))
                    };
                }
                _ = cancelled => Interrupt::Cancelled,
                _ = timed_out => Interrupt::TimedOut(timeout_secs.unwrap_or(0)),
            }
        };

        // the wait future is gone; the child can be killed now
        let _ = child.kill().await;
        match interrupt {
            Interrupt::Cancelled => {
                info!("Remux cancelled, FFmpeg killed");
                Err(MediaError::Cancelled)
            }
            Interrupt::TimedOut(secs) => {
                warn!("FFmpeg timed out after {secs} seconds, process killed");
                Err(MediaError::Timeout(secs))
            }
        }
    }
}

/// Parse one line of FFmpeg's `-progress` output. Returns a snapshot when
/// the block-terminating `progress=` key arrives.
fn parse_progress_line(line: &str, current: &mut RemuxProgress) -> Option<RemuxProgress> {
    let (key, value) = line.trim().split_once('=')?;

    match key {
        "out_time_ms" | "out_time_us" => {
            // both are microseconds in practice (out_time_ms historically mislabeled)
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Check that FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remux_command_args() {
        let cmd = FfmpegCommand::remux_title(Path::new("/library/raw/Dune"), 1, "/staging/Dune.mkv");
        let args = cmd.build_args();

        assert!(args.contains(&"-playlist".to_string()));
        assert!(args.contains(&"1".to_string()));
        assert!(args.contains(&"bluray:/library/raw/Dune".to_string()));
        // stream copy, never re-encode
        let c_pos = args.iter().position(|a| a == "-c").unwrap();
        assert_eq!(args[c_pos + 1], "copy");
        assert!(args.contains(&"-y".to_string()));
    }

    #[test]
    fn test_input_args_precede_input() {
        let cmd = FfmpegCommand::new("in.m2ts", "out.mkv").input_arg("-playlist");
        let args = cmd.build_args();

        let playlist_pos = args.iter().position(|a| a == "-playlist").unwrap();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(playlist_pos < input_pos);
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = RemuxProgress::default();

        parse_progress_line("out_time_ms=5000000", &mut progress);
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=30.5x", &mut progress);
        assert!((progress.speed - 30.5).abs() < 0.01);

        parse_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 30.5).abs() < 0.01);

        assert!(parse_progress_line("frame=42", &mut progress).is_none());
        let snapshot = parse_progress_line("progress=end", &mut progress);
        assert!(snapshot.is_some());
        assert!(progress.is_complete);
    }
}
