//! `ffmpeg`-backed [`MediaEncoder`].
//!
//! Video frames arrive through the [`EncoderInput`] and are streamed to the
//! child's stdin as raw RGBA; audio comes from a capture device (or a silent
//! source) opened by ffmpeg itself. Both are muxed into one MP4. Stopping
//! closes stdin, which lets ffmpeg flush and finalise the container.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::error::RecorderError;
use crate::recorder::input::{EncoderInput, VideoFrame};
use crate::recorder::monitor;
use crate::recorder::session::{
    EncoderRequest, MediaEncoder, RecorderFailure, RecorderInfo, RecorderListeners,
};
use crate::types::{EncoderDefaults, ENCODER_DEFAULTS};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// H.264 encoders ffmpeg may offer, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Nvenc,
    Qsv,
    Amf,
    VideoToolbox,
    X264,
}

impl VideoCodec {
    const PRIORITY: [VideoCodec; 5] = [
        VideoCodec::Nvenc,
        VideoCodec::Qsv,
        VideoCodec::Amf,
        VideoCodec::VideoToolbox,
        VideoCodec::X264,
    ];

    pub fn as_ffmpeg_codec(&self) -> &'static str {
        match self {
            VideoCodec::Nvenc => "h264_nvenc",
            VideoCodec::Qsv => "h264_qsv",
            VideoCodec::Amf => "h264_amf",
            VideoCodec::VideoToolbox => "h264_videotoolbox",
            VideoCodec::X264 => "libx264",
        }
    }

    fn pixel_format(&self) -> &'static str {
        match self {
            VideoCodec::Qsv => "nv12",
            _ => "yuv420p",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|codec| codec.as_ffmpeg_codec() == name)
    }

    /// Picks the best encoder listed in `ffmpeg -encoders` output.
    pub fn best_from_listing(listing: &str) -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|codec| listing.contains(codec.as_ffmpeg_codec()))
            .unwrap_or(VideoCodec::X264)
    }
}

/// How the video codec is chosen at prepare time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecChoice {
    /// Probe `ffmpeg -encoders` and use the first hardware encoder found.
    #[default]
    Auto,
    Fixed(VideoCodec),
}

/// Audio track source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Capture device opened through an ffmpeg input format (`pulse`,
    /// `avfoundation`, `dshow`, ...).
    Device { format: String, device: String },
    /// Generated silence, for hosts without a usable microphone.
    Silent,
}

impl AudioSource {
    /// Default microphone input for the current platform.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            AudioSource::Device {
                format: "pulse".into(),
                device: "default".into(),
            }
        } else if cfg!(target_os = "macos") {
            AudioSource::Device {
                format: "avfoundation".into(),
                device: ":0".into(),
            }
        } else {
            AudioSource::Silent
        }
    }
}

impl Default for AudioSource {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Process-level settings for [`FfmpegEncoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegSettings {
    pub binary: PathBuf,
    pub codec: CodecChoice,
    pub audio: AudioSource,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            codec: CodecChoice::Auto,
            audio: AudioSource::default(),
        }
    }
}

/// Builds the ffmpeg argument list for one recording.
#[derive(Debug, Clone)]
pub struct FfmpegCommandBuilder {
    output_path: PathBuf,
    width: u32,
    height: u32,
    codec: VideoCodec,
    audio: AudioSource,
    defaults: EncoderDefaults,
}

impl FfmpegCommandBuilder {
    pub fn new(output_path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            output_path: output_path.into(),
            width,
            height,
            codec: VideoCodec::X264,
            audio: AudioSource::Silent,
            defaults: ENCODER_DEFAULTS,
        }
    }

    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_audio(mut self, audio: AudioSource) -> Self {
        self.audio = audio;
        self
    }

    pub fn build(&self) -> Vec<String> {
        let defaults = self.defaults;
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-y".into(),
            // Video: raw RGBA frames on stdin, stamped as they arrive.
            "-thread_queue_size".into(),
            "64".into(),
            "-use_wallclock_as_timestamps".into(),
            "1".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", self.width, self.height),
            "-i".into(),
            "pipe:0".into(),
        ];

        args.push("-thread_queue_size".into());
        args.push("512".into());
        match &self.audio {
            AudioSource::Device { format, device } => {
                args.extend(["-f".into(), format.clone(), "-i".into(), device.clone()]);
            }
            AudioSource::Silent => {
                args.extend([
                    "-f".into(),
                    "lavfi".into(),
                    "-i".into(),
                    format!(
                        "anullsrc=r={}:cl=stereo",
                        defaults.audio_sample_rate
                    ),
                ]);
            }
        }

        args.extend([
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:v".into(),
            self.codec.as_ffmpeg_codec().into(),
            "-b:v".into(),
            defaults.video_bitrate.to_string(),
            "-r".into(),
            defaults.video_frame_rate.to_string(),
            "-pix_fmt".into(),
            self.codec.pixel_format().into(),
        ]);
        if self.codec == VideoCodec::X264 {
            args.extend(["-preset".into(), "veryfast".into()]);
        }

        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            defaults.audio_bitrate.to_string(),
            "-ar".into(),
            defaults.audio_sample_rate.to_string(),
            "-ac".into(),
            defaults.audio_channels.to_string(),
            "-shortest".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-f".into(),
            "mp4".into(),
            self.output_path.to_string_lossy().into_owned(),
        ]);
        args
    }
}

struct Prepared {
    args: Vec<String>,
    output: PathBuf,
    width: u32,
    height: u32,
    input: EncoderInput,
    listeners: RecorderListeners,
}

struct Running {
    child: Child,
    stop_tx: Option<Sender<()>>,
    writer: Option<JoinHandle<u64>>,
    monitor: Option<JoinHandle<()>>,
    listeners: RecorderListeners,
}

/// Records through an `ffmpeg` child process.
pub struct FfmpegEncoder {
    settings: FfmpegSettings,
    stop_timeout: Duration,
    prepared: Option<Prepared>,
    running: Option<Running>,
}

impl FfmpegEncoder {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self {
            settings,
            stop_timeout: STOP_TIMEOUT,
            prepared: None,
            running: None,
        }
    }

    /// Bounds how long a graceful stop may take, writer drain included,
    /// before the child is killed.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &FfmpegSettings {
        &self.settings
    }

    fn resolve_codec(&self) -> Result<VideoCodec, RecorderError> {
        match self.settings.codec {
            CodecChoice::Fixed(codec) => {
                self.probe_version()?;
                Ok(codec)
            }
            CodecChoice::Auto => {
                let output = Command::new(&self.settings.binary)
                    .args(["-hide_banner", "-encoders"])
                    .stdin(Stdio::null())
                    .output()
                    .map_err(|err| self.unavailable(err))?;
                let listing = String::from_utf8_lossy(&output.stdout);
                let codec = VideoCodec::best_from_listing(&listing);
                debug!(codec = codec.as_ffmpeg_codec(), "selected video encoder");
                Ok(codec)
            }
        }
    }

    fn probe_version(&self) -> Result<(), RecorderError> {
        let status = Command::new(&self.settings.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| self.unavailable(err))?;
        if status.success() {
            Ok(())
        } else {
            Err(RecorderError::io(
                &self.settings.binary,
                io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("-version exited with {status}"),
                ),
            ))
        }
    }

    fn unavailable(&self, err: io::Error) -> RecorderError {
        RecorderError::io(&self.settings.binary, err)
    }

    fn shutdown_running(&mut self, graceful: bool) -> Result<(), RecorderError> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        // Closing the frame feed ends the video stream; the writer then drops
        // stdin and ffmpeg finalises. A child that stopped reading keeps the
        // writer blocked until the child is killed.
        running.stop_tx.take();
        let result = if graceful {
            let deadline = Instant::now() + self.stop_timeout;
            let writer_done = wait_for_writer(running.writer.as_ref(), deadline);
            let remaining = deadline.saturating_duration_since(Instant::now());
            match wait_with_timeout(&mut running.child, remaining) {
                Ok(Some(status)) if status.success() => Ok(()),
                Ok(Some(status)) => Err(RecorderError::Rejected(format!(
                    "ffmpeg exited with {status}"
                ))),
                Ok(None) => {
                    warn!(writer_done, "ffmpeg did not exit in time; killing");
                    kill_child(&mut running.child);
                    Err(RecorderError::Rejected("ffmpeg did not finish in time".into()))
                }
                Err(err) => {
                    kill_child(&mut running.child);
                    Err(RecorderError::Rejected(format!(
                        "failed to wait for ffmpeg: {err}"
                    )))
                }
            }
        } else {
            kill_child(&mut running.child);
            Ok(())
        };

        // The child is gone, so a blocked write has already failed.
        if let Some(writer) = running.writer.take() {
            match writer.join() {
                Ok(frames) => debug!(frames, "encoder writer finished"),
                Err(_) => warn!("encoder writer thread panicked"),
            }
        }
        if let Some(monitor) = running.monitor.take() {
            let _ = monitor.join();
        }
        running.listeners.info(RecorderInfo::Finished {
            success: graceful && result.is_ok(),
        });
        result
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new(FfmpegSettings::default())
    }
}

impl MediaEncoder for FfmpegEncoder {
    fn prepare(&mut self, request: &EncoderRequest) -> Result<(), RecorderError> {
        if !output_parent_exists(&request.output) {
            return Err(RecorderError::io(
                &request.output,
                io::Error::new(io::ErrorKind::NotFound, "output directory does not exist"),
            ));
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&request.output)
            .map_err(|err| RecorderError::io(&request.output, err))?;

        let codec = match self.resolve_codec() {
            Ok(codec) => codec,
            Err(err) => {
                let _ = fs::remove_file(&request.output);
                return Err(err);
            }
        };
        let args = FfmpegCommandBuilder::new(&request.output, request.width, request.height)
            .with_codec(codec)
            .with_audio(self.settings.audio.clone())
            .build();
        debug!(?args, "prepared ffmpeg command");

        self.prepared = Some(Prepared {
            args,
            output: request.output.clone(),
            width: request.width,
            height: request.height,
            input: request.input.clone(),
            listeners: request.listeners.clone(),
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        if self.running.is_some() {
            return Err(RecorderError::InvalidState("encoder already running"));
        }
        let prepared = self
            .prepared
            .take()
            .ok_or(RecorderError::InvalidState("encoder was not prepared"))?;

        let mut child = Command::new(&self.settings.binary)
            .args(&prepared.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.unavailable(err))?;

        let stdin = child.stdin.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(stderr)) = (stdin, stderr) else {
            kill_child(&mut child);
            return Err(RecorderError::Rejected("ffmpeg pipes unavailable".into()));
        };

        let monitor = monitor::spawn(stderr, prepared.listeners.clone()).ok();

        let stale = prepared.input.drain();
        if stale > 0 {
            debug!(stale, "discarded frames queued before recording started");
        }
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let frames = prepared.input.frames();
        let expected = (prepared.width, prepared.height);
        let writer_listeners = prepared.listeners.clone();
        let writer = thread::Builder::new()
            .name("recsurface-ffmpeg-writer".into())
            .spawn(move || feed_frames(stdin, frames, stop_rx, expected, writer_listeners));
        let writer = match writer {
            Ok(handle) => handle,
            Err(err) => {
                kill_child(&mut child);
                return Err(RecorderError::Rejected(format!(
                    "failed to spawn encoder writer: {err}"
                )));
            }
        };

        info!(
            output = %prepared.output.display(),
            width = prepared.width,
            height = prepared.height,
            "ffmpeg recording started"
        );
        prepared.listeners.info(RecorderInfo::Started {
            output: prepared.output.clone(),
        });
        self.running = Some(Running {
            child,
            stop_tx: Some(stop_tx),
            writer: Some(writer),
            monitor,
            listeners: prepared.listeners,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        if self.running.is_none() {
            return Err(RecorderError::InvalidState("encoder is not running"));
        }
        self.shutdown_running(true)
    }

    fn reset(&mut self) {
        self.prepared = None;
    }

    fn release(&mut self) -> bool {
        self.prepared = None;
        if self.running.is_some() {
            if let Err(err) = self.shutdown_running(false) {
                warn!(error = %err, "failed to release ffmpeg process");
                return false;
            }
        }
        true
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.release();
    }
}

fn feed_frames(
    mut stdin: std::process::ChildStdin,
    frames: Receiver<VideoFrame>,
    stop: Receiver<()>,
    expected: (u32, u32),
    listeners: RecorderListeners,
) -> u64 {
    let mut written = 0u64;
    let mut mismatched = 0u64;
    loop {
        select! {
            recv(frames) -> frame => {
                let Ok(frame) = frame else { break };
                if (frame.width, frame.height) != expected {
                    mismatched += 1;
                    continue;
                }
                if let Err(err) = stdin.write_all(&frame.pixels) {
                    listeners.error(RecorderFailure {
                        message: format!("failed to write frame to ffmpeg: {err}"),
                    });
                    break;
                }
                written += 1;
            }
            recv(stop) -> _ => break,
        }
    }
    if mismatched > 0 {
        warn!(mismatched, "dropped encoder frames with unexpected size");
    }
    let _ = stdin.flush();
    written
}

fn wait_for_writer(writer: Option<&JoinHandle<u64>>, deadline: Instant) -> bool {
    let Some(writer) = writer else {
        return true;
    };
    while !writer.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(EXIT_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
    true
}

fn kill_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "ffmpeg already exited");
    }
    let _ = child.wait();
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

/// Returns whether `path` looks like a usable output location without touching it.
pub fn output_parent_exists(path: &Path) -> bool {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
        _ => true,
    }
}
