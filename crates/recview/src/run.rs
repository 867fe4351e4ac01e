use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use recsurface::{
    AudioSource, CodecChoice, ErrorCallback, FfmpegSettings, InfoCallback, PixelConfig,
    RecorderFailure, RecorderInfo, RenderMode, RendererCallbacks, VideoCodec, ViewOptions,
    WgpuBackendFactory, WindowView,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use viewconfig::{AudioSetting, RenderModeSetting, ViewConfig};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::cli::Cli;
use crate::paths;
use crate::scene::Scene;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads the config file (if any) and applies command-line overrides.
pub fn resolve_config(cli: &Cli) -> Result<ViewConfig> {
    let mut config = match &cli.config {
        Some(path) => ViewConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let path = paths::default_config_path()?;
            debug!(path = %path.display(), "looking for default config");
            ViewConfig::load_or_default(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?
        }
    };

    if let Some((width, height)) = cli.size {
        config.window.width = width;
        config.window.height = height;
    }
    if let Some(mode) = cli.render_mode {
        config.render.mode = mode;
    }
    if let Some(interval) = cli.frame_interval {
        config.render.frame_interval = interval;
    }
    if let Some(ffmpeg) = &cli.ffmpeg {
        config.recording.ffmpeg = Some(ffmpeg.clone());
    }
    if let Some(audio) = &cli.audio {
        config.recording.audio = audio.clone();
    }
    if let Some(codec) = &cli.video_codec {
        config.recording.video_codec = codec.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.recording.output_dir = Some(dir.clone());
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

pub fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(config.window.title.clone())
        .with_inner_size(PhysicalSize::new(config.window.width, config.window.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut host = Host::new(window.clone(), &config, cli.record)?;
    info!(
        width = config.window.width,
        height = config.window.height,
        mode = ?config.render.mode,
        output = %host.output_dir.display(),
        "recview ready (R: record, Space: pause, Enter: render, M: mode)"
    );

    event_loop
        .run(move |event, elwt| match event {
            Event::Resumed => host.surface_available(),
            Event::Suspended => host.surface_lost(),
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    host.surface_lost();
                    elwt.exit();
                }
                WindowEvent::Resized(size) => host.view.surface_changed(size.width, size.height),
                WindowEvent::KeyboardInput { event, .. } => {
                    if host.handle_key(&event) {
                        host.surface_lost();
                        elwt.exit();
                    }
                }
                _ => {}
            },
            _ => {}
        })
        .map_err(|err| anyhow!("event loop terminated with error: {err}"))
}

/// Surface provider for the view: forwards window lifecycle and key bindings.
struct Host {
    view: WindowView,
    window: Arc<Window>,
    // Kept alive here; the view only holds it weakly.
    _sink: Arc<dyn RendererCallbacks>,
    output_dir: PathBuf,
    record_on_start: bool,
    last_output: Option<PathBuf>,
}

impl Host {
    fn new(window: Arc<Window>, config: &ViewConfig, record_on_start: bool) -> Result<Self> {
        let options = ViewOptions {
            frame_interval: config.render.frame_interval,
            render_mode: match config.render.mode {
                RenderModeSetting::Continuous => RenderMode::Continuous,
                RenderModeSetting::OnDemand => RenderMode::OnDemand,
            },
        };
        let view = WindowView::new(
            WgpuBackendFactory::new(PixelConfig::default()),
            options,
            ffmpeg_settings(config)?,
        );
        let sink: Arc<dyn RendererCallbacks> = Arc::new(Scene::new());
        view.set_renderer_callbacks(&sink);

        let output_dir = config
            .recording
            .output_dir
            .clone()
            .unwrap_or_else(paths::default_output_dir);

        Ok(Self {
            view,
            window,
            _sink: sink,
            output_dir,
            record_on_start,
            last_output: None,
        })
    }

    fn surface_available(&mut self) {
        self.view.surface_created(self.window.clone());
        let size = self.window.inner_size();
        self.view.surface_changed(size.width, size.height);
        self.view.resume();
        if std::mem::take(&mut self.record_on_start) {
            self.toggle_recording();
        }
    }

    fn surface_lost(&mut self) {
        if self.view.is_recording() {
            self.toggle_recording();
        }
        self.view.pause();
        self.view.surface_destroyed();
    }

    /// Returns true when the host should exit.
    fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if event.state != ElementState::Pressed || event.repeat {
            return false;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => return true,
            Key::Named(NamedKey::Space) => {
                if self.view.is_paused() {
                    self.view.resume();
                    info!("resumed");
                } else {
                    self.view.pause();
                    info!("paused");
                }
            }
            Key::Named(NamedKey::Enter) => self.view.request_render(),
            Key::Character(value) if value.eq_ignore_ascii_case("r") => self.toggle_recording(),
            Key::Character(value) if value.eq_ignore_ascii_case("m") => {
                let next = match self.view.render_mode() {
                    RenderMode::Continuous => RenderMode::OnDemand,
                    RenderMode::OnDemand => RenderMode::Continuous,
                };
                self.view.set_render_mode(next);
                info!(mode = %next, "render mode switched");
            }
            _ => {}
        }
        false
    }

    fn toggle_recording(&mut self) {
        if self.view.is_recording() {
            match self.view.stop_recording() {
                Ok(true) => info!(output = ?self.last_output, "recording saved"),
                Ok(false) => warn!(output = ?self.last_output, "recording stopped uncleanly"),
                Err(err) => warn!(error = %err, "failed to stop recording"),
            }
            return;
        }

        if let Err(err) = fs::create_dir_all(&self.output_dir) {
            error!(dir = %self.output_dir.display(), error = %err, "cannot create output directory");
            return;
        }
        let output = self
            .output_dir
            .join(paths::recording_file_name(chrono::Local::now()));
        let size = self.window.inner_size();
        // yuv420p needs even dimensions.
        let (width, height) = ((size.width & !1).max(2), (size.height & !1).max(2));

        let on_error: ErrorCallback = Arc::new(|failure: &RecorderFailure| {
            warn!(message = %failure.message, "recorder error");
        });
        let on_info: InfoCallback = Arc::new(|event: &RecorderInfo| {
            debug!(?event, "recorder event");
        });

        // Keep recorder transitions away from a tick that is drawing.
        let was_paused = self.view.is_paused();
        self.view.pause();
        let prepared = self
            .view
            .init_recorder(&output, width, height, Some(on_error), Some(on_info));
        match prepared {
            Ok(()) if self.view.start_recording() => {
                info!(output = %output.display(), width, height, "recording");
                self.last_output = Some(output);
            }
            Ok(()) => warn!("recorder refused to start"),
            Err(err) => error!(error = %err, "failed to prepare recorder"),
        }
        if !was_paused {
            self.view.resume();
        }
    }
}

fn ffmpeg_settings(config: &ViewConfig) -> Result<FfmpegSettings> {
    let recording = &config.recording;
    let codec = match recording.video_codec.as_str() {
        "auto" => CodecChoice::Auto,
        name => CodecChoice::Fixed(
            VideoCodec::parse(name).ok_or_else(|| anyhow!("unsupported video codec '{name}'"))?,
        ),
    };
    let audio = match &recording.audio {
        AudioSetting::PlatformDefault => AudioSource::platform_default(),
        AudioSetting::Silent => AudioSource::Silent,
        AudioSetting::Device { format, device } => AudioSource::Device {
            format: format.clone(),
            device: device.clone(),
        },
    };
    Ok(FfmpegSettings {
        binary: recording
            .ffmpeg
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffmpeg")),
        codec,
        audio,
    })
}
