use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use viewconfig::{AudioSetting, RenderModeSetting};

#[derive(Parser, Debug)]
#[command(
    name = "recview",
    author,
    version,
    about = "Render into a window and record what it shows to MP4"
)]
pub struct Cli {
    /// Configuration file (defaults to `config.toml` in the user config directory).
    #[arg(long, env = "RECVIEW_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Render every tick (`continuous`) or only when asked (`on-demand`).
    #[arg(long, value_name = "MODE", value_parser = parse_render_mode)]
    pub render_mode: Option<RenderModeSetting>,

    /// Pause between render-loop ticks (e.g. `16ms`, `33ms 333us`).
    #[arg(long, value_name = "DURATION", value_parser = parse_interval)]
    pub frame_interval: Option<Duration>,

    /// ffmpeg binary used for recording.
    #[arg(long, env = "RECVIEW_FFMPEG", value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Audio source: `default`, `silent`, or `<format>:<device>` (e.g. `pulse:default`).
    #[arg(long, value_name = "SOURCE")]
    pub audio: Option<AudioSetting>,

    /// H.264 encoder to use, or `auto` to probe for hardware encoders.
    #[arg(long, value_name = "CODEC")]
    pub video_codec: Option<String>,

    /// Directory recordings are written to.
    #[arg(long, env = "RECVIEW_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Start recording as soon as the first frame is drawn.
    #[arg(long)]
    pub record: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{trimmed}'"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_render_mode(value: &str) -> Result<RenderModeSetting, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "continuous" | "always" => Ok(RenderModeSetting::Continuous),
        "on-demand" | "ondemand" | "on_demand" | "demand" => Ok(RenderModeSetting::OnDemand),
        other => Err(format!(
            "invalid render mode '{other}'; use continuous or on-demand"
        )),
    }
}

pub fn parse_interval(value: &str) -> Result<Duration, String> {
    let interval = humantime::parse_duration(value.trim())
        .map_err(|err| format!("invalid duration '{value}': {err}"))?;
    if interval.is_zero() {
        return Err("frame interval must be greater than zero".to_string());
    }
    Ok(interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("800x600").unwrap(), (800, 600));
        assert_eq!(parse_size(" 1920X1080 ").unwrap(), (1920, 1080));
        assert!(parse_size("800").is_err());
        assert!(parse_size("0x600").is_err());
    }

    #[test]
    fn parses_render_modes_and_intervals() {
        assert_eq!(
            parse_render_mode("On-Demand").unwrap(),
            RenderModeSetting::OnDemand
        );
        assert!(parse_render_mode("sometimes").is_err());
        assert_eq!(parse_interval("33ms").unwrap(), Duration::from_millis(33));
        assert!(parse_interval("0s").is_err());
    }

    #[test]
    fn cli_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "recview",
            "--size",
            "640x480",
            "--audio",
            "silent",
            "--render-mode",
            "on-demand",
            "--record",
        ])
        .unwrap();
        assert_eq!(cli.size, Some((640, 480)));
        assert_eq!(cli.audio, Some(AudioSetting::Silent));
        assert_eq!(cli.render_mode, Some(RenderModeSetting::OnDemand));
        assert!(cli.record);
        assert!(!cli.print_config);
    }
}
