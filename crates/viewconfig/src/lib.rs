use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

pub const CONFIG_VERSION: u32 = 1;

/// Video codec names accepted by `recording.video_codec`, besides `auto`.
pub const KNOWN_VIDEO_CODECS: &[&str] = &[
    "libx264",
    "h264_nvenc",
    "h264_qsv",
    "h264_amf",
    "h264_videotoolbox",
];

const MAX_WINDOW_DIMENSION: u32 = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ViewConfig {
    pub version: u32,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub recording: RecordingSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WindowSection {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderModeSetting {
    #[default]
    Continuous,
    #[serde(alias = "ondemand", alias = "on_demand")]
    OnDemand,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RenderSection {
    #[serde(default)]
    pub mode: RenderModeSetting,
    #[serde(
        default = "default_frame_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub frame_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecordingSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<PathBuf>,
    #[serde(default)]
    pub audio: AudioSetting,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// `recording.audio`: `default`, `silent`, or `<format>:<device>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AudioSetting {
    #[default]
    PlatformDefault,
    Silent,
    Device { format: String, device: String },
}

impl FromStr for AudioSetting {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "default" | "auto" | "" => return Ok(AudioSetting::PlatformDefault),
            "silent" | "none" | "off" => return Ok(AudioSetting::Silent),
            _ => {}
        }
        let (format, device) = trimmed
            .split_once(':')
            .ok_or_else(|| format!("invalid audio source '{trimmed}'; expected <format>:<device>"))?;
        if format.is_empty() || device.is_empty() {
            return Err(format!(
                "invalid audio source '{trimmed}'; format and device must be non-empty"
            ));
        }
        Ok(AudioSetting::Device {
            format: format.to_string(),
            device: device.to_string(),
        })
    }
}

impl fmt::Display for AudioSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSetting::PlatformDefault => f.write_str("default"),
            AudioSetting::Silent => f.write_str("silent"),
            AudioSetting::Device { format, device } => write!(f, "{format}:{device}"),
        }
    }
}

impl<'de> Deserialize<'de> for AudioSetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

impl Serialize for AudioSetting {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_title() -> String {
    "recview".to_string()
}

fn default_frame_interval() -> Duration {
    Duration::from_micros(16_667)
}

fn default_video_codec() -> String {
    "auto".to_string()
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            mode: RenderModeSetting::default(),
            frame_interval: default_frame_interval(),
        }
    }
}

impl Default for RecordingSection {
    fn default() -> Self {
        Self {
            ffmpeg: None,
            audio: AudioSetting::default(),
            video_codec: default_video_codec(),
            output_dir: None,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            window: WindowSection::default(),
            render: RenderSection::default(),
            recording: RecordingSection::default(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&humantime::format_duration(*duration))
}

impl ViewConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ViewConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reads `path` when it exists, otherwise falls back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        let window = &self.window;
        for (name, value) in [("width", window.width), ("height", window.height)] {
            if value == 0 || value > MAX_WINDOW_DIMENSION {
                return Err(ConfigError::Invalid(format!(
                    "window.{name} must be between 1 and {MAX_WINDOW_DIMENSION}, got {value}"
                )));
            }
        }
        if window.title.trim().is_empty() {
            return Err(ConfigError::Invalid("window.title may not be empty".into()));
        }

        let interval = self.render.frame_interval;
        if interval.is_zero() || interval > Duration::from_secs(1) {
            return Err(ConfigError::Invalid(format!(
                "render.frame_interval must be within (0s, 1s], got {}",
                humantime::format_duration(interval)
            )));
        }

        let codec = self.recording.video_codec.as_str();
        if codec != "auto" && !KNOWN_VIDEO_CODECS.contains(&codec) {
            return Err(ConfigError::Invalid(format!(
                "recording.video_codec '{codec}' is not one of auto, {}",
                KNOWN_VIDEO_CODECS.join(", ")
            )));
        }

        if let Some(ffmpeg) = &self.recording.ffmpeg {
            if ffmpeg.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "recording.ffmpeg may not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg = ViewConfig::from_toml_str(
            r#"
version = 1

[window]
width = 800
height = 600
title = "demo"

[render]
mode = "on-demand"
frame_interval = "33ms"

[recording]
ffmpeg = "/usr/local/bin/ffmpeg"
audio = "pulse:alsa_input.usb"
video_codec = "h264_nvenc"
output_dir = "/tmp/captures"
"#,
        )
        .unwrap();

        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.render.mode, RenderModeSetting::OnDemand);
        assert_eq!(cfg.render.frame_interval, Duration::from_millis(33));
        assert_eq!(
            cfg.recording.audio,
            AudioSetting::Device {
                format: "pulse".into(),
                device: "alsa_input.usb".into()
            }
        );
        assert_eq!(cfg.recording.output_dir, Some(PathBuf::from("/tmp/captures")));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = ViewConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(cfg, ViewConfig::default());
        assert_eq!(cfg.render.frame_interval, Duration::from_micros(16_667));
        assert_eq!(cfg.recording.audio, AudioSetting::PlatformDefault);
    }

    #[test]
    fn numeric_frame_interval_is_seconds() {
        let cfg = ViewConfig::from_toml_str(
            r#"
version = 1
[render]
frame_interval = 0.5
"#,
        )
        .unwrap();
        assert_eq!(cfg.render.frame_interval, Duration::from_millis(500));
    }

    #[test]
    fn rejects_unknown_version_and_bad_values() {
        let err = ViewConfig::from_toml_str("version = 2").unwrap_err();
        assert!(err.to_string().contains("unsupported config version"));

        let err = ViewConfig::from_toml_str(
            r#"
version = 1
[window]
width = 0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ViewConfig::from_toml_str(
            r#"
version = 1
[recording]
video_codec = "mpeg2video"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("video_codec"));

        let err = ViewConfig::from_toml_str(
            r#"
version = 1
[recording]
audio = "pulse:"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn audio_setting_parses_keywords() {
        assert_eq!("silent".parse(), Ok(AudioSetting::Silent));
        assert_eq!("Default".parse(), Ok(AudioSetting::PlatformDefault));
        assert_eq!(
            "avfoundation::0".parse(),
            Ok(AudioSetting::Device {
                format: "avfoundation".into(),
                device: ":0".into()
            })
        );
        assert!("mic".parse::<AudioSetting>().is_err());
    }

    #[test]
    fn serialised_config_parses_back() {
        let mut cfg = ViewConfig::default();
        cfg.recording.audio = AudioSetting::Silent;
        cfg.render.mode = RenderModeSetting::OnDemand;
        let text = cfg.to_toml_string().unwrap();
        assert!(text.contains("mode = \"on-demand\""));
        assert!(text.contains("frame_interval = \"16ms 667us\""));
        assert_eq!(ViewConfig::from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ViewConfig::load_or_default(Path::new("/nonexistent/recview/config.toml"))
            .unwrap();
        assert_eq!(cfg, ViewConfig::default());
    }
}
