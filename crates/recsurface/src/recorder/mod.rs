//! Recording pipeline: the persistent encoder input fed by the render
//! thread, and the session that drives an encoder over it.

mod ffmpeg;
mod input;
mod monitor;
pub mod session;

pub use ffmpeg::{
    AudioSource, CodecChoice, FfmpegCommandBuilder, FfmpegEncoder, FfmpegSettings, VideoCodec,
};
pub use input::{EncoderInput, VideoFrame};
pub use session::{
    EncoderRequest, ErrorCallback, InfoCallback, MediaEncoder, RecorderFailure, RecorderInfo,
    RecorderListeners, RecordingSession, SessionState, StopOutcome,
};
