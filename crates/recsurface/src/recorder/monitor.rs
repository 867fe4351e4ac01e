//! Parses ffmpeg's stderr into recorder events.

use std::io::{BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::recorder::session::{RecorderFailure, RecorderInfo, RecorderListeners};

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) fn spawn<R>(stderr: R, listeners: RecorderListeners) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("recsurface-ffmpeg-monitor".into())
        .spawn(move || watch(stderr, listeners))
}

fn watch<R: Read>(stderr: R, listeners: RecorderListeners) {
    let mut reader = BufReader::new(stderr);
    let mut buffer = Vec::new();
    let mut last_log: Option<Instant> = None;

    // ffmpeg rewrites its progress line with '\r', so split on both terminators.
    loop {
        buffer.clear();
        match read_segment(&mut reader, &mut buffer) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "ffmpeg stderr closed");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match classify(line) {
            LineKind::Progress => {
                let progress = parse_progress(line);
                if last_log.map_or(true, |at| at.elapsed() >= PROGRESS_LOG_INTERVAL) {
                    if let RecorderInfo::Progress {
                        frame, time, bitrate, speed,
                    } = &progress
                    {
                        info!(?frame, ?time, ?bitrate, ?speed, "recording progress");
                    }
                    last_log = Some(Instant::now());
                }
                listeners.info(progress);
            }
            LineKind::Error => {
                debug!(line, "ffmpeg reported an error");
                listeners.error(RecorderFailure {
                    message: line.to_string(),
                });
            }
            LineKind::Other => debug!("ffmpeg: {line}"),
        }
    }
}

fn read_segment<R: BufRead>(reader: &mut R, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
    let mut total = 0;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(total);
        }
        if let Some(pos) = available.iter().position(|b| *b == b'\n' || *b == b'\r') {
            buffer.extend_from_slice(&available[..pos]);
            reader.consume(pos + 1);
            return Ok(total + pos + 1);
        }
        let len = available.len();
        buffer.extend_from_slice(available);
        reader.consume(len);
        total += len;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineKind {
    Progress,
    Error,
    Other,
}

fn classify(line: &str) -> LineKind {
    if line.contains("time=") && line.contains("bitrate=") {
        LineKind::Progress
    } else if line.contains("Error")
        || line.contains("error")
        || line.starts_with("Invalid")
        || line.contains("Conversion failed")
    {
        LineKind::Error
    } else {
        LineKind::Other
    }
}

fn parse_progress(line: &str) -> RecorderInfo {
    RecorderInfo::Progress {
        frame: extract_value(line, "frame=").and_then(|value| value.parse().ok()),
        time: extract_value(line, "time="),
        bitrate: extract_value(line, "bitrate=").filter(|value| value != "N/A"),
        speed: extract_value(line, "speed="),
    }
}

fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)?;
    let after_key = line[start + key.len()..].trim_start();
    let end = after_key
        .find(char::is_whitespace)
        .unwrap_or(after_key.len());
    let value = &after_key[..end];
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const PROGRESS: &str =
        "frame=  123 fps= 30 q=28.0 size=    1024kB time=00:00:04.10 bitrate=2046.1kbits/s speed=1.01x";

    #[test]
    fn extracts_padded_values() {
        assert_eq!(extract_value(PROGRESS, "frame="), Some("123".to_string()));
        assert_eq!(extract_value(PROGRESS, "time="), Some("00:00:04.10".to_string()));
        assert_eq!(extract_value(PROGRESS, "speed="), Some("1.01x".to_string()));
        assert_eq!(extract_value(PROGRESS, "missing="), None);
    }

    #[test]
    fn classifies_lines() {
        assert_eq!(classify(PROGRESS), LineKind::Progress);
        assert_eq!(
            classify("size=     512kB time=00:00:30.00 bitrate= 139.8kbits/s speed=1x"),
            LineKind::Progress
        );
        assert_eq!(
            classify("Error opening output file /nope/out.mp4."),
            LineKind::Error
        );
        assert_eq!(classify("Input #0, rawvideo, from 'pipe:0':"), LineKind::Other);
    }

    #[test]
    fn forwards_progress_and_errors_to_listeners() {
        let infos = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let listeners = RecorderListeners {
            on_info: Some({
                let infos = infos.clone();
                Arc::new(move |info: &RecorderInfo| infos.lock().unwrap().push(info.clone()))
            }),
            on_error: Some({
                let errors = errors.clone();
                Arc::new(move |failure: &RecorderFailure| {
                    errors.lock().unwrap().push(failure.message.clone())
                })
            }),
        };

        let stderr = format!("Input #0\n{PROGRESS}\r{PROGRESS}\rConversion failed!\n");
        watch(stderr.as_bytes(), listeners);

        let infos = infos.lock().unwrap();
        assert_eq!(infos.len(), 2);
        assert!(matches!(
            &infos[0],
            RecorderInfo::Progress { frame: Some(123), .. }
        ));
        assert_eq!(errors.lock().unwrap().as_slice(), ["Conversion failed!"]);
    }
}
