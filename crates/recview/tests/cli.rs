use std::fs;
use std::process::Command;

fn recview() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_recview"));
    command
        .env_remove("RECVIEW_CONFIG")
        .env_remove("RECVIEW_FFMPEG")
        .env_remove("RECVIEW_OUTPUT_DIR")
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn help_lists_recording_flags() {
    let output = recview().arg("--help").output().expect("spawn recview");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--record"));
    assert!(stdout.contains("--video-codec"));
}

#[test]
fn print_config_applies_file_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "version = 1\n[render]\nmode = \"on-demand\"\n[recording]\naudio = \"silent\"\n",
    )
    .unwrap();

    let output = recview()
        .env("RECVIEW_CONFIG", &path)
        .args(["--print-config", "--size", "640x480"])
        .output()
        .expect("spawn recview");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mode = \"on-demand\""), "{stdout}");
    assert!(stdout.contains("audio = \"silent\""), "{stdout}");
    assert!(stdout.contains("width = 640"), "{stdout}");
    assert!(stdout.contains("height = 480"), "{stdout}");
}

#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "version = 7\n").unwrap();

    let output = recview()
        .args(["--print-config", "--config"])
        .arg(&path)
        .output()
        .expect("spawn recview");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unsupported config version"));
}
