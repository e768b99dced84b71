//! The `stdio-dictionary` binary driving the demo backend.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use super::test_helpers::demo_backend;

fn cli() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_stdio-dictionary"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn lookup_prints_the_translation() {
    let output = cli()
        .arg("--command")
        .arg(demo_backend())
        .args(["lookup", "T/E/F/T"])
        .output()
        .expect("run cli");

    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_of(&output), "test\n");
}

#[test]
fn lookup_without_entry_says_so() {
    let output = cli()
        .arg("--command")
        .arg(demo_backend())
        .args(["lookup", "KPW/PWA"])
        .output()
        .expect("run cli");

    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_of(&output), "(no entry)\n");
}

#[test]
fn reverse_prints_one_outline_per_line() {
    let output = cli()
        .arg("--command")
        .arg(demo_backend())
        .args(["reverse", "test"])
        .output()
        .expect("run cli");

    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_of(&output), "T/E/F/T\nTEFT\n");
}

#[test]
fn config_file_drives_the_backend() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "command = {:?}\n\n[env]\nDEMO_HANDSHAKE = '{{\"longest-key\":2}}'",
        demo_backend().display().to_string()
    )
    .expect("write config");

    let output = cli()
        .arg("--config")
        .arg(file.path())
        .args(["lookup", "H-L"])
        .output()
        .expect("run cli");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_of(&output), "hello\n");

    let output = cli()
        .arg("--config")
        .arg(file.path())
        .args(["lookup", "T/E/F/T"])
        .output()
        .expect("run cli");
    assert!(!output.status.success(), "overlong key must be rejected");
}

#[test]
fn repl_answers_each_line() {
    let mut child = cli()
        .arg("--command")
        .arg(demo_backend())
        .arg("repl")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn cli");

    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"TEFT\n\n?hello\nKPW\n")
        .expect("write repl input");

    let output = child.wait_with_output().expect("wait cli");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_of(&output), "test\nH-L\n(no entry)\n");
}

#[test]
fn missing_backend_is_an_error() {
    let output = cli().args(["lookup", "TEFT"]).output().expect("run cli");
    assert!(!output.status.success());

    let output = cli()
        .args(["--command", "/nonexistent/backend", "lookup", "TEFT"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
}
