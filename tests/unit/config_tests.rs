//! Unit tests for adapter configuration parsing.

use std::io::Write;
use std::time::Duration;

use stdio_dictionary::stdio::spawner::{DEFAULT_SHUTDOWN_GRACE, DEFAULT_STARTUP_TIMEOUT};
use stdio_dictionary::{AdapterConfig, AppError};

#[test]
fn minimal_config_takes_defaults() {
    let config = AdapterConfig::from_toml_str(r#"command = "my-dictionary""#).expect("valid");

    assert!(config.args.is_empty());
    assert!(config.env.is_empty());
    assert_eq!(config.working_dir, None);
    assert_eq!(config.startup_timeout_seconds, 30);
    assert_eq!(config.shutdown_grace_ms, 2000);

    let spawn = config.to_spawn_config();
    assert_eq!(spawn.startup_timeout, Some(DEFAULT_STARTUP_TIMEOUT));
    assert_eq!(spawn.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
}

#[test]
fn full_config_converts_to_spawn_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        r#"
command = "/usr/local/bin/dict"
args = ["--strict", "-v"]
working_dir = "{}"
startup_timeout_seconds = 5
shutdown_grace_ms = 250

[env]
DICT_LANG = "en"
"#,
        dir.path().display().to_string().replace('\\', "\\\\")
    );

    let spawn = AdapterConfig::from_toml_str(&raw)
        .expect("valid")
        .to_spawn_config();

    assert_eq!(spawn.command.to_str(), Some("/usr/local/bin/dict"));
    assert_eq!(spawn.args, vec!["--strict".to_owned(), "-v".to_owned()]);
    assert_eq!(spawn.env.get("DICT_LANG").map(String::as_str), Some("en"));
    assert_eq!(spawn.working_dir.as_deref(), Some(dir.path()));
    assert_eq!(spawn.startup_timeout, Some(Duration::from_secs(5)));
    assert_eq!(spawn.shutdown_grace, Duration::from_millis(250));
}

#[test]
fn zero_startup_timeout_waits_forever() {
    let config = AdapterConfig::from_toml_str(
        r#"
command = "dict"
startup_timeout_seconds = 0
"#,
    )
    .expect("valid");

    assert_eq!(config.to_spawn_config().startup_timeout, None);
}

#[test]
fn empty_command_is_rejected() {
    let err = AdapterConfig::from_toml_str(r#"command = """#).expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("command")));
}

#[test]
fn missing_command_is_rejected() {
    let err = AdapterConfig::from_toml_str("args = []").expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = AdapterConfig::from_toml_str(
        r#"
command = "dict"
max_latency_ms = 10
"#,
    )
    .expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn missing_working_dir_is_rejected() {
    let err = AdapterConfig::from_toml_str(
        r#"
command = "dict"
working_dir = "/definitely/not/a/real/dir"
"#,
    )
    .expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("working_dir")));
}

#[test]
fn config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, r#"command = "dict""#).expect("write");
    writeln!(file, r#"args = ["--fast"]"#).expect("write");

    let config = AdapterConfig::load_from_path(file.path()).expect("load");
    assert_eq!(config.args, vec!["--fast".to_owned()]);
}

#[test]
fn unreadable_file_is_a_config_error() {
    let err = AdapterConfig::load_from_path("/definitely/not/here.toml").expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}
