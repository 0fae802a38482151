use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_USAGE_ERROR: i32 = 64;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{nanos}"))
}

fn dataeng() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_dataeng"));
    for key in [
        "SNOWFLAKE_HOST",
        "SNOWFLAKE_HOME",
        "SNOWFLAKE_CONNECTION_NAME",
        "SNOWFLAKE_TOKEN_FILE",
        "RUST_LOG",
    ] {
        command.env_remove(key);
    }
    command
}

#[test]
fn missing_subcommand_exits_with_usage_code() {
    let status = dataeng()
        .arg("preview")
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_USAGE_ERROR));
}

#[test]
fn invalid_row_limit_exits_with_usage_code() {
    let status = dataeng()
        .args(["preview", "table", "--limit", "5000"])
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_USAGE_ERROR));
}

#[test]
fn help_exits_zero() {
    let status = dataeng()
        .arg("--help")
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_SUCCESS));
}

#[test]
fn bootstrap_failure_exits_with_runtime_code() {
    let temp = unique_temp_dir("dataeng-exit-bootstrap");
    std::fs::create_dir_all(&temp).expect("temp dir should be creatable");

    let output = dataeng()
        .args(["--home-dir"])
        .arg(&temp)
        .args(["--cwd"])
        .arg(&temp)
        .args(["preview", "pipelines"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connections file not found"), "{stderr}");
}

#[test]
fn relative_home_dir_exits_with_runtime_code() {
    let status = dataeng()
        .args(["--home-dir", "relative", "agent", "ask", "hello"])
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_RUNTIME_FAILURE));
}

#[test]
fn verify_without_snow_still_exits_zero() {
    let output = dataeng()
        .args(["verify", "--client", "/nonexistent/dataeng-test-snow"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("All components verified!"), "{stdout}");
}
