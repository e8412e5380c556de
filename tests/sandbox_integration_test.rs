//! Integration tests for the sandbox driver's subprocess fallback path.
//! These do not require a container runtime; `SandboxDriver` falls back
//! automatically when the container probe fails, which it always does in
//! a CI environment without a docker socket.

use cradle::sandbox::SandboxDriver;
use std::time::Duration;

#[tokio::test]
async fn run_shell_executes_and_captures_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let driver = SandboxDriver::new(dir.path().to_path_buf());

    let result = driver
        .run_shell("echo hello-from-sandbox", "alpine:3", Duration::from_secs(10), false)
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.stdout.contains("hello-from-sandbox"));
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn run_shell_reports_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let driver = SandboxDriver::new(dir.path().to_path_buf());

    let result = driver
        .run_shell("exit 7", "alpine:3", Duration::from_secs(10), false)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.exit_code, 7);
}

#[tokio::test]
async fn run_code_executes_python_and_captures_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let driver = SandboxDriver::new(dir.path().to_path_buf());

    let result = driver
        .run_code("print('hi from python')", Duration::from_secs(10), &[], false)
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.stdout.contains("hi from python"));
}
