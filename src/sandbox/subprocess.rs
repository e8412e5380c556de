//! Subprocess fallback used when the container runtime is absent or fails
//! its probe. No isolation guarantees; `method` on the result always says
//! so. A fresh temporary directory backs every call and is removed on
//! every exit path via `tempfile::TempDir`'s drop guarantee.

use super::{cap_stream, Result, SandboxMethod, SandboxResult};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

async fn run(
    program: &str,
    args: &[&str],
    stdin_payload: &str,
    workdir: &std::path::Path,
    timeout: Duration,
    method: SandboxMethod,
) -> Result<SandboxResult> {
    let started = Instant::now();

    let mut child = Command::new(program)
        .args(args)
        .current_dir(workdir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(stdin_payload.as_bytes()).await.ok();
    }

    let outcome = tokio::time::timeout(timeout, child.wait_with_output()).await;

    match outcome {
        Ok(Ok(output)) => {
            let (stdout, stdout_truncated) = cap_stream(&output.stdout);
            let (stderr, stderr_truncated) = cap_stream(&output.stderr);
            Ok(SandboxResult {
                success: output.status.success(),
                stdout,
                stderr,
                exit_code: output.status.code().unwrap_or(-1),
                duration_ms: started.elapsed().as_millis() as u64,
                truncated: stdout_truncated || stderr_truncated,
                method,
            })
        }
        Ok(Err(err)) => Err(err.into()),
        Err(_) => {
            // `kill_on_drop(true)` on the Command above means dropping
            // `child` here (via the consumed `wait_with_output` future)
            // sends the kill signal instead of leaving it running.
            Ok(SandboxResult {
                success: false,
                stdout: String::new(),
                stderr: format!("sandbox timed out after {}s", timeout.as_secs()),
                exit_code: -1,
                duration_ms: timeout.as_millis() as u64,
                truncated: false,
                method,
            })
        }
    }
}

pub async fn run_code(
    data_dir: &std::path::Path,
    program: &str,
    timeout: Duration,
    packages: &[String],
) -> Result<SandboxResult> {
    let scratch = tempfile::Builder::new()
        .prefix("cradle-sandbox-")
        .tempdir_in(data_dir)?;

    let payload = if packages.is_empty() {
        program.to_string()
    } else {
        format!(
            "import subprocess, sys\nsubprocess.run([sys.executable, '-m', 'pip', 'install', '-q', {}], check=False)\n{program}",
            packages.iter().map(|p| format!("{p:?}")).collect::<Vec<_>>().join(", ")
        )
    };

    run(
        "python3",
        &["-"],
        &payload,
        scratch.path(),
        timeout,
        SandboxMethod::SubprocessFallback,
    )
    .await
}

pub async fn run_shell(
    data_dir: &std::path::Path,
    script: &str,
    timeout: Duration,
) -> Result<SandboxResult> {
    let scratch = tempfile::Builder::new()
        .prefix("cradle-sandbox-")
        .tempdir_in(data_dir)?;

    run(
        "sh",
        &[],
        script,
        scratch.path(),
        timeout,
        SandboxMethod::SubprocessFallback,
    )
    .await
}
