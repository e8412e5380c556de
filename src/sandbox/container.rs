//! Container-backed sandbox execution via the local Docker engine (`bollard`).
//!
//! Every call launches a fresh, auto-removed container: all capabilities
//! dropped, a bounded memory/CPU/PID allowance, a read-only root, and the
//! program delivered over the container's stdin rather than a host mount.

use super::{cap_stream, timeout_result, Result, SandboxError, SandboxMethod, SandboxResult};
use bollard::container::{
    AttachContainerOptions, Config, RemoveContainerOptions, StartContainerOptions,
};
use bollard::models::{HostConfig, ResourcesUlimits};
use bollard::Docker;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

const DEFAULT_SCRIPT_IMAGE: &str = "python:3.12-slim";
const MEMORY_CAP_BYTES: i64 = 512 * 1024 * 1024;
const PIDS_LIMIT: i64 = 100;

fn connect() -> Result<Docker> {
    Docker::connect_with_local_defaults().map_err(|e| SandboxError::Container(e.to_string()))
}

/// Probe the container runtime at most once per process; callers memoize
/// the result via `SandboxDriver`'s `OnceCell`.
pub async fn probe() -> bool {
    match connect() {
        Ok(docker) => docker.ping().await.is_ok(),
        Err(_) => false,
    }
}

fn host_config(network: bool) -> HostConfig {
    HostConfig {
        cap_drop: Some(vec!["ALL".to_string()]),
        memory: Some(MEMORY_CAP_BYTES),
        nano_cpus: Some(1_000_000_000),
        pids_limit: Some(PIDS_LIMIT),
        readonly_rootfs: Some(true),
        network_mode: Some(if network { "bridge".to_string() } else { "none".to_string() }),
        ulimits: Some(vec![ResourcesUlimits {
            name: Some("nofile".to_string()),
            soft: Some(256),
            hard: Some(256),
        }]),
        auto_remove: Some(true),
        ..Default::default()
    }
}

fn forwarded_env() -> Vec<String> {
    super::FORWARDED_ENV_ALLOWLIST
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| format!("{key}={v}")))
        .collect()
}

/// Run `cmd` inside a fresh container, feeding `stdin_payload` on the
/// container's standard input, capping output streams, and killing on
/// timeout. Always removes the temporary container on every exit path.
async fn run_container(
    image: &str,
    cmd: Vec<String>,
    stdin_payload: &str,
    timeout: Duration,
    network: bool,
    method: SandboxMethod,
) -> Result<SandboxResult> {
    let docker = connect()?;
    let started = Instant::now();

    let config = Config {
        image: Some(image.to_string()),
        cmd: Some(cmd),
        env: Some(forwarded_env()),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        open_stdin: Some(true),
        stdin_once: Some(true),
        tty: Some(false),
        working_dir: Some("/workspace".to_string()),
        host_config: Some(host_config(network)),
        ..Default::default()
    };

    let created = docker
        .create_container::<&str, String>(None, config)
        .await
        .map_err(|e| SandboxError::Container(e.to_string()))?;
    let container_id = created.id;

    let run = async {
        docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::Container(e.to_string()))?;

        let attach = docker
            .attach_container(
                &container_id,
                Some(AttachContainerOptions::<String> {
                    stdin: Some(true),
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| SandboxError::Container(e.to_string()))?;

        let mut input = attach.input;
        input
            .write_all(stdin_payload.as_bytes())
            .await
            .map_err(SandboxError::Subprocess)?;
        input.shutdown().await.ok();

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut output = attach.output;
        while let Some(Ok(chunk)) = output.next().await {
            use bollard::container::LogOutput;
            match chunk {
                LogOutput::StdOut { message } => stdout_buf.extend_from_slice(&message),
                LogOutput::StdErr { message } => stderr_buf.extend_from_slice(&message),
                _ => {}
            }
            if stdout_buf.len() > super::OUTPUT_CAP_BYTES * 2
                && stderr_buf.len() > super::OUTPUT_CAP_BYTES * 2
            {
                break;
            }
        }

        let mut wait_stream = docker.wait_container::<String>(&container_id, None);
        let exit_code = match wait_stream.next().await {
            Some(Ok(w)) => w.status_code as i32,
            _ => -1,
        };

        Ok::<_, SandboxError>((stdout_buf, stderr_buf, exit_code))
    };

    let outcome = tokio::time::timeout(timeout, run).await;

    let result = match outcome {
        Ok(Ok((stdout_buf, stderr_buf, exit_code))) => {
            let (stdout, stdout_truncated) = cap_stream(&stdout_buf);
            let (stderr, stderr_truncated) = cap_stream(&stderr_buf);
            SandboxResult {
                success: exit_code == 0,
                stdout,
                stderr,
                exit_code,
                duration_ms: started.elapsed().as_millis() as u64,
                truncated: stdout_truncated || stderr_truncated,
                method,
            }
        }
        Ok(Err(err)) => return Err(err),
        Err(_) => timeout_result(method, timeout),
    };

    let _ = docker
        .remove_container(
            &container_id,
            Some(RemoveContainerOptions { force: true, ..Default::default() }),
        )
        .await;

    Ok(result)
}

pub async fn run_code(
    program: &str,
    timeout: Duration,
    packages: &[String],
    network: bool,
) -> Result<SandboxResult> {
    let stdin_payload = if packages.is_empty() {
        program.to_string()
    } else {
        format!(
            "import subprocess, sys\nsubprocess.run([sys.executable, '-m', 'pip', 'install', '-q', {}], check=False)\n{program}",
            packages
                .iter()
                .map(|p| format!("{p:?}"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    run_container(
        DEFAULT_SCRIPT_IMAGE,
        vec!["python3".to_string(), "-".to_string()],
        &stdin_payload,
        timeout,
        network,
        SandboxMethod::ContainerStdin,
    )
    .await
}

pub async fn run_shell(
    script: &str,
    base_image: &str,
    timeout: Duration,
    network: bool,
) -> Result<SandboxResult> {
    run_container(
        base_image,
        vec!["sh".to_string()],
        script,
        timeout,
        network,
        SandboxMethod::ContainerShell,
    )
    .await
}
