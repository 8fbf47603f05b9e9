//! Docker-backed sandbox. Provisions one container per run via the `docker`
//! CLI, installs the analysis stack, and pipes code units to `python -` over
//! stdin.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use quarry_core::config::SandboxSettings;

use crate::error::SandboxError;
use crate::executor::{CodeExecutor, ExecutionResult};

/// Mount points the agents are instructed to use in generated code.
pub const DATA_MOUNT: &str = "/mnt/data";
pub const OUTPUTS_MOUNT: &str = "/mnt/outputs";

/// Interval between interpreter readiness probes.
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-stream output cap for one execution.
const MAX_OUTPUT_BYTES: usize = 1_000_000; // 1MB

/// Docker-based sandbox bound to the run's `data/` and `outputs/` host
/// directories. `create` validates the directories, `start` launches the
/// container, and `stop` force-removes it (idempotent).
pub struct DockerSandbox {
    container_name: String,
    image: String,
    init_packages: Vec<String>,
    wait: Duration,
    exec_timeout: Duration,
    data_dir: PathBuf,
    outputs_dir: PathBuf,
    started: AtomicBool,
    stopped: AtomicBool,
    container_id: Mutex<Option<String>>,
}

impl DockerSandbox {
    /// Validate (and create, if missing) the two host directories. No
    /// container exists yet after this returns.
    pub fn create(
        data_dir: impl Into<PathBuf>,
        outputs_dir: impl Into<PathBuf>,
        settings: &SandboxSettings,
    ) -> Result<Self, SandboxError> {
        let data_dir = absolutize(data_dir.into())?;
        let outputs_dir = absolutize(outputs_dir.into())?;
        for dir in [&data_dir, &outputs_dir] {
            std::fs::create_dir_all(dir).map_err(|source| SandboxError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(Self {
            container_name: format!("quarry_{}", uuid::Uuid::now_v7().simple()),
            image: settings.image.clone(),
            init_packages: settings.init_packages.clone(),
            wait: settings.wait,
            exec_timeout: settings.exec_timeout,
            data_dir,
            outputs_dir,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            container_id: Mutex::new(None),
        })
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    /// `docker run -d` with both mounts and an idle entrypoint.
    async fn launch_container(&self) -> Result<String, SandboxError> {
        let data_mount = format!("{}:{}", self.data_dir.display(), DATA_MOUNT);
        let outputs_mount = format!("{}:{}", self.outputs_dir.display(), OUTPUTS_MOUNT);
        let args = [
            "run",
            "-d",
            "--name",
            &self.container_name,
            "-v",
            &data_mount,
            "-v",
            &outputs_mount,
            "-w",
            OUTPUTS_MOUNT,
            &self.image,
            "tail",
            "-f",
            "/dev/null",
        ];

        tracing::info!(image = %self.image, container = %self.container_name, "launching sandbox container");

        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| SandboxError::DockerUnavailable(format!("docker run: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::StartFailed(format!(
                "docker run failed: {stderr}"
            )));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if container_id.is_empty() {
            return Err(SandboxError::StartFailed(
                "docker run returned empty container ID".into(),
            ));
        }
        Ok(container_id)
    }

    /// Blocking `pip install` of the analysis stack inside the container.
    async fn install_packages(&self) -> Result<(), SandboxError> {
        if self.init_packages.is_empty() {
            return Ok(());
        }

        tracing::info!(packages = ?self.init_packages, "installing sandbox packages");

        let mut args = vec!["exec", self.container_name.as_str(), "pip", "install"];
        args.extend(self.init_packages.iter().map(String::as_str));

        let output = Command::new("docker")
            .args(&args)
            .output()
            .await
            .map_err(|e| SandboxError::DockerUnavailable(format!("docker exec pip: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::StartFailed(format!(
                "package install failed: {stderr}"
            )));
        }
        Ok(())
    }

    /// Probe the interpreter at a fixed interval until it imports the
    /// installed stack, with `self.wait` as the deadline.
    async fn wait_ready(&self) -> Result<(), SandboxError> {
        let probe = probe_statement(&self.init_packages);
        let deadline = tokio::time::Instant::now() + self.wait;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let output = Command::new("docker")
                .args(["exec", &self.container_name, "python", "-c", &probe])
                .output()
                .await
                .map_err(|e| SandboxError::DockerUnavailable(format!("docker exec probe: {e}")))?;

            if output.status.success() {
                tracing::info!(attempts, "sandbox interpreter ready");
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                let logs = capture_container_logs(&self.container_name, 50).await;
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                return Err(SandboxError::NotReady {
                    deadline: self.wait,
                    detail: format!(
                        "last probe: {stderr}\n--- container logs (last 50 lines) ---\n{logs}"
                    ),
                });
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl CodeExecutor for DockerSandbox {
    #[tracing::instrument(level = "info", skip(self), fields(container = %self.container_name))]
    async fn start(&self) -> Result<(), SandboxError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SandboxError::StartFailed("sandbox already started".into()));
        }

        let container_id = self.launch_container().await?;
        *self.container_id.lock() = Some(container_id);

        // Container exists from here on; failures below still leave it
        // removable by stop().
        self.install_packages().await?;
        self.wait_ready().await?;

        tracing::info!("sandbox ready");
        Ok(())
    }

    async fn execute(&self, code: &str) -> Result<ExecutionResult, SandboxError> {
        // Piping over stdin avoids shell quoting and a third mount.
        let mut child = Command::new("docker")
            .args(["exec", "-i", &self.container_name, "python", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::ExecFailed(format!("spawn docker exec: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| SandboxError::ExecFailed(format!("write code to stdin: {e}")))?;
            // Dropping stdin closes the pipe so python sees EOF.
        }

        let output = tokio::time::timeout(self.exec_timeout, child.wait_with_output())
            .await
            .map_err(|_| SandboxError::ExecTimeout(self.exec_timeout))?
            .map_err(|e| SandboxError::ExecFailed(format!("wait for docker exec: {e}")))?;

        Ok(ExecutionResult {
            stdout: truncate_stream(&String::from_utf8_lossy(&output.stdout)),
            stderr: truncate_stream(&String::from_utf8_lossy(&output.stderr)),
            exit_status: output.status.code(),
        })
    }

    #[tracing::instrument(level = "info", skip(self), fields(container = %self.container_name))]
    async fn stop(&self) -> Result<(), SandboxError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let output = Command::new("docker")
            .args(["rm", "-f", &self.container_name])
            .output()
            .await
            .map_err(|e| SandboxError::DockerUnavailable(format!("docker rm: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(%stderr, "docker rm -f returned non-zero (container may already be gone)");
        }

        tracing::info!("sandbox container removed");
        Ok(())
    }
}

/// Make a host directory absolute so the bind mount is unambiguous.
fn absolutize(path: PathBuf) -> Result<PathBuf, SandboxError> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|source| SandboxError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(cwd.join(path))
}

/// Import statement probing the installed stack. Packages without a known
/// module name are skipped; an empty set degrades to a bare interpreter check.
fn probe_statement(packages: &[String]) -> String {
    const MODULES: &[(&str, &str)] = &[
        ("pandas", "pandas"),
        ("numpy", "numpy"),
        ("scikit-learn", "sklearn"),
        ("matplotlib", "matplotlib"),
        ("seaborn", "seaborn"),
        ("plotly", "plotly"),
        ("kaleido", "kaleido"),
    ];
    let imports: Vec<&str> = packages
        .iter()
        .filter_map(|pkg| {
            MODULES
                .iter()
                .find(|(pip_name, _)| pip_name == pkg)
                .map(|(_, module)| *module)
        })
        .collect();
    if imports.is_empty() {
        "pass".to_string()
    } else {
        format!("import {}", imports.join(", "))
    }
}

fn truncate_stream(stream: &str) -> String {
    if stream.len() <= MAX_OUTPUT_BYTES {
        return stream.to_string();
    }
    let mut cut = MAX_OUTPUT_BYTES;
    while !stream.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}...\n[truncated: {} bytes total]",
        &stream[..cut],
        stream.len()
    )
}

/// Last `tail` lines of container logs, best-effort; empty string on failure.
async fn capture_container_logs(container: &str, tail: usize) -> String {
    let result = Command::new("docker")
        .args(["logs", "--tail", &tail.to_string(), container])
        .output()
        .await;

    match result {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            format!("{stdout}{stderr}")
        }
        Err(_) => String::new(),
    }
}
