use async_trait::async_trait;

use crate::error::SandboxError;

/// Outcome of running one code unit inside the sandbox. A non-zero exit is a
/// normal result the agent reacts to, never a `SandboxError`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_status: Option<i32>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Single-string view handed back to the agent: stdout, then stderr under
    /// a marker, then the exit code when non-zero.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.stdout.is_empty() {
            out.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("STDERR:\n");
            out.push_str(&self.stderr);
        }
        if out.is_empty() {
            out.push_str("(no output)");
        }
        match self.exit_status {
            Some(0) => out,
            Some(code) => format!("Exit code: {code}\n{out}"),
            None => format!("Killed by signal\n{out}"),
        }
    }
}

/// Lifecycle and execution seam between the agents and the container.
/// `DockerSandbox` is the production implementation; tests script a
/// `MockExecutor` instead.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Launch the environment and block until it accepts commands.
    async fn start(&self) -> Result<(), SandboxError>;

    /// Run one code unit. Non-zero exit comes back as a normal result.
    async fn execute(&self, code: &str) -> Result<ExecutionResult, SandboxError>;

    /// Tear the environment down. Idempotent.
    async fn stop(&self) -> Result<(), SandboxError>;
}
