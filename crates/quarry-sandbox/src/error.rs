use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The Docker daemon could not be reached or the CLI is missing.
    #[error("docker unavailable: {0}")]
    DockerUnavailable(String),

    /// Container launch or in-container package install failed. Fatal to the
    /// run; never retried.
    #[error("sandbox start failed: {0}")]
    StartFailed(String),

    /// The interpreter never became responsive within the readiness deadline.
    #[error("sandbox not ready after {deadline:?}: {detail}")]
    NotReady { deadline: Duration, detail: String },

    /// The exec client itself failed (spawn error, broken pipe). Non-zero
    /// exit of the executed code is NOT an error; see `ExecutionResult`.
    #[error("execution failed: {0}")]
    ExecFailed(String),

    #[error("execution timed out after {0:?}")]
    ExecTimeout(Duration),

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
