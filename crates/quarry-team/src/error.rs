use quarry_engine::EngineError;
use quarry_sandbox::SandboxError;
use quarry_store::StoreError;

/// Errors that abort a run. Recoverable conditions (turn limits, tool
/// failures, unrecognized stop reasons) are absorbed by the control loop and
/// never appear here.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operator input failed: {0}")]
    OperatorInput(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_errors_convert_transparently() {
        let err: RunError = SandboxError::StartFailed("no docker".into()).into();
        assert_eq!(err.to_string(), "sandbox start failed: no docker");
    }
}
