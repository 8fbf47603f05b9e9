//! Scripted executor for deterministic tests without a Docker daemon.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::SandboxError;
use crate::executor::{CodeExecutor, ExecutionResult};

/// Pre-programmed execution outcomes, consumed in order.
pub enum MockExecution {
    Result(ExecutionResult),
    Error(fn() -> SandboxError),
}

impl MockExecution {
    /// Convenience: a successful run printing `stdout`.
    pub fn stdout(stdout: &str) -> Self {
        Self::Result(ExecutionResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_status: Some(0),
        })
    }

    /// Convenience: a failed run with a traceback on stderr.
    pub fn failure(stderr: &str, exit_status: i32) -> Self {
        Self::Result(ExecutionResult {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_status: Some(exit_status),
        })
    }
}

/// Executor that returns scripted results and records every lifecycle call.
pub struct MockExecutor {
    executions: Mutex<Vec<MockExecution>>,
    executed_code: Mutex<Vec<String>>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    fail_start: bool,
}

impl MockExecutor {
    pub fn new(executions: Vec<MockExecution>) -> Self {
        Self {
            executions: Mutex::new(executions),
            executed_code: Mutex::new(Vec::new()),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            fail_start: false,
        }
    }

    /// An executor whose `start` fails, for exercising fatal-start paths.
    pub fn failing_start() -> Self {
        let mut mock = Self::new(vec![]);
        mock.fail_start = true;
        mock
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::Relaxed)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::Relaxed)
    }

    /// Code units passed to `execute`, in order.
    pub fn executed_code(&self) -> Vec<String> {
        self.executed_code.lock().clone()
    }
}

#[async_trait]
impl CodeExecutor for MockExecutor {
    async fn start(&self) -> Result<(), SandboxError> {
        self.start_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_start {
            return Err(SandboxError::StartFailed("scripted start failure".into()));
        }
        Ok(())
    }

    async fn execute(&self, code: &str) -> Result<ExecutionResult, SandboxError> {
        self.executed_code.lock().push(code.to_string());

        let mut executions = self.executions.lock();
        if executions.is_empty() {
            return Err(SandboxError::ExecFailed(
                "MockExecutor: no execution scripted for this call".into(),
            ));
        }
        match executions.remove(0) {
            MockExecution::Result(result) => Ok(result),
            MockExecution::Error(make) => Err(make()),
        }
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        self.stop_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_results_in_order() {
        let mock = MockExecutor::new(vec![
            MockExecution::stdout("first"),
            MockExecution::failure("boom", 1),
        ]);

        let a = mock.execute("print('a')").await.unwrap();
        assert_eq!(a.stdout, "first");
        assert!(a.success());

        let b = mock.execute("print('b')").await.unwrap();
        assert!(!b.success());
        assert_eq!(b.stderr, "boom");

        assert_eq!(mock.executed_code(), vec!["print('a')", "print('b')"]);
    }

    #[tokio::test]
    async fn exhausted_script_is_an_error() {
        let mock = MockExecutor::new(vec![]);
        let result = mock.execute("print(1)").await;
        assert!(matches!(result, Err(SandboxError::ExecFailed(_))));
    }

    #[tokio::test]
    async fn lifecycle_calls_are_counted() {
        let mock = MockExecutor::new(vec![]);
        mock.start().await.unwrap();
        mock.stop().await.unwrap();
        mock.stop().await.unwrap();
        assert_eq!(mock.start_calls(), 1);
        assert_eq!(mock.stop_calls(), 2);
    }

    #[tokio::test]
    async fn failing_start() {
        let mock = MockExecutor::failing_start();
        assert!(matches!(
            mock.start().await,
            Err(SandboxError::StartFailed(_))
        ));
    }
}
