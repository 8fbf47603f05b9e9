use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use quarry_core::tools::{Tool, ToolContext, ToolError, ToolOutput};
use quarry_sandbox::CodeExecutor;

/// Runs a complete Python script inside the sandbox. Script failures come
/// back as error-flagged output the agent can iterate on.
pub struct ExecuteCodeTool {
    executor: Arc<dyn CodeExecutor>,
}

impl ExecuteCodeTool {
    pub fn new(executor: Arc<dyn CodeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Run a complete Python script in the sandboxed analysis environment. \
         Data files are mounted read-only at /mnt/data; write every output \
         under /mnt/outputs. Nothing persists between calls, so each script \
         must be self-contained."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["code"],
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Complete Python script, including imports and print statements"
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let code = args["code"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("code is required".to_string()))?;

        match self.executor.execute(code).await {
            Ok(result) => {
                let rendered = result.render();
                if result.success() {
                    Ok(ToolOutput::ok(rendered, start.elapsed()))
                } else {
                    Ok(ToolOutput::error(rendered, start.elapsed()))
                }
            }
            Err(e) => Ok(ToolOutput::error(
                format!("Execution failed: {e}"),
                start.elapsed(),
            )),
        }
    }
}
