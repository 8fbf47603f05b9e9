use std::time::Instant;

use async_trait::async_trait;

use quarry_core::tools::{Tool, ToolContext, ToolError, ToolOutput};

use crate::tools::strip_mount_prefix;

/// Writes a text file into one of the workspace roots, creating parent
/// directories as needed.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a text file inside a workspace root, replacing it if it \
         exists. Deliverables go under the 'outputs' root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["root", "path", "content"],
            "properties": {
                "root": {
                    "type": "string",
                    "enum": ["data", "outputs"],
                    "description": "Workspace root to write under"
                },
                "path": {
                    "type": "string",
                    "description": "File path relative to the root, e.g. 'business_report.md'"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let root = args["root"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("root is required".to_string()))?;
        let path = args["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("path is required".to_string()))?;
        let content = args["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("content is required".to_string()))?;

        let path = strip_mount_prefix(root, path);
        let full = ctx.roots.resolve(root, path)?;

        if let Some(parent) = full.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolOutput::error(
                    format!("Failed to write {root}/{path}: {e}"),
                    start.elapsed(),
                ));
            }
        }
        match tokio::fs::write(&full, content).await {
            Ok(()) => Ok(ToolOutput::ok(
                format!(
                    "Wrote {} bytes ({} lines) to {root}/{path}",
                    content.len(),
                    content.lines().count()
                ),
                start.elapsed(),
            )),
            Err(e) => Ok(ToolOutput::error(
                format!("Failed to write {root}/{path}: {e}"),
                start.elapsed(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tools::test_support::test_ctx;

    #[tokio::test]
    async fn writes_into_outputs_root() {
        let (ctx, _data, outputs) = test_ctx("write");
        let tool = WriteFileTool;

        let output = tool
            .execute(
                serde_json::json!({
                    "root": "outputs",
                    "path": "report.md",
                    "content": "# Report\nline two\n"
                }),
                &ctx,
            )
            .await
            .unwrap();

        assert!(!output.is_error);
        assert_eq!(output.content, "Wrote 18 bytes (2 lines) to outputs/report.md");
        assert_eq!(
            std::fs::read_to_string(outputs.join("report.md")).unwrap(),
            "# Report\nline two\n"
        );
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let (ctx, _data, outputs) = test_ctx("write-nested");
        let tool = WriteFileTool;

        let output = tool
            .execute(
                serde_json::json!({
                    "root": "outputs",
                    "path": "nested/deep/file.txt",
                    "content": "x"
                }),
                &ctx,
            )
            .await
            .unwrap();

        assert!(!output.is_error);
        assert!(outputs.join("nested/deep/file.txt").exists());
    }

    #[tokio::test]
    async fn strips_container_mount_prefix() {
        let (ctx, _data, outputs) = test_ctx("write-mount");
        let tool = WriteFileTool;

        let output = tool
            .execute(
                serde_json::json!({
                    "root": "outputs",
                    "path": "/mnt/outputs/analysis_result.md",
                    "content": "done"
                }),
                &ctx,
            )
            .await
            .unwrap();

        assert!(!output.is_error);
        assert!(outputs.join("analysis_result.md").exists());
    }

    #[tokio::test]
    async fn rejects_escaping_path() {
        let (ctx, ..) = test_ctx("write-escape");
        let tool = WriteFileTool;

        let err = tool
            .execute(
                serde_json::json!({
                    "root": "outputs",
                    "path": "../outside.txt",
                    "content": "x"
                }),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_content_is_invalid_arguments() {
        let (ctx, ..) = test_ctx("write-args");
        let tool = WriteFileTool;

        let err = tool
            .execute(
                serde_json::json!({"root": "outputs", "path": "a.txt"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("content is required"));
    }
}
