use std::time::Instant;

use async_trait::async_trait;

use quarry_core::tools::{Tool, ToolContext, ToolError, ToolOutput};

/// Lists the top-level entries of a workspace root, directories marked with
/// a trailing slash.
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries at the top level of a workspace root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["root"],
            "properties": {
                "root": {
                    "type": "string",
                    "enum": ["data", "outputs"],
                    "description": "Workspace root to list"
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
        let dir = ctx.roots.dir_for(root)?.to_path_buf();

        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) => {
                return Ok(ToolOutput::error(
                    format!("Failed to list {root}: {e}"),
                    start.elapsed(),
                ))
            }
        };

        let mut names = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                        name.push('/');
                    }
                    names.push(name);
                }
                Ok(None) => break,
                Err(e) => {
                    return Ok(ToolOutput::error(
                        format!("Failed to list {root}: {e}"),
                        start.elapsed(),
                    ))
                }
            }
        }

        if names.is_empty() {
            return Ok(ToolOutput::ok("(empty)", start.elapsed()));
        }
        names.sort();
        Ok(ToolOutput::ok(names.join("\n"), start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tools::test_support::test_ctx;

    #[tokio::test]
    async fn lists_sorted_entries_with_dir_markers() {
        let (ctx, data, _outputs) = test_ctx("list");
        std::fs::write(data.join("sales.csv"), "a,b\n").unwrap();
        std::fs::write(data.join("README.txt"), "x").unwrap();
        std::fs::create_dir(data.join("archive")).unwrap();
        let tool = ListFilesTool;

        let output = tool
            .execute(serde_json::json!({"root": "data"}), &ctx)
            .await
            .unwrap();

        assert!(!output.is_error);
        assert_eq!(output.content, "README.txt\narchive/\nsales.csv");
    }

    #[tokio::test]
    async fn empty_root_is_named() {
        let (ctx, ..) = test_ctx("list-empty");
        let tool = ListFilesTool;

        let output = tool
            .execute(serde_json::json!({"root": "outputs"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output.content, "(empty)");
    }

    #[tokio::test]
    async fn unknown_root_is_invalid_arguments() {
        let (ctx, ..) = test_ctx("list-root");
        let tool = ListFilesTool;

        let err = tool
            .execute(serde_json::json!({"root": "workspace"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
