use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;

use quarry_core::tools::{Tool, ToolContext, ToolError, ToolOutput};

/// Matches files under a workspace root with a glob pattern, recursing with
/// `**` where needed.
pub struct GlobFilesTool;

#[async_trait]
impl Tool for GlobFilesTool {
    fn name(&self) -> &str {
        "glob_files"
    }

    fn description(&self) -> &str {
        "Find files under a workspace root matching a glob pattern, e.g. \
         '*.csv' or '**/*.jpg'. Paths come back relative to the root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["root", "pattern"],
            "properties": {
                "root": {
                    "type": "string",
                    "enum": ["data", "outputs"],
                    "description": "Workspace root to search"
                },
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern relative to the root"
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
        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("pattern is required".to_string()))?;

        let relative = Path::new(pattern);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ToolError::InvalidArguments(format!(
                "pattern '{pattern}' must stay inside the {root} root"
            )));
        }

        let base = ctx.roots.dir_for(root)?.to_path_buf();
        let full_pattern = base.join(relative).to_string_lossy().into_owned();

        // glob walks the filesystem; keep it off the async runtime.
        let matched = tokio::task::spawn_blocking(move || {
            glob::glob(&full_pattern).map(|paths| paths.flatten().collect::<Vec<PathBuf>>())
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("glob task failed: {e}")))?;

        let mut matched = match matched {
            Ok(matched) => matched,
            Err(e) => {
                return Err(ToolError::InvalidArguments(format!(
                    "invalid pattern '{pattern}': {e}"
                )))
            }
        };

        if matched.is_empty() {
            return Ok(ToolOutput::ok("No files matched the pattern.", start.elapsed()));
        }

        matched.sort();
        let listing: Vec<String> = matched
            .iter()
            .map(|p| p.strip_prefix(&base).unwrap_or(p).display().to_string())
            .collect();
        Ok(ToolOutput::ok(
            format!("{} file(s) matched:\n{}", listing.len(), listing.join("\n")),
            start.elapsed(),
        ))
    }
}
