//! The tool surface agents call: sandboxed code execution, file access
//! scoped to the data and outputs roots, and chart inspection via a vision
//! model.

pub mod append_file;
pub mod describe_image;
pub mod execute_code;
pub mod glob_files;
pub mod list_files;
pub mod read_file;
pub mod write_file;

use std::sync::Arc;

use quarry_core::llm::ChatProvider;
use quarry_sandbox::{CodeExecutor, DATA_MOUNT, OUTPUTS_MOUNT};

use crate::registry::ToolRegistry;

/// Tools for the analysis agent: code execution, the file surface, and
/// image description.
pub fn analysis_registry(
    executor: Arc<dyn CodeExecutor>,
    vision: Arc<dyn ChatProvider>,
) -> ToolRegistry {
    let mut registry = file_registry();
    registry.register(Arc::new(execute_code::ExecuteCodeTool::new(executor)));
    registry.register(Arc::new(describe_image::DescribeImageTool::new(vision)));
    registry
}

/// Tools for the ideation agent: file access only, no code execution.
pub fn ideation_registry() -> ToolRegistry {
    file_registry()
}

fn file_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(write_file::WriteFileTool));
    registry.register(Arc::new(read_file::ReadFileTool));
    registry.register(Arc::new(append_file::AppendFileTool));
    registry.register(Arc::new(list_files::ListFilesTool));
    registry.register(Arc::new(glob_files::GlobFilesTool));
    registry
}

/// Models that just ran code tend to echo container paths back into file
/// arguments. Strip the mount prefix matching the named root so the path
/// resolves on the host side.
pub(crate) fn strip_mount_prefix<'a>(root: &str, path: &'a str) -> &'a str {
    let mount = match root {
        "data" => DATA_MOUNT,
        "outputs" => OUTPUTS_MOUNT,
        _ => return path,
    };
    match path.strip_prefix(mount) {
        Some(rest) => rest.trim_start_matches('/'),
        None => path,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use quarry_core::ids::RunId;
    use quarry_core::tools::{ToolContext, WorkspaceRoots};
    use tokio_util::sync::CancellationToken;

    /// A tool context over fresh temp roots. Callers clean up via the
    /// returned paths.
    pub fn test_ctx(label: &str) -> (ToolContext, PathBuf, PathBuf) {
        let base = std::env::temp_dir().join(format!("quarry-tool-{label}-{}", uuid::Uuid::new_v4()));
        let data = base.join("data");
        let outputs = base.join("outputs");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::create_dir_all(&outputs).unwrap();
        let ctx = ToolContext {
            run_id: RunId::new(),
            agent: "analysis".to_string(),
            roots: WorkspaceRoots::new(&data, &outputs),
            abort: CancellationToken::new(),
        };
        (ctx, data, outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use quarry_llm::mock::MockProvider;
    use quarry_sandbox::mock::MockExecutor;

    #[test]
    fn analysis_registry_has_full_surface() {
        let registry = analysis_registry(
            Arc::new(MockExecutor::new(vec![])),
            Arc::new(MockProvider::new(vec![])),
        );
        assert_eq!(
            registry.names(),
            vec![
                "append_file",
                "describe_image",
                "execute_code",
                "glob_files",
                "list_files",
                "read_file",
                "write_file",
            ]
        );
    }

    #[test]
    fn ideation_registry_has_no_execution() {
        let registry = ideation_registry();
        assert!(!registry.contains("execute_code"));
        assert!(!registry.contains("describe_image"));
        assert!(registry.contains("write_file"));
        assert!(registry.contains("read_file"));
    }

    #[test]
    fn strip_mount_prefix_handles_container_paths() {
        assert_eq!(strip_mount_prefix("data", "/mnt/data/sales.csv"), "sales.csv");
        assert_eq!(
            strip_mount_prefix("outputs", "/mnt/outputs/plot.jpg"),
            "plot.jpg"
        );
        assert_eq!(strip_mount_prefix("outputs", "plot.jpg"), "plot.jpg");
        // A prefix for the other root is left alone and fails resolution later.
        assert_eq!(
            strip_mount_prefix("data", "/mnt/outputs/plot.jpg"),
            "/mnt/outputs/plot.jpg"
        );
    }
}
