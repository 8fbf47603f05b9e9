use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use quarry_core::llm::{ChatProvider, ChatRequest, LlmMessage, UserContent, UserMessage};
use quarry_core::tools::{Tool, ToolContext, ToolError, ToolOutput};

use crate::tools::strip_mount_prefix;

/// Question asked when the caller does not supply one.
pub const DEFAULT_QUERY: &str = "Analyze this data visualization image and describe what you see. \
Focus on trends, patterns, outliers, and any insights that would be relevant for data analysis.";

const VISION_MAX_TOKENS: u32 = 1000;

/// Describes a chart in the outputs root by sending it to the vision model.
pub struct DescribeImageTool {
    provider: Arc<dyn ChatProvider>,
}

impl DescribeImageTool {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for DescribeImageTool {
    fn name(&self) -> &str {
        "describe_image"
    }

    fn description(&self) -> &str {
        "Describe an image in the outputs root, such as a chart produced by \
         execute_code. Optionally pass a specific question about the image."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Image path relative to the outputs root, e.g. 'sales_trend.jpg'"
                },
                "query": {
                    "type": "string",
                    "description": "What to ask about the image (defaults to a general description)"
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
        let path = args["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("path is required".to_string()))?;
        let query = args["query"].as_str().unwrap_or(DEFAULT_QUERY);

        let path = strip_mount_prefix("outputs", path);
        let full = ctx.roots.resolve("outputs", path)?;

        let bytes = match tokio::fs::read(&full).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return Ok(ToolOutput::error(
                    format!("Error: Image file not found at {}", full.display()),
                    start.elapsed(),
                ))
            }
        };

        let request = ChatRequest::new(
            "",
            vec![LlmMessage::User(UserMessage {
                content: vec![
                    UserContent::Text {
                        text: query.to_string(),
                    },
                    UserContent::Image {
                        mime_type: mime_for(&full).to_string(),
                        data: STANDARD.encode(&bytes),
                    },
                ],
            })],
        )
        .with_max_tokens(VISION_MAX_TOKENS);

        match self.provider.complete(&request).await {
            Ok(response) => Ok(ToolOutput::ok(response.text(), start.elapsed())),
            Err(e) => Ok(ToolOutput::error(
                format!("Error analyzing image: {e}"),
                start.elapsed(),
            )),
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use quarry_core::errors::ProviderError;
    use quarry_llm::mock::{MockProvider, MockResponse};

    use crate::tools::test_support::test_ctx;

    #[tokio::test]
    async fn describes_an_existing_image() {
        let (ctx, _data, outputs) = test_ctx("img");
        std::fs::write(outputs.join("trend.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        let provider = Arc::new(MockProvider::new(vec![MockResponse::text(
            "An upward trend with a spike in March.",
        )]));
        let tool = DescribeImageTool::new(provider.clone());

        let output = tool
            .execute(serde_json::json!({"path": "trend.png"}), &ctx)
            .await
            .unwrap();

        assert!(!output.is_error);
        assert_eq!(output.content, "An upward trend with a spike in March.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, VISION_MAX_TOKENS);
        match &requests[0].messages[0] {
            LlmMessage::User(user) => {
                assert!(matches!(
                    &user.content[0],
                    UserContent::Text { text } if text == DEFAULT_QUERY
                ));
                assert!(matches!(
                    &user.content[1],
                    UserContent::Image { mime_type, data }
                        if mime_type == "image/png" && data == &STANDARD.encode([0x89u8, 0x50, 0x4e, 0x47])
                ));
            }
            other => panic!("expected user message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn custom_query_is_passed_through() {
        let (ctx, _data, outputs) = test_ctx("img-query");
        std::fs::write(outputs.join("dist.jpg"), [0xff, 0xd8]).unwrap();
        let provider = Arc::new(MockProvider::new(vec![MockResponse::text("Bimodal.")]));
        let tool = DescribeImageTool::new(provider.clone());

        tool.execute(
            serde_json::json!({"path": "dist.jpg", "query": "Is the distribution skewed?"}),
            &ctx,
        )
        .await
        .unwrap();

        match &provider.requests()[0].messages[0] {
            LlmMessage::User(user) => {
                assert!(matches!(
                    &user.content[0],
                    UserContent::Text { text } if text == "Is the distribution skewed?"
                ));
            }
            other => panic!("expected user message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn container_prefix_is_stripped() {
        let (ctx, _data, outputs) = test_ctx("img-mount");
        std::fs::write(outputs.join("plot.jpg"), [0xff, 0xd8]).unwrap();
        let provider = Arc::new(MockProvider::new(vec![MockResponse::text("A plot.")]));
        let tool = DescribeImageTool::new(provider);

        let output = tool
            .execute(serde_json::json!({"path": "/mnt/outputs/plot.jpg"}), &ctx)
            .await
            .unwrap();
        assert!(!output.is_error);
    }

    #[tokio::test]
    async fn missing_image_is_error_flagged() {
        let (ctx, ..) = test_ctx("img-missing");
        let provider = Arc::new(MockProvider::new(vec![]));
        let tool = DescribeImageTool::new(provider);

        let output = tool
            .execute(serde_json::json!({"path": "ghost.jpg"}), &ctx)
            .await
            .unwrap();

        assert!(output.is_error);
        assert!(output.content.starts_with("Error: Image file not found at"));
    }

    #[tokio::test]
    async fn provider_failure_is_error_flagged() {
        let (ctx, _data, outputs) = test_ctx("img-err");
        std::fs::write(outputs.join("plot.jpg"), [0xff, 0xd8]).unwrap();
        let provider = Arc::new(MockProvider::new(vec![MockResponse::Error(
            ProviderError::RateLimited { retry_after: None },
        )]));
        let tool = DescribeImageTool::new(provider);

        let output = tool
            .execute(serde_json::json!({"path": "plot.jpg"}), &ctx)
            .await
            .unwrap();

        assert!(output.is_error);
        assert!(output.content.starts_with("Error analyzing image:"));
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for(Path::new("a.png")), "image/png");
        assert_eq!(mime_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a.gif")), "image/gif");
        assert_eq!(mime_for(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_for(Path::new("chart")), "image/jpeg");
    }
}
