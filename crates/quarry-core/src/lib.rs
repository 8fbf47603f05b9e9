pub mod config;
pub mod errors;
pub mod ids;
pub mod llm;
pub mod manifest;
pub mod messages;
pub mod tokens;
pub mod tools;

pub use config::{ConfigError, ModelProvider, ModelSettings, SandboxSettings, Settings};
pub use errors::ProviderError;
pub use ids::{RunId, ToolCallId};
pub use manifest::{RunManifest, RunSummary, StopReason, TeamState};
pub use messages::{ChatMessage, USER_TARGET};
pub use tokens::{TokenTotals, TokenUsage};
