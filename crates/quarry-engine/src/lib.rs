//! Agents and their tool surface: the analysis and ideation agents, the
//! tool registry, and the per-turn provider/tool loop.

pub mod agent;
pub mod error;
pub mod prompts;
pub mod registry;
pub mod tools;

pub use agent::{analysis_agent, ideation_agent, Agent, AgentTurn};
pub use error::EngineError;
pub use registry::ToolRegistry;
