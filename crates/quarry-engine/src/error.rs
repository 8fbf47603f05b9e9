use quarry_core::errors::ProviderError;

/// Errors surfaced by an agent turn. Tool failures never appear here; they
/// are folded back into the conversation as error-flagged results so the
/// agent can react to them.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("agent {agent} exceeded {limit} tool rounds in a single turn")]
    ToolRoundsExceeded { agent: String, limit: u32 },
}
