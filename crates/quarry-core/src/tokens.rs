use serde::{Deserialize, Serialize};

/// Per-response token usage, raw from provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

/// Run-level accumulated totals (incremented per assistant response).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TokenTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub responses: u32,
}

impl TokenTotals {
    /// Incorporate one response's usage into the totals.
    pub fn add(&mut self, usage: &TokenUsage) {
        self.prompt_tokens += usage.prompt_tokens as u64;
        self.completion_tokens += usage.completion_tokens as u64;
        self.responses += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_accumulate_across_responses() {
        let mut totals = TokenTotals::default();
        totals.add(&TokenUsage::new(100, 50));
        totals.add(&TokenUsage::new(200, 75));

        assert_eq!(totals.prompt_tokens, 300);
        assert_eq!(totals.completion_tokens, 125);
        assert_eq!(totals.responses, 2);
    }

    #[test]
    fn serde_roundtrip() {
        let usage = TokenUsage::new(1234, 567);
        let json = serde_json::to_string(&usage).unwrap();
        let parsed: TokenUsage = serde_json::from_str(&json).unwrap();
        assert_eq!(usage, parsed);
    }
}
