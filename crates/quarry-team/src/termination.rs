//! Pluggable stop conditions. The orchestrator evaluates its conditions in
//! declaration order against every terminal message, so earlier conditions
//! take priority when several would fire on the same message.

use quarry_core::manifest::StopReason;
use quarry_core::messages::{ChatMessage, USER_TARGET};

/// One stop condition. `check` is called once per terminal message; state
/// accumulated across a single orchestrator invocation is discarded by
/// `reset` before the next invocation's first turn.
pub trait TerminationCondition: Send {
    fn check(&mut self, message: &ChatMessage) -> Option<StopReason>;
    fn reset(&mut self);
}

/// Fires when a terminal message's text contains any of the configured
/// phrases. First matching phrase wins.
pub struct SentinelTermination {
    phrases: Vec<String>,
}

impl SentinelTermination {
    pub fn new(phrases: Vec<String>) -> Self {
        Self { phrases }
    }
}

impl TerminationCondition for SentinelTermination {
    fn check(&mut self, message: &ChatMessage) -> Option<StopReason> {
        let text = message.content_text()?;
        self.phrases
            .iter()
            .find(|phrase| text.contains(phrase.as_str()))
            .map(|phrase| StopReason::Sentinel {
                phrase: phrase.clone(),
            })
    }

    fn reset(&mut self) {}
}

/// Fires when an agent hands the conversation off to the human operator.
pub struct UserHandoffTermination;

impl TerminationCondition for UserHandoffTermination {
    fn check(&mut self, message: &ChatMessage) -> Option<StopReason> {
        match message {
            ChatMessage::Handoff(h) if h.target == USER_TARGET => Some(StopReason::UserHandoff {
                source: h.source.clone(),
            }),
            _ => None,
        }
    }

    fn reset(&mut self) {}
}

/// Fires once `limit` terminal agent messages have been produced within one
/// invocation. Intra-turn tool traffic does not count.
pub struct MaxTurnsTermination {
    limit: u32,
    seen: u32,
}

impl MaxTurnsTermination {
    pub fn new(limit: u32) -> Self {
        Self { limit, seen: 0 }
    }
}

impl TerminationCondition for MaxTurnsTermination {
    fn check(&mut self, message: &ChatMessage) -> Option<StopReason> {
        if !message.ends_turn() {
            return None;
        }
        self.seen += 1;
        if self.seen >= self.limit {
            Some(StopReason::MaxTurns { limit: self.limit })
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.seen = 0;
    }
}
