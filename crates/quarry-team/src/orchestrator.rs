//! Turn-taking over the agent team: seed a task, let the active agent take a
//! turn, route control (handoff target or round-robin), and stop when a
//! termination condition fires.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use quarry_core::llm::ChatProvider;
use quarry_core::manifest::{StopReason, TeamState};
use quarry_core::messages::ChatMessage;
use quarry_core::tools::ToolContext;
use quarry_engine::{analysis_agent, ideation_agent, prompts, Agent, EngineError};
use quarry_sandbox::CodeExecutor;

use crate::termination::{
    MaxTurnsTermination, SentinelTermination, TerminationCondition, UserHandoffTermination,
};

/// Source name on orchestrator-emitted stop notices.
pub const ORCHESTRATOR_SOURCE: &str = "orchestrator";

pub struct Orchestrator {
    agents: Vec<Agent>,
    conditions: Vec<Box<dyn TerminationCondition>>,
    active: usize,
    thread: Vec<ChatMessage>,
    /// Per agent: how far into the thread its context has been folded.
    folded: HashMap<String, usize>,
}

impl Orchestrator {
    /// Agents take turns in the given cycle order; conditions are evaluated
    /// in the given priority order.
    pub fn new(agents: Vec<Agent>, conditions: Vec<Box<dyn TerminationCondition>>) -> Self {
        Self {
            agents,
            conditions,
            active: 0,
            thread: Vec::new(),
            folded: HashMap::new(),
        }
    }

    /// Name of the agent that will take the next turn. Persists across
    /// invocations within one run.
    pub fn active_agent(&self) -> &str {
        self.agents[self.active].name()
    }

    /// The full team thread accumulated so far.
    pub fn thread(&self) -> &[ChatMessage] {
        &self.thread
    }

    fn agent_index(&self, name: &str) -> Option<usize> {
        self.agents.iter().position(|a| a.name() == name)
    }

    /// Run turns until a condition fires or cancellation is observed between
    /// turns. Every produced message is mirrored onto `stream` in order; the
    /// firing condition's stop notice is the last message of the invocation.
    #[instrument(skip_all, fields(run_id = %ctx.run_id))]
    pub async fn run_turns(
        &mut self,
        task: ChatMessage,
        ctx: &ToolContext,
        stream: &mpsc::Sender<ChatMessage>,
        cancel: &CancellationToken,
    ) -> Result<StopReason, EngineError> {
        for condition in &mut self.conditions {
            condition.reset();
        }

        // An operator reply arrives handoff-shaped and is addressed to the
        // agent that asked; plain text goes to whoever is active.
        if let ChatMessage::Handoff(h) = &task {
            if let Some(idx) = self.agent_index(&h.target) {
                self.active = idx;
            }
        }
        self.thread.push(task.clone());
        send(stream, task).await;

        loop {
            if cancel.is_cancelled() {
                info!("cancellation observed between turns");
                return Ok(self.emit_stop(StopReason::Aborted, stream).await);
            }

            let agent = &mut self.agents[self.active];
            let seen = self.folded.get(agent.name()).copied().unwrap_or(0);
            let incoming: Vec<ChatMessage> = self.thread[seen..].to_vec();
            let turn_ctx = ToolContext {
                agent: agent.name().to_string(),
                ..ctx.clone()
            };

            let turn = agent.respond(&incoming, &turn_ctx, stream).await?;
            let name = agent.name().to_string();

            self.thread.extend(turn.events);
            self.thread.push(turn.terminal.clone());
            self.folded.insert(name, self.thread.len());

            if let Some(reason) = self
                .conditions
                .iter_mut()
                .find_map(|condition| condition.check(&turn.terminal))
            {
                return Ok(self.emit_stop(reason, stream).await);
            }

            self.active = match &turn.terminal {
                ChatMessage::Handoff(h) => self
                    .agent_index(&h.target)
                    .unwrap_or((self.active + 1) % self.agents.len()),
                _ => (self.active + 1) % self.agents.len(),
            };
        }
    }

    async fn emit_stop(
        &mut self,
        reason: StopReason,
        stream: &mpsc::Sender<ChatMessage>,
    ) -> StopReason {
        let stop = ChatMessage::stop(ORCHESTRATOR_SOURCE, reason.to_string());
        self.thread.push(stop.clone());
        send(stream, stop).await;
        reason
    }

    /// Snapshot for the manifest: the ordered thread plus every agent's
    /// private context. Round-trips losslessly through serde.
    pub fn state_snapshot(&self) -> TeamState {
        TeamState {
            message_thread: self.thread.clone(),
            agent_contexts: self
                .agents
                .iter()
                .map(|a| (a.name().to_string(), a.context().to_vec()))
                .collect(),
        }
    }
}

async fn send(stream: &mpsc::Sender<ChatMessage>, msg: ChatMessage) {
    if stream.send(msg).await.is_err() {
        warn!("message stream closed, dropping message");
    }
}

/// The standard two-agent exploration team: analysis then ideation in a
/// fixed cycle, completing on the ideation agent's report sentinel.
pub fn exploration_team(
    provider: Arc<dyn ChatProvider>,
    executor: Arc<dyn CodeExecutor>,
    max_turns: u32,
    max_tokens: u32,
) -> Orchestrator {
    let agents = vec![
        analysis_agent(provider.clone(), executor, max_tokens),
        ideation_agent(provider, max_tokens),
    ];
    let conditions: Vec<Box<dyn TerminationCondition>> = vec![
        Box::new(SentinelTermination::new(vec![
            prompts::REPORT_COMPLETE.to_string()
        ])),
        Box::new(UserHandoffTermination),
        Box::new(MaxTurnsTermination::new(max_turns)),
    ];
    Orchestrator::new(agents, conditions)
}
