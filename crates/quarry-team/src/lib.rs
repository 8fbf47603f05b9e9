//! Team orchestration and the run lifecycle: turn-taking over the agents,
//! pluggable termination, the stop-reason state machine, history snapshots,
//! and console rendering of the live stream.

pub mod console;
pub mod controller;
pub mod error;
pub mod orchestrator;
pub mod termination;

pub use console::ConsoleRenderer;
pub use controller::{
    OperatorInput, RunController, RunOutcome, RunRequest, ScriptedOperator, StdinOperator,
    NON_INTERACTIVE_INSTRUCTION, OPERATOR_PROMPT, TURN_LIMIT_INSTRUCTION,
    UNRECOGNIZED_INSTRUCTION,
};
pub use error::RunError;
pub use orchestrator::{exploration_team, Orchestrator, ORCHESTRATOR_SOURCE};
pub use termination::{
    MaxTurnsTermination, SentinelTermination, TerminationCondition, UserHandoffTermination,
};
