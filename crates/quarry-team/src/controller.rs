//! The run controller: one `run()` owns the whole lifecycle. It starts the
//! sandbox, seeds the orchestrator with the operator's intent, reacts to
//! each stop reason (wrap-up instructions, operator input), and always tears
//! the sandbox down and snapshots a manifest, completed or not.

use std::collections::VecDeque;
use std::io::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use quarry_core::config::Settings;
use quarry_core::ids::RunId;
use quarry_core::llm::ChatProvider;
use quarry_core::manifest::{RunManifest, StopReason};
use quarry_core::messages::{ChatMessage, USER_TARGET};
use quarry_core::tools::{ToolContext, WorkspaceRoots};
use quarry_engine::prompts::{describe_data_files, initial_task};
use quarry_sandbox::CodeExecutor;
use quarry_store::HistoryStore;

use crate::error::RunError;
use crate::orchestrator::{exploration_team, Orchestrator};

/// Fed back as a plain task when an invocation exhausts its turn budget.
pub const TURN_LIMIT_INSTRUCTION: &str =
    "Please wrap up your analysis quickly and provide the final results.";

/// Substituted for operator input on non-interactive runs, addressed to the
/// agent that asked so the conversation resumes where it paused.
pub const NON_INTERACTIVE_INSTRUCTION: &str = "Please continue with the analysis based on the \
     available information. Complete your analysis if you can't proceed.";

/// Fed back when a stop reason matches no known handling.
pub const UNRECOGNIZED_INSTRUCTION: &str = "Please wrap up your analysis quickly and provide \
     the final results. Ask the user if you need help.";

pub const OPERATOR_PROMPT: &str = "User feedback requested (type 'exit' to leave): ";

/// Parameters for one analysis run: the operator's intent plus the settings
/// in effect after any front-end overrides.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub intent: String,
    pub settings: Settings,
}

impl RunRequest {
    pub fn new(intent: impl Into<String>, settings: Settings) -> Self {
        Self {
            intent: intent.into(),
            settings,
        }
    }
}

/// What the caller gets back from a finished run. `run_id` is present only
/// when the run was persisted to history.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub completed: bool,
    pub stop_reason: StopReason,
    pub run_id: Option<RunId>,
}

/// Source of operator replies when an agent hands off to the user.
#[async_trait]
pub trait OperatorInput: Send {
    async fn read_reply(&mut self, prompt: &str) -> std::io::Result<String>;
}

/// Reads operator replies from stdin. The blocking read runs off the
/// async runtime.
pub struct StdinOperator;

#[async_trait]
impl OperatorInput for StdinOperator {
    async fn read_reply(&mut self, prompt: &str) -> std::io::Result<String> {
        print!("{prompt}");
        std::io::stdout().flush()?;
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }
}

/// Scripted operator replies, for tests. Pops replies in order and records
/// every prompt it was shown; once the script is exhausted it answers "exit".
pub struct ScriptedOperator {
    replies: VecDeque<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOperator {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: replies.into_iter().map(String::from).collect(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

#[async_trait]
impl OperatorInput for ScriptedOperator {
    async fn read_reply(&mut self, prompt: &str) -> std::io::Result<String> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self
            .replies
            .pop_front()
            .unwrap_or_else(|| "exit".to_string()))
    }
}

pub struct RunController {
    intent: String,
    settings: Settings,
    provider: Arc<dyn ChatProvider>,
    executor: Arc<dyn CodeExecutor>,
    operator: Box<dyn OperatorInput>,
    cancel: CancellationToken,
}

impl RunController {
    pub fn new(
        request: RunRequest,
        provider: Arc<dyn ChatProvider>,
        executor: Arc<dyn CodeExecutor>,
        operator: Box<dyn OperatorInput>,
    ) -> Self {
        Self {
            intent: request.intent,
            settings: request.settings,
            provider,
            executor,
            operator,
            cancel: CancellationToken::new(),
        }
    }

    /// Token the caller cancels to abort the run between turns.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute the run to its end. Every message is mirrored onto `stream`
    /// in order; the sender is dropped when the run is over, closing the
    /// renderer's channel. A history save failure downgrades to a warning,
    /// never a run error.
    pub async fn run_analysis(
        mut self,
        stream: mpsc::Sender<ChatMessage>,
    ) -> Result<RunOutcome, RunError> {
        let run_id = RunId::generate(Utc::now());
        let start_time = Utc::now();
        info!(run_id = %run_id, intent = %self.intent, "run starting");

        let roots = WorkspaceRoots::new(
            self.settings.data_dir.clone(),
            self.settings.outputs_dir.clone(),
        );
        if self.settings.cleanup_before_run {
            quarry_store::clear_dir(&roots.outputs)?;
        }

        let mut orchestrator = exploration_team(
            self.provider.clone(),
            self.executor.clone(),
            self.settings.max_turns,
            self.settings.model.max_tokens,
        );
        let ctx = ToolContext {
            run_id: run_id.clone(),
            agent: String::new(),
            roots: roots.clone(),
            abort: self.cancel.clone(),
        };

        self.executor.start().await?;
        let result = self.drive(&mut orchestrator, &ctx, &stream).await;
        if let Err(e) = self.executor.stop().await {
            warn!(run_id = %run_id, error = %e, "sandbox teardown failed");
        }
        let (stop_reason, completed) = result?;

        let end_time = Utc::now();
        let manifest = RunManifest {
            id: run_id.clone(),
            user_intent: self.intent.clone(),
            interactive: self.settings.interactive,
            max_turns: self.settings.max_turns,
            docker_wait_time: self.settings.sandbox.wait.as_secs(),
            start_time,
            end_time,
            duration: (end_time - start_time).num_milliseconds() as f64 / 1000.0,
            completed,
            stop_reason: stop_reason.clone(),
            model_provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
            team_state: orchestrator.state_snapshot(),
        };

        let saved = if self.settings.save_history {
            let store = HistoryStore::new(&self.settings.history_dir);
            match store.save(&manifest, &roots) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "failed to save run history");
                    None
                }
            }
        } else {
            None
        };

        info!(run_id = %run_id, completed, stop_reason = %stop_reason, "run finished");
        Ok(RunOutcome {
            completed,
            stop_reason,
            run_id: saved,
        })
    }

    /// The stop-reason state machine. Returns the final reason and whether
    /// the run completed.
    #[instrument(skip_all, fields(run_id = %ctx.run_id))]
    async fn drive(
        &mut self,
        orchestrator: &mut Orchestrator,
        ctx: &ToolContext,
        stream: &mpsc::Sender<ChatMessage>,
    ) -> Result<(StopReason, bool), RunError> {
        let data_files = describe_data_files(&self.settings.data_dir);
        let mut task = ChatMessage::text(USER_TARGET, initial_task(&self.intent, &data_files));

        loop {
            let reason = orchestrator
                .run_turns(task, ctx, stream, &self.cancel)
                .await?;
            match reason {
                StopReason::Sentinel { .. } => return Ok((reason, true)),
                StopReason::Aborted => return Ok((reason, false)),
                StopReason::MaxTurns { .. } => {
                    info!("turn budget exhausted, instructing the team to wrap up");
                    task = ChatMessage::text(USER_TARGET, TURN_LIMIT_INSTRUCTION);
                }
                StopReason::UserHandoff { ref source } => {
                    let source = source.clone();
                    if self.settings.interactive {
                        let reply = self.operator.read_reply(OPERATOR_PROMPT).await?;
                        let reply = reply.trim();
                        if reply.eq_ignore_ascii_case("exit") {
                            info!("operator left the run");
                            return Ok((reason, false));
                        }
                        task = ChatMessage::handoff(USER_TARGET, source, reply);
                    } else {
                        task = ChatMessage::handoff(USER_TARGET, source, NON_INTERACTIVE_INSTRUCTION);
                    }
                }
                StopReason::Unrecognized { ref detail } => {
                    warn!(detail = %detail, "unrecognized stop reason, instructing a wrap-up");
                    task = ChatMessage::text(USER_TARGET, UNRECOGNIZED_INSTRUCTION);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use quarry_llm::mock::{MockProvider, MockResponse};
    use quarry_sandbox::mock::MockExecutor;
    use quarry_store::MANIFEST_FILE;

    struct Fixture {
        base: std::path::PathBuf,
    }

    impl Fixture {
        fn new(label: &str) -> Self {
            let base = std::env::temp_dir().join(format!(
                "quarry-controller-{label}-{}",
                uuid::Uuid::new_v4()
            ));
            std::fs::create_dir_all(base.join("data")).unwrap();
            std::fs::create_dir_all(base.join("outputs")).unwrap();
            Self { base }
        }

        fn settings(&self) -> Settings {
            Settings {
                data_dir: self.base.join("data"),
                outputs_dir: self.base.join("outputs"),
                history_dir: self.base.join("history"),
                sandbox: Default::default(),
                model: Default::default(),
                max_turns: 20,
                interactive: true,
                save_history: true,
                cleanup_before_run: false,
            }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.base);
        }
    }

    fn controller(
        settings: Settings,
        responses: Vec<MockResponse>,
        executor: Arc<MockExecutor>,
        operator: ScriptedOperator,
    ) -> (RunController, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new(responses));
        let controller = RunController::new(
            RunRequest::new("find drivers of churn", settings),
            provider.clone(),
            executor,
            Box::new(operator),
        );
        (controller, provider)
    }

    fn drain(mut rx: mpsc::Receiver<ChatMessage>) -> Vec<ChatMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn sentinel_run_completes_and_saves_history() {
        let fixture = Fixture::new("sentinel");
        let executor = Arc::new(MockExecutor::new(vec![]));
        let (controller, _) = controller(
            fixture.settings(),
            vec![
                MockResponse::text("data has three numeric columns"),
                MockResponse::text("REPORT COMPLETE"),
            ],
            executor.clone(),
            ScriptedOperator::new(vec![]),
        );
        let (tx, rx) = mpsc::channel(64);

        let outcome = controller.run_analysis(tx).await.unwrap();

        assert!(outcome.completed);
        assert!(matches!(outcome.stop_reason, StopReason::Sentinel { .. }));
        let run_id = outcome.run_id.expect("history saved");
        let manifest_path = fixture
            .base
            .join("history")
            .join(run_id.as_str())
            .join(MANIFEST_FILE);
        assert!(manifest_path.exists());
        assert_eq!(executor.start_calls(), 1);
        assert_eq!(executor.stop_calls(), 1);

        let streamed = drain(rx);
        assert!(matches!(streamed.last(), Some(ChatMessage::Stop(_))));
    }

    #[tokio::test]
    async fn operator_exit_leaves_run_uncompleted() {
        let fixture = Fixture::new("exit");
        let executor = Arc::new(MockExecutor::new(vec![]));
        let (controller, _) = controller(
            fixture.settings(),
            vec![MockResponse::tool_call(
                "transfer_to_user",
                json!({"message": "which column is the label?"}),
            )],
            executor.clone(),
            ScriptedOperator::new(vec!["  Exit "]),
        );
        let (tx, _rx) = mpsc::channel(64);

        let outcome = controller.run_analysis(tx).await.unwrap();

        assert!(!outcome.completed);
        assert_eq!(
            outcome.stop_reason,
            StopReason::UserHandoff {
                source: "analysis".into()
            }
        );
        assert_eq!(executor.stop_calls(), 1);

        // The uncompleted run still left a manifest behind.
        let run_id = outcome.run_id.expect("history saved");
        let manifest = HistoryStore::new(fixture.base.join("history"))
            .load_manifest(&run_id)
            .unwrap();
        assert!(!manifest.completed);
    }

    #[tokio::test]
    async fn operator_reply_resumes_the_asking_agent() {
        let fixture = Fixture::new("reply");
        let executor = Arc::new(MockExecutor::new(vec![]));
        let operator = ScriptedOperator::new(vec!["churned_at marks the label"]);
        let prompts = operator.prompts();
        let (controller, provider) = controller(
            fixture.settings(),
            vec![
                MockResponse::tool_call(
                    "transfer_to_user",
                    json!({"message": "which column is the label?"}),
                ),
                MockResponse::text("thanks, proceeding. REPORT COMPLETE"),
            ],
            executor,
            operator,
        );
        let (tx, _rx) = mpsc::channel(64);

        let outcome = controller.run_analysis(tx).await.unwrap();

        assert!(outcome.completed);
        assert_eq!(prompts.lock().as_slice(), [OPERATOR_PROMPT]);
        // The reply was folded into the asking agent's next request.
        let requests = provider.requests();
        let folded = requests[1]
            .messages
            .iter()
            .filter_map(|m| match m {
                quarry_core::llm::LlmMessage::User(u) => Some(u),
                _ => None,
            })
            .count();
        assert!(folded >= 2);
    }

    #[tokio::test]
    async fn non_interactive_handoff_feeds_the_continue_instruction() {
        let fixture = Fixture::new("noninteractive");
        let mut settings = fixture.settings();
        settings.interactive = false;
        let executor = Arc::new(MockExecutor::new(vec![]));
        let (controller, provider) = controller(
            settings,
            vec![
                MockResponse::tool_call(
                    "transfer_to_user",
                    json!({"message": "need a hint"}),
                ),
                MockResponse::text("continuing solo. REPORT COMPLETE"),
            ],
            executor,
            ScriptedOperator::new(vec![]),
        );
        let (tx, _rx) = mpsc::channel(64);

        let outcome = controller.run_analysis(tx).await.unwrap();

        assert!(outcome.completed);
        let requests = provider.requests();
        let second = serde_json::to_string(&requests[1].messages).unwrap();
        assert!(second.contains("Please continue with the analysis"));
    }

    #[tokio::test]
    async fn turn_limit_triggers_a_wrap_up_instruction() {
        let fixture = Fixture::new("turnlimit");
        let mut settings = fixture.settings();
        settings.max_turns = 1;
        let executor = Arc::new(MockExecutor::new(vec![]));
        let (controller, provider) = controller(
            settings,
            vec![
                MockResponse::text("still exploring"),
                MockResponse::text("summary done. REPORT COMPLETE"),
            ],
            executor,
            ScriptedOperator::new(vec![]),
        );
        let (tx, _rx) = mpsc::channel(64);

        let outcome = controller.run_analysis(tx).await.unwrap();

        assert!(outcome.completed);
        let requests = provider.requests();
        let second = serde_json::to_string(&requests[1].messages).unwrap();
        assert!(second.contains("Please wrap up your analysis quickly"));
    }

    #[tokio::test]
    async fn no_save_skips_history() {
        let fixture = Fixture::new("nosave");
        let mut settings = fixture.settings();
        settings.save_history = false;
        let executor = Arc::new(MockExecutor::new(vec![]));
        let (controller, _) = controller(
            settings,
            vec![MockResponse::text("REPORT COMPLETE")],
            executor,
            ScriptedOperator::new(vec![]),
        );
        let (tx, _rx) = mpsc::channel(64);

        let outcome = controller.run_analysis(tx).await.unwrap();

        assert!(outcome.completed);
        assert!(outcome.run_id.is_none());
        assert!(!fixture.base.join("history").exists());
    }

    #[tokio::test]
    async fn provider_failure_still_stops_the_sandbox() {
        let fixture = Fixture::new("providerfail");
        let executor = Arc::new(MockExecutor::new(vec![]));
        let (controller, _) = controller(
            fixture.settings(),
            vec![MockResponse::Error(
                quarry_core::errors::ProviderError::AuthenticationFailed("bad key".into()),
            )],
            executor.clone(),
            ScriptedOperator::new(vec![]),
        );
        let (tx, _rx) = mpsc::channel(64);

        let err = controller.run_analysis(tx).await.unwrap_err();

        assert!(matches!(err, RunError::Engine(_)));
        assert_eq!(executor.start_calls(), 1);
        assert_eq!(executor.stop_calls(), 1);
    }

    #[tokio::test]
    async fn failed_sandbox_start_aborts_before_any_turn() {
        let fixture = Fixture::new("startfail");
        let executor = Arc::new(MockExecutor::failing_start());
        let (controller, provider) = controller(
            fixture.settings(),
            vec![MockResponse::text("never used")],
            executor,
            ScriptedOperator::new(vec![]),
        );
        let (tx, _rx) = mpsc::channel(64);

        let err = controller.run_analysis(tx).await.unwrap_err();

        assert!(matches!(err, RunError::Sandbox(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn cleanup_empties_outputs_before_the_run() {
        let fixture = Fixture::new("cleanup");
        let mut settings = fixture.settings();
        settings.cleanup_before_run = true;
        std::fs::write(fixture.base.join("outputs/stale.md"), "old").unwrap();
        let executor = Arc::new(MockExecutor::new(vec![]));
        let (controller, _) = controller(
            settings,
            vec![MockResponse::text("REPORT COMPLETE")],
            executor,
            ScriptedOperator::new(vec![]),
        );
        let (tx, _rx) = mpsc::channel(64);

        controller.run_analysis(tx).await.unwrap();

        assert!(!fixture.base.join("outputs/stale.md").exists());
    }

    #[tokio::test]
    async fn pre_cancelled_run_aborts_with_manifest() {
        let fixture = Fixture::new("cancel");
        let executor = Arc::new(MockExecutor::new(vec![]));
        let (controller, provider) = controller(
            fixture.settings(),
            vec![MockResponse::text("never used")],
            executor.clone(),
            ScriptedOperator::new(vec![]),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let controller = controller.with_cancellation(cancel);
        let (tx, _rx) = mpsc::channel(64);

        let outcome = controller.run_analysis(tx).await.unwrap();

        assert!(!outcome.completed);
        assert_eq!(outcome.stop_reason, StopReason::Aborted);
        assert!(outcome.run_id.is_some());
        assert_eq!(provider.call_count(), 0);
        assert_eq!(executor.stop_calls(), 1);
    }
}
