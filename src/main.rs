use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use quarry_core::config::{ModelProvider, Settings};
use quarry_core::ids::RunId;
use quarry_core::tools::WorkspaceRoots;
use quarry_llm::provider_for;
use quarry_sandbox::DockerSandbox;
use quarry_store::HistoryStore;
use quarry_team::{ConsoleRenderer, RunController, RunRequest, StdinOperator};
use quarry_telemetry::{init_telemetry, LogQuery, TelemetryConfig, TelemetryGuard};

#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(about = "Multi-agent exploratory data analysis in a Docker sandbox")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an analysis for the given intent.
    Run(RunArgs),
    /// Inspect and restore stored runs.
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    /// Query the persistent log sink.
    Logs {
        /// Only records at this level (ERROR, WARN, ...).
        #[arg(long)]
        level: Option<String>,
        /// Maximum number of records to print.
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Only records tagged with this run id.
        #[arg(long)]
        run: Option<String>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// What the ML solution should achieve, in plain language.
    intent: String,
    /// Never pause for operator feedback.
    #[arg(long)]
    no_interactive: bool,
    /// Turn budget per orchestrator invocation.
    #[arg(long)]
    max_turns: Option<u32>,
    /// Seconds to wait for the sandbox to become ready.
    #[arg(long)]
    wait_secs: Option<u64>,
    /// Skip the history snapshot at run end.
    #[arg(long)]
    no_save: bool,
    /// Keep the outputs directory as-is instead of clearing it.
    #[arg(long)]
    no_cleanup: bool,
    /// Model provider: anthropic, openai, azure, or google.
    #[arg(long)]
    provider: Option<String>,
    /// Model name for the selected provider.
    #[arg(long)]
    model: Option<String>,
    /// Show full tool arguments and outputs in the transcript.
    #[arg(long)]
    verbose_tools: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = init_telemetry(TelemetryConfig::default());

    match cli.command {
        Command::Run(args) => {
            let mut settings = Settings::from_env().context("loading configuration")?;
            apply_overrides(&mut settings, &args)?;
            run(args, settings).await
        }
        Command::History { command } => {
            let settings = Settings::from_env().context("loading configuration")?;
            history(command, &settings).await
        }
        Command::Logs { level, limit, run } => logs(&telemetry, level, limit, run),
    }
}

fn apply_overrides(settings: &mut Settings, args: &RunArgs) -> anyhow::Result<()> {
    if args.no_interactive {
        settings.interactive = false;
    }
    if let Some(turns) = args.max_turns {
        settings.max_turns = turns;
    }
    if let Some(secs) = args.wait_secs {
        settings.sandbox.wait = Duration::from_secs(secs);
    }
    if args.no_save {
        settings.save_history = false;
    }
    if args.no_cleanup {
        settings.cleanup_before_run = false;
    }
    if let Some(name) = &args.provider {
        let provider: ModelProvider = name.parse()?;
        settings.model.select_provider(provider);
    }
    if let Some(model) = &args.model {
        settings.model.model = model.clone();
    }
    Ok(())
}

async fn run(args: RunArgs, settings: Settings) -> anyhow::Result<()> {
    let provider = provider_for(&settings.model)?;
    let executor = Arc::new(
        DockerSandbox::create(
            settings.data_dir.clone(),
            settings.outputs_dir.clone(),
            &settings.sandbox,
        )
        .context("preparing the sandbox workspace")?,
    );
    info!(
        provider = %settings.model.descriptor(),
        data_dir = %settings.data_dir.display(),
        "starting analysis run"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupt received, stopping after the current turn");
                cancel.cancel();
            }
        });
    }

    let controller = RunController::new(
        RunRequest::new(args.intent, settings),
        provider,
        executor,
        Box::new(StdinOperator),
    )
    .with_cancellation(cancel);

    let (tx, rx) = mpsc::channel(256);
    let renderer = tokio::spawn(ConsoleRenderer::new(args.verbose_tools).render(rx));
    let result = controller.run_analysis(tx).await;
    let totals = renderer.await?;
    let outcome = result?;

    println!();
    if outcome.completed {
        println!("Run completed: {}", outcome.stop_reason);
    } else {
        println!("Run stopped: {}", outcome.stop_reason);
    }
    if let Some(run_id) = &outcome.run_id {
        println!("History saved as {run_id}");
    }
    println!(
        "Tokens: {} prompt, {} completion across {} responses",
        totals.prompt_tokens, totals.completion_tokens, totals.responses
    );
    Ok(())
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List stored runs, newest first.
    List,
    /// Print a stored run's transcript.
    Show {
        run_id: String,
        /// Only messages from this agent.
        #[arg(long)]
        agent: Option<String>,
    },
    /// Restore a stored run's data and outputs into the workspace.
    Load { run_id: String },
}

async fn history(command: HistoryCommand, settings: &Settings) -> anyhow::Result<()> {
    let store = HistoryStore::new(settings.history_dir.clone());
    match command {
        HistoryCommand::List => {
            let runs = store.list()?;
            if runs.is_empty() {
                println!("No stored runs.");
                return Ok(());
            }
            for run in runs {
                println!(
                    "{}  {}  {:>7.1}s  {:9}  {}/{}  {}  [{}]",
                    run.id,
                    run.start_time.format("%Y-%m-%d %H:%M:%S"),
                    run.duration,
                    if run.completed { "completed" } else { "stopped" },
                    run.model_provider,
                    run.model,
                    excerpt(&run.user_intent, 48),
                    run.stop_reason
                );
            }
        }
        HistoryCommand::Show { run_id, agent } => {
            let thread = store.replay(&RunId::from_raw(run_id), agent.as_deref())?;
            // Reuse the live renderer so a replayed transcript reads exactly
            // like it did during the run.
            let (tx, rx) = mpsc::channel(thread.len().max(1));
            for msg in thread {
                tx.send(msg).await?;
            }
            drop(tx);
            let totals = ConsoleRenderer::new(true).render(rx).await;
            println!();
            println!(
                "Tokens: {} prompt, {} completion across {} responses",
                totals.prompt_tokens, totals.completion_tokens, totals.responses
            );
        }
        HistoryCommand::Load { run_id } => {
            let roots = WorkspaceRoots::new(settings.data_dir.clone(), settings.outputs_dir.clone());
            let manifest = store.load(&RunId::from_raw(run_id), &roots)?;
            println!(
                "Restored run {} into {} and {}",
                manifest.id,
                settings.data_dir.display(),
                settings.outputs_dir.display()
            );
        }
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

fn logs(
    telemetry: &TelemetryGuard,
    level: Option<String>,
    limit: u32,
    run: Option<String>,
) -> anyhow::Result<()> {
    let Some(sink) = telemetry.logs() else {
        anyhow::bail!("log persistence is disabled");
    };
    let records = sink.query(&LogQuery {
        level,
        run_id: run,
        limit: Some(limit),
        ..Default::default()
    })?;
    if records.is_empty() {
        println!("No matching log records.");
        return Ok(());
    }
    for record in records {
        let mut line = format!(
            "{} {:5} {}  {}",
            record.timestamp, record.level, record.target, record.message
        );
        if let Some(run_id) = &record.run_id {
            line.push_str(&format!("  run={run_id}"));
        }
        if let Some(agent) = &record.agent {
            line.push_str(&format!("  agent={agent}"));
        }
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(intent: &str) -> RunArgs {
        RunArgs {
            intent: intent.to_string(),
            no_interactive: false,
            max_turns: None,
            wait_secs: None,
            no_save: false,
            no_cleanup: false,
            provider: None,
            model: None,
            verbose_tools: false,
        }
    }

    #[test]
    fn defaults_leave_settings_untouched() {
        let mut settings = Settings::default();
        apply_overrides(&mut settings, &args("explore")).unwrap();
        assert!(settings.interactive);
        assert_eq!(settings.max_turns, 20);
        assert!(settings.save_history);
        assert!(settings.cleanup_before_run);
    }

    #[test]
    fn flags_override_settings() {
        let mut settings = Settings::default();
        let mut run_args = args("explore");
        run_args.no_interactive = true;
        run_args.max_turns = Some(5);
        run_args.wait_secs = Some(60);
        run_args.no_save = true;
        run_args.no_cleanup = true;
        run_args.model = Some("claude-sonnet-4".to_string());

        apply_overrides(&mut settings, &run_args).unwrap();

        assert!(!settings.interactive);
        assert_eq!(settings.max_turns, 5);
        assert_eq!(settings.sandbox.wait, Duration::from_secs(60));
        assert!(!settings.save_history);
        assert!(!settings.cleanup_before_run);
        assert_eq!(settings.model.model, "claude-sonnet-4");
    }

    #[test]
    fn provider_override_switches_provider() {
        let mut settings = Settings::default();
        let mut run_args = args("explore");
        run_args.provider = Some("openai".to_string());

        apply_overrides(&mut settings, &run_args).unwrap();

        assert_eq!(settings.model.provider, ModelProvider::OpenAi);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut settings = Settings::default();
        let mut run_args = args("explore");
        run_args.provider = Some("mistral".to_string());

        let err = apply_overrides(&mut settings, &run_args).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn cli_parses_run_with_flags() {
        let cli = Cli::parse_from([
            "quarry",
            "run",
            "find churn drivers",
            "--no-interactive",
            "--max-turns",
            "5",
            "--provider",
            "openai",
            "--verbose-tools",
        ]);
        match cli.command {
            Command::Run(run_args) => {
                assert_eq!(run_args.intent, "find churn drivers");
                assert!(run_args.no_interactive);
                assert_eq!(run_args.max_turns, Some(5));
                assert_eq!(run_args.provider.as_deref(), Some("openai"));
                assert!(run_args.verbose_tools);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_history_show_with_agent() {
        let cli = Cli::parse_from([
            "quarry",
            "history",
            "show",
            "run_20250422_212715_4bd7549d",
            "--agent",
            "analysis",
        ]);
        match cli.command {
            Command::History {
                command: HistoryCommand::Show { run_id, agent },
            } => {
                assert_eq!(run_id, "run_20250422_212715_4bd7549d");
                assert_eq!(agent.as_deref(), Some("analysis"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_logs_defaults() {
        let cli = Cli::parse_from(["quarry", "logs"]);
        match cli.command {
            Command::Logs { level, limit, run } => {
                assert!(level.is_none());
                assert_eq!(limit, 50);
                assert!(run.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("find churn drivers", 48), "find churn drivers");
        assert_eq!(excerpt("line one\n  line two", 48), "line one line two");
        assert_eq!(excerpt("abcdef", 4), "abcd...");
    }
}
