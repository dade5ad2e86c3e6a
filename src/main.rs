use anyhow::{Context, Result};
use ci_runner::backend::{
    check_runtime_available, git, CliRuntime, GitSource, LocalTree, SourceProvider,
};
use ci_runner::cli::commands::{
    CheckCommand, EventArgs, HistoryCommand, ListCommand, RunCommand, ValidateCommand,
};
use ci_runner::cli::output::*;
use ci_runner::cli::{Cli, Command};
use ci_runner::core::config::WorkflowConfig;
use ci_runner::core::secrets::EnvSecretStore;
use ci_runner::core::{EventDescriptor, RunStatus, WorkspaceMode};
use ci_runner::execution::{ExecutionEvent, RunDispatcher, RunEngine};
use ci_runner::persistence::{
    create_summary, InMemoryPersistence, PersistenceBackend, RunSummary,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit code of `check` when the event would not trigger a run
const EXIT_SKIPPED: i32 = 78;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, &cli).await?,
        Command::Check(cmd) => check_trigger(cmd, &cli).await?,
        Command::Validate(cmd) => validate_workflow(cmd, &cli)?,
        Command::List(cmd) => list_workflows(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> Result<WorkflowConfig> {
    match path {
        Some(path) => WorkflowConfig::from_file(path)
            .with_context(|| format!("Failed to load workflow config {}", path)),
        None => Ok(WorkflowConfig::default()),
    }
}

/// Build the event list from an event file or from flags
async fn resolve_events(args: &EventArgs, repo: &Path) -> Result<Vec<EventDescriptor>> {
    if !args.event_file.is_empty() {
        return args
            .event_file
            .iter()
            .map(|path| {
                EventDescriptor::from_json_file(path)
                    .with_context(|| format!("Failed to load event file {}", path.display()))
            })
            .collect();
    }

    let mut event = args.flag_event();

    if let Some(base) = &args.diff_base {
        let head = match &event.sha {
            Some(sha) => sha.clone(),
            None => git::head_commit("git", repo)
                .await
                .context("Failed to resolve HEAD")?,
        };
        let paths = git::changed_paths("git", repo, base, &head)
            .await
            .with_context(|| format!("Failed to diff {}...{}", base, head))?;
        info!("{} path(s) changed since {}", paths.len(), base);
        event.changed_paths.extend(paths);
        event.sha.get_or_insert(head);
    }

    Ok(vec![event])
}

async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        Ok(Arc::new(
            ci_runner::persistence::SqliteRunStore::with_default_path().await?,
        ))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        warn!("Built without sqlite; run history is not kept");
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

async fn run_workflow(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(runtime) = &cmd.runtime {
        config.build.runtime = runtime.clone();
    }
    if let Some(image) = &cmd.image {
        config.build.image = image.clone();
    }
    if cmd.require_secrets {
        config.secrets.require_non_empty = true;
    }
    config.validate().context("Invalid workflow config")?;

    println!("{} Loaded workflow: {}", INFO, style(&config.name).bold());

    let repo = cmd
        .repo
        .canonicalize()
        .with_context(|| format!("Repository not found: {}", cmd.repo.display()))?;
    let policy = config.trigger_policy()?;
    let events = resolve_events(&cmd.event, &repo).await?;

    let mut runs = Vec::new();
    for event in events {
        let decision = policy.evaluate(&event);
        println!("{} {}", format_decision(&decision), style(event.kind).dim());
        if decision.should_run() {
            let workspace = if cmd.in_place {
                WorkspaceMode::InPlace(repo.clone())
            } else {
                WorkspaceMode::Ephemeral
            };
            runs.push(config.to_run(event, workspace));
        }
    }

    if runs.is_empty() {
        println!("{} Nothing to run", INFO);
        return Ok(());
    }
    if cmd.in_place && runs.len() > 1 {
        anyhow::bail!("--in-place runs share the working tree; pass a single event");
    }

    let version = check_runtime_available(&config.build.runtime)
        .await
        .with_context(|| format!("Container runtime '{}' is not usable", config.build.runtime))?;
    info!("Using {}", version);

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store().await?
    };

    let source: Box<dyn SourceProvider> = if cmd.in_place {
        Box::new(LocalTree::new(repo.clone()))
    } else {
        Box::new(GitSource::new(repo.display().to_string()))
    };

    let mut engine = RunEngine::new(
        source,
        CliRuntime::new(config.build.runtime.clone()),
        Arc::new(EnvSecretStore),
    )
    .keep_image(cmd.keep_image);
    if cli.stream {
        engine = engine.with_log_sink(Arc::new(TerminalLogSink::new()));
    }
    let engine = Arc::new(engine);

    // Set up event handler for console output
    let stream = cli.stream;
    let progress = (!stream && runs.len() == 1).then(StepProgress::new);
    engine
        .add_event_handler(move |event| {
            if let Some(progress) = &progress {
                progress.on_event(&event);
            }
            match &event {
                ExecutionEvent::StepOutput { output, .. } => {
                    if !stream && !output.trim().is_empty() {
                        println!("{}", format_output(output, 5));
                    }
                }
                ExecutionEvent::StepFailed { output, .. } => {
                    println!("{}", format_run_event(&event));
                    if !stream && !output.trim().is_empty() {
                        println!("{}", format_output(output, 40));
                    }
                }
                _ => println!("{}", format_run_event(&event)),
            }
        })
        .await;

    println!();
    let results = RunDispatcher::new(engine, cmd.jobs).dispatch(runs).await;

    let mut failed = 0;
    for result in &results {
        let run = &result.run;

        if !cmd.no_history {
            let summary = create_summary(run, result.error.as_ref());
            match store.save_run(&summary).await {
                Ok(()) => println!(
                    "\n{} Run saved to history (ID: {})",
                    INFO,
                    style(&summary.run_id.to_string()[..8]).dim()
                ),
                Err(e) => warn!("Failed to save run {}: {}", summary.run_id, e),
            }
        }

        match &result.error {
            None if run.passed() => println!(
                "\n{} {} {}",
                CHECK,
                style(&run.name).bold(),
                style("passed").green()
            ),
            error => {
                failed += 1;
                println!(
                    "\n{} {} {}",
                    CROSS,
                    style(&run.name).bold(),
                    style("failed").red()
                );
                for step in &run.steps {
                    println!("  {:<16} {}", step.kind.name(), format_step_state(&step.state));
                }
                if let Some(e) = error {
                    error!("{}", e);
                }
            }
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

async fn check_trigger(cmd: &CheckCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let policy = config.trigger_policy()?;
    let events = resolve_events(&cmd.event, &cmd.repo).await?;

    let decisions: Vec<_> = events
        .iter()
        .map(|event| (event, policy.evaluate(event)))
        .collect();

    if cmd.json {
        let data: Vec<_> = decisions
            .iter()
            .map(|(event, decision)| serde_json::json!({ "event": event, "result": decision }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        for (event, decision) in &decisions {
            println!("{} {}", format_decision(decision), style(event.kind).dim());
        }
    }

    if !decisions.iter().any(|(_, decision)| decision.should_run()) {
        std::process::exit(EXIT_SKIPPED);
    }

    Ok(())
}

fn validate_workflow(cmd: &ValidateCommand, cli: &Cli) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    let path = cmd.file.as_deref().or(cli.config.as_deref());
    let result = load_config(path).and_then(|config| {
        config.validate()?;
        Ok(config)
    });

    match result {
        Ok(config) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            if let Some(push) = &config.on.push {
                println!(
                    "  Push: {} ignored path pattern(s)",
                    style(push.paths_ignore.len()).cyan()
                );
            }
            if let Some(pr) = &config.on.pull_request {
                println!("  Pull request types: {}", style(pr.types.join(", ")).cyan());
            }
            println!(
                "  Manual dispatch: {}",
                style(config.on.workflow_dispatch).cyan()
            );
            println!("  Image: {}", style(&config.build.image).cyan());
            println!("  Test: {}", style(config.test.script()).dim());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn list_workflows(cmd: &ListCommand) -> Result<()> {
    let store = open_store().await?;
    let workflows = store.list_workflows().await?;

    if workflows.is_empty() {
        println!("{} No workflows found in history", INFO);
        return Ok(());
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for workflow in &workflows {
            let runs = store.list_runs(workflow).await?;
            json_data.push(serde_json::json!({
                "name": workflow,
                "run_count": runs.len()
            }));
        }
        let data = serde_json::json!({ "workflows": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Workflows in history:", INFO);

    for workflow in &workflows {
        if cmd.with_counts {
            let runs = store.list_runs(workflow).await?;
            let passed = runs.iter().filter(|r| r.status == RunStatus::Passed).count();
            let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();
            println!(
                "  {} ({} runs: {} passed, {} failed)",
                style(workflow).bold(),
                style(runs.len()).cyan(),
                style(passed).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(workflow).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;

        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.verbose || cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let mut runs = match &cmd.workflow {
        Some(workflow) => store.list_runs(workflow).await?,
        None => {
            let mut all_runs = Vec::new();
            for workflow in store.list_workflows().await? {
                all_runs.extend(store.list_runs(&workflow).await?);
            }
            all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_runs
        }
    };
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Event: {}", summary.event);
    if let Some(git_ref) = &summary.git_ref {
        println!("  Ref: {}", git_ref);
    }
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{})",
        style(format!("{:.0}%", summary.progress() * 100.0)).cyan(),
        summary.completed_steps,
        summary.total_steps
    );
    if let Some(step) = &summary.failed_step {
        println!("  Failed step: {}", style(step).red());
    }
    if let Some(error) = &summary.error {
        println!("  Error: {}", style(error).red());
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
