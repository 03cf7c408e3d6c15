use anyhow::{Context, Result};
use solr_subquery::cli::commands::{
    HistoryCommand, PlanCommand, QueryAction, QueryCommand, RunCommand, ValidateCommand,
};
use solr_subquery::cli::output::*;
use solr_subquery::cli::{load_workflow_config, Cli, Command};
use solr_subquery::core::ExecutionStatus;
use solr_subquery::execution::{
    DryRunPublisher, DryRunRunner, ExecutionEngine, ExecutionEvent, GhReleasePublisher,
    ProcessRunner, Publisher, StepRunner,
};
#[cfg(feature = "sqlite")]
use solr_subquery::persistence::SqliteRunStore;
use solr_subquery::persistence::{create_summary, InMemoryPersistence, PersistenceBackend, RunSummary};
use solr_subquery::query::{QueryChain, SolrQuery};
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd).await?,
        Command::Plan(cmd) => plan_workflow(cmd)?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
        Command::Query(cmd) => run_query(cmd)?,
    }

    Ok(())
}

async fn open_store() -> Result<Box<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        match SqliteRunStore::with_default_path().await {
            Ok(store) => return Ok(Box::new(store)),
            Err(e) => error!("Failed to open history database, using memory: {:#}", e),
        }
    }
    Ok(Box::new(InMemoryPersistence::new()))
}

async fn run_workflow(cmd: &RunCommand) -> Result<()> {
    let config = load_workflow_config(cmd.file.as_deref())?;
    let event = cmd.refs.event(cmd.manual)?;

    println!("{} Loaded workflow: {}", INFO, style(&config.name).bold());

    let mut workflow = config.to_workflow()?;

    let (runner, publisher): (Arc<dyn StepRunner>, Arc<dyn Publisher>) = if cmd.dry_run {
        println!("{} Dry run: commands and uploads are only printed", WARN);
        (Arc::new(DryRunRunner::new()), Arc::new(DryRunPublisher::new()))
    } else {
        (Arc::new(ProcessRunner::new()), Arc::new(GhReleasePublisher::default()))
    };

    let working_dir = match &cmd.workdir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let mut engine = ExecutionEngine::new(runner, publisher)
        .with_working_dir(working_dir)
        .with_strategy(cmd.strategy.with_limit(cmd.max_parallel));

    for name in config.secret_names() {
        match std::env::var(&name) {
            Ok(value) => engine = engine.with_secret(name, value),
            Err(_) => debug!("Secret {} is not set", name),
        }
    }

    let total_instances: usize = workflow.jobs.values().map(|j| j.instances().len()).sum();
    let progress = create_progress_bar(total_instances);
    let bar = progress.clone();
    engine
        .add_event_handler(move |event| {
            if let ExecutionEvent::InstanceFinished { .. } = &event {
                bar.inc(1);
            }
            if let ExecutionEvent::RunCompleted { .. } | ExecutionEvent::RunNotTriggered { .. } =
                &event
            {
                bar.finish_and_clear();
            }
            if let Some(line) = format_execution_event(&event) {
                bar.println(line);
            }
        })
        .await;

    let result = engine.execute(&mut workflow, &event).await;
    progress.finish_and_clear();

    println!();
    for line in format_job_results(&workflow) {
        println!("{}", line);
    }

    if !cmd.no_history {
        let store = open_store().await?;
        let summary = create_summary(&workflow);
        store.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(summary.execution_id).dim()
        );
    }

    if let Err(e) = result {
        error!("{}", e);
        println!("\n{} {} {}", CROSS, style(&workflow.name).bold(), style("failed").red());
        std::process::exit(1);
    }

    match workflow.state.status {
        ExecutionStatus::Completed => println!(
            "\n{} {} completed {}",
            CHECK,
            style(&workflow.name).bold(),
            style("successfully").green()
        ),
        ExecutionStatus::NotTriggered => println!(
            "\n{} {} was not triggered by {}",
            INFO,
            style(&workflow.name).bold(),
            style(&event).cyan()
        ),
        _ => {
            println!("\n{} {} {}", CROSS, style(&workflow.name).bold(), style("failed").red());
            std::process::exit(1);
        }
    }

    Ok(())
}

fn plan_workflow(cmd: &PlanCommand) -> Result<()> {
    let config = load_workflow_config(cmd.file.as_deref())?;
    let workflow = config.to_workflow()?;
    let event = cmd.refs.event(cmd.manual)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&workflow, &event))?);
    } else {
        for line in format_plan(&workflow, &event) {
            println!("{}", line);
        }
    }

    Ok(())
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    match load_workflow_config(cmd.file.as_deref()) {
        Ok(config) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Jobs: {}", style(config.jobs.len()).cyan());
            let instances: usize = config
                .jobs
                .values()
                .map(|job| job.matrix().values().map(Vec::len).product::<usize>())
                .sum();
            println!("  Job instances: {}", style(instances).cyan());

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

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store().await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        match store.load_run(exec_id).await? {
            Some(summary) => print_run_details(&summary, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let mut runs = match &cmd.workflow {
        Some(name) => store.list_runs(name).await?,
        None => {
            let mut all_runs = Vec::new();
            for name in store.list_workflows().await? {
                all_runs.extend(store.list_runs(&name).await?);
            }
            all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_runs
        }
    };
    runs.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Ref: {}", style(&summary.git_ref).cyan());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Jobs: {} completed, {} failed, {} total ({})",
        style(summary.completed_jobs).green(),
        style(summary.failed_jobs).red(),
        summary.total_jobs,
        style(format!("{:.0}%", summary.progress * 100.0)).cyan()
    );

    Ok(())
}

fn run_query(cmd: &QueryCommand) -> Result<()> {
    match &cmd.action {
        QueryAction::Join { urls } => {
            let mut chain = QueryChain::new(Vec::new());
            for url in urls {
                chain
                    .add_subquery(url.as_str())
                    .with_context(|| format!("Invalid query {}", url))?;
            }
            let joined = chain.fold_all()?;
            println!("{}", joined);
            println!("{}", joined.inverse());
        }
        QueryAction::Chain { urls } => {
            let queries = urls
                .iter()
                .map(|url| SolrQuery::parse(url).with_context(|| format!("Invalid query {}", url)))
                .collect::<Result<Vec<_>>>()?;
            for (index, query) in QueryChain::new(queries).enumerate() {
                println!("{}. {}", index + 1, query?);
            }
        }
        QueryAction::Inverse { url } => {
            let query = SolrQuery::parse(url)?;
            println!("{}", query.inverse());
        }
    }

    Ok(())
}
