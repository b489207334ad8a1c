use crate::{
    app::App,
    commands::{Commands, FormatArg, PipelineCommand},
    error::CliError,
    shutdown::{EXIT_INTERRUPTED, cancel_on_signal},
};
use clap::Parser;
use engine_config::{
    report::export::{ExportFormat, export_to_path, write_rows},
    settings::{Settings, env::EnvSource, validator::SettingsValidator},
};
use engine_core::state::JobStore;
use engine_runtime::{
    actor::poller::{BackgroundPoller, PollerConfig},
    coordinator::SingleOptions,
};
use model::{
    job::{JobSpec, JobStatus},
    phase::PipelinePlan,
};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod error;
mod output;
mod shutdown;
mod targets;

#[derive(Parser)]
#[command(name = "bulkgen", version, about = "Bulk page generation jobs")]
struct Cli {
    #[arg(long, global = true, help = "Settings file (JSON)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Load environment variables from this file")]
    env_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Print JSON instead of tables")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    match run(cli, &shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::ShutdownRequested) => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, shutdown: &CancellationToken) -> Result<(), CliError> {
    let mut env = EnvSource::from_process();
    if let Some(path) = &cli.env_file {
        env.load_dotenv(path)?;
    }
    let settings = Settings::load(cli.config.as_deref(), &env, &SettingsValidator::default())?;
    let app = App::open(settings)?;
    let json = cli.json;

    match cli.command {
        Commands::Submit {
            name,
            targets,
            options,
        } => {
            let targets = targets::from_args(&targets)?;
            let spec = JobSpec::new(name, targets)
                .with_update_existing(options.update_existing)
                .with_auto_publish(options.auto_publish);
            let (job_id, remote_job_id) = app.coordinator.create_and_submit(spec).await?;
            if json {
                output::print_json(&serde_json::json!({
                    "job_id": job_id,
                    "remote_job_id": remote_job_id,
                }))?;
            } else {
                println!("Submitted job {job_id} (remote {remote_job_id})");
            }
        }

        Commands::Poll {
            job_id,
            watch,
            interval,
        } => {
            let interval = interval_or(interval, &app);
            loop {
                let report = app.coordinator.poll(&job_id).await?;
                output::print_poll(&report, json)?;
                if !watch || !report.needs_followup {
                    break;
                }
                pause(interval, shutdown).await?;
            }
        }

        Commands::Cancel { job_id } => {
            let job = app.coordinator.cancel(&job_id).await?;
            output::print_job(&job, json)?;
        }

        Commands::Status { job_id } => {
            let job = app.coordinator.status(&job_id).await?;
            output::print_job(&job, json)?;
        }

        Commands::Export {
            job_id,
            format,
            output,
        } => {
            let rows = app.coordinator.export(&job_id).await?;
            let format = match format {
                FormatArg::Csv => ExportFormat::Csv,
                FormatArg::Json => ExportFormat::Json,
            };
            match output.as_deref() {
                Some("-") => write_rows(&rows, format, std::io::stdout().lock())?,
                Some(path) => {
                    export_to_path(&rows, format, &PathBuf::from(path))?;
                    println!("Wrote {} rows to {path}", rows.len());
                }
                None => {
                    let path = app
                        .settings
                        .exports_dir()
                        .join(format!("{job_id}.{}", format.extension()));
                    export_to_path(&rows, format, &path)?;
                    println!("Wrote {} rows to {}", rows.len(), path.display());
                }
            }
        }

        Commands::Recent { limit, pipelines } => {
            let ids = if pipelines {
                app.sequencer.recent(limit).await?
            } else {
                app.coordinator.recent(limit).await?
            };
            output::print_ids(&ids, json)?;
        }

        Commands::Watch { job_ids } => watch_jobs(&app, job_ids, json, shutdown).await?,

        Commands::Generate {
            kind,
            service,
            location,
            options,
        } => {
            let services: Vec<String> = service.into_iter().collect();
            let locations: Vec<_> = location.into_iter().collect();
            let target = targets::expand(kind, &services, &locations)?
                .into_iter()
                .next()
                .ok_or_else(|| CliError::InvalidArgs("nothing to generate".into()))?;

            let result = app
                .coordinator
                .generate_single(
                    target,
                    SingleOptions {
                        update_existing: options.update_existing,
                        auto_publish: options.auto_publish,
                    },
                )
                .await?;
            output::print_import(&result, json)?;
        }

        Commands::Pipeline { command } => match command {
            PipelineCommand::Start {
                name,
                services,
                locations,
                options,
            } => {
                let pipeline = app
                    .sequencer
                    .start(PipelinePlan {
                        name,
                        services,
                        locations,
                        update_existing: options.update_existing,
                        auto_publish: options.auto_publish,
                    })
                    .await?;
                output::print_pipeline(&pipeline, json)?;
            }
            PipelineCommand::Advance {
                pipeline_id,
                watch,
                interval,
            } => {
                let interval = interval_or(interval, &app);
                loop {
                    let pipeline = app.sequencer.advance(&pipeline_id).await?;
                    output::print_pipeline(&pipeline, json)?;
                    if !watch || pipeline.status.is_terminal() {
                        break;
                    }
                    pause(interval, shutdown).await?;
                }
            }
            PipelineCommand::Status { pipeline_id } => {
                let pipeline = app.sequencer.status(&pipeline_id).await?;
                output::print_pipeline(&pipeline, json)?;
            }
            PipelineCommand::Cancel { pipeline_id } => {
                let pipeline = app.sequencer.cancel(&pipeline_id).await?;
                output::print_pipeline(&pipeline, json)?;
            }
        },
    }

    Ok(())
}

fn interval_or(secs: Option<u64>, app: &App) -> Duration {
    secs.map(Duration::from_secs)
        .unwrap_or(app.settings.poll_interval)
}

/// Sleeps for `interval` unless a shutdown signal arrives first.
async fn pause(interval: Duration, shutdown: &CancellationToken) -> Result<(), CliError> {
    tokio::select! {
        _ = shutdown.cancelled() => Err(CliError::ShutdownRequested),
        _ = tokio::time::sleep(interval) => Ok(()),
    }
}

async fn watch_jobs(
    app: &App,
    job_ids: Vec<String>,
    json: bool,
    shutdown: &CancellationToken,
) -> Result<(), CliError> {
    let store = app.coordinator.store().clone();

    let job_ids = if job_ids.is_empty() {
        let mut running = Vec::new();
        for id in app.coordinator.recent(50).await? {
            if store.load(&id).await?.status == JobStatus::Running {
                running.push(id);
            }
        }
        running
    } else {
        job_ids
    };
    if job_ids.is_empty() {
        println!("No running jobs to watch");
        return Ok(());
    }

    let config = PollerConfig {
        interval: app.settings.poll_interval,
        ..PollerConfig::default()
    };
    let poller = BackgroundPoller::spawn(
        app.coordinator.clone(),
        config,
        shutdown.child_token(),
    )
    .await?;
    for id in &job_ids {
        poller.schedule(id.clone(), Duration::ZERO).await?;
    }
    info!(jobs = job_ids.len(), "Watching jobs");

    let mut outcome = Ok(());
    loop {
        let mut open = 0;
        for id in &job_ids {
            if !store.load(id).await?.status.is_terminal() {
                open += 1;
            }
        }
        if open == 0 {
            break;
        }
        if let Err(e) = pause(app.settings.poll_interval, shutdown).await {
            outcome = Err(e);
            break;
        }
    }

    poller.shutdown().await?;
    for id in &job_ids {
        output::print_job(&store.load(id).await?, json)?;
    }
    outcome
}
