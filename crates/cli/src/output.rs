use crate::error::CliError;
use engine_config::report::summary::{JobSummary, PipelineSummary};
use engine_processing::import_gate::ImportResult;
use engine_runtime::coordinator::PollReport;
use model::{job::Job, phase::Pipeline};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_job(job: &Job, as_json: bool) -> Result<(), CliError> {
    let summary = JobSummary::from(job);
    if as_json {
        return print_json(&summary);
    }

    println!("Job '{}' ({})", summary.id, summary.name);
    println!("-----------------------------");
    println!("{:<16} {}", "Status", summary.status);
    println!(
        "{:<16} {}/{} ({:.0}%)",
        "Processed",
        summary.processed,
        summary.total_rows,
        summary.percent_done()
    );
    println!("{:<16} {}", "Success", summary.success);
    println!("{:<16} {}", "Skipped", summary.skipped);
    println!("{:<16} {}", "Failed", summary.failed);
    println!(
        "{:<16} {}",
        "Remote job",
        summary.remote_job_id.as_deref().unwrap_or("n/a")
    );
    if let Some(error) = &summary.last_error {
        println!("{:<16} {}", "Last error", error);
    }
    Ok(())
}

pub fn print_poll(report: &PollReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        return print_json(&serde_json::json!({
            "job_id": report.job_id,
            "status": report.status,
            "processed": report.counters.processed,
            "total_rows": report.total_rows,
            "fetched": report.fetched,
            "acknowledged": report.acknowledged,
            "imported": report.tally.imported,
            "already_existed": report.tally.already_existed,
            "failed": report.tally.failed,
            "lock_contended": report.tally.lock_contended,
            "error": report.error,
            "needs_followup": report.needs_followup,
        }));
    }

    let remote = report
        .remote
        .as_ref()
        .map(|r| format!("{}/{} done remotely", r.completed + r.failed, r.total_items))
        .unwrap_or_else(|| "remote status unavailable".to_string());
    println!(
        "{} {} | {}/{} processed | fetched {} imported {} existing {} failed {} | {}",
        report.job_id,
        report.status,
        report.counters.processed,
        report.total_rows,
        report.fetched,
        report.tally.imported,
        report.tally.already_existed,
        report.tally.failed,
        remote
    );
    if let Some(error) = &report.error {
        println!("  transient error, will retry: {error}");
    }
    Ok(())
}

pub fn print_pipeline(pipeline: &Pipeline, as_json: bool) -> Result<(), CliError> {
    let summary = PipelineSummary::from(pipeline);
    if as_json {
        return print_json(&summary);
    }

    println!("Pipeline '{}' ({})", summary.id, summary.name);
    println!("-----------------------------");
    println!("{:<16} {:?}", "Status", summary.status);
    for phase in &summary.phases {
        println!(
            "{:<16} {:<10} job={} success={} {}",
            phase.kind.as_str(),
            format!("{:?}", phase.status).to_lowercase(),
            phase.job_id.as_deref().unwrap_or("-"),
            phase.success,
            phase.message.as_deref().unwrap_or("")
        );
    }
    println!("{:<16} {}", "Total success", summary.total_success);
    if let Some(error) = &summary.last_error {
        println!("{:<16} {}", "Last error", error);
    }
    Ok(())
}

pub fn print_import(result: &ImportResult, as_json: bool) -> Result<(), CliError> {
    let artifact = result.artifact_ref.as_ref().map(|a| a.as_str().to_string());
    if as_json {
        return print_json(&serde_json::json!({
            "outcome": format!("{:?}", result.outcome),
            "artifact_ref": artifact,
            "error": result.error,
        }));
    }
    println!(
        "{:?} artifact={} {}",
        result.outcome,
        artifact.as_deref().unwrap_or("-"),
        result.error.as_deref().unwrap_or("")
    );
    Ok(())
}

pub fn print_ids(ids: &[String], as_json: bool) -> Result<(), CliError> {
    if as_json {
        return print_json(&ids);
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}
