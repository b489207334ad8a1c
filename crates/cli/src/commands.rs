use clap::{Args, Subcommand, ValueEnum};
use model::target::Location;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Create a bulk job and send it to the generation service
    Submit {
        #[arg(long, help = "Job name shown in listings")]
        name: String,

        #[command(flatten)]
        targets: TargetArgs,

        #[command(flatten)]
        options: ImportArgs,
    },
    /// Run one fetch/import/acknowledge step, or keep polling with --watch
    Poll {
        job_id: String,

        #[arg(long, help = "Keep polling until the job no longer needs follow-up")]
        watch: bool,

        #[arg(long, help = "Seconds between polls when watching")]
        interval: Option<u64>,
    },
    /// Cancel a job. Safe to repeat.
    Cancel { job_id: String },
    /// Reconcile a job against the content store and print its snapshot
    Status { job_id: String },
    /// Write terminal row outcomes to a file
    Export {
        job_id: String,

        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,

        #[arg(
            long,
            help = "Output path; defaults to the state directory, '-' writes to stdout"
        )]
        output: Option<String>,
    },
    /// List the most recently created jobs
    Recent {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        #[arg(long, help = "List pipelines instead of jobs")]
        pipelines: bool,
    },
    /// Poll jobs in the background until they finish or Ctrl+C
    Watch {
        #[arg(help = "Jobs to watch; defaults to recent running jobs")]
        job_ids: Vec<String>,
    },
    /// Generate one page synchronously
    Generate {
        #[arg(long, value_enum)]
        kind: KindArg,

        #[arg(long)]
        service: Option<String>,

        #[arg(long, value_parser = parse_location, help = "Location as 'City,ST'")]
        location: Option<Location>,

        #[command(flatten)]
        options: ImportArgs,
    },
    /// Hub, leaf and city-hub jobs run in order
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommand,
    },
}

#[derive(Subcommand)]
pub enum PipelineCommand {
    Start {
        #[arg(long)]
        name: String,

        #[arg(long = "service", required = true)]
        services: Vec<String>,

        #[arg(long = "location", value_parser = parse_location)]
        locations: Vec<Location>,

        #[command(flatten)]
        options: ImportArgs,
    },
    Advance {
        pipeline_id: String,

        #[arg(long, help = "Keep advancing until the pipeline finishes")]
        watch: bool,

        #[arg(long, help = "Seconds between steps when watching")]
        interval: Option<u64>,
    },
    Status {
        pipeline_id: String,
    },
    Cancel {
        pipeline_id: String,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ImportArgs {
    #[arg(long, help = "Overwrite pages that already exist")]
    pub update_existing: bool,

    #[arg(long, help = "Publish imported pages instead of saving drafts")]
    pub auto_publish: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    #[arg(long, value_enum, default_value_t = KindArg::Leaf)]
    pub kind: KindArg,

    #[arg(long = "service")]
    pub services: Vec<String>,

    #[arg(long = "location", value_parser = parse_location)]
    pub locations: Vec<Location>,

    #[arg(
        long,
        conflicts_with_all = ["services", "locations"],
        help = "CSV file with columns kind,service,city,state"
    )]
    pub targets_file: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindArg {
    Hub,
    #[default]
    Leaf,
    CityHub,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Csv,
    Json,
}

pub fn parse_location(raw: &str) -> Result<Location, String> {
    let Some((city, state)) = raw.rsplit_once(',') else {
        return Err(format!("expected 'City,ST', got '{raw}'"));
    };
    let (city, state) = (city.trim(), state.trim());
    if city.is_empty() || state.is_empty() {
        return Err(format!("expected 'City,ST', got '{raw}'"));
    }
    Ok(Location::new(city, state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locations() {
        assert_eq!(
            parse_location("Fort Worth, TX").unwrap(),
            Location::new("Fort Worth", "TX")
        );
        assert!(parse_location("Dallas").is_err());
        assert!(parse_location(",TX").is_err());
    }
}
