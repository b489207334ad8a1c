use crate::error::ReportError;
use model::job::RowOutcome;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
    str::FromStr,
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ReportError::UnsupportedFormat(other.to_string())),
        }
    }
}

pub fn write_rows<W: Write>(
    rows: &[RowOutcome],
    format: ExportFormat,
    writer: W,
) -> Result<(), ReportError> {
    match format {
        ExportFormat::Csv => {
            let mut csv = csv::Writer::from_writer(writer);
            for row in rows {
                csv.serialize(row)?;
            }
            csv.flush()?;
        }
        ExportFormat::Json => {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, rows)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Writes `rows` to `path`, creating parent directories as needed.
pub fn export_to_path(
    rows: &[RowOutcome],
    format: ExportFormat,
    path: &Path,
) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_rows(rows, format, &mut writer)?;
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), format = format.extension(), "Export written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::job::RowStatus;

    fn rows() -> Vec<RowOutcome> {
        vec![
            RowOutcome {
                index: 0,
                kind: "leaf".into(),
                service: Some("Roof Repair".into()),
                city: Some("Dallas".into()),
                state: Some("TX".into()),
                canonical_key: "leaf:roof-repair:dallas-tx".into(),
                status: RowStatus::Success,
                message: Some("imported".into()),
                artifact_ref: Some("art-1".into()),
                attempts: 1,
            },
            RowOutcome {
                index: 3,
                kind: "hub".into(),
                service: Some("Roof Repair".into()),
                city: None,
                state: None,
                canonical_key: "hub:roof-repair".into(),
                status: RowStatus::Failed,
                message: Some("model refused, with comma".into()),
                artifact_ref: None,
                attempts: 2,
            },
        ]
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let mut out = Vec::new();
        write_rows(&rows(), ExportFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("index,kind,service,city,state,canonical_key,status"));
        assert!(lines[1].contains("success"));
        assert!(lines[2].contains("\"model refused, with comma\""));
    }

    #[test]
    fn json_export_parses_back() {
        let mut out = Vec::new();
        write_rows(&rows(), ExportFormat::Json, &mut out).unwrap();
        let parsed: Vec<RowOutcome> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, rows());
    }

    #[test]
    fn writes_into_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports/job.csv");
        export_to_path(&rows(), ExportFormat::Csv, &path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
