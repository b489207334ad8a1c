use crate::{
    commands::{KindArg, TargetArgs},
    error::CliError,
};
use model::target::{Location, PageTarget};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct TargetRecord {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

pub fn from_args(args: &TargetArgs) -> Result<Vec<PageTarget>, CliError> {
    if let Some(path) = &args.targets_file {
        let file = std::fs::File::open(path)?;
        return from_csv(file, args.kind);
    }
    expand(args.kind, &args.services, &args.locations)
}

/// Cartesian expansion of services and locations for one page kind.
pub fn expand(
    kind: KindArg,
    services: &[String],
    locations: &[Location],
) -> Result<Vec<PageTarget>, CliError> {
    let targets: Vec<PageTarget> = match kind {
        KindArg::Hub => services.iter().map(|s| PageTarget::hub(s.clone())).collect(),
        KindArg::Leaf => services
            .iter()
            .flat_map(|s| locations.iter().map(move |l| PageTarget::leaf(s.clone(), l)))
            .collect(),
        KindArg::CityHub => locations.iter().map(PageTarget::city_hub).collect(),
    };

    if targets.is_empty() {
        return Err(CliError::InvalidArgs(match kind {
            KindArg::Hub => "hub pages need at least one --service".into(),
            KindArg::Leaf => "leaf pages need at least one --service and one --location".into(),
            KindArg::CityHub => "city hub pages need at least one --location".into(),
        }));
    }
    Ok(targets)
}

/// One target per CSV record. A missing `kind` column falls back to `default_kind`.
pub fn from_csv<R: Read>(reader: R, default_kind: KindArg) -> Result<Vec<PageTarget>, CliError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut targets = Vec::new();

    for (line, record) in csv.deserialize::<TargetRecord>().enumerate() {
        let record = record?;
        let kind = match record.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("") => default_kind,
            Some("hub") => KindArg::Hub,
            Some("leaf") => KindArg::Leaf,
            Some("city_hub") | Some("city-hub") => KindArg::CityHub,
            Some(other) => {
                return Err(CliError::InvalidArgs(format!(
                    "row {}: unknown kind '{other}'",
                    line + 1
                )));
            }
        };
        let location = match (record.city, record.state) {
            (Some(city), Some(state)) if !city.is_empty() && !state.is_empty() => {
                Some(Location::new(city, state))
            }
            _ => None,
        };
        let service = record.service.filter(|s| !s.is_empty());

        let target = match (kind, service, location) {
            (KindArg::Hub, Some(service), _) => PageTarget::hub(service),
            (KindArg::Leaf, Some(service), Some(location)) => PageTarget::leaf(service, &location),
            (KindArg::CityHub, _, Some(location)) => PageTarget::city_hub(&location),
            _ => {
                return Err(CliError::InvalidArgs(format!(
                    "row {}: missing service or location for {kind:?} page",
                    line + 1
                )));
            }
        };
        targets.push(target);
    }

    if targets.is_empty() {
        return Err(CliError::InvalidArgs("targets file has no rows".into()));
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::target::PageKind;

    #[test]
    fn expands_leaves_per_service_and_location() {
        let targets = expand(
            KindArg::Leaf,
            &["Roof Repair".into(), "Gutter Cleaning".into()],
            &[Location::new("Dallas", "TX"), Location::new("Austin", "TX")],
        )
        .unwrap();
        assert_eq!(targets.len(), 4);
        assert!(targets.iter().all(|t| t.kind() == PageKind::Leaf));
    }

    #[test]
    fn leaf_without_locations_is_rejected() {
        assert!(expand(KindArg::Leaf, &["Roof Repair".into()], &[]).is_err());
    }

    #[test]
    fn reads_mixed_csv() {
        let data = "kind,service,city,state\nhub,Roof Repair,,\n,Roof Repair,Dallas,TX\ncity_hub,,Austin,TX\n";
        let targets = from_csv(data.as_bytes(), KindArg::Leaf).unwrap();
        assert_eq!(
            targets.iter().map(PageTarget::kind).collect::<Vec<_>>(),
            vec![PageKind::Hub, PageKind::Leaf, PageKind::CityHub]
        );
    }

    #[test]
    fn csv_row_missing_location_is_rejected() {
        let data = "service,city,state\nRoof Repair,,\n";
        assert!(from_csv(data.as_bytes(), KindArg::Leaf).is_err());
    }
}
