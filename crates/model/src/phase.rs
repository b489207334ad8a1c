use crate::target::{Location, PageTarget};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of the generation pipeline, in dependency order.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    HubPages,
    LeafPages,
    CityHubPages,
}

impl PhaseKind {
    pub const ORDERED: [PhaseKind; 3] = [
        PhaseKind::HubPages,
        PhaseKind::LeafPages,
        PhaseKind::CityHubPages,
    ];

    pub fn next(&self) -> Option<PhaseKind> {
        match self {
            PhaseKind::HubPages => Some(PhaseKind::LeafPages),
            PhaseKind::LeafPages => Some(PhaseKind::CityHubPages),
            PhaseKind::CityHubPages => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::HubPages => "hub_pages",
            PhaseKind::LeafPages => "leaf_pages",
            PhaseKind::CityHubPages => "city_hub_pages",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Canceled,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Phase {
    pub kind: PhaseKind,
    pub status: PhaseStatus,
    pub job_id: Option<String>,
    pub message: Option<String>,
    pub success: u64,
}

impl Phase {
    pub fn new(kind: PhaseKind) -> Self {
        Self {
            kind,
            status: PhaseStatus::Pending,
            job_id: None,
            message: None,
            success: 0,
        }
    }
}

/// Inputs shared by every phase of a pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelinePlan {
    pub name: String,
    pub services: Vec<String>,
    pub locations: Vec<Location>,
    pub update_existing: bool,
    pub auto_publish: bool,
}

impl PipelinePlan {
    /// Work for one phase: hubs per service, leaves per service and location,
    /// city hubs per location.
    pub fn targets_for(&self, phase: PhaseKind) -> Vec<PageTarget> {
        match phase {
            PhaseKind::HubPages => self
                .services
                .iter()
                .map(|service| PageTarget::hub(service.clone()))
                .collect(),
            PhaseKind::LeafPages => self
                .services
                .iter()
                .flat_map(|service| {
                    self.locations
                        .iter()
                        .map(move |location| PageTarget::leaf(service.clone(), location))
                })
                .collect(),
            PhaseKind::CityHubPages => self.locations.iter().map(PageTarget::city_hub).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Running,
    Completed,
    /// Stopped by a submission or configuration error.
    Aborted,
    Canceled,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineStatus::Running)
    }
}

/// Three dependent jobs driven as one unit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub id: String,
    pub plan: PipelinePlan,
    pub status: PipelineStatus,
    pub phases: Vec<Phase>,
    pub total_success: u64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, plan: PipelinePlan) -> Self {
        Self {
            id: id.into(),
            plan,
            status: PipelineStatus::Running,
            phases: PhaseKind::ORDERED.iter().map(|k| Phase::new(*k)).collect(),
            total_success: 0,
            last_error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn phase(&self, kind: PhaseKind) -> &Phase {
        &self.phases[kind as usize]
    }

    pub fn phase_mut(&mut self, kind: PhaseKind) -> &mut Phase {
        &mut self.phases[kind as usize]
    }

    /// First phase that has not completed yet.
    pub fn current_phase(&self) -> Option<PhaseKind> {
        self.phases
            .iter()
            .find(|p| p.status != PhaseStatus::Completed)
            .map(|p| p.kind)
    }

    pub fn abort(&mut self, kind: PhaseKind, message: impl Into<String>) {
        let message = message.into();
        let phase = self.phase_mut(kind);
        phase.status = PhaseStatus::Canceled;
        phase.message = Some(message.clone());
        self.status = PipelineStatus::Aborted;
        self.last_error = Some(message);
    }

    pub fn cancel(&mut self) {
        if let Some(kind) = self.current_phase() {
            let phase = self.phase_mut(kind);
            phase.status = PhaseStatus::Canceled;
            phase.message = Some("canceled by operator".into());
        }
        self.status = PipelineStatus::Canceled;
    }

    pub fn finish(&mut self) {
        self.total_success = self.phases.iter().map(|p| p.success).sum();
        self.status = PipelineStatus::Completed;
        self.completed_at = Some(Utc::now());
    }
}
