//! Disaster-recovery runbook.
//!
//! Operator-facing sequencing for the three disaster scenarios, with the
//! declared recovery targets. The checklists are data the CLI prints, not
//! executable logic: the actual work is one `backup`/`restore` invocation at
//! the step that calls for it.

use crate::StoreKind;

/// Declared Recovery Time Objective, in hours.
pub const RTO_HOURS: u32 = 4;

/// Recovery Point Objective given the configured backup interval: the worst
/// case is losing everything since the last completed backup.
pub fn rpo_hours(backup_interval_hours: u32) -> u32 {
    backup_interval_hours
}

/// The three disaster scenarios the runbook covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// The PostgreSQL store is lost or unrecoverable.
    RelationalLoss,
    /// The vector persist directory is corrupted.
    VectorCorruption,
    /// Hosts, disks, and both stores are gone.
    FullInfrastructureLoss,
}

impl Scenario {
    /// Scenario name used on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::RelationalLoss => "relational-loss",
            Scenario::VectorCorruption => "vector-corruption",
            Scenario::FullInfrastructureLoss => "full-loss",
        }
    }

    /// Which stores a restore should target in this scenario.
    ///
    /// Per-store restore is not offered on the restore surface itself; the
    /// scenario notes tell the operator which outcome matters.
    pub fn affected_stores(&self) -> &'static [StoreKind] {
        match self {
            Scenario::RelationalLoss => &[StoreKind::Relational],
            Scenario::VectorCorruption => &[StoreKind::Vector],
            Scenario::FullInfrastructureLoss => &[StoreKind::Vector, StoreKind::Relational],
        }
    }

    /// Ordered operator checklist for this scenario.
    pub fn checklist(&self) -> Vec<ChecklistStep> {
        let fetch_hint = match self {
            Scenario::FullInfrastructureLoss => {
                "provision replacement infrastructure, install kbvault, then fetch from remote"
            }
            _ => "prefer the local artifact; fall back to remote if the backup directory is gone",
        };
        let restore_hint = match self {
            Scenario::RelationalLoss => {
                "run `kbvault restore <ts> <source> --yes`; only the relational outcome matters, \
                 a vector failure here is reportable but not blocking"
            }
            Scenario::VectorCorruption => {
                "run `kbvault restore <ts> <source> --yes`; only the vector outcome matters"
            }
            Scenario::FullInfrastructureLoss => {
                "run `kbvault restore <ts> remote --yes`; both stores must come back"
            }
        };

        vec![
            ChecklistStep::new("assess", "confirm the failure mode and scope; capture store error output before touching anything"),
            ChecklistStep::new("identify", "run `kbvault list-backups` (or inspect the remote metadata/ prefix) and pick the latest valid timestamp"),
            ChecklistStep::new("fetch", fetch_hint),
            ChecklistStep::new("stop", "stop the chat application and bots so nothing writes to the stores mid-restore"),
            ChecklistStep::new("restore", restore_hint),
            ChecklistStep::new("verify", "check the restore report per store; exit code 2 means partial, rerun for the failed store before proceeding"),
            ChecklistStep::new("restart", "restart the application and run one end-to-end query"),
            ChecklistStep::new("monitor", "watch logs and usage analytics for the first hour; keep the safety snapshot until signed off"),
        ]
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "relational-loss" => Ok(Scenario::RelationalLoss),
            "vector-corruption" => Ok(Scenario::VectorCorruption),
            "full-loss" => Ok(Scenario::FullInfrastructureLoss),
            other => Err(format!(
                "unknown scenario {other:?}; expected relational-loss, vector-corruption, or full-loss"
            )),
        }
    }
}

/// One ordered step in a scenario checklist.
#[derive(Debug, Clone)]
pub struct ChecklistStep {
    /// Short step name.
    pub name: &'static str,
    /// What the operator does.
    pub action: &'static str,
}

impl ChecklistStep {
    fn new(name: &'static str, action: &'static str) -> Self {
        Self { name, action }
    }
}
