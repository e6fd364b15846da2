//! Seams to the host CRM. The core never reaches the CRM except through
//! these traits, so tests substitute fakes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::normalize::RawDeals;

/// Stages treated as "open" when querying a pipeline.
pub const OPEN_STAGES: [&str; 8] = [
    "Initial Contact",
    "Qualification",
    "Awaiting Quote - Product",
    "Awaiting Quote - Services",
    "Quoted",
    "Upside",
    "Commit",
    "At Risk",
];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub is_admin: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no identity available")]
    NoIdentity,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Search criteria for one owner's open deals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealQuery {
    pub owner: String,
    pub stages: Vec<String>,
}

impl DealQuery {
    pub fn open_deals(owner: impl Into<String>) -> Self {
        DealQuery {
            owner: owner.into(),
            stages: OPEN_STAGES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_stages(owner: impl Into<String>, stages: &[String]) -> Self {
        if stages.is_empty() {
            return DealQuery::open_deals(owner);
        }
        DealQuery {
            owner: owner.into(),
            stages: stages.to_vec(),
        }
    }

    pub fn matches(&self, owner: &str, stage: &str) -> bool {
        self.owner == owner && self.stages.iter().any(|s| s == stage)
    }

    /// CRM search criteria string, e.g.
    /// `((Owner:equals:Ann)and(Stage:equals:Quoted)or(Stage:equals:Commit))`.
    pub fn criteria(&self) -> String {
        let stages = self
            .stages
            .iter()
            .map(|s| format!("(Stage:equals:{})", s))
            .collect::<Vec<_>>()
            .join("or");
        format!("((Owner:equals:{})and{})", self.owner, stages)
    }
}

/// Remote answer to a close-date update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Success,
    Rejected { code: String, message: String },
}

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Result<Identity, ServiceError>;
}

/// Active users, for the administrative pipeline picker.
pub trait UserDirectory: Send + Sync {
    fn active_users(&self) -> Result<Vec<Identity>, ServiceError>;
}

pub trait DealQueryService: Send + Sync {
    fn search_deals(&self, query: &DealQuery) -> Result<RawDeals, ServiceError>;
}

pub trait DealUpdateService: Send + Sync {
    fn update_close_date(
        &self,
        external_id: &str,
        close_date: NaiveDate,
    ) -> Result<UpdateOutcome, ServiceError>;
}

/// Update service for local/offline operation: every update succeeds and
/// nothing leaves the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineUpdates;

impl DealUpdateService for OfflineUpdates {
    fn update_close_date(
        &self,
        external_id: &str,
        close_date: NaiveDate,
    ) -> Result<UpdateOutcome, ServiceError> {
        tracing::info!(external_id, %close_date, "offline mode: skipping remote update");
        Ok(UpdateOutcome::Success)
    }
}
