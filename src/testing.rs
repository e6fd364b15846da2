//! Service fakes shared by unit tests.

use chrono::NaiveDate;
use std::sync::Mutex;

use crate::normalize::RawDeals;
use crate::services::{
    DealQuery, DealQueryService, DealUpdateService, Identity, IdentityProvider, ServiceError,
    UpdateOutcome, UserDirectory,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Reject,
    Error,
}

/// Update service that records every call and answers per its script.
#[derive(Debug)]
pub struct RecordingUpdates {
    script: Script,
    calls: Mutex<Vec<(String, NaiveDate)>>,
}

impl RecordingUpdates {
    pub fn new(script: Script) -> Self {
        RecordingUpdates {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, NaiveDate)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl DealUpdateService for RecordingUpdates {
    fn update_close_date(
        &self,
        external_id: &str,
        close_date: NaiveDate,
    ) -> Result<UpdateOutcome, ServiceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((external_id.to_string(), close_date));
        }
        match self.script {
            Script::Succeed => Ok(UpdateOutcome::Success),
            Script::Reject => Ok(UpdateOutcome::Rejected {
                code: "INVALID_DATA".into(),
                message: "scripted rejection".into(),
            }),
            Script::Error => Err(ServiceError::Unavailable("scripted outage".into())),
        }
    }
}

/// Query service returning a fixed payload, or failing when `None`.
#[derive(Debug)]
pub struct CannedQuery {
    pub payload: Option<RawDeals>,
    pub seen: Mutex<Vec<DealQuery>>,
}

impl CannedQuery {
    pub fn new(payload: Option<RawDeals>) -> Self {
        CannedQuery {
            payload,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl DealQueryService for CannedQuery {
    fn search_deals(&self, query: &DealQuery) -> Result<RawDeals, ServiceError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(query.clone());
        }
        self.payload
            .clone()
            .ok_or_else(|| ServiceError::Unavailable("scripted outage".into()))
    }
}

#[derive(Debug, Default)]
pub struct StaticUsers {
    pub current: Option<Identity>,
    pub users: Vec<Identity>,
}

impl IdentityProvider for StaticUsers {
    fn current_user(&self) -> Result<Identity, ServiceError> {
        self.current.clone().ok_or(ServiceError::NoIdentity)
    }
}

impl UserDirectory for StaticUsers {
    fn active_users(&self) -> Result<Vec<Identity>, ServiceError> {
        Ok(self.users.clone())
    }
}

pub fn identity(id: &str, name: &str) -> Identity {
    Identity {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{}@example.com", id),
        role: Some("Sales".into()),
        ..Identity::default()
    }
}
