//! Two-phase commit for moving a deal into a different month.
//!
//! A cross-bucket drop becomes a [`PendingCommit`] with a proposed day. The
//! user confirms a day (or cancels) before anything is written; the CRM
//! update then runs, and only a successful answer moves the deal on the
//! board. Every other path puts the deal back where the drag found it.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

use crate::drag::{revert, CrossBucketDrop};
use crate::model::{Board, DealId};
use crate::services::{ServiceError, UpdateOutcome};
use crate::window::{days_in_month, parse_month_key};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    pub deal_id: DealId,
    pub external_id: String,
    pub source_bucket: String,
    pub origin_index: usize,
    pub target_bucket: String,
    pub year: i32,
    pub month: u32,
    pub proposed_day: u32,
}

impl PendingCommit {
    pub fn day_count(&self) -> u32 {
        days_in_month(self.year, self.month)
    }

    pub fn close_date(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }
}

/// The CRM call a confirmed commit needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub deal_id: DealId,
    pub external_id: String,
    pub close_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub pending: PendingCommit,
    pub request: UpdateRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackReason {
    Cancelled,
    AlreadyInFlight,
    Rejected { code: String, message: String },
    Failed(String),
    /// The CRM accepted the change but the board could not apply it.
    LocalApply(String),
}

impl std::fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackReason::Cancelled => write!(f, "cancelled"),
            RollbackReason::AlreadyInFlight => write!(f, "an update for this deal is already in flight"),
            RollbackReason::Rejected { code, message } => write!(f, "rejected by CRM ({}): {}", code, message),
            RollbackReason::Failed(err) => write!(f, "update failed: {}", err),
            RollbackReason::LocalApply(err) => write!(f, "could not apply locally: {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitState {
    Idle,
    Proposed(PendingCommit),
    Committing(InFlight),
    Committed {
        deal_id: DealId,
        bucket: String,
        close_date: NaiveDate,
    },
    RolledBack {
        deal_id: DealId,
        bucket: String,
        reason: RollbackReason,
    },
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CommitError {
    #[error("a date confirmation is already open for deal {0}")]
    ModalOpen(DealId),
    #[error("no pending commit")]
    NoPending,
    #[error("day {day} is not valid for a month with {max} days")]
    InvalidDay { day: u32, max: u32 },
    #[error("no update in flight for deal {0}")]
    UnknownCommit(DealId),
    #[error("bucket key {0} does not name a month")]
    BadBucketKey(String),
    #[error("deal not found: {0}")]
    DealNotFound(DealId),
}

/// Keeps the current day when the target month has it, otherwise the 1st.
pub fn propose_day(current: NaiveDate, year: i32, month: u32) -> u32 {
    let day = current.day();
    if day <= days_in_month(year, month) {
        day
    } else {
        1
    }
}

#[derive(Debug, Default)]
pub struct CommitWorkflow {
    pending: Option<PendingCommit>,
    in_flight: HashMap<DealId, InFlight>,
}

impl CommitWorkflow {
    pub fn new() -> Self {
        CommitWorkflow::default()
    }

    pub fn pending(&self) -> Option<&PendingCommit> {
        self.pending.as_ref()
    }

    /// True while a date confirmation is waiting on the user.
    pub fn is_modal_open(&self) -> bool {
        self.pending.is_some()
    }

    pub fn in_flight(&self, deal_id: &str) -> Option<&InFlight> {
        self.in_flight.get(deal_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Phase of the given deal's move, as far as this workflow knows.
    pub fn phase(&self, deal_id: &str) -> CommitState {
        if let Some(pending) = self.pending.as_ref().filter(|p| p.deal_id == deal_id) {
            return CommitState::Proposed(pending.clone());
        }
        match self.in_flight.get(deal_id) {
            Some(flight) => CommitState::Committing(flight.clone()),
            None => CommitState::Idle,
        }
    }

    pub fn propose(&mut self, drop: CrossBucketDrop, board: &mut Board) -> Result<CommitState, CommitError> {
        if let Some(open) = &self.pending {
            let open_id = open.deal_id.clone();
            revert(board, &drop.deal_id, &drop.source_bucket, drop.origin_index);
            return Err(CommitError::ModalOpen(open_id));
        }
        if self.in_flight.contains_key(&drop.deal_id) {
            tracing::warn!(deal = %drop.deal_id, "move refused: update already in flight");
            revert(board, &drop.deal_id, &drop.source_bucket, drop.origin_index);
            return Ok(CommitState::RolledBack {
                deal_id: drop.deal_id,
                bucket: drop.source_bucket,
                reason: RollbackReason::AlreadyInFlight,
            });
        }
        let (year, month) = match parse_month_key(&drop.target_bucket) {
            Some(ym) => ym,
            None => {
                revert(board, &drop.deal_id, &drop.source_bucket, drop.origin_index);
                return Err(CommitError::BadBucketKey(drop.target_bucket));
            }
        };
        let (current, external_id) = match board.deal(&drop.deal_id) {
            Some(deal) => (deal.close_date, deal.external_id.clone()),
            None => return Err(CommitError::DealNotFound(drop.deal_id)),
        };
        let pending = PendingCommit {
            proposed_day: propose_day(current, year, month),
            deal_id: drop.deal_id,
            external_id,
            source_bucket: drop.source_bucket,
            origin_index: drop.origin_index,
            target_bucket: drop.target_bucket,
            year,
            month,
        };
        tracing::info!(
            deal = %pending.deal_id,
            to = %pending.target_bucket,
            day = pending.proposed_day,
            "awaiting close date confirmation"
        );
        self.pending = Some(pending.clone());
        Ok(CommitState::Proposed(pending))
    }

    /// Closes the confirmation without committing; the deal goes back.
    pub fn cancel(&mut self, board: &mut Board) -> Result<CommitState, CommitError> {
        let pending = self.pending.take().ok_or(CommitError::NoPending)?;
        revert(board, &pending.deal_id, &pending.source_bucket, pending.origin_index);
        tracing::info!(deal = %pending.deal_id, "close date change cancelled");
        Ok(CommitState::RolledBack {
            deal_id: pending.deal_id,
            bucket: pending.source_bucket,
            reason: RollbackReason::Cancelled,
        })
    }

    /// Confirms a day-of-month. An invalid day leaves the proposal open.
    pub fn confirm(&mut self, day: u32) -> Result<CommitState, CommitError> {
        let pending = self.pending.as_ref().ok_or(CommitError::NoPending)?;
        let max = pending.day_count();
        let close_date = match pending.close_date(day) {
            Some(date) if day >= 1 && day <= max => date,
            _ => return Err(CommitError::InvalidDay { day, max }),
        };
        let pending = self.pending.take().ok_or(CommitError::NoPending)?;
        let request = UpdateRequest {
            deal_id: pending.deal_id.clone(),
            external_id: pending.external_id.clone(),
            close_date,
        };
        tracing::info!(deal = %request.deal_id, external_id = %request.external_id, %close_date, "sending close date update");
        let flight = InFlight { pending, request };
        self.in_flight.insert(flight.request.deal_id.clone(), flight.clone());
        Ok(CommitState::Committing(flight))
    }

    /// Applies the CRM's answer. Only `Success` mutates the board for good.
    pub fn complete(
        &mut self,
        deal_id: &str,
        result: Result<UpdateOutcome, ServiceError>,
        board: &mut Board,
    ) -> Result<CommitState, CommitError> {
        let flight = self
            .in_flight
            .remove(deal_id)
            .ok_or_else(|| CommitError::UnknownCommit(deal_id.to_string()))?;
        let InFlight { pending, request } = flight;

        let reason = match result {
            Ok(UpdateOutcome::Success) => {
                match board.commit_move(&request.deal_id, &pending.target_bucket, request.close_date) {
                    Ok(()) => {
                        tracing::info!(
                            deal = %request.deal_id,
                            bucket = %pending.target_bucket,
                            close_date = %request.close_date,
                            "close date committed"
                        );
                        return Ok(CommitState::Committed {
                            deal_id: request.deal_id,
                            bucket: pending.target_bucket,
                            close_date: request.close_date,
                        });
                    }
                    Err(err) => {
                        tracing::error!(deal = %request.deal_id, %err, "CRM accepted update but board could not apply it");
                        RollbackReason::LocalApply(err.to_string())
                    }
                }
            }
            Ok(UpdateOutcome::Rejected { code, message }) => {
                tracing::warn!(deal = %request.deal_id, external_id = %request.external_id, %code, %message, "CRM rejected close date update");
                RollbackReason::Rejected { code, message }
            }
            Err(err) => {
                tracing::error!(deal = %request.deal_id, external_id = %request.external_id, %err, "close date update failed");
                RollbackReason::Failed(err.to_string())
            }
        };
        revert(board, &pending.deal_id, &pending.source_bucket, pending.origin_index);
        Ok(CommitState::RolledBack {
            deal_id: pending.deal_id,
            bucket: pending.source_bucket,
            reason,
        })
    }
}
