//! In-progress drag tracking with optimistic reordering.

use crate::collision::{ActiveDrag, TargetRef};
use crate::model::{Board, DealId};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        deal_id: DealId,
        source_bucket: String,
        /// Position in the source bucket at drag start, for reverts.
        origin_index: usize,
    },
    DraggingBucket {
        key: String,
    },
}

/// Where a reordered card lands relative to the card under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
}

impl Placement {
    /// Moving down past the card's midpoint inserts after it.
    pub fn from_motion(delta_y: f64, pointer_y: Option<f64>, anchor_mid_y: Option<f64>) -> Self {
        let past_midpoint = match (pointer_y, anchor_mid_y) {
            (Some(y), Some(mid)) => y > mid,
            _ => true,
        };
        if delta_y > 0.0 && past_midpoint {
            Placement::After
        } else {
            Placement::Before
        }
    }
}

/// A cross-bucket drop awaiting the commit workflow. The board may already
/// show the deal in `target_bucket`; that placement is provisional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossBucketDrop {
    pub deal_id: DealId,
    pub source_bucket: String,
    pub origin_index: usize,
    pub target_bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Dropped nowhere (or a bucket drag ended); the board is back to its
    /// pre-drag order.
    Discarded,
    /// Reordered within its own bucket. Local only.
    Reordered { bucket: String },
    CrossBucket(CrossBucketDrop),
}

#[derive(Debug, Default)]
pub struct DragSession {
    state: DragState,
}

impl DragSession {
    pub fn new() -> Self {
        DragSession::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == DragState::Idle
    }

    pub fn active(&self) -> Option<ActiveDrag> {
        match &self.state {
            DragState::Idle => None,
            DragState::Dragging { deal_id, .. } => Some(ActiveDrag::Card(deal_id.clone())),
            DragState::DraggingBucket { key } => Some(ActiveDrag::Bucket(key.clone())),
        }
    }

    /// Identifies the dragged id as a bucket or a deal. Unknown ids leave the
    /// session idle.
    pub fn start(&mut self, active_id: &str, board: &Board) -> &DragState {
        if board.is_bucket_key(active_id) {
            tracing::debug!(bucket = active_id, "drag start on bucket");
            self.state = DragState::DraggingBucket {
                key: active_id.to_string(),
            };
            return &self.state;
        }
        match (board.bucket_of(active_id), board.position_of(active_id)) {
            (Some(bucket), Some(index)) => {
                tracing::debug!(deal = active_id, bucket, "drag start on deal");
                self.state = DragState::Dragging {
                    deal_id: active_id.to_string(),
                    source_bucket: bucket.to_string(),
                    origin_index: index,
                };
            }
            _ => {
                tracing::info!(id = active_id, "drag start ignored: id is neither a bucket nor a deal");
                self.state = DragState::Idle;
            }
        }
        &self.state
    }

    /// Live preview while the pointer moves. Never touches the CRM.
    pub fn over(&mut self, target: Option<&TargetRef>, placement: Placement, board: &mut Board) {
        let deal_id = match &self.state {
            DragState::Dragging { deal_id, .. } => deal_id.clone(),
            _ => return,
        };
        let target = match target {
            Some(t) => t,
            None => return,
        };
        if let TargetRef::Card(over_id) = target {
            if over_id == &deal_id {
                return;
            }
        }
        let target_bucket = match target.bucket_key(board) {
            Some(key) => key.to_string(),
            None => {
                tracing::debug!(over = target.id(), "drag over unknown target");
                return;
            }
        };
        let current_bucket = match board.bucket_of(&deal_id) {
            Some(key) => key.to_string(),
            None => return,
        };

        let result = if target_bucket != current_bucket {
            tracing::debug!(deal = %deal_id, from = %current_bucket, to = %target_bucket, "preview move");
            board.move_to_end(&deal_id, &target_bucket)
        } else if let TargetRef::Card(over_id) = target {
            board.reorder(&deal_id, over_id, placement == Placement::After)
        } else {
            Ok(())
        };
        if let Err(err) = result {
            tracing::warn!(deal = %deal_id, %err, "drag preview failed");
        }
    }

    /// Ends the drag. The session is idle afterwards whatever the outcome.
    pub fn end(&mut self, target: Option<&TargetRef>, board: &mut Board) -> DropOutcome {
        let state = std::mem::take(&mut self.state);
        let (deal_id, source_bucket, origin_index) = match state {
            DragState::Dragging {
                deal_id,
                source_bucket,
                origin_index,
            } => (deal_id, source_bucket, origin_index),
            DragState::DraggingBucket { key } => {
                tracing::debug!(bucket = %key, "bucket drag ended");
                return DropOutcome::Discarded;
            }
            DragState::Idle => return DropOutcome::Discarded,
        };

        let target_bucket = target.and_then(|t| t.bucket_key(board)).map(str::to_string);
        let target_bucket = match target_bucket {
            Some(key) => key,
            None => {
                tracing::debug!(deal = %deal_id, "dropped outside any bucket");
                revert(board, &deal_id, &source_bucket, origin_index);
                return DropOutcome::Discarded;
            }
        };

        if target_bucket == source_bucket {
            // A preview may have visited another bucket before coming back.
            if board.bucket_of(&deal_id) != Some(source_bucket.as_str()) {
                revert(board, &deal_id, &source_bucket, origin_index);
            }
            tracing::debug!(deal = %deal_id, bucket = %source_bucket, "reordered within bucket");
            return DropOutcome::Reordered {
                bucket: source_bucket,
            };
        }

        tracing::debug!(deal = %deal_id, from = %source_bucket, to = %target_bucket, "cross-bucket drop");
        DropOutcome::CrossBucket(CrossBucketDrop {
            deal_id,
            source_bucket,
            origin_index,
            target_bucket,
        })
    }
}

/// Puts a deal back where a drag found it.
pub fn revert(board: &mut Board, deal_id: &str, source_bucket: &str, origin_index: usize) {
    if let Err(err) = board.place_at(deal_id, source_bucket, origin_index) {
        tracing::warn!(deal = deal_id, %err, "could not restore deal to its source bucket");
    }
}
