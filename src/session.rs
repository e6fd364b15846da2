//! Event-facing board controller.
//!
//! [`BoardSession`] owns the board store, the drag session, and the commit
//! workflow, and turns the rendering layer's drag events into calls on them.
//! Everything runs on the caller's event loop; the CRM update is handed out
//! as an [`UpdateRequest`] so the caller decides where to run it.

use crate::collision::{resolve_drop_target, Droppable, Point, PointerGeometry, Rect, TargetRef};
use crate::commit::{CommitError, CommitState, CommitWorkflow, UpdateRequest};
use crate::drag::{DragSession, DragState, DropOutcome, Placement};
use crate::model::Board;
use crate::services::{DealUpdateService, ServiceError, UpdateOutcome};

/// Geometry of one pointer move, as measured by the rendering layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DragFrame {
    pub pointer: Option<Point>,
    pub active_rect: Rect,
    /// Pointer movement since the previous frame.
    pub delta: Point,
    /// Droppable regions in registration order.
    pub droppables: Vec<Droppable>,
}

impl DragFrame {
    fn geometry(&self) -> PointerGeometry {
        PointerGeometry {
            pointer: self.pointer,
            active_rect: self.active_rect,
        }
    }

    fn anchor_mid_y(&self, target: &TargetRef) -> Option<f64> {
        self.droppables
            .iter()
            .find(|d| &d.target == target)
            .map(|d| d.rect.center().y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEnd {
    Discarded,
    Reordered { bucket: String },
    /// A cross-month drop; `Proposed` when awaiting a day, `RolledBack` when
    /// refused outright.
    Commit(CommitState),
}

#[derive(Debug)]
pub struct BoardSession {
    board: Board,
    drag: DragSession,
    commits: CommitWorkflow,
}

impl BoardSession {
    pub fn new(board: Board) -> Self {
        BoardSession {
            board,
            drag: DragSession::new(),
            commits: CommitWorkflow::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn drag_state(&self) -> &DragState {
        self.drag.state()
    }

    pub fn commits(&self) -> &CommitWorkflow {
        &self.commits
    }

    /// Swaps in a freshly loaded board. Refused while a drag, confirmation,
    /// or update is outstanding.
    pub fn replace_board(&mut self, board: Board) -> bool {
        if !self.drag.is_idle() || self.commits.is_modal_open() || self.commits.in_flight_count() > 0 {
            return false;
        }
        self.board = board;
        true
    }

    /// Returns false when the drag cannot start (confirmation open, or the
    /// id is unknown).
    pub fn drag_start(&mut self, active_id: &str) -> bool {
        if let Some(pending) = self.commits.pending() {
            tracing::debug!(active = active_id, pending = %pending.deal_id, "drag blocked by open date confirmation");
            return false;
        }
        !matches!(self.drag.start(active_id, &self.board), DragState::Idle)
    }

    pub fn resolve(&self, frame: &DragFrame) -> Option<TargetRef> {
        let active = self.drag.active()?;
        resolve_drop_target(&frame.geometry(), &frame.droppables, &active, &self.board)
    }

    pub fn drag_over(&mut self, frame: &DragFrame) -> Option<TargetRef> {
        let target = self.resolve(frame);
        let placement = Placement::from_motion(
            frame.delta.y,
            frame.pointer.map(|p| p.y),
            target.as_ref().and_then(|t| frame.anchor_mid_y(t)),
        );
        self.over_target(target.as_ref(), placement);
        target
    }

    pub fn over_target(&mut self, target: Option<&TargetRef>, placement: Placement) {
        self.drag.over(target, placement, &mut self.board);
    }

    /// Ends the drag at the frame's target; `None` aborts the drag.
    pub fn drag_end(&mut self, frame: Option<&DragFrame>) -> Result<DragEnd, CommitError> {
        let target = frame.and_then(|f| self.resolve(f));
        self.end_on(target.as_ref())
    }

    pub fn end_on(&mut self, target: Option<&TargetRef>) -> Result<DragEnd, CommitError> {
        match self.drag.end(target, &mut self.board) {
            DropOutcome::Discarded => Ok(DragEnd::Discarded),
            DropOutcome::Reordered { bucket } => Ok(DragEnd::Reordered { bucket }),
            DropOutcome::CrossBucket(drop) => {
                let state = self.commits.propose(drop, &mut self.board)?;
                Ok(DragEnd::Commit(state))
            }
        }
    }

    pub fn confirm_date(&mut self, day: u32) -> Result<UpdateRequest, CommitError> {
        match self.commits.confirm(day)? {
            CommitState::Committing(flight) => Ok(flight.request),
            _ => Err(CommitError::NoPending),
        }
    }

    pub fn cancel_date(&mut self) -> Result<CommitState, CommitError> {
        self.commits.cancel(&mut self.board)
    }

    pub fn complete_update(
        &mut self,
        deal_id: &str,
        result: Result<UpdateOutcome, ServiceError>,
    ) -> Result<CommitState, CommitError> {
        self.commits.complete(deal_id, result, &mut self.board)
    }

    /// Confirms and runs the update inline. For callers without an event
    /// loop of their own.
    pub fn commit_with(
        &mut self,
        day: u32,
        updates: &dyn DealUpdateService,
    ) -> Result<CommitState, CommitError> {
        let request = self.confirm_date(day)?;
        let result = updates.update_close_date(&request.external_id, request.close_date);
        self.complete_update(&request.deal_id, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::RollbackReason;
    use crate::model::Deal;
    use crate::testing::{RecordingUpdates, Script};
    use crate::window::compute_window;
    use chrono::NaiveDate;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn session() -> BoardSession {
        let mut d1 = Deal::placeholder("d1", date(7, 31));
        d1.external_id = "crm-d1".into();
        BoardSession::new(Board::from_deals(
            compute_window(date(7, 1)),
            vec![
                d1,
                Deal::placeholder("d2", date(7, 12)),
                Deal::placeholder("d3", date(7, 20)),
                Deal::placeholder("s1", date(9, 4)),
            ],
        ))
    }

    /// Four 100-wide columns; cards 40 tall starting at y=20, 60 apart.
    fn frame(session: &BoardSession, pointer: Point, delta_y: f64) -> DragFrame {
        let mut droppables = Vec::new();
        for (col, bucket) in session.board().buckets().iter().enumerate() {
            let left = col as f64 * 110.0;
            droppables.push(Droppable::bucket(bucket.key.clone(), Rect::new(left, 0.0, 100.0, 400.0)));
            for (row, id) in bucket.deal_ids.iter().enumerate() {
                let top = 20.0 + row as f64 * 60.0;
                droppables.push(Droppable::card(id.clone(), Rect::new(left + 10.0, top, 80.0, 40.0)));
            }
        }
        DragFrame {
            pointer: Some(pointer),
            active_rect: Rect::centered(pointer, 80.0, 40.0),
            delta: Point::new(0.0, delta_y),
            droppables,
        }
    }

    fn members(session: &BoardSession, key: &str) -> Vec<String> {
        session.board().bucket(key).unwrap().deal_ids.clone()
    }

    #[test]
    fn test_reorder_within_bucket_makes_no_remote_call() {
        let updates = RecordingUpdates::new(Script::Succeed);
        let mut session = session();
        assert!(session.drag_start("d1"));
        let f = frame(&session, Point::new(50.0, 165.0), 30.0);
        assert_eq!(session.drag_over(&f), Some(TargetRef::Card("d3".into())));
        let f = frame(&session, Point::new(50.0, 170.0), 5.0);
        let end = session.drag_end(Some(&f)).unwrap();
        assert_eq!(end, DragEnd::Reordered { bucket: "July 2025".into() });
        assert_eq!(members(&session, "July 2025"), vec!["d2", "d3", "d1"]);
        assert!(session.commits().pending().is_none());
        assert_eq!(updates.calls().len(), 0);
    }

    #[test]
    fn test_cross_month_drop_needs_confirmation_then_commits() {
        let updates = RecordingUpdates::new(Script::Succeed);
        let mut session = session();
        session.drag_start("d1");
        // Over the empty August column.
        let f = frame(&session, Point::new(160.0, 300.0), 0.0);
        assert_eq!(session.drag_over(&f), Some(TargetRef::Bucket("August 2025".into())));
        assert_eq!(members(&session, "August 2025"), vec!["d1"]);

        let f = frame(&session, Point::new(160.0, 40.0), 0.0);
        let end = session.drag_end(Some(&f)).unwrap();
        match end {
            DragEnd::Commit(CommitState::Proposed(p)) => assert_eq!(p.proposed_day, 31),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(updates.calls().len(), 0);
        assert!(!session.drag_start("d2"), "confirmation blocks new drags");

        let state = session.commit_with(31, &updates).unwrap();
        assert!(matches!(state, CommitState::Committed { .. }));
        assert_eq!(updates.calls(), vec![("crm-d1".to_string(), date(8, 31))]);
        assert_eq!(session.board().deal("d1").unwrap().close_date, date(8, 31));
        assert_eq!(members(&session, "August 2025"), vec!["d1"]);
        assert!(session.drag_start("d2"));
    }

    #[test]
    fn test_failed_update_leaves_membership_untouched() {
        for script in [Script::Reject, Script::Error] {
            let updates = RecordingUpdates::new(script);
            let mut session = session();
            let before = session.board().buckets().to_vec();
            session.drag_start("d2");
            let f = frame(&session, Point::new(380.0, 30.0), 0.0);
            session.drag_over(&f);
            let f = frame(&session, Point::new(380.0, 30.0), 0.0);
            session.drag_end(Some(&f)).unwrap();
            let state = session.commit_with(12, &updates).unwrap();
            assert!(matches!(state, CommitState::RolledBack { .. }));
            assert_eq!(session.board().buckets(), &before[..]);
            assert_eq!(session.board().deal("d2").unwrap().close_date, date(7, 12));
            assert_eq!(updates.calls().len(), 1);
        }
    }

    #[test]
    fn test_cancel_restores_source_position() {
        let mut session = session();
        let before = session.board().buckets().to_vec();
        session.drag_start("d2");
        let f = frame(&session, Point::new(270.0, 20.0), 0.0);
        assert_eq!(session.drag_over(&f), Some(TargetRef::Card("s1".into())));
        session.drag_end(Some(&f)).unwrap();
        let state = session.cancel_date().unwrap();
        assert!(matches!(state, CommitState::RolledBack { reason: RollbackReason::Cancelled, .. }));
        assert_eq!(session.board().buckets(), &before[..]);
    }

    #[test]
    fn test_aborted_drag_is_discarded() {
        let mut session = session();
        let before = session.board().buckets().to_vec();
        session.drag_start("d3");
        let f = frame(&session, Point::new(160.0, 30.0), 0.0);
        session.drag_over(&f);
        assert_eq!(session.drag_end(None).unwrap(), DragEnd::Discarded);
        assert_eq!(session.board().buckets(), &before[..]);
        assert_eq!(session.drag_state(), &DragState::Idle);
    }

    #[test]
    fn test_unknown_drag_source_is_ignored() {
        let mut session = session();
        assert!(!session.drag_start("nope"));
        assert_eq!(session.drag_end(None).unwrap(), DragEnd::Discarded);
    }

    /// Known gap: a success that arrives while the same card is being
    /// dragged again moves it out from under the active drag.
    #[test]
    fn test_late_success_lands_under_active_drag() {
        let mut session = session();
        session.drag_start("d1");
        session.over_target(Some(&TargetRef::Bucket("August 2025".into())), Placement::Before);
        session.end_on(Some(&TargetRef::Bucket("August 2025".into()))).unwrap();
        let request = session.confirm_date(10).unwrap();

        assert!(session.drag_start("d1"));
        session.over_target(Some(&TargetRef::Bucket("October 2025".into())), Placement::Before);
        assert_eq!(session.board().bucket_of("d1"), Some("October 2025"));

        let state = session
            .complete_update(&request.deal_id, Ok(UpdateOutcome::Success))
            .unwrap();
        assert!(matches!(state, CommitState::Committed { .. }));
        assert_eq!(session.board().bucket_of("d1"), Some("August 2025"));
        assert_eq!(session.board().deal("d1").unwrap().close_date, date(8, 10));
        assert!(matches!(session.drag_state(), DragState::Dragging { .. }));
    }

    #[test]
    fn test_drop_of_in_flight_deal_is_refused() {
        let mut session = session();
        session.drag_start("d1");
        session.end_on(Some(&TargetRef::Bucket("August 2025".into()))).unwrap();
        session.confirm_date(3).unwrap();

        session.drag_start("d1");
        session.over_target(Some(&TargetRef::Bucket("October 2025".into())), Placement::Before);
        let end = session.end_on(Some(&TargetRef::Bucket("October 2025".into()))).unwrap();
        assert!(matches!(
            end,
            DragEnd::Commit(CommitState::RolledBack { reason: RollbackReason::AlreadyInFlight, .. })
        ));
        assert_eq!(session.board().bucket_of("d1"), Some("July 2025"));
    }

    #[test]
    fn test_replace_board_waits_for_outstanding_work() {
        let mut session = session();
        let fresh = session.board().clone();
        session.drag_start("d1");
        session.end_on(Some(&TargetRef::Bucket("August 2025".into()))).unwrap();
        assert!(!session.replace_board(fresh.clone()));
        let request = session.confirm_date(1).unwrap();
        assert!(!session.replace_board(fresh.clone()));
        session
            .complete_update(&request.deal_id, Err(ServiceError::Unavailable("down".into())))
            .unwrap();
        assert!(session.replace_board(fresh));
    }
}
