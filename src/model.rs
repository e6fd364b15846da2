use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::format::total_value;
use crate::window::{MonthBucket, MonthWindow};

pub type DealId = String;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Deal {
    pub id: DealId,
    /// Identifier the CRM knows the record by; the key for updates.
    pub external_id: String,
    pub url: Option<String>,
    pub title: String,
    pub company: String,
    pub contact: String,
    /// Parsed amount; `None` means "no value".
    pub value: Option<f64>,
    pub close_date: NaiveDate,
    pub stage: String,
    pub probability: u32,
    pub owner: String,
    pub currency: String,
    pub expected_revenue: Option<f64>,
    pub created_by: String,
    pub modified_time: Option<String>,
    pub lead_source: String,
    pub industry: String,
    pub region: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Bucket {
    pub key: String,
    pub ordinal: u8,
    pub deal_ids: Vec<DealId>,
}

/// Bucket key to ordered deals. Buckets are fixed at construction; only
/// their membership changes.
#[derive(Debug, Clone)]
pub struct Board {
    window: MonthWindow,
    buckets: Vec<Bucket>,
    deals: HashMap<DealId, Deal>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BoardError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("deal not found: {0}")]
    DealNotFound(String),
    #[error("deal {0} not present in any bucket")]
    DealLocationMissing(String),
    #[error("close date {date} does not fall in bucket {bucket}")]
    DateOutsideBucket { date: NaiveDate, bucket: String },
}

impl Board {
    pub fn new(window: MonthWindow) -> Self {
        let buckets = window
            .buckets()
            .iter()
            .map(|b: &MonthBucket| Bucket {
                key: b.key.clone(),
                ordinal: b.ordinal,
                deal_ids: Vec::new(),
            })
            .collect();
        Board {
            window,
            buckets,
            deals: HashMap::new(),
        }
    }

    /// Places each deal in the bucket owning its close date, keeping input
    /// order. Deals outside the window are dropped.
    pub fn from_deals(window: MonthWindow, deals: Vec<Deal>) -> Self {
        let mut board = Board::new(window);
        for deal in deals {
            let key = match board.window.assign_date(Some(deal.close_date)) {
                Some(bucket) => bucket.key.clone(),
                None => {
                    tracing::debug!(deal = %deal.id, date = %deal.close_date, "deal outside window");
                    continue;
                }
            };
            if board.deals.contains_key(&deal.id) {
                tracing::warn!(deal = %deal.id, "duplicate deal id, keeping first");
                continue;
            }
            if let Some(idx) = board.find_bucket_index(&key) {
                board.buckets[idx].deal_ids.push(deal.id.clone());
                board.deals.insert(deal.id.clone(), deal);
            }
        }
        board
    }

    pub fn window(&self) -> &MonthWindow {
        &self.window
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, key: &str) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.key == key)
    }

    pub fn is_bucket_key(&self, id: &str) -> bool {
        self.find_bucket_index(id).is_some()
    }

    pub fn deal(&self, id: &str) -> Option<&Deal> {
        self.deals.get(id)
    }

    pub fn deal_count(&self) -> usize {
        self.deals.len()
    }

    pub fn find_bucket_index(&self, key: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b.key == key)
    }

    pub fn find_deal_bucket_index(&self, deal_id: &str) -> Option<usize> {
        self.buckets
            .iter()
            .position(|b| b.deal_ids.iter().any(|id| id == deal_id))
    }

    /// Key of the bucket currently holding the deal.
    pub fn bucket_of(&self, deal_id: &str) -> Option<&str> {
        self.find_deal_bucket_index(deal_id)
            .map(|idx| self.buckets[idx].key.as_str())
    }

    pub fn position_of(&self, deal_id: &str) -> Option<usize> {
        let idx = self.find_deal_bucket_index(deal_id)?;
        self.buckets[idx].deal_ids.iter().position(|id| id == deal_id)
    }

    pub fn deals_in(&self, key: &str) -> Vec<&Deal> {
        self.bucket(key)
            .map(|b| b.deal_ids.iter().filter_map(|id| self.deals.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn bucket_total(&self, key: &str) -> f64 {
        total_value(self.deals_in(key).into_iter().map(|d| d.value))
    }

    pub fn board_total(&self) -> f64 {
        total_value(self.deals.values().map(|d| d.value))
    }

    /// Moves the deal to the end of `dest_key` without touching its close
    /// date. Used for the live drag preview.
    pub fn move_to_end(&mut self, deal_id: &str, dest_key: &str) -> Result<(), BoardError> {
        let dest_idx = self.require_bucket(dest_key)?;
        let src_idx = self.require_location(deal_id)?;
        if src_idx == dest_idx {
            return Ok(());
        }
        self.buckets[src_idx].deal_ids.retain(|id| id != deal_id);
        self.buckets[dest_idx].deal_ids.push(deal_id.to_string());
        Ok(())
    }

    /// Re-inserts the deal into `dest_key` at `index` (clamped), wherever it
    /// currently sits.
    pub fn place_at(&mut self, deal_id: &str, dest_key: &str, index: usize) -> Result<(), BoardError> {
        let dest_idx = self.require_bucket(dest_key)?;
        let src_idx = self.require_location(deal_id)?;
        self.buckets[src_idx].deal_ids.retain(|id| id != deal_id);
        let members = &mut self.buckets[dest_idx].deal_ids;
        let at = index.min(members.len());
        members.insert(at, deal_id.to_string());
        Ok(())
    }

    /// Reorders within one bucket so the deal sits before or after `anchor_id`.
    pub fn reorder(&mut self, deal_id: &str, anchor_id: &str, after: bool) -> Result<(), BoardError> {
        let idx = self.require_location(deal_id)?;
        let anchor_idx = self.require_location(anchor_id)?;
        if idx != anchor_idx || deal_id == anchor_id {
            return Ok(());
        }
        let members = &mut self.buckets[idx].deal_ids;
        members.retain(|id| id != deal_id);
        let anchor_pos = members
            .iter()
            .position(|id| id == anchor_id)
            .ok_or_else(|| BoardError::DealLocationMissing(anchor_id.to_string()))?;
        let at = if after { anchor_pos + 1 } else { anchor_pos };
        members.insert(at, deal_id.to_string());
        Ok(())
    }

    /// Atomically moves the deal to `dest_key` with its new close date. The
    /// date must belong to the destination bucket.
    pub fn commit_move(
        &mut self,
        deal_id: &str,
        dest_key: &str,
        close_date: NaiveDate,
    ) -> Result<(), BoardError> {
        let dest_idx = self.require_bucket(dest_key)?;
        let owner = self.window.assign_date(Some(close_date)).map(|b| b.key.as_str());
        if owner != Some(dest_key) {
            return Err(BoardError::DateOutsideBucket {
                date: close_date,
                bucket: dest_key.to_string(),
            });
        }
        let src_idx = self.require_location(deal_id)?;
        let deal = self
            .deals
            .get_mut(deal_id)
            .ok_or_else(|| BoardError::DealNotFound(deal_id.to_string()))?;
        deal.close_date = close_date;
        self.buckets[src_idx].deal_ids.retain(|id| id != deal_id);
        self.buckets[dest_idx].deal_ids.push(deal_id.to_string());
        Ok(())
    }

    fn require_bucket(&self, key: &str) -> Result<usize, BoardError> {
        self.find_bucket_index(key)
            .ok_or_else(|| BoardError::BucketNotFound(key.to_string()))
    }

    fn require_location(&self, deal_id: &str) -> Result<usize, BoardError> {
        if !self.deals.contains_key(deal_id) {
            return Err(BoardError::DealNotFound(deal_id.to_string()));
        }
        self.find_deal_bucket_index(deal_id)
            .ok_or_else(|| BoardError::DealLocationMissing(deal_id.to_string()))
    }
}

impl Deal {
    /// A deal with every descriptive field at its placeholder.
    pub fn placeholder(id: impl Into<DealId>, close_date: NaiveDate) -> Self {
        let id = id.into();
        Deal {
            external_id: id.clone(),
            id,
            url: None,
            title: "Untitled Deal".into(),
            company: "Unknown Company".into(),
            contact: "Unknown Contact".into(),
            value: None,
            close_date,
            stage: "Unknown Stage".into(),
            probability: 0,
            owner: "Unknown Owner".into(),
            currency: "ZAR".into(),
            expected_revenue: None,
            created_by: "Unknown".into(),
            modified_time: None,
            lead_source: "Unknown".into(),
            industry: "Unknown".into(),
            region: "Unknown".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::compute_window;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_board() -> Board {
        let window = compute_window(date(2025, 7, 10));
        Board::from_deals(
            window,
            vec![
                Deal::placeholder("a", date(2025, 7, 3)),
                Deal::placeholder("b", date(2025, 7, 20)),
                Deal::placeholder("c", date(2025, 8, 31)),
                Deal::placeholder("late", date(2025, 11, 1)),
            ],
        )
    }

    fn members(board: &Board, key: &str) -> Vec<String> {
        board.bucket(key).unwrap().deal_ids.clone()
    }

    #[test]
    fn test_from_deals_buckets_by_close_date() {
        let board = sample_board();
        assert_eq!(board.buckets().len(), 4);
        assert_eq!(members(&board, "July 2025"), vec!["a", "b"]);
        assert_eq!(members(&board, "August 2025"), vec!["c"]);
        assert!(members(&board, "October 2025").is_empty());
        assert!(board.deal("late").is_none());
    }

    #[test]
    fn test_move_to_end_keeps_close_date() {
        let mut board = sample_board();
        board.move_to_end("a", "August 2025").expect("move");
        assert_eq!(members(&board, "August 2025"), vec!["c", "a"]);
        assert_eq!(board.deal("a").unwrap().close_date, date(2025, 7, 3));
    }

    #[test]
    fn test_reorder_before_and_after() {
        let mut board = sample_board();
        board.move_to_end("c", "July 2025").unwrap();
        board.reorder("a", "c", true).unwrap();
        assert_eq!(members(&board, "July 2025"), vec!["b", "c", "a"]);
        board.reorder("a", "b", false).unwrap();
        assert_eq!(members(&board, "July 2025"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_place_at_clamps_index() {
        let mut board = sample_board();
        board.place_at("c", "July 2025", 99).unwrap();
        assert_eq!(members(&board, "July 2025"), vec!["a", "b", "c"]);
        board.place_at("c", "July 2025", 0).unwrap();
        assert_eq!(members(&board, "July 2025"), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_commit_move_updates_date_and_membership() {
        let mut board = sample_board();
        board
            .commit_move("b", "September 2025", date(2025, 9, 20))
            .expect("commit");
        assert_eq!(board.bucket_of("b"), Some("September 2025"));
        assert_eq!(board.deal("b").unwrap().close_date, date(2025, 9, 20));
    }

    #[test]
    fn test_commit_move_rejects_mismatched_date() {
        let mut board = sample_board();
        let err = board
            .commit_move("b", "September 2025", date(2025, 10, 1))
            .unwrap_err();
        assert!(matches!(err, BoardError::DateOutsideBucket { .. }));
        assert_eq!(board.bucket_of("b"), Some("July 2025"));
    }

    #[test]
    fn test_unknown_targets_are_errors() {
        let mut board = sample_board();
        assert_eq!(
            board.move_to_end("zzz", "July 2025"),
            Err(BoardError::DealNotFound("zzz".into()))
        );
        assert_eq!(
            board.move_to_end("a", "Smarch 2025"),
            Err(BoardError::BucketNotFound("Smarch 2025".into()))
        );
    }
}
