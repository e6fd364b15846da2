//! Whose pipeline is shown, and loading it into a board.

use crate::model::Board;
use crate::normalize::{normalize_with, NormalizeOptions};
use crate::services::{DealQuery, DealQueryService, Identity, ServiceError, UserDirectory};
use crate::window::MonthWindow;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ViewerError {
    #[error("only administrators can view another user's pipeline")]
    NotAdmin,
    #[error("no active user with id {0}")]
    UnknownUser(String),
}

/// The signed-in identity and the owner whose deals are on the board.
#[derive(Debug, Clone)]
pub struct Viewer {
    current: Identity,
    is_admin: bool,
    users: Vec<Identity>,
    selected: Identity,
}

impl Viewer {
    pub fn new(current: Identity, admin_ids: &[String]) -> Self {
        let is_admin = current.is_admin || admin_ids.iter().any(|id| id == &current.id);
        Viewer {
            selected: current.clone(),
            current,
            is_admin,
            users: Vec::new(),
        }
    }

    pub fn current(&self) -> &Identity {
        &self.current
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Owner of the pipeline being shown.
    pub fn owner(&self) -> &Identity {
        &self.selected
    }

    pub fn is_viewing_other(&self) -> bool {
        self.selected.id != self.current.id
    }

    pub fn users(&self) -> &[Identity] {
        &self.users
    }

    /// Loads the active-user list for administrators. Failures leave the list
    /// empty; the viewer keeps showing its own pipeline.
    pub fn load_users(&mut self, directory: &dyn UserDirectory) {
        if !self.is_admin {
            return;
        }
        match directory.active_users() {
            Ok(users) => {
                let mut users: Vec<Identity> = users.into_iter().map(with_display_name).collect();
                users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
                tracing::debug!(count = users.len(), "loaded active users");
                self.users = users;
            }
            Err(err) => {
                tracing::warn!(%err, "could not load active users");
                self.users.clear();
            }
        }
    }

    pub fn select(&mut self, user_id: &str) -> Result<&Identity, ViewerError> {
        if user_id == self.current.id {
            self.selected = self.current.clone();
            return Ok(&self.selected);
        }
        if !self.is_admin {
            return Err(ViewerError::NotAdmin);
        }
        let user = self
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| ViewerError::UnknownUser(user_id.to_string()))?;
        tracing::info!(owner = %user.name, "viewing another user's pipeline");
        self.selected = user;
        Ok(&self.selected)
    }
}

fn with_display_name(mut user: Identity) -> Identity {
    if !user.name.trim().is_empty() {
        return user;
    }
    let full = [&user.first_name, &user.last_name]
        .iter()
        .filter_map(|part| part.as_deref().map(str::trim).filter(|p| !p.is_empty()))
        .collect::<Vec<_>>()
        .join(" ");
    user.name = if full.is_empty() {
        user.email.split('@').next().unwrap_or_default().to_string()
    } else {
        full
    };
    user
}

/// Query, normalize, and bucket one owner's deals. Any failure yields an
/// empty board that still has all four buckets.
pub fn load_board(
    query: &dyn DealQueryService,
    owner: &Identity,
    stages: &[String],
    window: MonthWindow,
    opts: &NormalizeOptions,
) -> Board {
    match fetch(query, owner, stages, &window, opts) {
        Ok(board) => board,
        Err(err) => {
            tracing::warn!(owner = %owner.name, %err, "deal query failed, showing empty board");
            Board::new(window)
        }
    }
}

fn fetch(
    query: &dyn DealQueryService,
    owner: &Identity,
    stages: &[String],
    window: &MonthWindow,
    opts: &NormalizeOptions,
) -> Result<Board, ServiceError> {
    // The query is keyed on the owner's name; a blank one would match
    // every ownerless record.
    if owner.name.trim().is_empty() {
        return Err(ServiceError::NoIdentity);
    }
    let request = DealQuery::with_stages(owner.name.clone(), stages);
    tracing::debug!(criteria = %request.criteria(), "searching deals");
    let raw = query.search_deals(&request)?;
    if raw.is_empty() {
        tracing::info!(owner = %owner.name, "no deals returned");
    }
    let deals = normalize_with(&raw, window, opts);
    tracing::info!(owner = %owner.name, count = deals.len(), "deals loaded");
    Ok(Board::from_deals(window.clone(), deals))
}
