use crate::ui;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use dealboard::collision::TargetRef;
use dealboard::commit::CommitState;
use dealboard::config::Config;
use dealboard::crm::{sample_records, CrmDocument, LocalCrm};
use dealboard::format::{format_amount, format_date};
use dealboard::model::{Board, Deal};
use dealboard::normalize::NormalizeOptions;
use dealboard::pipeline::{load_board, Viewer};
use dealboard::services::{DealUpdateService, Identity, IdentityProvider, OfflineUpdates};
use dealboard::session::{BoardSession, DragEnd};
use dealboard::window::compute_window;
use std::sync::Arc;

/// Everything a command needs: resolved config plus the CRM behind it.
pub struct Workspace {
    pub config: Config,
    pub crm: Arc<LocalCrm>,
}

impl Workspace {
    pub fn open(config: Config) -> Result<Self> {
        let path = config.crm_path()?;
        let crm = LocalCrm::open(&path)?;
        Ok(Workspace {
            config,
            crm: Arc::new(crm),
        })
    }

    pub fn updates(&self) -> Arc<dyn DealUpdateService> {
        if self.config.offline {
            return Arc::new(OfflineUpdates);
        }
        self.crm.clone()
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            record_url_template: self.config.record_url_template.clone(),
        }
    }

    pub fn viewer(&self, owner: Option<&str>) -> Result<Viewer> {
        let current = self
            .crm
            .current_user()
            .context("the CRM document has no signed-in user")?;
        let mut viewer = Viewer::new(current, &self.config.admin_ids);
        viewer.load_users(self.crm.as_ref());
        if let Some(owner) = owner {
            viewer.select(owner)?;
        }
        Ok(viewer)
    }

    pub fn board_for(&self, owner: &Identity, today: NaiveDate) -> Board {
        load_board(
            self.crm.as_ref(),
            owner,
            &self.config.stages,
            compute_window(today),
            &self.normalize_options(),
        )
    }
}

pub fn init(config: Config, owner: String, sample: usize) -> Result<()> {
    let path = config.crm_path()?;
    if path.exists() {
        println!("CRM file already exists at {}", path.display());
        return Ok(());
    }
    let mut rng = rand::thread_rng();
    let current = Identity {
        id: "u1".into(),
        email: email_for(&owner),
        name: owner,
        role: Some("Administrator".into()),
        is_admin: true,
        ..Identity::default()
    };
    let teammates: Vec<Identity> = ["Lerato Mokoena", "Daniel Fourie"]
        .iter()
        .enumerate()
        .map(|(n, name)| Identity {
            id: format!("u{}", n + 2),
            name: name.to_string(),
            email: email_for(name),
            role: Some("Sales".into()),
            ..Identity::default()
        })
        .collect();
    let today = today();
    let mut deals = sample_records(&current, sample, today, &mut rng);
    for mate in &teammates {
        deals.extend(sample_records(mate, sample / 2, today, &mut rng));
    }
    let mut users = vec![current.clone()];
    users.extend(teammates);
    let crm = LocalCrm::init(
        &path,
        CrmDocument {
            current_user: Some(current),
            users,
            deals,
        },
    )?;
    println!("Initialized CRM at {}", crm.path().display());
    Ok(())
}

pub fn list(config: Config, month: Option<String>, owner: Option<String>) -> Result<()> {
    let workspace = Workspace::open(config)?;
    let viewer = workspace.viewer(owner.as_deref())?;
    let board = workspace.board_for(viewer.owner(), today());
    if let Some(ref key) = month {
        if !board.is_bucket_key(key) {
            bail!(
                "{} is not on the board; months are: {}",
                key,
                board.window().keys().collect::<Vec<_>>().join(", ")
            );
        }
    }
    println!(
        "Pipeline: {} ({} deals, {})",
        viewer.owner().name,
        board.deal_count(),
        format_amount(Some(board.board_total()))
    );
    for bucket in board.buckets() {
        if let Some(ref filter) = month {
            if &bucket.key != filter {
                continue;
            }
        }
        println!(
            "{}  {}",
            bucket.key,
            format_amount(Some(board.bucket_total(&bucket.key)))
        );
        if bucket.deal_ids.is_empty() {
            println!("  (empty)");
        }
        for deal in board.deals_in(&bucket.key) {
            print_deal(deal);
        }
        println!();
    }
    Ok(())
}

pub fn users(config: Config) -> Result<()> {
    let workspace = Workspace::open(config)?;
    let viewer = workspace.viewer(None)?;
    if !viewer.is_admin() {
        bail!("only administrators can list users");
    }
    for user in viewer.users() {
        let marker = if user.id == viewer.current().id { "*" } else { " " };
        println!("{} {}  {} <{}>", marker, user.id, user.name, user.email);
    }
    Ok(())
}

pub fn move_deal(
    config: Config,
    deal_id: String,
    month: String,
    day: Option<u32>,
    owner: Option<String>,
) -> Result<()> {
    let workspace = Workspace::open(config)?;
    let viewer = workspace.viewer(owner.as_deref())?;
    let board = workspace.board_for(viewer.owner(), today());
    if !board.is_bucket_key(&month) {
        bail!("{} is not on the board", month);
    }
    let mut session = BoardSession::new(board);
    if !session.drag_start(&deal_id) {
        bail!("deal {} is not on {}'s board", deal_id, viewer.owner().name);
    }
    let pending = match session.end_on(Some(&TargetRef::Bucket(month.clone())))? {
        DragEnd::Reordered { bucket } => {
            println!("Deal {} already closes in {}", deal_id, bucket);
            return Ok(());
        }
        DragEnd::Commit(CommitState::Proposed(pending)) => pending,
        DragEnd::Commit(CommitState::RolledBack { reason, .. }) => bail!("move refused: {}", reason),
        other => return Err(anyhow!("unexpected drop outcome: {:?}", other)),
    };
    let day = day.unwrap_or(pending.proposed_day);
    let updates = workspace.updates();
    match session.commit_with(day, updates.as_ref())? {
        CommitState::Committed {
            deal_id,
            bucket,
            close_date,
        } => {
            println!("Moved deal {} to {} (closes {})", deal_id, bucket, format_date(close_date));
            Ok(())
        }
        CommitState::RolledBack { reason, .. } => bail!("move rolled back: {}", reason),
        other => Err(anyhow!("unexpected commit state: {:?}", other)),
    }
}

pub fn tui(config: Config, owner: Option<String>) -> Result<()> {
    let workspace = Workspace::open(config)?;
    let viewer = workspace.viewer(owner.as_deref())?;
    ui::run(workspace, viewer)
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn email_for(name: &str) -> String {
    format!("{}@example.com", name.to_lowercase().replace(' ', "."))
}

fn print_deal(deal: &Deal) {
    println!("  - {}: {}", deal.id, deal.title);
    println!(
        "    {} | {} | {}",
        deal.company,
        format_amount(deal.value),
        format_date(deal.close_date)
    );
    println!("    {} ({}%)", deal.stage, deal.probability);
}
