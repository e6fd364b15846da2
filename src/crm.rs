//! File-backed CRM used by the shell: one YAML document holding the
//! signed-in user, the active users, and the deal records.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::format::RawAmount;
use crate::normalize::{CrmRecord, NamedRef, RawDeals};
use crate::services::{
    DealQuery, DealQueryService, DealUpdateService, Identity, IdentityProvider, ServiceError,
    UpdateOutcome, UserDirectory, OPEN_STAGES,
};
use crate::window::{days_in_month, WINDOW_MONTHS};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmDocument {
    pub current_user: Option<Identity>,
    pub users: Vec<Identity>,
    pub deals: Vec<CrmRecord>,
}

#[derive(Debug)]
pub struct LocalCrm {
    path: PathBuf,
    doc: Mutex<CrmDocument>,
}

impl LocalCrm {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "no CRM file at {}; run `dealboard init` first",
                path.display()
            );
        }
        let data = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        let doc: CrmDocument = serde_yaml::from_str(&data).context("parsing CRM file")?;
        tracing::debug!(path = %path.display(), deals = doc.deals.len(), "opened local CRM");
        Ok(LocalCrm {
            path: path.to_path_buf(),
            doc: Mutex::new(doc),
        })
    }

    /// Writes a fresh document unless one already exists.
    pub fn init(path: &Path, doc: CrmDocument) -> Result<Self> {
        if path.exists() {
            return LocalCrm::open(path);
        }
        save_document(path, &doc)?;
        tracing::info!(path = %path.display(), deals = doc.deals.len(), "initialized local CRM");
        Ok(LocalCrm {
            path: path.to_path_buf(),
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Result<CrmDocument, ServiceError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, CrmDocument>, ServiceError> {
        self.doc
            .lock()
            .map_err(|_| ServiceError::Unavailable("CRM document lock poisoned".into()))
    }
}

pub fn save_document(path: &Path, doc: &CrmDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(doc).context("serializing CRM document")?;
    fs::write(path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}

impl IdentityProvider for LocalCrm {
    fn current_user(&self) -> Result<Identity, ServiceError> {
        self.lock()?.current_user.clone().ok_or(ServiceError::NoIdentity)
    }
}

impl UserDirectory for LocalCrm {
    fn active_users(&self) -> Result<Vec<Identity>, ServiceError> {
        Ok(self.lock()?.users.clone())
    }
}

impl DealQueryService for LocalCrm {
    fn search_deals(&self, query: &DealQuery) -> Result<RawDeals, ServiceError> {
        let doc = self.lock()?;
        let records = doc
            .deals
            .iter()
            .filter(|r| {
                let owner = r.owner.as_ref().and_then(|o| o.name.as_deref()).unwrap_or_default();
                let stage = r.stage.as_deref().unwrap_or_default();
                query.matches(owner, stage)
            })
            .cloned()
            .collect();
        Ok(RawDeals::Records(records))
    }
}

impl DealUpdateService for LocalCrm {
    fn update_close_date(
        &self,
        external_id: &str,
        close_date: NaiveDate,
    ) -> Result<UpdateOutcome, ServiceError> {
        let mut doc = self.lock()?;
        let mut updated = doc.clone();
        let Some(record) = updated
            .deals
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(external_id))
        else {
            return Ok(UpdateOutcome::Rejected {
                code: "INVALID_DATA".into(),
                message: format!("no deal record with id {}", external_id),
            });
        };
        let previous = record.closing_date.replace(close_date.format("%Y-%m-%d").to_string());
        // The in-memory document only changes once the file write succeeded.
        let serialized = serde_yaml::to_string(&updated)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serialized)?;
        *doc = updated;
        tracing::info!(external_id, ?previous, %close_date, "close date updated");
        Ok(UpdateOutcome::Success)
    }
}

const COMPANIES: [&str; 8] = [
    "Acme Mining",
    "Blue Crane Logistics",
    "Cape Fibre",
    "Drakensberg Foods",
    "Eastgate Retail",
    "Fynbos Health",
    "Garden Route Energy",
    "Highveld Steel",
];

const CONTACTS: [&str; 6] = [
    "Thandi Nkosi",
    "Pieter van Wyk",
    "Aisha Patel",
    "Sipho Dlamini",
    "Megan Smith",
    "Johan Botha",
];

const OFFERINGS: [&str; 5] = ["Network refresh", "Managed services", "Cloud migration", "Licensing", "Support renewal"];

/// Builds `count` open deals for `owner`, with close dates spread over the
/// months starting at `today`.
pub fn sample_records<R: Rng>(owner: &Identity, count: usize, today: NaiveDate, rng: &mut R) -> Vec<CrmRecord> {
    (0..count)
        .map(|n| {
            let company = COMPANIES.choose(rng).copied().unwrap_or("Acme Mining");
            let offering = OFFERINGS.choose(rng).copied().unwrap_or("Licensing");
            let stage = OPEN_STAGES.choose(rng).copied().unwrap_or("Qualification");
            let (year, month) = months_ahead(today, rng.gen_range(0..WINDOW_MONTHS));
            let day = rng.gen_range(1..=days_in_month(year, month));
            let amount = (rng.gen_range(5_000.0..500_000.0_f64) * 100.0).round() / 100.0;
            let probability = rng.gen_range(1..=9) as f64 * 10.0;
            CrmRecord {
                id: Some(generate_record_id(rng)),
                potential_no: Some(format!("POT-{:05}", n + 1)),
                deal_name: Some(format!("{} - {}", company, offering)),
                amount: Some(RawAmount::Number(amount)),
                account_name: Some(NamedRef::named(company)),
                contact_name: CONTACTS.choose(rng).map(|c| NamedRef::named(*c)),
                closing_date: Some(format!("{:04}-{:02}-{:02}", year, month, day)),
                stage: Some(stage.to_string()),
                probability: Some(probability),
                owner: Some(NamedRef {
                    id: Some(owner.id.clone()),
                    name: Some(owner.name.clone()),
                }),
                currency: Some("ZAR".into()),
                expected_revenue: Some(RawAmount::Number((amount * probability).round() / 100.0)),
                created_by: Some(NamedRef::named(owner.name.clone())),
                ..CrmRecord::default()
            }
        })
        .collect()
}

fn months_ahead(today: NaiveDate, offset: u32) -> (i32, u32) {
    let index = today.month0() + offset;
    (today.year() + (index / 12) as i32, index % 12 + 1)
}

fn generate_record_id<R: Rng>(rng: &mut R) -> String {
    (0..12).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}
