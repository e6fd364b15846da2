//! Reduces the two CRM record shapes to the canonical [`Deal`].
//!
//! Normalization is total: missing or malformed fields fall back to
//! placeholders, and records whose close date falls outside the board
//! window are dropped before returning.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::format::{parse_amount, RawAmount};
use crate::model::Deal;
use crate::window::{parse_close_date, MonthWindow};

/// Raw deal payload as returned by the deal query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDeals {
    Tabular(TabularDeals),
    Records(Vec<CrmRecord>),
}

impl RawDeals {
    pub fn is_empty(&self) -> bool {
        match self {
            RawDeals::Tabular(t) => t.rows.is_empty(),
            RawDeals::Records(r) => r.is_empty(),
        }
    }
}

/// Report export: parallel column names and row cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TabularDeals {
    #[serde(alias = "column_order")]
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    fn text(&self) -> Option<String> {
        match self {
            Cell::Text(s) if !s.trim().is_empty() => Some(s.clone()),
            Cell::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn amount(&self) -> Option<RawAmount> {
        match self {
            Cell::Number(n) => Some(RawAmount::Number(*n)),
            Cell::Text(s) => Some(RawAmount::Text(s.clone())),
            Cell::Empty => None,
        }
    }
}

/// Lookup (relational) field carrying a display name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl NamedRef {
    pub fn named(name: impl Into<String>) -> Self {
        NamedRef {
            id: None,
            name: Some(name.into()),
        }
    }
}

/// One CRM deal record in the object shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmRecord {
    pub id: Option<String>,
    #[serde(rename = "Potential_No", skip_serializing_if = "Option::is_none")]
    pub potential_no: Option<String>,
    #[serde(rename = "Deal_Name")]
    pub deal_name: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: Option<RawAmount>,
    #[serde(rename = "Account_Name")]
    pub account_name: Option<NamedRef>,
    #[serde(rename = "Contact_Name")]
    pub contact_name: Option<NamedRef>,
    #[serde(rename = "Closing_Date")]
    pub closing_date: Option<String>,
    #[serde(rename = "Stage")]
    pub stage: Option<String>,
    #[serde(rename = "Probability")]
    pub probability: Option<f64>,
    #[serde(rename = "Owner")]
    pub owner: Option<NamedRef>,
    #[serde(rename = "Currency", skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(rename = "Expected_Revenue", skip_serializing_if = "Option::is_none")]
    pub expected_revenue: Option<RawAmount>,
    #[serde(rename = "Created_By", skip_serializing_if = "Option::is_none")]
    pub created_by: Option<NamedRef>,
    #[serde(rename = "Modified_Time", skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(rename = "Created_Time", skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(rename = "Lead_Source", skip_serializing_if = "Option::is_none")]
    pub lead_source: Option<String>,
    #[serde(rename = "Industry", skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(rename = "Region", skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Deep-link template for object records; `{id}` is replaced.
    pub record_url_template: Option<String>,
}

pub fn normalize(raw: &RawDeals, window: &MonthWindow) -> Vec<Deal> {
    normalize_with(raw, window, &NormalizeOptions::default())
}

pub fn normalize_with(raw: &RawDeals, window: &MonthWindow, opts: &NormalizeOptions) -> Vec<Deal> {
    let today = window.reference();
    let candidates: Vec<(Deal, Option<NaiveDate>)> = match raw {
        RawDeals::Tabular(table) => normalize_tabular(table, today),
        RawDeals::Records(records) => records
            .iter()
            .enumerate()
            .map(|(idx, record)| normalize_record(idx, record, today, opts))
            .collect(),
    };
    candidates
        .into_iter()
        .filter_map(|(deal, close_date)| match window.assign_date(close_date) {
            Some(_) => Some(deal),
            None => {
                tracing::debug!(deal = %deal.id, ?close_date, "excluded from window");
                None
            }
        })
        .collect()
}

fn normalize_tabular(table: &TabularDeals, today: NaiveDate) -> Vec<(Deal, Option<NaiveDate>)> {
    let index: HashMap<&str, usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();
    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let cell = |column: &str| index.get(column).and_then(|&i| row.get(i));
            let text = |column: &str| cell(column).and_then(Cell::text);

            let (close_date, parsed) = resolve_close_date(text("Date").as_deref(), today);
            let mut deal = Deal::placeholder(format!("deal-{}", row_idx + 1), close_date);
            if let Some(external) = text("Potential ID") {
                deal.external_id = external;
            }
            deal.url = text("CRM URL");
            set_text(&mut deal.title, text("Potential Name"));
            deal.value = cell("Total Value").and_then(Cell::amount).as_ref().and_then(parse_amount);
            set_text(&mut deal.company, text("Account Name"));
            set_text(&mut deal.contact, text("Contact Role"));
            set_text(&mut deal.stage, text("Stage"));
            set_text(&mut deal.owner, text("Owner Name"));
            (deal, parsed)
        })
        .collect()
}

fn normalize_record(
    idx: usize,
    record: &CrmRecord,
    today: NaiveDate,
    opts: &NormalizeOptions,
) -> (Deal, Option<NaiveDate>) {
    let (close_date, parsed) = resolve_close_date(record.closing_date.as_deref(), today);
    let id = non_empty(record.id.clone()).unwrap_or_else(|| format!("deal-{}", idx + 1));
    let mut deal = Deal::placeholder(id.clone(), close_date);
    deal.url = match (&opts.record_url_template, &record.id) {
        (Some(template), Some(remote_id)) => Some(template.replace("{id}", remote_id)),
        _ => None,
    };
    set_text(&mut deal.title, record.deal_name.clone());
    deal.value = record.amount.as_ref().and_then(parse_amount);
    set_text(&mut deal.company, ref_name(&record.account_name));
    set_text(&mut deal.contact, ref_name(&record.contact_name));
    set_text(&mut deal.stage, record.stage.clone());
    deal.probability = record
        .probability
        .filter(|p| p.is_finite() && *p > 0.0)
        .map(|p| p.round().min(100.0) as u32)
        .unwrap_or(0);
    set_text(&mut deal.owner, ref_name(&record.owner));
    set_text(&mut deal.currency, record.currency.clone());
    deal.expected_revenue = record.expected_revenue.as_ref().and_then(parse_amount);
    set_text(&mut deal.created_by, ref_name(&record.created_by));
    deal.modified_time = non_empty(record.modified_time.clone())
        .or_else(|| non_empty(record.created_time.clone()));
    set_text(&mut deal.lead_source, record.lead_source.clone());
    set_text(&mut deal.industry, record.industry.clone());
    set_text(&mut deal.region, record.region.clone());
    (deal, parsed)
}

/// Absent dates default to today; present-but-unparsable dates keep the
/// placeholder but report `None` so the window filter drops the record.
fn resolve_close_date(raw: Option<&str>, today: NaiveDate) -> (NaiveDate, Option<NaiveDate>) {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => (today, Some(today)),
        Some(text) => match parse_close_date(text) {
            Some(date) => (date, Some(date)),
            None => (today, None),
        },
    }
}

fn ref_name(named: &Option<NamedRef>) -> Option<String> {
    named.as_ref().and_then(|n| non_empty(n.name.clone()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn set_text(field: &mut String, value: Option<String>) {
    if let Some(v) = non_empty(value) {
        *field = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::compute_window;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window() -> MonthWindow {
        compute_window(date(2025, 7, 15))
    }

    #[test]
    fn test_empty_record_gets_every_placeholder() {
        let raw = RawDeals::Records(vec![CrmRecord::default()]);
        let deals = normalize(&raw, &window());
        assert_eq!(deals.len(), 1);
        let deal = &deals[0];
        assert_eq!(deal.id, "deal-1");
        assert_eq!(deal.external_id, "deal-1");
        assert_eq!(deal.title, "Untitled Deal");
        assert_eq!(deal.company, "Unknown Company");
        assert_eq!(deal.contact, "Unknown Contact");
        assert_eq!(deal.stage, "Unknown Stage");
        assert_eq!(deal.owner, "Unknown Owner");
        assert_eq!(deal.currency, "ZAR");
        assert_eq!(deal.value, None);
        assert_eq!(deal.probability, 0);
        assert_eq!(deal.close_date, date(2025, 7, 15));
    }

    #[test]
    fn test_object_shape_reads_nested_names() {
        let record = CrmRecord {
            id: Some("3531584000001".into()),
            deal_name: Some("Fibre rollout".into()),
            amount: Some("R 30,830".into()),
            account_name: Some(NamedRef::named("Acme")),
            contact_name: Some(NamedRef::named("Thandi")),
            closing_date: Some("2025-08-12".into()),
            stage: Some("Quoted".into()),
            probability: Some(60.0),
            owner: Some(NamedRef::named("Pieter")),
            created_time: Some("2025-01-01T09:00:00+02:00".into()),
            ..CrmRecord::default()
        };
        let opts = NormalizeOptions {
            record_url_template: Some("https://crm.example/deals/{id}".into()),
        };
        let deals = normalize_with(&RawDeals::Records(vec![record]), &window(), &opts);
        let deal = &deals[0];
        assert_eq!(deal.id, "3531584000001");
        assert_eq!(deal.external_id, "3531584000001");
        assert_eq!(deal.company, "Acme");
        assert_eq!(deal.contact, "Thandi");
        assert_eq!(deal.value, Some(30830.0));
        assert_eq!(deal.probability, 60);
        assert_eq!(deal.close_date, date(2025, 8, 12));
        assert_eq!(deal.url.as_deref(), Some("https://crm.example/deals/3531584000001"));
        assert_eq!(deal.modified_time.as_deref(), Some("2025-01-01T09:00:00+02:00"));
    }

    #[test]
    fn test_tabular_shape_uses_column_index() {
        let table = TabularDeals {
            columns: vec![
                "Stage".into(),
                "Potential Name".into(),
                "Date".into(),
                "Potential ID".into(),
                "Total Value".into(),
            ],
            rows: vec![
                vec![
                    Cell::Text("Commit".into()),
                    Cell::Text("Router refresh".into()),
                    Cell::Text("2025-09-01".into()),
                    Cell::Text("POT-77".into()),
                    Cell::Number(1200.0),
                ],
                vec![Cell::Empty, Cell::Empty, Cell::Empty],
            ],
        };
        let deals = normalize(&RawDeals::Tabular(table), &window());
        assert_eq!(deals.len(), 2);
        assert_eq!(deals[0].id, "deal-1");
        assert_eq!(deals[0].external_id, "POT-77");
        assert_eq!(deals[0].title, "Router refresh");
        assert_eq!(deals[0].stage, "Commit");
        assert_eq!(deals[0].value, Some(1200.0));
        assert_eq!(deals[0].company, "Unknown Company");
        assert_eq!(deals[1].id, "deal-2");
        assert_eq!(deals[1].title, "Untitled Deal");
        assert_eq!(deals[1].close_date, date(2025, 7, 15));
    }

    #[test]
    fn test_out_of_window_and_unparsable_dates_are_dropped() {
        let records = vec![
            CrmRecord {
                id: Some("in".into()),
                closing_date: Some("2025-10-31".into()),
                ..CrmRecord::default()
            },
            CrmRecord {
                id: Some("after".into()),
                closing_date: Some("2025-11-01".into()),
                ..CrmRecord::default()
            },
            CrmRecord {
                id: Some("before".into()),
                closing_date: Some("2025-06-30".into()),
                ..CrmRecord::default()
            },
            CrmRecord {
                id: Some("garbled".into()),
                closing_date: Some("soon".into()),
                ..CrmRecord::default()
            },
        ];
        let ids: Vec<String> = normalize(&RawDeals::Records(records), &window())
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["in"]);
    }

    #[test]
    fn test_raw_deals_deserialize_both_shapes() {
        let tabular: RawDeals = serde_yaml::from_str(
            "column_order: [Potential Name, Date]\nrows:\n  - [Deal A, '2025-07-20']\n",
        )
        .expect("tabular");
        assert!(matches!(tabular, RawDeals::Tabular(_)));

        let records: RawDeals = serde_yaml::from_str(
            "- id: '1'\n  Deal_Name: Deal B\n  Amount: 5000\n  Account_Name: { name: Acme }\n",
        )
        .expect("records");
        match records {
            RawDeals::Records(r) => {
                assert_eq!(r[0].deal_name.as_deref(), Some("Deal B"));
                assert_eq!(r[0].amount, Some(RawAmount::Number(5000.0)));
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }
}
