//! Report filter grammar shared by list, bulk, export and intersection

use chrono::NaiveDate;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Query-string keys that take part in filtering
const FILTER_KEYS: &[&str] = &[
    "id",
    "user",
    "task",
    "project",
    "customer",
    "date",
    "from_date",
    "to_date",
    "reviewer",
    "verifier",
    "cost_center",
    "review",
    "not_billable",
    "verified",
    "editable",
];

/// Sort order for report queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ordering {
    #[default]
    Date,
    DateDesc,
    Id,
    Duration,
    DurationDesc,
    Comment,
    TaskName,
    Username,
}

impl Ordering {
    /// SQL `ORDER BY` body; always ends on the id to stay stable
    pub fn as_sql(&self) -> &'static str {
        match self {
            Ordering::Date => "r.date ASC, r.id ASC",
            Ordering::DateDesc => "r.date DESC, r.id ASC",
            Ordering::Id => "r.id ASC",
            Ordering::Duration => "r.duration_secs ASC, r.id ASC",
            Ordering::DurationDesc => "r.duration_secs DESC, r.id ASC",
            Ordering::Comment => "r.comment ASC, r.id ASC",
            Ordering::TaskName => "t.name ASC, r.id ASC",
            Ordering::Username => "u.username ASC, r.id ASC",
        }
    }
}

impl std::str::FromStr for Ordering {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "date" => Ok(Ordering::Date),
            "-date" => Ok(Ordering::DateDesc),
            "id" => Ok(Ordering::Id),
            "duration" => Ok(Ordering::Duration),
            "-duration" => Ok(Ordering::DurationDesc),
            "comment" => Ok(Ordering::Comment),
            "task__name" => Ok(Ordering::TaskName),
            "user__username" => Ok(Ordering::Username),
            _ => Err(format!("Invalid ordering: {}", s)),
        }
    }
}

/// Parsed report filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    /// `None` when the parameter is absent or empty
    pub ids: Option<Vec<Uuid>>,
    pub user: Option<Uuid>,
    pub task: Option<Uuid>,
    pub project: Option<Uuid>,
    pub customer: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub reviewer: Option<Uuid>,
    pub verifier: Option<Uuid>,
    pub cost_center: Option<Uuid>,
    pub review: Option<bool>,
    pub not_billable: Option<bool>,
    pub verified: Option<bool>,
    /// Resolved against the acting user at query time
    pub editable: Option<bool>,
    pub ordering: Ordering,
    canonical: String,
}

impl ReportFilter {
    /// Parse from raw query parameters. Unknown keys are ignored.
    pub fn from_query(params: &BTreeMap<String, String>) -> Result<Self> {
        let mut filter = ReportFilter::default();
        let mut canonical = Vec::new();

        for (key, value) in params {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key.as_str() {
                "id" => {
                    filter.ids = parse_id_list(value)?;
                    if filter.ids.is_none() {
                        continue;
                    }
                }
                "user" => filter.user = Some(parse_uuid(key, value)?),
                "task" => filter.task = Some(parse_uuid(key, value)?),
                "project" => filter.project = Some(parse_uuid(key, value)?),
                "customer" => filter.customer = Some(parse_uuid(key, value)?),
                "date" => filter.date = Some(parse_date(key, value)?),
                "from_date" => filter.from_date = Some(parse_date(key, value)?),
                "to_date" => filter.to_date = Some(parse_date(key, value)?),
                "reviewer" => filter.reviewer = Some(parse_uuid(key, value)?),
                "verifier" => filter.verifier = Some(parse_uuid(key, value)?),
                "cost_center" => filter.cost_center = Some(parse_uuid(key, value)?),
                "review" => filter.review = Some(parse_bool(key, value)?),
                "not_billable" => filter.not_billable = Some(parse_bool(key, value)?),
                "verified" => filter.verified = Some(parse_bool(key, value)?),
                "editable" => filter.editable = Some(parse_bool(key, value)?),
                "ordering" => {
                    filter.ordering = value.parse().map_err(AppError::BadRequest)?;
                }
                _ => {}
            }

            if FILTER_KEYS.contains(&key.as_str()) {
                canonical.push(format!("{}={}", key, value));
            }
        }

        filter.canonical = canonical.join("&");
        Ok(filter)
    }

    /// `key=value&...` of the applied filter keys, sorted by key
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

fn parse_uuid(key: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| AppError::BadRequest(format!("Invalid {}: {}", key, value)))
}

/// Comma separated ids; a list without any id is no filter at all
fn parse_id_list(value: &str) -> Result<Option<Vec<Uuid>>> {
    let ids = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_uuid("id", s))
        .collect::<Result<Vec<_>>>()?;

    Ok((!ids.is_empty()).then_some(ids))
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid {}: {}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(AppError::BadRequest(format!("Invalid {}: {}", key, value))),
    }
}
