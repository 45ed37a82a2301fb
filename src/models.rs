//! Data models for reports and the task hierarchy they are booked on

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::duration::serde_hms;

/// An account that books time and, depending on relations, reviews or
/// supervises others
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCenter {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingType {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub customer_id: Uuid,
    pub cost_center_id: Option<Uuid>,
    pub billing_type_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub project_id: Uuid,
    /// Overrides the project's cost center when set
    pub cost_center_id: Option<Uuid>,
}

/// A single time entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "serde_hms")]
    pub duration: Duration,
    pub comment: String,
    pub not_billable: bool,
    pub review: bool,
    pub verified_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn is_verified(&self) -> bool {
        self.verified_by.is_some()
    }
}

/// A report joined with the names of everything it hangs off
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRecord {
    #[serde(flatten)]
    pub report: Report,
    pub username: String,
    pub user_email: String,
    pub task_name: String,
    pub project_id: Uuid,
    pub project_name: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub verified_by_username: Option<String>,
    pub task_cost_center: Option<String>,
    pub project_cost_center: Option<String>,
    pub billing_type: Option<String>,
}

impl ReportRecord {
    /// Task cost center wins over the project's; empty when neither is set
    pub fn effective_cost_center(&self) -> &str {
        self.task_cost_center
            .as_deref()
            .or(self.project_cost_center.as_deref())
            .unwrap_or("")
    }

    pub fn effective_billing_type(&self) -> &str {
        self.billing_type.as_deref().unwrap_or("")
    }
}

/// Request to create a new report
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReportRequest {
    pub task: Uuid,
    pub date: NaiveDate,
    #[serde(with = "serde_hms")]
    pub duration: Duration,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub not_billable: bool,
    #[serde(default)]
    pub review: bool,
    /// Book on behalf of another user; defaults to the acting user
    #[serde(default)]
    pub user: Option<Uuid>,
    #[serde(default)]
    pub verified_by: Option<Uuid>,
}

/// Partial update of a single report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportDelta {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, with = "serde_hms::option")]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub task: Option<Uuid>,
    #[serde(default)]
    pub not_billable: Option<bool>,
    #[serde(default)]
    pub review: Option<bool>,
    /// Shortcut for `verified_by` set to the acting user or cleared
    #[serde(default)]
    pub verified: Option<bool>,
    /// Absent leaves it alone, `null` clears it
    #[serde(default, deserialize_with = "double_option")]
    pub verified_by: Option<Option<Uuid>>,
}

/// Single delta applied to every report matched by a bulk filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkDelta {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub not_billable: Option<bool>,
    #[serde(default)]
    pub review: Option<bool>,
    #[serde(default)]
    pub task: Option<Uuid>,
    #[serde(default)]
    pub verified: Option<bool>,
}

impl BulkDelta {
    pub fn is_empty(&self) -> bool {
        self.comment.is_none()
            && self.not_billable.is_none()
            && self.review.is_none()
            && self.task.is_none()
            && self.verified.is_none()
    }
}

/// Deserialize a present-but-null field as `Some(None)`
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
