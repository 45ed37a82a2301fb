//! Common attribute values across a set of reports

use serde::Serialize;
use uuid::Uuid;

use crate::models::ReportRecord;

/// Each attribute holds the value every report agrees on, or `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Intersection {
    /// Canonical rendering of the filter that produced the set
    pub id: String,
    pub comment: Option<String>,
    pub not_billable: Option<bool>,
    pub verified: Option<bool>,
    pub review: Option<bool>,
    pub customer: Option<Uuid>,
    pub project: Option<Uuid>,
    pub task: Option<Uuid>,
    pub count: usize,
}

/// Value shared by all items, `None` when they differ or there are none
fn common<T, I>(mut values: I) -> Option<T>
where
    T: PartialEq,
    I: Iterator<Item = T>,
{
    let first = values.next()?;
    values.all(|v| v == first).then_some(first)
}

pub fn intersect(id: impl Into<String>, records: &[ReportRecord]) -> Intersection {
    Intersection {
        id: id.into(),
        comment: common(records.iter().map(|r| r.report.comment.clone())),
        not_billable: common(records.iter().map(|r| r.report.not_billable)),
        verified: common(records.iter().map(|r| r.report.is_verified())),
        review: common(records.iter().map(|r| r.report.review)),
        customer: common(records.iter().map(|r| r.customer_id)),
        project: common(records.iter().map(|r| r.project_id)),
        task: common(records.iter().map(|r| r.report.task_id)),
        count: records.len(),
    }
}
