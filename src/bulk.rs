//! Bulk report updates
//!
//! A bulk update applies one delta to every report a filter matches. The
//! whole batch is checked first without touching anything; only a fully
//! valid batch produces a plan for the store to write.

use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::{authorize_update, Denial, RoleSet};
use crate::filter::ReportFilter;
use crate::models::{BulkDelta, Report, ReportDelta, ReportRecord, Task, User};
use crate::notify::{changed_fields, ChangedReport};

impl From<&BulkDelta> for ReportDelta {
    fn from(delta: &BulkDelta) -> Self {
        ReportDelta {
            comment: delta.comment.clone(),
            not_billable: delta.not_billable,
            review: delta.review,
            task: delta.task,
            verified: delta.verified,
            ..Default::default()
        }
    }
}

/// What a validated bulk update will write and whom it concerns
#[derive(Debug, Default)]
pub struct BulkPlan {
    /// Next state of every report that actually changes
    pub updates: Vec<Report>,
    pub changes: Vec<ChangedReport>,
}

/// Request-level checks that need no report data
pub fn validate_request(actor: &User, filter: &ReportFilter, delta: &BulkDelta) -> Result<(), Denial> {
    if filter.editable != Some(true) {
        return Err(Denial::BadRequest(
            "Editable filter needs to be set for bulk update".to_string(),
        ));
    }

    if delta.verified.is_some() && !actor.is_superuser && filter.reviewer != Some(actor.id) {
        return Err(Denial::BadRequest(
            "Reviewer filter needs to be set to verifying user".to_string(),
        ));
    }

    if delta.verified == Some(true) && delta.review == Some(true) {
        return Err(Denial::BadRequest(
            "Reports can't both be set as `review` and `verified`".to_string(),
        ));
    }

    Ok(())
}

/// Check `delta` against every matched report. Any denial fails the batch.
pub fn plan(
    actor: &User,
    delta: &BulkDelta,
    records: &[ReportRecord],
    roles: &HashMap<Uuid, RoleSet>,
    new_task: Option<&Task>,
) -> Result<BulkPlan, Denial> {
    // clearing the flag in the same request is fine
    if delta.verified == Some(true)
        && delta.review != Some(false)
        && records.iter().any(|r| r.report.review)
    {
        return Err(Denial::BadRequest(
            "Reports can't both be set as `review` and `verified`".to_string(),
        ));
    }

    let report_delta = ReportDelta::from(delta);
    let no_roles = RoleSet::new();
    let mut plan = BulkPlan::default();

    for record in records {
        let held = roles.get(&record.report.id).unwrap_or(&no_roles);
        let next = authorize_update(actor, held, &record.report, &report_delta)?;

        if next == record.report {
            continue;
        }

        plan.changes.push(ChangedReport {
            before: record.clone(),
            changes: changed_fields(record, &next, new_task),
        });
        plan.updates.push(next);
    }

    Ok(plan)
}
