//! Mutation rules for reports
//!
//! A report is either unverified or verified (`verified_by` set). The
//! functions here take the acting user, the roles they hold over the
//! report and the requested change, and either return the next state or a
//! [`Denial`]. `Forbidden` means the actor may not touch the report at all;
//! `BadRequest` means they may, but not with this combination of fields.

use chrono::{Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::role::{Role, RoleSet};
use crate::duration::{round_to_quarter, MAX_REPORT_SECS};
use crate::models::{CreateReportRequest, Report, ReportDelta, User};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),
}

impl Denial {
    fn forbidden(msg: impl Into<String>) -> Self {
        Denial::Forbidden(msg.into())
    }

    fn bad_request(msg: impl Into<String>) -> Self {
        Denial::BadRequest(msg.into())
    }
}

/// Roles that may move a report's date or duration
const TIME_EDITORS: &[Role] = &[Role::Owner, Role::Supervisor, Role::Superuser];

/// Roles that may set or clear `verified_by`
const VERIFIERS: &[Role] = &[Role::Reviewer, Role::Superuser];

/// Check an update and return the report as it would be stored.
pub fn authorize_update(
    actor: &User,
    roles: &RoleSet,
    report: &Report,
    delta: &ReportDelta,
) -> Result<Report, Denial> {
    if roles.is_empty() {
        tracing::debug!(actor = %actor.id, report = %report.id, "update denied: no role");
        return Err(Denial::forbidden("You are not allowed to change this report"));
    }

    let date_changed = delta.date.is_some_and(|d| d != report.date);
    let duration = delta.duration.map(round_to_quarter);
    let duration_changed = duration.is_some_and(|d| d != report.duration);

    if (date_changed || duration_changed) && !roles.any(TIME_EDITORS) {
        return Err(Denial::bad_request(
            "Only the owner may change date and duration",
        ));
    }

    if report.is_verified() && !roles.has(Role::Superuser) {
        tracing::debug!(actor = %actor.id, report = %report.id, "update denied: report verified");
        return Err(Denial::forbidden("Verified reports can not be changed"));
    }

    if let Some(d) = duration {
        check_duration(d)?;
    }

    let verified_by = requested_verifier(actor, delta)?;
    if let Some(target) = verified_by {
        check_verifier(actor, roles, report.verified_by, target)?;

        if delta.review == Some(true) && target.is_some() {
            return Err(Denial::bad_request(
                "Report can't both be set as `review` and `verified`",
            ));
        }
    }

    let mut next = report.clone();
    if let Some(date) = delta.date {
        next.date = date;
    }
    if let Some(duration) = duration {
        next.duration = duration;
    }
    if let Some(comment) = &delta.comment {
        next.comment = comment.clone();
    }
    if let Some(task) = delta.task {
        next.task_id = task;
    }
    if let Some(not_billable) = delta.not_billable {
        next.not_billable = not_billable;
    }
    if let Some(review) = delta.review {
        next.review = review;
    }
    if let Some(target) = verified_by {
        next.verified_by = target;
    }
    if next != *report {
        next.updated_at = Utc::now();
    }

    Ok(next)
}

/// Only the owner may delete, whatever else the actor holds.
pub fn authorize_delete(actor: &User, roles: &RoleSet, report: &Report) -> Result<(), Denial> {
    if roles.has(Role::Owner) {
        return Ok(());
    }
    tracing::debug!(actor = %actor.id, report = %report.id, "delete denied: not owner");
    Err(Denial::forbidden("Only the owner may delete a report"))
}

/// Check a new report booked for `owner`. `roles` are resolved against the
/// prospective report (owner plus the task's project reviewers).
pub fn authorize_create(
    actor: &User,
    roles: &RoleSet,
    owner: Uuid,
    request: &CreateReportRequest,
) -> Result<(), Denial> {
    if owner != actor.id && !roles.any(&[Role::Supervisor, Role::Superuser]) {
        return Err(Denial::forbidden(
            "You may only book reports for yourself or users you supervise",
        ));
    }

    check_duration(request.duration)?;

    if let Some(target) = request.verified_by {
        check_verifier(actor, roles, None, Some(target))?;
        if request.review {
            return Err(Denial::bad_request(
                "Report can't both be set as `review` and `verified`",
            ));
        }
    }

    Ok(())
}

/// Merge `verified` and `verified_by` into one requested value.
/// `None` means the request does not touch verification.
fn requested_verifier(actor: &User, delta: &ReportDelta) -> Result<Option<Option<Uuid>>, Denial> {
    let from_flag = delta
        .verified
        .map(|verified| verified.then_some(actor.id));

    match (from_flag, delta.verified_by) {
        (Some(a), Some(b)) if a != b => Err(Denial::bad_request(
            "`verified` and `verified_by` disagree",
        )),
        (Some(a), _) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}

fn check_verifier(
    actor: &User,
    roles: &RoleSet,
    current: Option<Uuid>,
    target: Option<Uuid>,
) -> Result<(), Denial> {
    if target == current {
        return Ok(());
    }
    if target.is_some_and(|id| id != actor.id) {
        return Err(Denial::bad_request("You may only verify with your own user"));
    }
    if !roles.any(VERIFIERS) {
        return Err(Denial::bad_request("Only reviewers may verify reports"));
    }
    Ok(())
}

fn check_duration(duration: Duration) -> Result<(), Denial> {
    if duration < Duration::zero() {
        return Err(Denial::bad_request("Duration may not be negative"));
    }
    if duration > Duration::seconds(MAX_REPORT_SECS) {
        return Err(Denial::bad_request("Duration may not exceed 24 hours"));
    }
    Ok(())
}
