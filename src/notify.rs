//! Change notifications for report owners
//!
//! When someone other than the owner changes a report, the owner gets a
//! mail listing what changed. Changes from one operation are grouped so
//! every owner receives exactly one mail, whatever the number of reports.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::duration::format_duration;
use crate::models::{Report, ReportRecord, Task, User};

/// One field of a report that changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

/// A report (as it was before) together with what changed on it
#[derive(Debug, Clone)]
pub struct ChangedReport {
    pub before: ReportRecord,
    pub changes: Vec<FieldChange>,
}

/// Fields owners are told about. Verification and the review flag are
/// workflow state and not reported.
pub fn changed_fields(before: &ReportRecord, after: &Report, new_task: Option<&Task>) -> Vec<FieldChange> {
    let old = &before.report;
    let mut changes = Vec::new();

    if old.task_id != after.task_id {
        let new_name = new_task
            .filter(|t| t.id == after.task_id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| after.task_id.to_string());
        changes.push(FieldChange {
            field: "task",
            old: before.task_name.clone(),
            new: new_name,
        });
    }
    if old.comment != after.comment {
        changes.push(FieldChange {
            field: "comment",
            old: old.comment.clone(),
            new: after.comment.clone(),
        });
    }
    if old.not_billable != after.not_billable {
        changes.push(FieldChange {
            field: "not_billable",
            old: old.not_billable.to_string(),
            new: after.not_billable.to_string(),
        });
    }

    changes
}

/// An outgoing mail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// Mail delivery backend
pub trait Mailer: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Writes mails to the log instead of delivering them
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = ?message.to,
            subject = %message.subject,
            "mail\n{}",
            message.body
        );
        Ok(())
    }
}

/// Keeps every sent mail in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryOutbox {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<EmailMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl Mailer for MemoryOutbox {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        self.messages
            .lock()
            .map_err(|e| MailError::Delivery(e.to_string()))?
            .push(message.clone());
        Ok(())
    }
}

/// All changed reports of one owner
#[derive(Debug, Clone)]
pub struct OwnerNotice {
    pub owner_id: Uuid,
    pub username: String,
    pub email: String,
    pub reports: Vec<ChangedReport>,
}

/// Group changes by owner, dropping the actor's own reports and reports
/// without a reportable change. Owners keep first-seen order.
pub fn group_by_owner(actor: &User, changed: Vec<ChangedReport>) -> Vec<OwnerNotice> {
    let mut notices: Vec<OwnerNotice> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for item in changed {
        let owner_id = item.before.report.user_id;
        if owner_id == actor.id || item.changes.is_empty() {
            continue;
        }

        let slot = *index.entry(owner_id).or_insert_with(|| {
            notices.push(OwnerNotice {
                owner_id,
                username: item.before.username.clone(),
                email: item.before.user_email.clone(),
                reports: Vec::new(),
            });
            notices.len() - 1
        });
        notices[slot].reports.push(item);
    }

    notices
}

/// Builds and sends owner notifications
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    from: String,
    subject_prefix: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, from: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            mailer,
            from: from.into(),
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Send one mail per affected owner; returns how many were delivered.
    /// Failed deliveries are logged and not retried.
    pub fn notify(&self, actor: &User, changed: Vec<ChangedReport>) -> usize {
        let mut sent = 0;

        for notice in group_by_owner(actor, changed) {
            let message = self.render(actor, &notice);
            match self.mailer.send(&message) {
                Ok(()) => {
                    tracing::info!(
                        owner = %notice.owner_id,
                        reports = notice.reports.len(),
                        "notified owner about changed reports"
                    );
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!(owner = %notice.owner_id, "{}", e);
                }
            }
        }

        sent
    }

    pub fn render(&self, actor: &User, notice: &OwnerNotice) -> EmailMessage {
        let mut body = format!(
            "Hi {},\n\n{} changed {} of your reports:\n",
            notice.username,
            actor.username,
            notice.reports.len()
        );

        for changed in &notice.reports {
            let r = &changed.before;
            body.push_str(&format!(
                "\n---\nDate: {}\nDuration: {}\nCustomer: {}\nProject: {}\nTask: {}\n",
                r.report.date,
                format_duration(r.report.duration),
                r.customer_name,
                r.project_name,
                r.task_name
            ));
            for change in &changed.changes {
                body.push_str(&format!(
                    "    {}: {} -> {}\n",
                    change.field, change.old, change.new
                ));
            }
        }

        EmailMessage {
            from: self.from.clone(),
            to: vec![notice.email.clone()],
            subject: format!("{}Your reports have been changed", self.subject_prefix),
            body,
        }
    }
}
