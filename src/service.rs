//! Report operations: store, authorizer and notifier put together

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::{authorize_create, authorize_delete, authorize_update, RoleSet};
use crate::bulk;
use crate::duration::{checked_total, format_duration, round_to_quarter};
use crate::error::{AppError, Result};
use crate::export::{self, FileType};
use crate::filter::ReportFilter;
use crate::intersection::{intersect, Intersection};
use crate::models::{BulkDelta, CreateReportRequest, Report, ReportDelta, ReportRecord, Task, User};
use crate::notify::{changed_fields, ChangedReport, Notifier};
use crate::store::Store;

/// Report list plus aggregate metadata
#[derive(Debug, Serialize)]
pub struct ReportList {
    pub data: Vec<ReportRecord>,
    pub meta: ListMeta,
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    /// Sum of all listed durations as `HH:MM:SS`
    pub total_time: String,
    pub count: usize,
}

/// A rendered export file
#[derive(Debug)]
pub struct ExportFile {
    pub file_type: FileType,
    pub bytes: Vec<u8>,
}

impl ExportFile {
    pub fn filename(&self) -> String {
        format!("report.{}", self.file_type.as_str())
    }
}

pub struct ReportService {
    store: Store,
    notifier: Notifier,
    export_max_count: i64,
}

impl ReportService {
    pub fn new(store: Store, notifier: Notifier, export_max_count: i64) -> Self {
        Self {
            store,
            notifier,
            export_max_count,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Look up the acting user; an unknown id is not an authenticated user.
    pub async fn actor(&self, id: Uuid) -> Result<User> {
        match self.store.get_user(id).await {
            Err(AppError::NotFound(_)) => Err(AppError::Forbidden(
                "Authentication credentials were not provided".to_string(),
            )),
            other => other,
        }
    }

    pub async fn list(&self, actor: &User, filter: &ReportFilter) -> Result<ReportList> {
        let data = self.store.list_records(filter, actor).await?;
        let total = checked_total(data.iter().map(|r| r.report.duration))
            .ok_or_else(|| AppError::Internal("Total time out of range".to_string()))?;

        Ok(ReportList {
            meta: ListMeta {
                total_time: format_duration(total),
                count: data.len(),
            },
            data,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<ReportRecord> {
        self.store.get_record(id).await
    }

    pub async fn create(&self, actor: &User, request: CreateReportRequest) -> Result<ReportRecord> {
        let task = self.existing_task(request.task).await?;
        let owner = match request.user {
            Some(id) => self.existing_user(id).await?.id,
            None => actor.id,
        };

        let facts = self.store.role_facts(owner, task.project_id).await?;
        let roles = RoleSet::resolve(actor, &facts);
        authorize_create(actor, &roles, owner, &request)?;

        let now = Utc::now();
        let report = Report {
            id: Uuid::new_v4(),
            user_id: owner,
            task_id: task.id,
            date: request.date,
            duration: round_to_quarter(request.duration),
            comment: request.comment,
            not_billable: request.not_billable,
            review: request.review,
            verified_by: request.verified_by,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_report(&report).await?;
        tracing::debug!(report = %report.id, owner = %owner, "report created");

        self.store.get_record(report.id).await
    }

    pub async fn update(&self, actor: &User, id: Uuid, delta: ReportDelta) -> Result<ReportRecord> {
        let record = self.store.get_record(id).await?;
        let facts = self
            .store
            .role_facts(record.report.user_id, record.project_id)
            .await?;
        let roles = RoleSet::resolve(actor, &facts);

        let next = authorize_update(actor, &roles, &record.report, &delta)?;
        if next == record.report {
            return Ok(record);
        }

        let new_task = self.changed_task(&record.report, &next).await?;
        self.store.save_report(&next).await?;

        if record.report.user_id != actor.id {
            let changes = changed_fields(&record, &next, new_task.as_ref());
            self.notifier
                .notify(actor, vec![ChangedReport { before: record, changes }]);
        }

        self.store.get_record(id).await
    }

    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        let record = self.store.get_record(id).await?;
        let facts = self
            .store
            .role_facts(record.report.user_id, record.project_id)
            .await?;
        let roles = RoleSet::resolve(actor, &facts);

        authorize_delete(actor, &roles, &record.report)?;
        self.store.delete_report(id).await
    }

    /// Apply `delta` to every report `filter` matches. Returns the number of
    /// reports written; nothing is written unless every report passes.
    pub async fn bulk_update(&self, actor: &User, filter: &ReportFilter, delta: BulkDelta) -> Result<usize> {
        bulk::validate_request(actor, filter, &delta)?;
        if delta.is_empty() {
            return Ok(0);
        }

        let new_task = match delta.task {
            Some(id) => Some(self.existing_task(id).await?),
            None => None,
        };

        let records = self.store.list_records(filter, actor).await?;
        let roles: HashMap<Uuid, RoleSet> = self
            .store
            .role_facts_for(&records)
            .await?
            .iter()
            .map(|(id, facts)| (*id, RoleSet::resolve(actor, facts)))
            .collect();

        let plan = bulk::plan(actor, &delta, &records, &roles, new_task.as_ref())?;
        let written = plan.updates.len();
        self.store.save_reports(&plan.updates).await?;

        tracing::info!(
            actor = %actor.id,
            matched = records.len(),
            written,
            "bulk update applied"
        );

        self.notifier.notify(actor, plan.changes);
        Ok(written)
    }

    pub async fn export(
        &self,
        actor: &User,
        file_type: Option<&str>,
        filter: &ReportFilter,
    ) -> Result<ExportFile> {
        let file_type: FileType = file_type
            .ok_or_else(|| AppError::BadRequest("file_type is required".to_string()))?
            .parse()
            .map_err(AppError::BadRequest)?;

        let count = self.store.count_reports(filter, actor).await?;
        export::check_max_count(count, self.export_max_count)?;

        let records = self.store.list_records(filter, actor).await?;
        let bytes = export::render(file_type, &records)?;

        Ok(ExportFile { file_type, bytes })
    }

    pub async fn intersection(&self, actor: &User, filter: &ReportFilter) -> Result<Intersection> {
        let records = self.store.list_records(filter, actor).await?;
        Ok(intersect(filter.canonical(), &records))
    }

    async fn existing_task(&self, id: Uuid) -> Result<Task> {
        self.store.get_task(id).await.map_err(not_found_as_bad_request)
    }

    async fn existing_user(&self, id: Uuid) -> Result<User> {
        self.store.get_user(id).await.map_err(not_found_as_bad_request)
    }

    async fn changed_task(&self, before: &Report, after: &Report) -> Result<Option<Task>> {
        if before.task_id == after.task_id {
            return Ok(None);
        }
        self.existing_task(after.task_id).await.map(Some)
    }
}

/// A referenced object that does not exist is a client error
fn not_found_as_bad_request(e: AppError) -> AppError {
    match e {
        AppError::NotFound(msg) => AppError::BadRequest(msg),
        other => other,
    }
}
