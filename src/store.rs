//! Database store for reports and the task hierarchy

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::RoleFacts;
use crate::error::{AppError, Result};
use crate::filter::ReportFilter;
use crate::models::{
    BillingType, CostCenter, Customer, Project, Report, ReportRecord, Task, User,
};

const RECORD_COLUMNS: &str = r#"
    SELECT r.id, r.user_id, r.task_id, r.date, r.duration_secs, r.comment,
           r.not_billable, r.review, r.verified_by_id, r.created_at, r.updated_at,
           u.username, u.email AS user_email,
           t.name AS task_name,
           p.id AS project_id, p.name AS project_name,
           c.id AS customer_id, c.name AS customer_name,
           vb.username AS verified_by_username,
           tcc.name AS task_cost_center,
           pcc.name AS project_cost_center,
           bt.name AS billing_type
"#;

const RECORD_FROM: &str = r#"
    FROM reports r
    JOIN users u ON u.id = r.user_id
    JOIN tasks t ON t.id = r.task_id
    JOIN projects p ON p.id = t.project_id
    JOIN customers c ON c.id = p.customer_id
    LEFT JOIN users vb ON vb.id = r.verified_by_id
    LEFT JOIN cost_centers tcc ON tcc.id = t.cost_center_id
    LEFT JOIN cost_centers pcc ON pcc.id = p.cost_center_id
    LEFT JOIN billing_types bt ON bt.id = p.billing_type_id
    WHERE 1 = 1
"#;

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // User operations

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn create_user(&self, username: &str, email: &str, is_superuser: bool) -> Result<User> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, is_superuser)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(username)
        .bind(email)
        .bind(is_superuser)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            is_superuser,
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, is_superuser
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        row.try_into()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn add_supervisor(&self, user_id: Uuid, supervisor_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO user_supervisors (user_id, supervisor_id)
            VALUES (?, ?)
            "#,
        )
        .bind(user_id.to_string())
        .bind(supervisor_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Task hierarchy operations

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn create_cost_center(&self, name: &str) -> Result<CostCenter> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO cost_centers (id, name) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(CostCenter {
            id,
            name: name.to_string(),
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn create_billing_type(&self, name: &str) -> Result<BillingType> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO billing_types (id, name) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(BillingType {
            id,
            name: name.to_string(),
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn create_customer(&self, name: &str) -> Result<Customer> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO customers (id, name) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(Customer {
            id,
            name: name.to_string(),
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn create_project(
        &self,
        name: &str,
        customer_id: Uuid,
        cost_center_id: Option<Uuid>,
        billing_type_id: Option<Uuid>,
    ) -> Result<Project> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO projects (id, name, customer_id, cost_center_id, billing_type_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(customer_id.to_string())
        .bind(cost_center_id.map(|u| u.to_string()))
        .bind(billing_type_id.map(|u| u.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(Project {
            id,
            name: name.to_string(),
            customer_id,
            cost_center_id,
            billing_type_id,
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn add_reviewer(&self, project_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO project_reviewers (project_id, user_id)
            VALUES (?, ?)
            "#,
        )
        .bind(project_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn create_task(
        &self,
        name: &str,
        project_id: Uuid,
        cost_center_id: Option<Uuid>,
    ) -> Result<Task> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO tasks (id, name, project_id, cost_center_id)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(project_id.to_string())
        .bind(cost_center_id.map(|u| u.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(Task {
            id,
            name: name.to_string(),
            project_id,
            cost_center_id,
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn get_task(&self, id: Uuid) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, name, project_id, cost_center_id
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?;

        row.try_into()
    }

    // Role facts

    /// Reviewers of `project_id` and supervisors of `owner_id`
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn role_facts(&self, owner_id: Uuid, project_id: Uuid) -> Result<RoleFacts> {
        let mut reviewers = self.reviewers_by_project(&[project_id]).await?;
        let mut supervisors = self.supervisors_by_user(&[owner_id]).await?;

        Ok(RoleFacts {
            owner_id,
            reviewers: reviewers.remove(&project_id).unwrap_or_default(),
            supervisors: supervisors.remove(&owner_id).unwrap_or_default(),
        })
    }

    /// Role facts for many reports in two queries, keyed by report id
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn role_facts_for(&self, records: &[ReportRecord]) -> Result<HashMap<Uuid, RoleFacts>> {
        let project_ids: Vec<Uuid> = records.iter().map(|r| r.project_id).collect();
        let user_ids: Vec<Uuid> = records.iter().map(|r| r.report.user_id).collect();

        let reviewers = self.reviewers_by_project(&project_ids).await?;
        let supervisors = self.supervisors_by_user(&user_ids).await?;

        Ok(records
            .iter()
            .map(|r| {
                let facts = RoleFacts {
                    owner_id: r.report.user_id,
                    reviewers: reviewers.get(&r.project_id).cloned().unwrap_or_default(),
                    supervisors: supervisors
                        .get(&r.report.user_id)
                        .cloned()
                        .unwrap_or_default(),
                };
                (r.report.id, facts)
            })
            .collect())
    }

    async fn reviewers_by_project(&self, project_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Uuid>>> {
        self.pairs_in(
            "SELECT project_id, user_id FROM project_reviewers WHERE project_id IN (",
            project_ids,
        )
        .await
    }

    async fn supervisors_by_user(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Uuid>>> {
        self.pairs_in(
            "SELECT user_id, supervisor_id FROM user_supervisors WHERE user_id IN (",
            user_ids,
        )
        .await
    }

    /// Run a two-column lookup over `keys` and group the second column by the first
    async fn pairs_in(&self, head: &str, keys: &[Uuid]) -> Result<HashMap<Uuid, Vec<Uuid>>> {
        let mut grouped: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        if keys.is_empty() {
            return Ok(grouped);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(head);
        {
            let mut separated = qb.separated(", ");
            for key in keys {
                separated.push_bind(key.to_string());
            }
            separated.push_unseparated(")");
        }

        let rows = qb
            .build_query_as::<(String, String)>()
            .fetch_all(&self.pool)
            .await?;

        for (key, value) in rows {
            let key = parse_uuid(&key, "key")?;
            let value = parse_uuid(&value, "value")?;
            let entry = grouped.entry(key).or_default();
            if !entry.contains(&value) {
                entry.push(value);
            }
        }

        Ok(grouped)
    }

    // Report operations

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn insert_report(&self, report: &Report) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reports (id, user_id, task_id, date, duration_secs, comment,
                                 not_billable, review, verified_by_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.id.to_string())
        .bind(report.user_id.to_string())
        .bind(report.task_id.to_string())
        .bind(report.date)
        .bind(report.duration.num_seconds())
        .bind(&report.comment)
        .bind(report.not_billable)
        .bind(report.review)
        .bind(report.verified_by.map(|u| u.to_string()))
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn get_record(&self, id: Uuid) -> Result<ReportRecord> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(RECORD_COLUMNS);
        qb.push(RECORD_FROM);
        qb.push(" AND r.id = ").push_bind(id.to_string());

        let row = qb
            .build_query_as::<ReportRecordRow>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", id)))?;

        row.try_into()
    }

    /// Every report matching `filter` as seen by `actor`, joined in one query
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn list_records(&self, filter: &ReportFilter, actor: &User) -> Result<Vec<ReportRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(RECORD_COLUMNS);
        qb.push(RECORD_FROM);
        push_filter(&mut qb, filter, actor);
        qb.push(" ORDER BY ").push(filter.ordering.as_sql());

        let rows = qb
            .build_query_as::<ReportRecordRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn count_reports(&self, filter: &ReportFilter, actor: &User) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*)");
        qb.push(RECORD_FROM);
        push_filter(&mut qb, filter, actor);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn save_report(&self, report: &Report) -> Result<()> {
        write_report(&self.pool, report).await
    }

    /// Write every report in one transaction
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn save_reports(&self, reports: &[Report]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for report in reports {
            write_report(&mut *tx, report).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn delete_report(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Report {} not found", id)));
        }
        Ok(())
    }
}

async fn write_report<'e, E>(executor: E, report: &Report) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE reports
        SET task_id = ?, date = ?, duration_secs = ?, comment = ?, not_billable = ?,
            review = ?, verified_by_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(report.task_id.to_string())
    .bind(report.date)
    .bind(report.duration.num_seconds())
    .bind(&report.comment)
    .bind(report.not_billable)
    .bind(report.review)
    .bind(report.verified_by.map(|u| u.to_string()))
    .bind(report.updated_at)
    .bind(report.id.to_string())
    .execute(executor)
    .await?;

    Ok(())
}

/// Append `AND ...` clauses for every set field of `filter`
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ReportFilter, actor: &User) {
    if let Some(ids) = &filter.ids {
        qb.push(" AND r.id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");
    }
    if let Some(user) = filter.user {
        qb.push(" AND r.user_id = ").push_bind(user.to_string());
    }
    if let Some(task) = filter.task {
        qb.push(" AND r.task_id = ").push_bind(task.to_string());
    }
    if let Some(project) = filter.project {
        qb.push(" AND p.id = ").push_bind(project.to_string());
    }
    if let Some(customer) = filter.customer {
        qb.push(" AND c.id = ").push_bind(customer.to_string());
    }
    if let Some(date) = filter.date {
        qb.push(" AND r.date = ").push_bind(date);
    }
    if let Some(from) = filter.from_date {
        qb.push(" AND r.date >= ").push_bind(from);
    }
    if let Some(to) = filter.to_date {
        qb.push(" AND r.date <= ").push_bind(to);
    }
    if let Some(reviewer) = filter.reviewer {
        qb.push(
            " AND EXISTS (SELECT 1 FROM project_reviewers pr WHERE pr.project_id = p.id AND pr.user_id = ",
        )
        .push_bind(reviewer.to_string())
        .push(")");
    }
    if let Some(verifier) = filter.verifier {
        qb.push(" AND r.verified_by_id = ").push_bind(verifier.to_string());
    }
    if let Some(cost_center) = filter.cost_center {
        qb.push(" AND (t.cost_center_id = ")
            .push_bind(cost_center.to_string())
            .push(" OR (t.cost_center_id IS NULL AND p.cost_center_id = ")
            .push_bind(cost_center.to_string())
            .push("))");
    }
    if let Some(review) = filter.review {
        qb.push(" AND r.review = ").push_bind(review);
    }
    if let Some(not_billable) = filter.not_billable {
        qb.push(" AND r.not_billable = ").push_bind(not_billable);
    }
    match filter.verified {
        Some(true) => {
            qb.push(" AND r.verified_by_id IS NOT NULL");
        }
        Some(false) => {
            qb.push(" AND r.verified_by_id IS NULL");
        }
        None => {}
    }
    if let Some(editable) = filter.editable {
        push_editable(qb, editable, actor);
    }
}

/// Reports `actor` may change: everything for a superuser, otherwise
/// unverified reports they own, review or supervise
fn push_editable(qb: &mut QueryBuilder<'_, Sqlite>, editable: bool, actor: &User) {
    if actor.is_superuser {
        if !editable {
            qb.push(" AND 0");
        }
        return;
    }

    qb.push(if editable { " AND (" } else { " AND NOT (" });
    qb.push("r.verified_by_id IS NULL AND (r.user_id = ")
        .push_bind(actor.id.to_string())
        .push(" OR EXISTS (SELECT 1 FROM project_reviewers er WHERE er.project_id = p.id AND er.user_id = ")
        .push_bind(actor.id.to_string())
        .push(") OR EXISTS (SELECT 1 FROM user_supervisors es WHERE es.user_id = r.user_id AND es.supervisor_id = ")
        .push_bind(actor.id.to_string())
        .push(")))");
}

fn parse_uuid(s: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Internal(format!("Invalid {} UUID: {}", what, e)))
}

fn parse_opt_uuid(s: Option<String>, what: &str) -> Result<Option<Uuid>> {
    s.map(|s| parse_uuid(&s, what)).transpose()
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    is_superuser: bool,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid(&row.id, "user")?,
            username: row.username,
            email: row.email,
            is_superuser: row.is_superuser,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    name: String,
    project_id: String,
    cost_center_id: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: parse_uuid(&row.id, "task")?,
            name: row.name,
            project_id: parse_uuid(&row.project_id, "project")?,
            cost_center_id: parse_opt_uuid(row.cost_center_id, "cost_center")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReportRecordRow {
    id: String,
    user_id: String,
    task_id: String,
    date: NaiveDate,
    duration_secs: i64,
    comment: String,
    not_billable: bool,
    review: bool,
    verified_by_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    username: String,
    user_email: String,
    task_name: String,
    project_id: String,
    project_name: String,
    customer_id: String,
    customer_name: String,
    verified_by_username: Option<String>,
    task_cost_center: Option<String>,
    project_cost_center: Option<String>,
    billing_type: Option<String>,
}

impl TryFrom<ReportRecordRow> for ReportRecord {
    type Error = AppError;

    fn try_from(row: ReportRecordRow) -> Result<Self> {
        Ok(ReportRecord {
            report: Report {
                id: parse_uuid(&row.id, "report")?,
                user_id: parse_uuid(&row.user_id, "user")?,
                task_id: parse_uuid(&row.task_id, "task")?,
                date: row.date,
                duration: Duration::try_seconds(row.duration_secs).ok_or_else(|| {
                    AppError::Internal(format!("Invalid duration: {}", row.duration_secs))
                })?,
                comment: row.comment,
                not_billable: row.not_billable,
                review: row.review,
                verified_by: parse_opt_uuid(row.verified_by_id, "verified_by")?,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            username: row.username,
            user_email: row.user_email,
            task_name: row.task_name,
            project_id: parse_uuid(&row.project_id, "project")?,
            project_name: row.project_name,
            customer_id: parse_uuid(&row.customer_id, "customer")?,
            customer_name: row.customer_name,
            verified_by_username: row.verified_by_username,
            task_cost_center: row.task_cost_center,
            project_cost_center: row.project_cost_center,
            billing_type: row.billing_type,
        })
    }
}
