use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::store::{StartedTimer, StopOutcome, TimeEntryStore};
use crate::error::{Error, Result};
use crate::models::project::Project;
use crate::models::task::Task;
use crate::models::time_entry::{DateRange, NewTimeEntry, TimeEntry, TimeEntryDetail};

const ENTRY_COLUMNS: &str = "id, user_id, project_id, task_id, description, entry_type, start_time, end_time, duration_seconds, billable, hourly_rate, is_running, created_at, updated_at";

#[derive(Debug, FromRow)]
struct TimeEntryRow {
    id: Uuid,
    user_id: Uuid,
    project_id: Uuid,
    task_id: Option<Uuid>,
    description: Option<String>,
    entry_type: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
    billable: bool,
    hourly_rate: Option<Decimal>,
    is_running: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TimeEntryRow> for TimeEntry {
    type Error = Error;

    fn try_from(row: TimeEntryRow) -> Result<Self> {
        Ok(TimeEntry {
            id: row.id,
            user_id: row.user_id,
            project_id: row.project_id,
            task_id: row.task_id,
            description: row.description,
            entry_type: row.entry_type.parse().map_err(Error::Internal)?,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_seconds: row.duration_seconds,
            billable: row.billable,
            hourly_rate: row.hourly_rate,
            is_running: row.is_running,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TimeEntryDetailRow {
    #[sqlx(flatten)]
    entry: TimeEntryRow,
    project_name: String,
    project_rate: Option<Decimal>,
    task_title: Option<String>,
}

impl TryFrom<TimeEntryDetailRow> for TimeEntryDetail {
    type Error = Error;

    fn try_from(row: TimeEntryDetailRow) -> Result<Self> {
        Ok(TimeEntryDetail {
            entry: row.entry.try_into()?,
            project_name: row.project_name,
            project_rate: row.project_rate,
            task_title: row.task_title,
        })
    }
}

/// Time entries backed by Postgres. Atomicity comes from transactions and row
/// locks; the partial unique index on running entries is the last line.
#[derive(Clone)]
pub struct PgTimeEntryStore {
    pool: PgPool,
}

impl PgTimeEntryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn close_entry(
        tx: &mut Transaction<'_, Postgres>,
        entry: &mut TimeEntry,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !entry.close_at(now) {
            return Ok(false);
        }
        sqlx::query(
            r#"
            UPDATE time_entries
            SET end_time = $2, duration_seconds = $3, is_running = FALSE, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(entry.id)
        .bind(entry.end_time)
        .bind(entry.duration_seconds)
        .bind(entry.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(true)
    }

    async fn insert_with(
        tx: &mut Transaction<'_, Postgres>,
        entry: NewTimeEntry,
        now: DateTime<Utc>,
    ) -> Result<TimeEntry> {
        let entry = entry.into_entry(Uuid::new_v4(), now);
        let query = format!(
            r#"
            INSERT INTO time_entries (
                id, user_id, project_id, task_id, description, entry_type,
                start_time, end_time, duration_seconds, billable, hourly_rate,
                is_running, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );
        let row = sqlx::query_as::<_, TimeEntryRow>(&query)
            .bind(entry.id)
            .bind(entry.user_id)
            .bind(entry.project_id)
            .bind(entry.task_id)
            .bind(&entry.description)
            .bind(entry.entry_type.as_str())
            .bind(entry.start_time)
            .bind(entry.end_time)
            .bind(entry.duration_seconds)
            .bind(entry.billable)
            .bind(entry.hourly_rate)
            .bind(entry.is_running)
            .bind(entry.created_at)
            .bind(entry.updated_at)
            .fetch_one(&mut **tx)
            .await?;
        row.try_into()
    }

    async fn details(
        &self,
        filter_column: &'static str,
        filter_value: Uuid,
        range: DateRange,
    ) -> Result<Vec<TimeEntryDetail>> {
        let query = format!(
            r#"
            SELECT
                e.id, e.user_id, e.project_id, e.task_id, e.description, e.entry_type,
                e.start_time, e.end_time, e.duration_seconds, e.billable, e.hourly_rate,
                e.is_running, e.created_at, e.updated_at,
                p.name AS project_name,
                p.hourly_rate AS project_rate,
                t.title AS task_title
            FROM time_entries e
            JOIN projects p ON p.id = e.project_id
            LEFT JOIN tasks t ON t.id = e.task_id
            WHERE e.{} = $1
              AND ($2::timestamptz IS NULL OR e.start_time >= $2)
              AND ($3::timestamptz IS NULL OR e.start_time < $3)
            ORDER BY e.start_time DESC
            "#,
            filter_column
        );
        let rows = sqlx::query_as::<_, TimeEntryDetailRow>(&query)
            .bind(filter_value)
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TimeEntryDetail::try_from).collect()
    }
}

#[async_trait]
impl TimeEntryStore for PgTimeEntryStore {
    async fn accessible_project(&self, project_id: Uuid, user_id: Uuid) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            SELECT p.id, p.owner_id, p.name, p.hourly_rate, p.created_at
            FROM projects p
            WHERE p.id = $1
              AND (
                p.owner_id = $2
                OR EXISTS (
                    SELECT 1 FROM project_members m
                    WHERE m.project_id = p.id AND m.user_id = $2
                )
              )
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(project)
    }

    async fn find_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>("SELECT id, project_id, title FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    async fn start_timer(&self, entry: NewTimeEntry, now: DateTime<Utc>) -> Result<StartedTimer> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent starts of the same user until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(entry.user_id.to_string())
            .execute(&mut *tx)
            .await?;

        let query = format!(
            "SELECT {} FROM time_entries WHERE user_id = $1 AND is_running FOR UPDATE",
            ENTRY_COLUMNS
        );
        let running = sqlx::query_as::<_, TimeEntryRow>(&query)
            .bind(entry.user_id)
            .fetch_all(&mut *tx)
            .await?;

        let mut stopped = Vec::with_capacity(running.len());
        for row in running {
            let mut previous: TimeEntry = row.try_into()?;
            if Self::close_entry(&mut tx, &mut previous, now).await? {
                stopped.push(previous);
            }
        }

        let created = Self::insert_with(&mut tx, entry, now).await?;
        tx.commit().await?;

        Ok(StartedTimer {
            entry: created,
            stopped,
        })
    }

    async fn stop_timer(
        &self,
        entry_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<StopOutcome>> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "SELECT {} FROM time_entries WHERE id = $1 AND user_id = $2 FOR UPDATE",
            ENTRY_COLUMNS
        );
        let Some(row) = sqlx::query_as::<_, TimeEntryRow>(&query)
            .bind(entry_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let mut entry: TimeEntry = row.try_into()?;
        let outcome = if Self::close_entry(&mut tx, &mut entry, now).await? {
            StopOutcome::Stopped(entry)
        } else {
            StopOutcome::AlreadyStopped(entry)
        };
        tx.commit().await?;
        Ok(Some(outcome))
    }

    async fn insert_entry(&self, entry: NewTimeEntry, now: DateTime<Utc>) -> Result<TimeEntry> {
        let mut tx = self.pool.begin().await?;
        let created = Self::insert_with(&mut tx, entry, now).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<TimeEntry>> {
        let query = format!("SELECT {} FROM time_entries WHERE id = $1", ENTRY_COLUMNS);
        let row = sqlx::query_as::<_, TimeEntryRow>(&query)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TimeEntry::try_from).transpose()
    }

    async fn update_entry(
        &self,
        entry: &TimeEntry,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Option<TimeEntry>> {
        let query = format!(
            r#"
            UPDATE time_entries
            SET
                task_id = $3,
                description = $4,
                billable = $5,
                hourly_rate = $6,
                start_time = $7,
                end_time = $8,
                duration_seconds = $9,
                is_running = $10,
                updated_at = $11
            WHERE id = $1 AND user_id = $2 AND updated_at = $12
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );
        let row = sqlx::query_as::<_, TimeEntryRow>(&query)
            .bind(entry.id)
            .bind(entry.user_id)
            .bind(entry.task_id)
            .bind(&entry.description)
            .bind(entry.billable)
            .bind(entry.hourly_rate)
            .bind(entry.start_time)
            .bind(entry.end_time)
            .bind(entry.duration_seconds)
            .bind(entry.is_running)
            .bind(entry.updated_at)
            .bind(expected_updated_at)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TimeEntry::try_from).transpose()
    }

    async fn delete_entry(&self, entry_id: Uuid, user_id: Uuid) -> Result<bool> {
        let res = sqlx::query("DELETE FROM time_entries WHERE id = $1 AND user_id = $2")
            .bind(entry_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn running_entry(&self, user_id: Uuid) -> Result<Option<TimeEntry>> {
        let query = format!(
            "SELECT {} FROM time_entries WHERE user_id = $1 AND is_running",
            ENTRY_COLUMNS
        );
        let row = sqlx::query_as::<_, TimeEntryRow>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TimeEntry::try_from).transpose()
    }

    async fn project_entries(
        &self,
        project_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<TimeEntryDetail>> {
        self.details("project_id", project_id, range).await
    }

    async fn user_entries(&self, user_id: Uuid, range: DateRange) -> Result<Vec<TimeEntryDetail>> {
        self.details("user_id", user_id, range).await
    }
}
