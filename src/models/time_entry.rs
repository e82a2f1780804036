use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::billing_service::BillingService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Manual,
    Timer,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Manual => "manual",
            EntryType::Timer => "timer",
        }
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(EntryType::Manual),
            "timer" => Ok(EntryType::Timer),
            other => Err(format!("unknown entry type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    pub description: Option<String>,
    pub entry_type: EntryType,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub billable: bool,
    pub hourly_rate: Option<Decimal>,
    pub is_running: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeEntry {
    /// Closes a running entry at `end`, never before its start.
    /// Returns false and leaves already-closed entries untouched.
    pub fn close_at(&mut self, end: DateTime<Utc>) -> bool {
        if !self.is_running {
            return false;
        }
        let end = end.max(self.start_time);
        self.end_time = Some(end);
        self.duration_seconds = Some(BillingService::duration_seconds(self.start_time, end));
        self.is_running = false;
        self.updated_at = end;
        true
    }
}

/// Fields of an entry about to be inserted. Derived fields are filled in by the store.
#[derive(Debug, Clone)]
pub struct NewTimeEntry {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    pub description: Option<String>,
    pub entry_type: EntryType,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub billable: bool,
    pub hourly_rate: Option<Decimal>,
}

impl NewTimeEntry {
    pub fn into_entry(self, id: Uuid, now: DateTime<Utc>) -> TimeEntry {
        let duration_seconds = self
            .end_time
            .map(|end| BillingService::duration_seconds(self.start_time, end));
        TimeEntry {
            id,
            user_id: self.user_id,
            project_id: self.project_id,
            task_id: self.task_id,
            description: self.description,
            entry_type: self.entry_type,
            start_time: self.start_time,
            is_running: self.end_time.is_none(),
            end_time: self.end_time,
            duration_seconds,
            billable: self.billable,
            hourly_rate: self.hourly_rate,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Entry joined with the display names of its project and task.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntryDetail {
    pub entry: TimeEntry,
    pub project_name: String,
    pub project_rate: Option<Decimal>,
    pub task_title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }
}
