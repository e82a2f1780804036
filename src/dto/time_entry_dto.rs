use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::database::store::StartedTimer;
use crate::models::time_entry::{TimeEntry, TimeEntryDetail};
use crate::services::billing_service::{BillingService, ProjectTotals};

fn default_billable() -> bool {
    true
}

/// Distinguishes an absent field from an explicit `null`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StartTimerPayload {
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default = "default_billable")]
    pub billable: bool,
    pub hourly_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateManualEntryPayload {
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub duration_hours: Decimal,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default = "default_billable")]
    pub billable: bool,
    pub hourly_rate: Option<Decimal>,
}

/// Partial edit. For the nullable fields, `null` clears and an absent key keeps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEntryPayload {
    #[serde(default, deserialize_with = "present")]
    pub task_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub billable: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub hourly_rate: Option<Option<Decimal>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartTimerResponse {
    pub entry: TimeEntry,
    pub stopped: Vec<TimeEntry>,
}

impl From<StartedTimer> for StartTimerResponse {
    fn from(value: StartedTimer) -> Self {
        Self {
            entry: value.entry,
            stopped: value.stopped,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunningTimerResponse {
    #[serde(flatten)]
    pub entry: TimeEntry,
    pub elapsed_seconds: i64,
}

/// Entry as listed, with display names and derived billing fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeEntryView {
    #[serde(flatten)]
    pub entry: TimeEntry,
    pub project_name: String,
    pub task_title: Option<String>,
    pub duration_hours: Option<Decimal>,
    pub amount: Option<Decimal>,
}

impl From<TimeEntryDetail> for TimeEntryView {
    fn from(value: TimeEntryDetail) -> Self {
        let duration_hours = BillingService::duration_hours(&value.entry);
        let amount = BillingService::amount(&value.entry, value.project_rate);
        Self {
            entry: value.entry,
            project_name: value.project_name,
            task_title: value.task_title,
            duration_hours,
            amount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeEntryListResponse {
    pub items: Vec<TimeEntryView>,
    pub total: usize,
}

impl From<Vec<TimeEntryView>> for TimeEntryListResponse {
    fn from(items: Vec<TimeEntryView>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectTotalsResponse {
    pub project_id: Uuid,
    #[serde(flatten)]
    pub totals: ProjectTotals,
}
