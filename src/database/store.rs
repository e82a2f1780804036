use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::project::Project;
use crate::models::task::Task;
use crate::models::time_entry::{DateRange, NewTimeEntry, TimeEntry, TimeEntryDetail};

#[derive(Debug, Clone, PartialEq)]
pub struct StartedTimer {
    pub entry: TimeEntry,
    /// Entries of the same user that were still running and got closed at the new start.
    pub stopped: Vec<TimeEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Stopped(TimeEntry),
    AlreadyStopped(TimeEntry),
}

impl StopOutcome {
    pub fn into_entry(self) -> TimeEntry {
        match self {
            StopOutcome::Stopped(entry) | StopOutcome::AlreadyStopped(entry) => entry,
        }
    }
}

/// Storage seam for time entries and the project/task lookups they depend on.
///
/// Every method is a single atomic unit against the backing store. In particular
/// `start_timer` must close the user's running entries and insert the new one
/// so that no reader ever observes two running entries for one user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimeEntryStore: Send + Sync {
    /// Project if it exists and `user_id` owns it or is a member.
    async fn accessible_project(&self, project_id: Uuid, user_id: Uuid) -> Result<Option<Project>>;

    async fn find_task(&self, task_id: Uuid) -> Result<Option<Task>>;

    async fn start_timer(&self, entry: NewTimeEntry, now: DateTime<Utc>) -> Result<StartedTimer>;

    /// `None` when no entry with this id belongs to `user_id`.
    async fn stop_timer(
        &self,
        entry_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<StopOutcome>>;

    async fn insert_entry(&self, entry: NewTimeEntry, now: DateTime<Utc>) -> Result<TimeEntry>;

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<TimeEntry>>;

    /// Writes the editable fields of `entry` if the stored row still carries
    /// `expected_updated_at`. `None` when the row is gone or was changed meanwhile.
    async fn update_entry(
        &self,
        entry: &TimeEntry,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Option<TimeEntry>>;

    /// Deletes only if the entry belongs to `user_id`.
    async fn delete_entry(&self, entry_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn running_entry(&self, user_id: Uuid) -> Result<Option<TimeEntry>>;

    /// Newest first, filtered on `start_time`.
    async fn project_entries(&self, project_id: Uuid, range: DateRange)
        -> Result<Vec<TimeEntryDetail>>;

    async fn user_entries(&self, user_id: Uuid, range: DateRange) -> Result<Vec<TimeEntryDetail>>;
}
