use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::database::store::{StartedTimer, StopOutcome, TimeEntryStore};
use crate::error::{Error, Result};
use crate::models::project::Project;
use crate::models::task::Task;
use crate::models::time_entry::{DateRange, NewTimeEntry, TimeEntry, TimeEntryDetail};

#[derive(Debug, Default)]
struct MemoryState {
    projects: HashMap<Uuid, Project>,
    members: HashSet<(Uuid, Uuid)>,
    tasks: HashMap<Uuid, Task>,
    entries: HashMap<Uuid, TimeEntry>,
}

impl MemoryState {
    fn can_access(&self, project: &Project, user_id: Uuid) -> bool {
        project.owner_id == user_id || self.members.contains(&(project.id, user_id))
    }

    fn detail(&self, entry: &TimeEntry) -> Result<TimeEntryDetail> {
        let project = self.projects.get(&entry.project_id).ok_or_else(|| {
            Error::Internal(format!("time entry {} references a missing project", entry.id))
        })?;
        let task_title = entry
            .task_id
            .and_then(|id| self.tasks.get(&id))
            .map(|task| task.title.clone());
        Ok(TimeEntryDetail {
            entry: entry.clone(),
            project_name: project.name.clone(),
            project_rate: project.hourly_rate,
            task_title,
        })
    }

    fn details<F>(&self, range: DateRange, filter: F) -> Result<Vec<TimeEntryDetail>>
    where
        F: Fn(&TimeEntry) -> bool,
    {
        let mut rows = self
            .entries
            .values()
            .filter(|entry| filter(entry) && range.contains(entry.start_time))
            .map(|entry| self.detail(entry))
            .collect::<Result<Vec<_>>>()?;
        rows.sort_by(|a, b| b.entry.start_time.cmp(&a.entry.start_time));
        Ok(rows)
    }

    fn check_references(&self, entry: &NewTimeEntry) -> Result<()> {
        if !self.projects.contains_key(&entry.project_id) {
            return Err(Error::Invalid(format!("Unknown project {}", entry.project_id)));
        }
        if let Some(task_id) = entry.task_id {
            if !self.tasks.contains_key(&task_id) {
                return Err(Error::Invalid(format!("Unknown task {}", task_id)));
            }
        }
        Ok(())
    }
}

/// Process-local store guarded by a single mutex, so every trait call is atomic.
///
/// Suited to tests and single-instance development; multiple server instances
/// need the Postgres store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory store mutex poisoned")
    }

    pub fn add_project(&self, project: Project) {
        self.lock().projects.insert(project.id, project);
    }

    pub fn add_member(&self, project_id: Uuid, user_id: Uuid) {
        self.lock().members.insert((project_id, user_id));
    }

    pub fn add_task(&self, task: Task) {
        self.lock().tasks.insert(task.id, task);
    }

    /// Every stored entry, oldest start first.
    pub fn entries(&self) -> Vec<TimeEntry> {
        let mut entries: Vec<TimeEntry> = self.lock().entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.start_time);
        entries
    }
}

#[async_trait]
impl TimeEntryStore for MemoryStore {
    async fn accessible_project(&self, project_id: Uuid, user_id: Uuid) -> Result<Option<Project>> {
        let state = self.lock();
        Ok(state
            .projects
            .get(&project_id)
            .filter(|project| state.can_access(project, user_id))
            .cloned())
    }

    async fn find_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        Ok(self.lock().tasks.get(&task_id).cloned())
    }

    async fn start_timer(&self, entry: NewTimeEntry, now: DateTime<Utc>) -> Result<StartedTimer> {
        let mut state = self.lock();
        state.check_references(&entry)?;

        let user_id = entry.user_id;
        let mut stopped = Vec::new();
        for existing in state.entries.values_mut() {
            if existing.user_id == user_id && existing.close_at(now) {
                stopped.push(existing.clone());
            }
        }

        let created = entry.into_entry(Uuid::new_v4(), now);
        state.entries.insert(created.id, created.clone());
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
        let mut state = self.lock();
        let Some(entry) = state
            .entries
            .get_mut(&entry_id)
            .filter(|entry| entry.user_id == user_id)
        else {
            return Ok(None);
        };
        if entry.close_at(now) {
            Ok(Some(StopOutcome::Stopped(entry.clone())))
        } else {
            Ok(Some(StopOutcome::AlreadyStopped(entry.clone())))
        }
    }

    async fn insert_entry(&self, entry: NewTimeEntry, now: DateTime<Utc>) -> Result<TimeEntry> {
        let mut state = self.lock();
        state.check_references(&entry)?;
        let created = entry.into_entry(Uuid::new_v4(), now);
        if created.is_running
            && state
                .entries
                .values()
                .any(|e| e.user_id == created.user_id && e.is_running)
        {
            return Err(Error::Conflict(
                "User already has a running timer".to_string(),
            ));
        }
        state.entries.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<TimeEntry>> {
        Ok(self.lock().entries.get(&entry_id).cloned())
    }

    async fn update_entry(
        &self,
        entry: &TimeEntry,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Option<TimeEntry>> {
        let mut state = self.lock();
        if let Some(task_id) = entry.task_id {
            if !state.tasks.contains_key(&task_id) {
                return Err(Error::Invalid(format!("Unknown task {}", task_id)));
            }
        }
        let Some(stored) = state
            .entries
            .get_mut(&entry.id)
            .filter(|stored| stored.user_id == entry.user_id)
        else {
            return Ok(None);
        };
        if stored.updated_at != expected_updated_at {
            return Ok(None);
        }
        stored.task_id = entry.task_id;
        stored.description = entry.description.clone();
        stored.billable = entry.billable;
        stored.hourly_rate = entry.hourly_rate;
        stored.start_time = entry.start_time;
        stored.end_time = entry.end_time;
        stored.duration_seconds = entry.duration_seconds;
        stored.is_running = entry.is_running;
        stored.updated_at = entry.updated_at;
        Ok(Some(stored.clone()))
    }

    async fn delete_entry(&self, entry_id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        let owned = state
            .entries
            .get(&entry_id)
            .is_some_and(|entry| entry.user_id == user_id);
        if owned {
            state.entries.remove(&entry_id);
        }
        Ok(owned)
    }

    async fn running_entry(&self, user_id: Uuid) -> Result<Option<TimeEntry>> {
        Ok(self
            .lock()
            .entries
            .values()
            .find(|entry| entry.user_id == user_id && entry.is_running)
            .cloned())
    }

    async fn project_entries(
        &self,
        project_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<TimeEntryDetail>> {
        self.lock()
            .details(range, |entry| entry.project_id == project_id)
    }

    async fn user_entries(&self, user_id: Uuid, range: DateRange) -> Result<Vec<TimeEntryDetail>> {
        self.lock().details(range, |entry| entry.user_id == user_id)
    }
}
