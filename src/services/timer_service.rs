use chrono::{DateTime, Duration, SubsecRound, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::store::{StartedTimer, StopOutcome, TimeEntryStore};
use crate::dto::time_entry_dto::{
    CreateManualEntryPayload, StartTimerPayload, TimeEntryView, UpdateEntryPayload,
};
use crate::error::{Error, Result};
use crate::models::project::Project;
use crate::models::time_entry::{DateRange, EntryType, NewTimeEntry, TimeEntry};
use crate::services::billing_service::{BillingService, ProjectTotals};
use crate::utils::time::Clock;

#[derive(Debug, Clone, PartialEq)]
pub struct RunningTimer {
    pub entry: TimeEntry,
    pub elapsed_seconds: i64,
}

/// Keeps at most one running timer per user and the derived duration fields
/// consistent with `start_time` / `end_time`.
#[derive(Clone)]
pub struct TimerService {
    store: Arc<dyn TimeEntryStore>,
    clock: Arc<dyn Clock>,
}

impl TimerService {
    pub fn new(store: Arc<dyn TimeEntryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    // Postgres keeps microseconds; everything written is truncated to match.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    async fn project_for(&self, project_id: Uuid, user_id: Uuid) -> Result<Project> {
        self.store
            .accessible_project(project_id, user_id)
            .await?
            .ok_or_else(|| {
                Error::Invalid(format!(
                    "Project {} does not exist or is not accessible",
                    project_id
                ))
            })
    }

    async fn check_task(&self, task_id: Option<Uuid>, project_id: Uuid) -> Result<()> {
        let Some(task_id) = task_id else {
            return Ok(());
        };
        match self.store.find_task(task_id).await? {
            Some(task) if task.project_id == project_id => Ok(()),
            _ => Err(Error::Invalid(format!(
                "Task {} does not belong to project {}",
                task_id, project_id
            ))),
        }
    }

    fn check_rate(rate: Option<Decimal>) -> Result<Option<Decimal>> {
        match rate {
            Some(rate) if rate < Decimal::ZERO => Err(Error::Invalid(
                "hourly_rate must not be negative".to_string(),
            )),
            other => Ok(other.map(BillingService::round2)),
        }
    }

    fn check_range(range: &DateRange) -> Result<()> {
        if let (Some(from), Some(to)) = (range.from, range.to) {
            if from >= to {
                return Err(Error::Invalid("'from' must be before 'to'".to_string()));
            }
        }
        Ok(())
    }

    pub async fn start_timer(
        &self,
        user_id: Uuid,
        payload: StartTimerPayload,
    ) -> Result<StartedTimer> {
        let project = self.project_for(payload.project_id, user_id).await?;
        self.check_task(payload.task_id, project.id).await?;
        let hourly_rate = Self::check_rate(payload.hourly_rate)?;

        let now = self.now();
        let started = self
            .store
            .start_timer(
                NewTimeEntry {
                    user_id,
                    project_id: project.id,
                    task_id: payload.task_id,
                    description: payload.description,
                    entry_type: EntryType::Timer,
                    start_time: now,
                    end_time: None,
                    billable: payload.billable,
                    hourly_rate,
                },
                now,
            )
            .await?;

        for previous in &started.stopped {
            tracing::info!(
                user_id = %user_id,
                entry_id = %previous.id,
                duration_seconds = ?previous.duration_seconds,
                "stopped running timer before starting a new one"
            );
        }
        tracing::info!(
            user_id = %user_id,
            entry_id = %started.entry.id,
            project_id = %project.id,
            "timer started"
        );
        Ok(started)
    }

    /// Stopping an entry that is already stopped succeeds without changing it.
    pub async fn stop_timer(&self, entry_id: Uuid, user_id: Uuid) -> Result<TimeEntry> {
        let outcome = self
            .store
            .stop_timer(entry_id, user_id, self.now())
            .await?
            .ok_or_else(|| Error::NotFound(format!("Time entry {} not found", entry_id)))?;

        match &outcome {
            StopOutcome::Stopped(entry) => tracing::info!(
                user_id = %user_id,
                entry_id = %entry.id,
                duration_seconds = ?entry.duration_seconds,
                "timer stopped"
            ),
            StopOutcome::AlreadyStopped(entry) => tracing::debug!(
                user_id = %user_id,
                entry_id = %entry.id,
                "stop requested for an entry that is not running"
            ),
        }
        Ok(outcome.into_entry())
    }

    pub async fn add_manual_entry(
        &self,
        user_id: Uuid,
        payload: CreateManualEntryPayload,
    ) -> Result<TimeEntry> {
        let start_time = payload.start_time.trunc_subsecs(6);
        let end_time = BillingService::manual_end_time(start_time, payload.duration_hours)?;
        let hourly_rate = Self::check_rate(payload.hourly_rate)?;
        let project = self.project_for(payload.project_id, user_id).await?;
        self.check_task(payload.task_id, project.id).await?;

        let entry = self
            .store
            .insert_entry(
                NewTimeEntry {
                    user_id,
                    project_id: project.id,
                    task_id: payload.task_id,
                    description: payload.description,
                    entry_type: EntryType::Manual,
                    start_time,
                    end_time: Some(end_time),
                    billable: payload.billable,
                    hourly_rate,
                },
                self.now(),
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            entry_id = %entry.id,
            duration_seconds = ?entry.duration_seconds,
            "manual entry added"
        );
        Ok(entry)
    }

    async fn owned_entry(&self, entry_id: Uuid, user_id: Uuid) -> Result<TimeEntry> {
        let entry = self
            .store
            .find_entry(entry_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Time entry {} not found", entry_id)))?;
        if entry.user_id != user_id {
            return Err(Error::Forbidden(
                "Time entry belongs to another user".to_string(),
            ));
        }
        Ok(entry)
    }

    pub async fn update_entry(
        &self,
        entry_id: Uuid,
        user_id: Uuid,
        payload: UpdateEntryPayload,
    ) -> Result<TimeEntry> {
        let mut entry = self.owned_entry(entry_id, user_id).await?;
        let expected_updated_at = entry.updated_at;
        let now = self.now();

        if let Some(task_id) = payload.task_id {
            self.check_task(task_id, entry.project_id).await?;
            entry.task_id = task_id;
        }
        if let Some(description) = payload.description {
            entry.description = description;
        }
        if let Some(billable) = payload.billable {
            entry.billable = billable;
        }
        if let Some(rate) = payload.hourly_rate {
            entry.hourly_rate = Self::check_rate(rate)?;
        }

        let start_time = payload
            .start_time
            .map(|start| start.trunc_subsecs(6))
            .unwrap_or(entry.start_time);
        if entry.is_running {
            if payload.end_time.is_some() {
                return Err(Error::Invalid(
                    "A running timer is ended by stopping it".to_string(),
                ));
            }
            if start_time > now {
                return Err(Error::Invalid(
                    "A running timer cannot start in the future".to_string(),
                ));
            }
            entry.start_time = start_time;
        } else if payload.start_time.is_some() || payload.end_time.is_some() {
            // Spans are only checked when the caller moves them; timers may exceed a day.
            let end_time = payload
                .end_time
                .map(|end| end.trunc_subsecs(6))
                .or(entry.end_time)
                .ok_or_else(|| Error::Internal(format!("Stopped entry {} has no end", entry.id)))?;
            BillingService::check_span(start_time, end_time)?;
            entry.start_time = start_time;
            entry.end_time = Some(end_time);
            entry.duration_seconds = Some(BillingService::duration_seconds(start_time, end_time));
        }
        entry.updated_at = now.max(expected_updated_at + Duration::microseconds(1));

        let updated = self
            .store
            .update_entry(&entry, expected_updated_at)
            .await?
            .ok_or_else(|| {
                Error::Conflict("Time entry was changed concurrently, reload and retry".to_string())
            })?;

        tracing::info!(user_id = %user_id, entry_id = %updated.id, "time entry updated");
        Ok(updated)
    }

    /// Hard delete. Other users' entries are refused and left in place.
    pub async fn delete_entry(&self, entry_id: Uuid, user_id: Uuid) -> Result<()> {
        self.owned_entry(entry_id, user_id).await?;
        if !self.store.delete_entry(entry_id, user_id).await? {
            return Err(Error::NotFound(format!("Time entry {} not found", entry_id)));
        }
        tracing::info!(user_id = %user_id, entry_id = %entry_id, "time entry deleted");
        Ok(())
    }

    pub async fn running_timer(&self, user_id: Uuid) -> Result<Option<RunningTimer>> {
        let now = self.now();
        Ok(self
            .store
            .running_entry(user_id)
            .await?
            .map(|entry| RunningTimer {
                elapsed_seconds: BillingService::duration_seconds(entry.start_time, now).max(0),
                entry,
            }))
    }

    pub async fn list_entries(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<TimeEntryView>> {
        Self::check_range(&range)?;
        self.visible_project(project_id, user_id).await?;
        let rows = self.store.project_entries(project_id, range).await?;
        Ok(rows.into_iter().map(TimeEntryView::from).collect())
    }

    pub async fn list_user_entries(
        &self,
        user_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<TimeEntryView>> {
        Self::check_range(&range)?;
        let rows = self.store.user_entries(user_id, range).await?;
        Ok(rows.into_iter().map(TimeEntryView::from).collect())
    }

    pub async fn project_totals(&self, user_id: Uuid, project_id: Uuid) -> Result<ProjectTotals> {
        let project = self.visible_project(project_id, user_id).await?;
        let rows = self
            .store
            .project_entries(project_id, DateRange::default())
            .await?;
        Ok(BillingService::project_totals(
            rows.iter().map(|row| &row.entry),
            project.hourly_rate,
        ))
    }

    async fn visible_project(&self, project_id: Uuid, user_id: Uuid) -> Result<Project> {
        self.store
            .accessible_project(project_id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Project {} not found", project_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::store::MockTimeEntryStore;
    use crate::models::task::Task;
    use crate::utils::time::ManualClock;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: ManualClock,
        service: TimerService,
        user: Uuid,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(t0());
        let service = TimerService::new(store.clone(), Arc::new(clock.clone()));
        Fixture {
            store,
            clock,
            service,
            user: Uuid::new_v4(),
        }
    }

    impl Fixture {
        fn project(&self, name: &str, rate: Option<Decimal>) -> Uuid {
            let id = Uuid::new_v4();
            self.store.add_project(Project {
                id,
                owner_id: self.user,
                name: name.to_string(),
                hourly_rate: rate,
                created_at: t0(),
            });
            id
        }

        fn start_payload(project_id: Uuid) -> StartTimerPayload {
            StartTimerPayload {
                project_id,
                task_id: None,
                description: None,
                billable: true,
                hourly_rate: None,
            }
        }

        fn manual_payload(project_id: Uuid, hours: Decimal) -> CreateManualEntryPayload {
            CreateManualEntryPayload {
                project_id,
                task_id: None,
                start_time: t0() - Duration::days(1),
                duration_hours: hours,
                description: Some("design review".to_string()),
                billable: true,
                hourly_rate: None,
            }
        }

        fn running_count(&self, user: Uuid) -> usize {
            self.store
                .entries()
                .iter()
                .filter(|e| e.user_id == user && e.is_running)
                .count()
        }
    }

    #[tokio::test]
    async fn switching_projects_closes_the_previous_timer() {
        let fx = fixture();
        let p = fx.project("Website", Some(Decimal::from(50)));
        let q = fx.project("Mobile app", None);

        let first = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();
        assert!(first.stopped.is_empty());

        fx.clock.advance(Duration::seconds(3600));
        let second = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(q))
            .await
            .unwrap();
        assert_eq!(second.stopped.len(), 1);
        assert_eq!(second.stopped[0].id, first.entry.id);

        let entry1 = fx.store.find_entry(first.entry.id).await.unwrap().unwrap();
        assert_eq!(entry1.duration_seconds, Some(3600));
        assert_eq!(entry1.end_time, Some(t0() + Duration::seconds(3600)));
        assert!(!entry1.is_running);
        assert!(second.entry.is_running);
        assert_eq!(fx.running_count(fx.user), 1);

        fx.clock.advance(Duration::seconds(1800));
        let stopped = fx
            .service
            .stop_timer(second.entry.id, fx.user)
            .await
            .unwrap();
        assert_eq!(stopped.duration_seconds, Some(1800));
        assert!(!stopped.is_running);

        let totals = fx.service.project_totals(fx.user, p).await.unwrap();
        assert_eq!(totals.total_hours, Decimal::from(1));
        assert_eq!(totals.billable_hours, Decimal::from(1));
        assert_eq!(totals.billable_amount, Decimal::new(5000, 2));
    }

    #[tokio::test]
    async fn other_users_timers_are_left_alone() {
        let fx = fixture();
        let p = fx.project("Shared", None);
        let colleague = Uuid::new_v4();
        fx.store.add_member(p, colleague);

        fx.service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();
        let theirs = fx
            .service
            .start_timer(colleague, Fixture::start_payload(p))
            .await
            .unwrap();

        assert!(theirs.stopped.is_empty());
        assert_eq!(fx.running_count(fx.user), 1);
        assert_eq!(fx.running_count(colleague), 1);
    }

    #[tokio::test]
    async fn concurrent_starts_leave_one_running_timer() {
        let fx = fixture();
        let p = fx.project("Busy", None);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = fx.service.clone();
            let user = fx.user;
            handles.push(tokio::spawn(async move {
                service
                    .start_timer(user, Fixture::start_payload(p))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(fx.running_count(fx.user), 1);
        assert_eq!(fx.store.entries().len(), 16);
    }

    #[tokio::test]
    async fn start_rejects_inaccessible_project_and_foreign_task() {
        let fx = fixture();
        let err = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let stranger = Uuid::new_v4();
        let p = fx.project("Private", None);
        let err = fx
            .service
            .start_timer(stranger, Fixture::start_payload(p))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let other = fx.project("Other", None);
        let task = Task {
            id: Uuid::new_v4(),
            project_id: other,
            title: "QA".to_string(),
        };
        fx.store.add_task(task.clone());
        let mut payload = Fixture::start_payload(p);
        payload.task_id = Some(task.id);
        let err = fx.service.start_timer(fx.user, payload).await.unwrap_err();
        assert!(err.is_validation());
        assert!(fx.store.entries().is_empty());
    }

    #[tokio::test]
    async fn stopping_twice_is_a_no_op() {
        let fx = fixture();
        let p = fx.project("Website", None);
        let started = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();

        fx.clock.advance(Duration::seconds(600));
        let first = fx.service.stop_timer(started.entry.id, fx.user).await.unwrap();
        fx.clock.advance(Duration::seconds(600));
        let again = fx.service.stop_timer(started.entry.id, fx.user).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(again.duration_seconds, Some(600));
    }

    #[tokio::test]
    async fn stopping_unknown_or_foreign_entry_is_not_found() {
        let fx = fixture();
        let p = fx.project("Website", None);
        let started = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();

        let err = fx
            .service
            .stop_timer(Uuid::new_v4(), fx.user)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = fx
            .service
            .stop_timer(started.entry.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(fx.running_count(fx.user), 1);
    }

    #[tokio::test]
    async fn manual_entries_validate_duration() {
        let fx = fixture();
        let p = fx.project("Website", None);

        for hours in [Decimal::ZERO, Decimal::from(25), Decimal::new(-5, 1)] {
            let err = fx
                .service
                .add_manual_entry(fx.user, Fixture::manual_payload(p, hours))
                .await
                .unwrap_err();
            assert!(err.is_validation(), "{} hours should be rejected", hours);
        }

        let entry = fx
            .service
            .add_manual_entry(fx.user, Fixture::manual_payload(p, Decimal::new(25, 1)))
            .await
            .unwrap();
        assert_eq!(entry.entry_type, EntryType::Manual);
        assert!(!entry.is_running);
        assert_eq!(entry.duration_seconds, Some(9000));
        assert_eq!(
            entry.end_time,
            Some(entry.start_time + Duration::seconds(9000))
        );
    }

    #[tokio::test]
    async fn manual_entry_does_not_touch_running_timer() {
        let fx = fixture();
        let p = fx.project("Website", None);
        let started = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();
        fx.service
            .add_manual_entry(fx.user, Fixture::manual_payload(p, Decimal::from(2)))
            .await
            .unwrap();

        let running = fx.service.running_timer(fx.user).await.unwrap().unwrap();
        assert_eq!(running.entry.id, started.entry.id);
    }

    #[tokio::test]
    async fn running_timer_reports_live_elapsed_time() {
        let fx = fixture();
        let p = fx.project("Website", None);
        assert!(fx.service.running_timer(fx.user).await.unwrap().is_none());

        fx.service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();
        fx.clock.advance(Duration::seconds(95));
        let running = fx.service.running_timer(fx.user).await.unwrap().unwrap();
        assert_eq!(running.elapsed_seconds, 95);
        assert_eq!(running.entry.end_time, None);
    }

    #[tokio::test]
    async fn deleting_someone_elses_entry_is_refused() {
        let fx = fixture();
        let p = fx.project("Website", None);
        let entry = fx
            .service
            .add_manual_entry(fx.user, Fixture::manual_payload(p, Decimal::from(1)))
            .await
            .unwrap();
        let before = fx.store.entries();

        let err = fx
            .service
            .delete_entry(entry.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(fx.store.entries(), before);

        fx.service.delete_entry(entry.id, fx.user).await.unwrap();
        assert!(fx.store.entries().is_empty());
        let err = fx.service.delete_entry(entry.id, fx.user).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_checks_ownership_before_touching_the_store() {
        let owner = Uuid::new_v4();
        let entry_id = Uuid::new_v4();
        let entry = NewTimeEntry {
            user_id: owner,
            project_id: Uuid::new_v4(),
            task_id: None,
            description: None,
            entry_type: EntryType::Manual,
            start_time: t0(),
            end_time: Some(t0() + Duration::hours(1)),
            billable: true,
            hourly_rate: None,
        }
        .into_entry(entry_id, t0());

        let mut store = MockTimeEntryStore::new();
        store
            .expect_find_entry()
            .withf(move |id| *id == entry_id)
            .returning(move |_| Ok(Some(entry.clone())));
        store.expect_delete_entry().never();

        let service = TimerService::new(Arc::new(store), Arc::new(ManualClock::new(t0())));
        let err = service
            .delete_entry(entry_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn stale_edit_is_a_conflict() {
        let owner = Uuid::new_v4();
        let entry_id = Uuid::new_v4();
        let entry = NewTimeEntry {
            user_id: owner,
            project_id: Uuid::new_v4(),
            task_id: None,
            description: Some("draft".to_string()),
            entry_type: EntryType::Manual,
            start_time: t0(),
            end_time: Some(t0() + Duration::hours(1)),
            billable: true,
            hourly_rate: None,
        }
        .into_entry(entry_id, t0());

        let mut store = MockTimeEntryStore::new();
        store
            .expect_find_entry()
            .returning(move |_| Ok(Some(entry.clone())));
        store
            .expect_update_entry()
            .withf(|_, expected| *expected == t0())
            .times(1)
            .returning(|_, _| Ok(None));

        let service = TimerService::new(Arc::new(store), Arc::new(ManualClock::new(t0())));
        let err = service
            .update_entry(
                entry_id,
                owner,
                UpdateEntryPayload {
                    description: Some(Some("final".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn negative_rates_are_rejected() {
        let fx = fixture();
        let p = fx.project("Website", None);

        let mut payload = Fixture::start_payload(p);
        payload.hourly_rate = Some(Decimal::from(-1));
        let err = fx.service.start_timer(fx.user, payload).await.unwrap_err();
        assert!(err.is_validation());

        let mut manual = Fixture::manual_payload(p, Decimal::from(2));
        manual.hourly_rate = Some(Decimal::new(-50, 2));
        let err = fx.service.add_manual_entry(fx.user, manual).await.unwrap_err();
        assert!(err.is_validation());
        assert!(fx.store.entries().is_empty());
    }

    #[tokio::test]
    async fn editing_recomputes_duration_and_rate() {
        let fx = fixture();
        let p = fx.project("Website", Some(Decimal::from(40)));
        let entry = fx
            .service
            .add_manual_entry(fx.user, Fixture::manual_payload(p, Decimal::from(1)))
            .await
            .unwrap();

        fx.clock.advance(Duration::seconds(5));
        let updated = fx
            .service
            .update_entry(
                entry.id,
                fx.user,
                UpdateEntryPayload {
                    end_time: Some(entry.start_time + Duration::minutes(90)),
                    hourly_rate: Some(Some(Decimal::from(60))),
                    description: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.duration_seconds, Some(5400));
        assert_eq!(updated.hourly_rate, Some(Decimal::from(60)));
        assert_eq!(updated.description, None);

        let totals = fx.service.project_totals(fx.user, p).await.unwrap();
        assert_eq!(totals.billable_amount, Decimal::from(90));

        let err = fx
            .service
            .update_entry(
                entry.id,
                fx.user,
                UpdateEntryPayload {
                    end_time: Some(entry.start_time - Duration::minutes(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn forgotten_overnight_timer_can_be_marked_non_billable() {
        let fx = fixture();
        let p = fx.project("Website", Some(Decimal::from(50)));
        let started = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();
        fx.clock.advance(Duration::hours(30));
        let stopped = fx
            .service
            .stop_timer(started.entry.id, fx.user)
            .await
            .unwrap();
        assert_eq!(stopped.duration_seconds, Some(108_000));

        let updated = fx
            .service
            .update_entry(
                stopped.id,
                fx.user,
                UpdateEntryPayload {
                    billable: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.billable);
        assert_eq!(updated.end_time, stopped.end_time);
        assert_eq!(updated.duration_seconds, Some(108_000));

        let totals = fx.service.project_totals(fx.user, p).await.unwrap();
        assert_eq!(totals.billable_amount, Decimal::ZERO);
        assert_eq!(totals.total_hours, Decimal::from(30));

        let err = fx
            .service
            .update_entry(
                stopped.id,
                fx.user,
                UpdateEntryPayload {
                    start_time: Some(stopped.start_time + Duration::minutes(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn zero_length_timer_accepts_description_edit() {
        let fx = fixture();
        let p = fx.project("Website", None);
        let started = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();
        let stopped = fx
            .service
            .stop_timer(started.entry.id, fx.user)
            .await
            .unwrap();
        assert_eq!(stopped.duration_seconds, Some(0));

        let updated = fx
            .service
            .update_entry(
                stopped.id,
                fx.user,
                UpdateEntryPayload {
                    description: Some(Some("false start".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("false start"));
        assert_eq!(updated.duration_seconds, Some(0));
    }

    #[tokio::test]
    async fn edits_advance_the_version_when_the_clock_stands_still() {
        let fx = fixture();
        let p = fx.project("Website", None);
        let started = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();
        let stopped = fx
            .service
            .stop_timer(started.entry.id, fx.user)
            .await
            .unwrap();
        assert_eq!(stopped.updated_at, t0());

        let first = fx
            .service
            .update_entry(
                stopped.id,
                fx.user,
                UpdateEntryPayload {
                    description: Some(Some("first".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(first.updated_at > stopped.updated_at);

        let mut stale = stopped.clone();
        stale.description = Some("second".to_string());
        stale.updated_at = t0() + Duration::seconds(1);
        let outcome = fx
            .store
            .update_entry(&stale, stopped.updated_at)
            .await
            .unwrap();
        assert!(outcome.is_none());
        let stored = fx.store.find_entry(stopped.id).await.unwrap().unwrap();
        assert_eq!(stored.description.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn running_entries_cannot_be_ended_by_edit() {
        let fx = fixture();
        let p = fx.project("Website", None);
        let started = fx
            .service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();

        let err = fx
            .service
            .update_entry(
                started.entry.id,
                fx.user,
                UpdateEntryPayload {
                    end_time: Some(t0() + Duration::hours(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = fx
            .service
            .update_entry(started.entry.id, Uuid::new_v4(), UpdateEntryPayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let renamed = fx
            .service
            .update_entry(
                started.entry.id,
                fx.user,
                UpdateEntryPayload {
                    description: Some(Some("pairing".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(renamed.is_running);
        assert_eq!(renamed.description.as_deref(), Some("pairing"));
    }

    #[tokio::test]
    async fn listing_annotates_hours_and_amount() {
        let fx = fixture();
        let p = fx.project("Website", Some(Decimal::from(50)));
        let task = Task {
            id: Uuid::new_v4(),
            project_id: p,
            title: "Landing page".to_string(),
        };
        fx.store.add_task(task.clone());

        let mut payload = Fixture::manual_payload(p, Decimal::new(15, 1));
        payload.task_id = Some(task.id);
        fx.service.add_manual_entry(fx.user, payload).await.unwrap();

        let mut unbilled = Fixture::manual_payload(p, Decimal::from(2));
        unbilled.billable = false;
        unbilled.start_time = t0() - Duration::days(3);
        fx.service.add_manual_entry(fx.user, unbilled).await.unwrap();

        fx.service
            .start_timer(fx.user, Fixture::start_payload(p))
            .await
            .unwrap();

        let rows = fx
            .service
            .list_entries(fx.user, p, DateRange::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].entry.is_running);
        assert_eq!(rows[0].duration_hours, None);
        assert_eq!(rows[0].amount, None);
        assert_eq!(rows[1].task_title.as_deref(), Some("Landing page"));
        assert_eq!(rows[1].project_name, "Website");
        assert_eq!(rows[1].duration_hours, Some(Decimal::new(150, 2)));
        assert_eq!(rows[1].amount, Some(Decimal::new(7500, 2)));
        assert_eq!(rows[2].amount, None);

        let last_two_days = DateRange {
            from: Some(t0() - Duration::days(2)),
            to: Some(t0()),
        };
        let rows = fx
            .service
            .list_entries(fx.user, p, last_two_days)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let err = fx
            .service
            .list_entries(Uuid::new_v4(), p, DateRange::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let mine = fx
            .service
            .list_user_entries(fx.user, DateRange::default())
            .await
            .unwrap();
        assert_eq!(mine.len(), 3);
    }
}
