//! The update cycle: every mutation flows through `App`, which persists
//! the touched keys, recomputes all derived state and hands a fresh
//! `Frame` to the renderer.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::clock::Clock;
use crate::datetime::local_date;
use crate::error::{Error, Result};
use crate::kv::{
    ABANDONED_KEY, ACTIVITY_LOG_KEY, KvStore, MOOD_KEY, NOTIFICATION_HISTORY_KEY,
    NOTIFICATION_SETTINGS_KEY, SNOOZED_KEY, TASK_ID_COUNTER_KEY, TASKS_KEY, load_optional,
    load_or_default, save_json,
};
use crate::notify::{NotificationBundle, NotificationCenter, NotificationSettings, SnoozedNotification};
use crate::query::{self, ViewConfig};
use crate::render::Renderer;
use crate::report::{Mood, failure_report};
use crate::stats::{ProductivityInsights, SadStats, Stats, insight_messages};
use crate::store::{DeleteOutcome, Disposition, TaskStore};
use crate::task::{AbandonedTask, Task, TaskDraft, TaskPatch};

/// Everything a renderer needs for one redraw.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub generated_at: DateTime<Utc>,
    pub today: NaiveDate,
    /// Filtered and sorted view of the store.
    pub tasks: Vec<Task>,
    pub stats: Stats,
    pub sad: SadStats,
    pub insights: ProductivityInsights,
    pub messages: Vec<String>,
    pub notifications: NotificationBundle,
}

pub struct App {
    kv: Box<dyn KvStore>,
    clock: Box<dyn Clock>,
    renderer: Box<dyn Renderer>,
    tz: Tz,
    store: TaskStore,
    view: ViewConfig,
    settings: NotificationSettings,
    center: NotificationCenter,
    log: ActivityLog,
    mood: Mood,
    frame: Option<Frame>,
}

impl App {
    /// Restores every persisted key and runs the first update cycle.
    /// Missing or corrupt keys fall back to defaults; `default_settings`
    /// is used until notification settings have been saved once.
    #[tracing::instrument(skip_all)]
    pub fn load(
        kv: Box<dyn KvStore>,
        clock: Box<dyn Clock>,
        renderer: Box<dyn Renderer>,
        tz: Tz,
        default_settings: NotificationSettings,
        view: ViewConfig,
    ) -> Self {
        let store = TaskStore::from_parts(
            load_or_default(kv.as_ref(), TASKS_KEY),
            load_or_default(kv.as_ref(), ABANDONED_KEY),
            load_or_default(kv.as_ref(), TASK_ID_COUNTER_KEY),
        );
        let settings =
            load_optional(kv.as_ref(), NOTIFICATION_SETTINGS_KEY).unwrap_or(default_settings);
        let center = NotificationCenter::new(
            load_or_default(kv.as_ref(), NOTIFICATION_HISTORY_KEY),
            load_or_default(kv.as_ref(), SNOOZED_KEY),
        );
        let log = load_or_default(kv.as_ref(), ACTIVITY_LOG_KEY);
        let mood = load_or_default(kv.as_ref(), MOOD_KEY);

        info!(
            tasks = store.snapshot().len(),
            abandoned = store.abandoned().len(),
            tz = %tz,
            "state restored"
        );

        let mut app = Self {
            kv,
            clock,
            renderer,
            tz,
            store,
            view,
            settings,
            center,
            log,
            mood,
            frame: None,
        };
        app.refresh();
        app
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn abandoned(&self) -> &[AbandonedTask] {
        self.store.abandoned()
    }

    pub fn view(&self) -> &ViewConfig {
        &self.view
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.log
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.center
    }

    /// Calendar date of the clock's current instant in the app timezone.
    pub fn today(&self) -> NaiveDate {
        local_date(self.clock.now(), &self.tz)
    }

    /// Latest recomputed frame.
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn Renderer>) {
        self.renderer = renderer;
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create(&mut self, draft: TaskDraft) -> Result<Task> {
        let now = self.clock.now();
        let result = self.store.create(draft, now);
        match &result {
            Ok(task) => self.log.record(
                now,
                format!(
                    "Task created: \"{}\" (priority: {}, category: {})",
                    task.title, task.priority, task.category
                ),
            ),
            Err(err) => self
                .log
                .record(now, format!("Failed task creation attempt - {err}")),
        }
        let saved = if result.is_ok() {
            self.save_tasks().and_then(|()| self.save_log())
        } else {
            self.save_log()
        };
        self.finish(result, saved)
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle(&mut self, id: u64) -> Result<Task> {
        let now = self.clock.now();
        let result = self.store.toggle_complete(id, now);
        let saved = match &result {
            Ok(task) => {
                let verb = if task.completed {
                    "completed"
                } else {
                    "marked as incomplete"
                };
                self.log.record(now, format!("Task {verb}: \"{}\"", task.title));
                self.save_tasks().and_then(|()| self.save_log())
            }
            Err(_) => Ok(()),
        };
        self.finish(result, saved)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, id: u64, disposition: Disposition) -> Result<DeleteOutcome> {
        let now = self.clock.now();
        let result = self.store.delete(id, disposition, now);
        let saved = match &result {
            Ok(DeleteOutcome::Removed(task)) => {
                self.log
                    .record(now, format!("Task permanently deleted: \"{}\"", task.title));
                self.save_tasks().and_then(|()| self.save_log())
            }
            Ok(DeleteOutcome::Abandoned(entry)) => {
                self.log.record(
                    now,
                    format!("Task abandoned: \"{}\" - {}", entry.task.title, entry.reason),
                );
                self.save_tasks().and_then(|()| self.save_log())
            }
            Ok(DeleteOutcome::Kept(_)) | Err(_) => Ok(()),
        };
        self.finish(result, saved)
    }

    /// Replaces task `id` with the patched version, which receives a new id.
    #[tracing::instrument(skip(self, patch))]
    pub fn edit(&mut self, id: u64, patch: TaskPatch) -> Result<Task> {
        let now = self.clock.now();
        let result = self.store.edit(id, patch, now);
        let saved = match &result {
            Ok(task) => {
                self.log.record(
                    now,
                    format!("Task edited: \"{}\" (#{id} is now #{})", task.title, task.id),
                );
                self.save_tasks().and_then(|()| self.save_log())
            }
            Err(err @ Error::Validation { .. }) => {
                self.log
                    .record(now, format!("Failed task edit attempt - {err}"));
                self.save_log()
            }
            Err(_) => Ok(()),
        };
        self.finish(result, saved)
    }

    /// Changes the filter or sort selection. Not persisted.
    #[tracing::instrument(skip(self, view))]
    pub fn set_view(&mut self, view: ViewConfig) -> Result<()> {
        let now = self.clock.now();
        if view.status != self.view.status
            || view.category != self.view.category
            || view.search != self.view.search
        {
            self.log.record(
                now,
                format!(
                    "Filters applied - Status: {}, Category: {}",
                    view.status, view.category
                ),
            );
        }
        if view.sort != self.view.sort {
            self.log.record(now, format!("Tasks sorted by: {}", view.sort));
        }
        self.view = view;
        let saved = self.save_log();
        self.finish(Ok(()), saved)
    }

    #[tracing::instrument(skip(self))]
    pub fn snooze(&mut self, notification_id: &str) -> Result<SnoozedNotification> {
        let now = self.clock.now();
        let result = self.center.snooze(notification_id, now);
        let saved = match &result {
            Ok(entry) => {
                self.log.record(
                    now,
                    format!(
                        "Notification snoozed for 1 hour: {}",
                        entry.notification.message
                    ),
                );
                self.save_notifications().and_then(|()| self.save_log())
            }
            Err(_) => Ok(()),
        };
        self.finish(result, saved)
    }

    /// Periodic re-evaluation with no mutation.
    pub fn tick(&mut self) {
        debug!("tick");
        self.refresh();
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_log(&mut self) -> Result<()> {
        let now = self.clock.now();
        self.log.clear(now);
        let saved = self.save_log();
        self.finish(Ok(()), saved)
    }

    /// Plain-text activity log export; the export itself is logged.
    #[tracing::instrument(skip(self))]
    pub fn export_log(&mut self) -> Result<String> {
        let now = self.clock.now();
        let text = self.log.export(&self.tz);
        self.log.record(now, "Activity log exported");
        let saved = self.save_log();
        self.finish(Ok(text), saved)
    }

    #[tracing::instrument(skip(self))]
    pub fn report(&mut self) -> Result<String> {
        let now = self.clock.now();
        let stats = Stats::compute(self.store.snapshot(), now, &self.tz);
        let text = failure_report(&stats, self.store.abandoned(), self.mood, now, &self.tz);
        self.log.record(now, "Failure report generated");
        let saved = self.save_log();
        self.finish(Ok(text), saved)
    }

    #[tracing::instrument(skip(self))]
    pub fn set_mood(&mut self, mood: Mood) -> Result<()> {
        let now = self.clock.now();
        self.mood = mood;
        self.log
            .record(now, format!("Mood updated to: {mood} - {}", mood.response()));
        let saved = save_json(self.kv.as_mut(), MOOD_KEY, &self.mood)
            .and_then(|()| self.save_log());
        self.finish(Ok(()), saved)
    }

    #[tracing::instrument(skip(self, settings))]
    pub fn update_settings(&mut self, settings: NotificationSettings) -> Result<()> {
        let now = self.clock.now();
        self.settings = settings;
        self.log.record(now, "Notification settings updated");
        let saved = save_json(self.kv.as_mut(), NOTIFICATION_SETTINGS_KEY, &self.settings)
            .and_then(|()| self.save_log());
        self.finish(Ok(()), saved)
    }

    /// Re-renders, then surfaces a storage failure in preference to the
    /// operation's own result.
    fn finish<T>(&mut self, result: Result<T>, saved: anyhow::Result<()>) -> Result<T> {
        if let Err(err) = &result {
            debug!(error = %err, "operation rejected");
        }
        self.refresh();
        saved?;
        result
    }

    fn refresh(&mut self) {
        let now = self.clock.now();
        let today = local_date(now, &self.tz);
        let all = self.store.snapshot();

        let stats = Stats::compute(all, now, &self.tz);
        let sad = SadStats::compute(all, &stats, now);
        let insights = ProductivityInsights::compute(all, now, &self.tz);
        let messages = insight_messages(&stats, &sad, self.store.abandoned().len());
        let tasks = query::view(all, &self.view);

        let snoozed_before = self.center.snoozed().len();
        let mut notifications = self.center.evaluate(all, now, &self.tz, &self.settings);
        notifications.insights = insights.summary();
        if (!notifications.announced.is_empty()
            || snoozed_before != self.center.snoozed().len())
            && let Err(err) = self.save_notifications()
        {
            warn!(error = %err, "failed to persist notification state");
        }

        let frame = Frame {
            generated_at: now,
            today,
            tasks,
            stats,
            sad,
            insights,
            messages,
            notifications,
        };
        debug!(
            visible = frame.tasks.len(),
            badge = frame.notifications.badge_count,
            "frame recomputed"
        );

        if let Err(err) = self.renderer.render(&frame) {
            warn!(error = %err, "renderer failed");
        }
        self.frame = Some(frame);
    }

    fn save_tasks(&mut self) -> anyhow::Result<()> {
        save_json(self.kv.as_mut(), TASKS_KEY, self.store.snapshot())?;
        save_json(self.kv.as_mut(), ABANDONED_KEY, self.store.abandoned())?;
        save_json(self.kv.as_mut(), TASK_ID_COUNTER_KEY, &self.store.next_id())
    }

    fn save_log(&mut self) -> anyhow::Result<()> {
        save_json(self.kv.as_mut(), ACTIVITY_LOG_KEY, &self.log)
    }

    fn save_notifications(&mut self) -> anyhow::Result<()> {
        save_json(self.kv.as_mut(), NOTIFICATION_HISTORY_KEY, self.center.history())?;
        save_json(self.kv.as_mut(), SNOOZED_KEY, self.center.snoozed())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{App, Frame};
    use crate::clock::ManualClock;
    use crate::error::Error;
    use crate::kv::{KvStore, MemoryStore};
    use crate::notify::NotificationSettings;
    use crate::query::{StatusFilter, ViewConfig};
    use crate::render::Renderer;
    use crate::store::{DeleteOutcome, Disposition};
    use crate::task::{TaskDraft, TaskPatch};

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Frame>>>);

    impl Renderer for Recorder {
        fn render(&mut self, frame: &Frame) -> anyhow::Result<()> {
            self.0.borrow_mut().push(frame.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct SharedStore(Rc<RefCell<MemoryStore>>);

    impl KvStore for SharedStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.borrow().get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            self.0.borrow_mut().set(key, value)
        }
    }

    // Monday, inside working hours.
    fn monday_morning() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap())
    }

    fn app_with(kv: SharedStore, clock: ManualClock, frames: Recorder) -> App {
        App::load(
            Box::new(kv),
            Box::new(clock),
            Box::new(frames),
            chrono_tz::UTC,
            NotificationSettings::default(),
            ViewConfig::default(),
        )
    }

    fn due(date: NaiveDate, title: &str) -> TaskDraft {
        TaskDraft {
            due_date: Some(date),
            ..TaskDraft::new(title)
        }
    }

    #[test]
    fn create_due_today_renders_stats_and_urgent_alert() {
        let frames = Recorder::default();
        let mut app = app_with(SharedStore::default(), monday_morning(), frames.clone());
        app.create(due(NaiveDate::from_ymd_opt(2026, 2, 16).unwrap(), "Pay rent"))
            .unwrap();

        let rendered = frames.0.borrow();
        assert_eq!(rendered.len(), 2);
        let frame = rendered.last().unwrap();
        assert_eq!(frame.stats.total, 1);
        assert_eq!(frame.stats.pending, 1);
        assert_eq!(frame.stats.completion_rate, 0);
        assert_eq!(frame.notifications.urgent.len(), 1);
        assert_eq!(frame.notifications.urgent[0].message, "Due today: \"Pay rent\"");
        assert_eq!(frame.notifications.badge_count, 1);
        assert!(!frame.notifications.insights.is_empty());
    }

    #[test]
    fn toggling_one_of_two_gives_half_completion() {
        let mut app = app_with(SharedStore::default(), monday_morning(), Recorder::default());
        let first = app.create(TaskDraft::new("Water plants")).unwrap();
        app.create(TaskDraft::new("Call mum")).unwrap();
        app.toggle(first.id).unwrap();

        let frame = app.frame().unwrap();
        assert_eq!(frame.stats.completed, 1);
        assert_eq!(frame.stats.completion_rate, 50);
    }

    #[test]
    fn invalid_create_is_logged_and_still_renders() {
        let frames = Recorder::default();
        let mut app = app_with(SharedStore::default(), monday_morning(), frames.clone());
        let err = app.create(TaskDraft::new("   ")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.is_recoverable());

        assert_eq!(frames.0.borrow().len(), 2);
        assert!(app.store().snapshot().is_empty());
        let last = app.activity().entries().last().unwrap();
        assert!(last.message.starts_with("Failed task creation attempt"));
    }

    #[test]
    fn snoozed_alert_returns_exactly_once_after_an_hour() {
        let clock = monday_morning();
        let mut app = app_with(SharedStore::default(), clock.clone(), Recorder::default());
        let task = app
            .create(due(NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(), "File taxes"))
            .unwrap();
        let id = format!("overdue-{}", task.id);

        app.snooze(&id).unwrap();
        assert_eq!(app.frame().unwrap().notifications.badge_count, 0);

        clock.advance(Duration::minutes(30));
        app.tick();
        assert_eq!(app.frame().unwrap().notifications.badge_count, 0);

        clock.advance(Duration::minutes(30));
        app.tick();
        let bundle = &app.frame().unwrap().notifications;
        assert_eq!(bundle.urgent.iter().filter(|n| n.id == id).count(), 1);
        assert!(app.notifications().snoozed().is_empty());
    }

    #[test]
    fn snoozing_unknown_notification_is_a_no_op() {
        let mut app = app_with(SharedStore::default(), monday_morning(), Recorder::default());
        let err = app.snooze("overdue-99").unwrap_err();
        assert!(matches!(err, Error::UnknownNotification { .. }));
    }

    #[test]
    fn view_changes_filter_rendered_tasks_only() {
        let mut app = app_with(SharedStore::default(), monday_morning(), Recorder::default());
        let done = app.create(TaskDraft::new("Done already")).unwrap();
        app.create(TaskDraft::new("Still waiting")).unwrap();
        app.toggle(done.id).unwrap();

        app.set_view(ViewConfig {
            status: StatusFilter::Pending,
            ..ViewConfig::default()
        })
        .unwrap();

        let frame = app.frame().unwrap();
        assert_eq!(frame.tasks.len(), 1);
        assert_eq!(frame.tasks[0].title, "Still waiting");
        assert_eq!(frame.stats.total, 2);
        assert!(
            app.activity()
                .entries()
                .iter()
                .any(|e| e.message.starts_with("Filters applied - Status: pending"))
        );
    }

    #[test]
    fn state_survives_reload() {
        let kv = SharedStore::default();
        let clock = monday_morning();
        {
            let mut app = app_with(kv.clone(), clock.clone(), Recorder::default());
            let keep = app.create(TaskDraft::new("Keep me")).unwrap();
            let drop = app.create(TaskDraft::new("Learn piano")).unwrap();
            app.edit(
                keep.id,
                TaskPatch {
                    title: Some("Keep me, edited".to_string()),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
            let outcome = app.delete(drop.id, Disposition::Abandon).unwrap();
            assert!(matches!(outcome, DeleteOutcome::Abandoned(_)));
        }

        let app = app_with(kv, clock, Recorder::default());
        let titles: Vec<&str> = app
            .store()
            .snapshot()
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Keep me, edited"]);
        assert_eq!(app.abandoned().len(), 1);
        assert_eq!(app.store().next_id(), 4);
        assert!(app.activity().entries().len() >= 4);
    }

    #[test]
    fn cancelled_delete_changes_nothing() {
        let mut app = app_with(SharedStore::default(), monday_morning(), Recorder::default());
        let task = app.create(TaskDraft::new("Maybe")).unwrap();
        let before = app.activity().entries().len();
        let outcome = app.delete(task.id, Disposition::Cancel).unwrap();
        assert!(matches!(outcome, DeleteOutcome::Kept(_)));
        assert_eq!(app.store().snapshot().len(), 1);
        assert_eq!(app.activity().entries().len(), before);
    }
}
