use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::datetime::days_between;
use crate::error::{Error, Result};
use crate::task::Task;

pub const HISTORY_LIMIT: usize = 50;
pub const SNOOZE_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    /// Days ahead of a due date at which "upcoming" alerts start.
    pub reminder_days: i64,
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub weekends: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reminder_days: 3,
            work_start_hour: 9,
            work_end_hour: 17,
            weekends: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Overdue,
    DueToday,
    DueTomorrow,
    Upcoming,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::DueToday => "due-today",
            Self::DueTomorrow => "due-tomorrow",
            Self::Upcoming => "upcoming",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::Overdue => 1,
            Self::DueToday => 2,
            Self::DueTomorrow => 3,
            Self::Upcoming => 4,
        }
    }

    pub fn category(self) -> AlertCategory {
        match self {
            Self::Overdue | Self::DueToday => AlertCategory::Urgent,
            Self::DueTomorrow | Self::Upcoming => AlertCategory::Upcoming,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Overdue | Self::DueToday => Severity::Urgent,
            Self::DueTomorrow => Severity::Warning,
            Self::Upcoming => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Urgent,
    Upcoming,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Urgent,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub task_id: u64,
    pub kind: NotificationKind,
    pub category: AlertCategory,
    pub severity: Severity,
    pub message: String,
    pub rank: u8,
}

impl Notification {
    fn new(task: &Task, kind: NotificationKind, message: String) -> Self {
        Self {
            id: format!("{}-{}", kind.as_str(), task.id),
            task_id: task.id,
            kind,
            category: kind.category(),
            severity: kind.severity(),
            message,
            rank: kind.rank(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: String,
    pub shown_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnoozedNotification {
    pub notification: Notification,
    pub until: DateTime<Utc>,
}

/// Output of one evaluation pass, ready for the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationBundle {
    pub urgent: Vec<Notification>,
    pub upcoming: Vec<Notification>,
    pub badge_count: usize,
    pub insights: String,
    /// Entries shown for the first time this pass.
    pub announced: Vec<Notification>,
}

impl NotificationBundle {
    fn from_live(live: &[Notification], announced: Vec<Notification>) -> Self {
        let (urgent, upcoming): (Vec<_>, Vec<_>) = live
            .iter()
            .cloned()
            .partition(|n| n.category == AlertCategory::Urgent);
        Self {
            badge_count: live.len(),
            urgent,
            upcoming,
            insights: String::new(),
            announced,
        }
    }

    pub fn live(&self) -> impl Iterator<Item = &Notification> {
        self.urgent.iter().chain(self.upcoming.iter())
    }
}

/// Gate applied to a whole pass: working hours and weekend policy.
pub fn should_notify_now<T: TimeZone>(local_now: &DateTime<T>, settings: &NotificationSettings) -> bool {
    if !settings.enabled {
        return false;
    }
    let weekend = matches!(local_now.weekday(), Weekday::Sat | Weekday::Sun);
    if weekend && !settings.weekends {
        return false;
    }
    let hour = local_now.hour();
    hour >= settings.work_start_hour && hour < settings.work_end_hour
}

/// Classifies every pending, dated task against `today`, most severe first.
pub fn classify(tasks: &[Task], today: NaiveDate, settings: &NotificationSettings) -> Vec<Notification> {
    let mut out: Vec<Notification> = tasks
        .iter()
        .filter(|t| !t.completed)
        .filter_map(|task| {
            let due = task.due_date?;
            let d = days_between(today, due);
            let title = &task.title;
            match d {
                d if d < 0 => {
                    let late = -d;
                    let unit = if late == 1 { "day" } else { "days" };
                    Some(Notification::new(
                        task,
                        NotificationKind::Overdue,
                        format!("\"{title}\" is {late} {unit} overdue"),
                    ))
                }
                0 => Some(Notification::new(
                    task,
                    NotificationKind::DueToday,
                    format!("Due today: \"{title}\""),
                )),
                1 => Some(Notification::new(
                    task,
                    NotificationKind::DueTomorrow,
                    format!("Due tomorrow: \"{title}\""),
                )),
                d if d <= settings.reminder_days => Some(Notification::new(
                    task,
                    NotificationKind::Upcoming,
                    format!("\"{title}\" is due in {d} days"),
                )),
                _ => None,
            }
        })
        .collect();
    out.sort_by_key(|n| n.rank);
    out
}

/// Append-only history and snooze bookkeeping around `classify`.
#[derive(Debug, Clone, Default)]
pub struct NotificationCenter {
    history: Vec<NotificationRecord>,
    snoozed: Vec<SnoozedNotification>,
    live: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new(history: Vec<NotificationRecord>, snoozed: Vec<SnoozedNotification>) -> Self {
        let mut center = Self {
            history,
            snoozed,
            live: Vec::new(),
        };
        center.trim_history();
        center
    }

    pub fn history(&self) -> &[NotificationRecord] {
        &self.history
    }

    pub fn snoozed(&self) -> &[SnoozedNotification] {
        &self.snoozed
    }

    pub fn live(&self) -> &[Notification] {
        &self.live
    }

    #[tracing::instrument(skip(self, tasks, tz, settings))]
    pub fn evaluate(
        &mut self,
        tasks: &[Task],
        now: DateTime<Utc>,
        tz: &Tz,
        settings: &NotificationSettings,
    ) -> NotificationBundle {
        let local_now = now.with_timezone(tz);
        if !should_notify_now(&local_now, settings) {
            debug!(hour = local_now.hour(), "outside notification window");
            self.live.clear();
            return NotificationBundle::default();
        }

        let mut live = classify(tasks, local_now.date_naive(), settings);

        let (released, waiting): (Vec<_>, Vec<_>) =
            self.snoozed.drain(..).partition(|s| s.until <= now);
        self.snoozed = waiting;
        for entry in released {
            debug!(id = %entry.notification.id, "snooze elapsed");
            live.retain(|n| n.id != entry.notification.id);
            live.push(entry.notification);
        }
        live.retain(|n| !self.snoozed.iter().any(|s| s.notification.id == n.id));
        live.sort_by_key(|n| n.rank);

        let mut announced = Vec::new();
        for notification in &live {
            if self.history.iter().any(|r| r.id == notification.id) {
                continue;
            }
            self.history.push(NotificationRecord {
                id: notification.id.clone(),
                shown_at: now,
            });
            announced.push(notification.clone());
        }
        self.trim_history();

        if !announced.is_empty() {
            info!(count = announced.len(), "new notifications");
        }
        self.live = live;
        NotificationBundle::from_live(&self.live, announced)
    }

    /// Defers a live notification by one hour from `now`.
    #[tracing::instrument(skip(self, now))]
    pub fn snooze(&mut self, id: &str, now: DateTime<Utc>) -> Result<SnoozedNotification> {
        let idx = self
            .live
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| Error::UnknownNotification { id: id.to_string() })?;

        let entry = SnoozedNotification {
            notification: self.live.remove(idx),
            until: now + Duration::minutes(SNOOZE_MINUTES),
        };
        self.snoozed.push(entry.clone());
        info!(id, until = %entry.until, "notification snoozed");
        Ok(entry)
    }

    fn trim_history(&mut self) {
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{
        AlertCategory, HISTORY_LIMIT, NotificationCenter, NotificationKind, NotificationRecord,
        NotificationSettings, Severity, classify, should_notify_now,
    };
    use crate::task::{Task, TaskDraft};

    fn today() -> NaiveDate {
        // Monday
        NaiveDate::from_ymd_opt(2026, 2, 16).unwrap()
    }

    fn due_in(id: u64, days: i64) -> Task {
        let created = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let mut task = Task::from_draft(id, TaskDraft::new(format!("task {id}")), created);
        task.due_date = Some(today() + Duration::days(days));
        task
    }

    #[test]
    fn buckets_by_day_difference() {
        let tasks = vec![due_in(1, 5), due_in(2, 3), due_in(3, 1), due_in(4, 0), due_in(5, -2)];
        let out = classify(&tasks, today(), &NotificationSettings::default());

        let ids: Vec<&str> = out.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["overdue-5", "due-today-4", "due-tomorrow-3", "upcoming-2"]);
        assert!(out[0].message.contains("2 days overdue"));
        assert_eq!(out[0].category, AlertCategory::Urgent);
        assert_eq!(out[2].severity, Severity::Warning);
        assert_eq!(out[3].kind, NotificationKind::Upcoming);
        assert_eq!(out[3].rank, 4);
    }

    #[test]
    fn completed_and_undated_tasks_are_skipped() {
        let mut done = due_in(1, 0);
        done.completed = true;
        done.completed_at = Some(Utc::now());
        let mut undated = due_in(2, 0);
        undated.due_date = None;

        assert!(classify(&[done, undated], today(), &NotificationSettings::default()).is_empty());
    }

    #[test]
    fn gate_respects_hours_and_weekends() {
        let settings = NotificationSettings::default();
        let monday_morning = Utc.with_ymd_and_hms(2026, 2, 16, 9, 0, 0).unwrap();
        let monday_evening = Utc.with_ymd_and_hms(2026, 2, 16, 17, 0, 0).unwrap();
        let saturday = Utc.with_ymd_and_hms(2026, 2, 21, 10, 0, 0).unwrap();

        assert!(should_notify_now(&monday_morning, &settings));
        assert!(!should_notify_now(&monday_evening, &settings));
        assert!(!should_notify_now(&saturday, &settings));

        let weekends = NotificationSettings {
            weekends: true,
            ..settings.clone()
        };
        assert!(should_notify_now(&saturday, &weekends));

        let disabled = NotificationSettings {
            enabled: false,
            ..settings
        };
        assert!(!should_notify_now(&monday_morning, &disabled));
    }

    #[test]
    fn due_today_only_inside_window() {
        let tasks = vec![due_in(1, 0)];
        let settings = NotificationSettings::default();
        let mut center = NotificationCenter::default();

        let inside = Utc.with_ymd_and_hms(2026, 2, 16, 10, 30, 0).unwrap();
        let bundle = center.evaluate(&tasks, inside, &chrono_tz::UTC, &settings);
        assert_eq!(bundle.urgent.len(), 1);
        assert_eq!(bundle.urgent[0].kind, NotificationKind::DueToday);

        let outside = Utc.with_ymd_and_hms(2026, 2, 16, 7, 0, 0).unwrap();
        let bundle = center.evaluate(&tasks, outside, &chrono_tz::UTC, &settings);
        assert_eq!(bundle.badge_count, 0);
        assert!(center.live().is_empty());
    }

    #[test]
    fn history_dedupes_announcements() {
        let tasks = vec![due_in(1, 0), due_in(2, 2)];
        let settings = NotificationSettings::default();
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap();
        let mut center = NotificationCenter::default();

        let first = center.evaluate(&tasks, now, &chrono_tz::UTC, &settings);
        assert_eq!(first.announced.len(), 2);

        let second = center.evaluate(&tasks, now + Duration::minutes(1), &chrono_tz::UTC, &settings);
        assert!(second.announced.is_empty());
        assert_eq!(second.badge_count, 2);
        assert_eq!(center.history().len(), 2);
    }

    #[test]
    fn history_is_capped() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap();
        let records = (0..60)
            .map(|i| NotificationRecord {
                id: format!("overdue-{i}"),
                shown_at: now,
            })
            .collect();
        let center = NotificationCenter::new(records, vec![]);
        assert_eq!(center.history().len(), HISTORY_LIMIT);
        assert_eq!(center.history()[0].id, "overdue-10");
    }

    #[test]
    fn snoozed_entry_returns_once_after_an_hour() {
        let tasks = vec![due_in(1, 0)];
        let settings = NotificationSettings::default();
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap();
        let mut center = NotificationCenter::default();

        center.evaluate(&tasks, now, &chrono_tz::UTC, &settings);
        let snoozed = center.snooze("due-today-1", now).unwrap();
        assert_eq!(snoozed.until, now + Duration::hours(1));

        let during = center.evaluate(&tasks, now + Duration::minutes(30), &chrono_tz::UTC, &settings);
        assert_eq!(during.badge_count, 0);

        let after = center.evaluate(&tasks, now + Duration::hours(1), &chrono_tz::UTC, &settings);
        let hits = after.live().filter(|n| n.id == "due-today-1").count();
        assert_eq!(hits, 1);
        assert!(center.snoozed().is_empty());
    }

    #[test]
    fn released_snooze_is_kept_as_is() {
        let mut tasks = vec![due_in(1, 0)];
        let settings = NotificationSettings::default();
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap();
        let mut center = NotificationCenter::default();

        center.evaluate(&tasks, now, &chrono_tz::UTC, &settings);
        center.snooze("due-today-1", now).unwrap();

        tasks[0].completed = true;
        tasks[0].completed_at = Some(now);
        let after = center.evaluate(&tasks, now + Duration::hours(2), &chrono_tz::UTC, &settings);
        assert_eq!(after.urgent.len(), 1);
        assert_eq!(after.urgent[0].id, "due-today-1");
    }

    #[test]
    fn snoozing_unknown_id_fails() {
        let mut center = NotificationCenter::default();
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap();
        assert!(center.snooze("overdue-99", now).is_err());
    }
}
