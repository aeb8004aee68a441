//! Aggregate figures derived from a task snapshot.
//!
//! Everything here is a pure function of `(tasks, now, tz)`; nothing is
//! cached between passes.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::datetime::{local_date, weekday_name};
use crate::task::Task;

const STALE_AFTER_DAYS: i64 = 7;
const TREND_WINDOW_DAYS: i64 = 7;

fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * part as f64 / total as f64).round() as u32
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Rounded percentage in `0..=100`.
    pub completion_rate: u32,
    pub overdue: usize,
    pub total_estimated_minutes: u64,
    pub average_estimated_minutes: u64,
}

impl Stats {
    pub fn compute(tasks: &[Task], now: DateTime<Utc>, tz: &Tz) -> Self {
        let today = local_date(now, tz);
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();
        let overdue = tasks.iter().filter(|t| t.is_overdue(today)).count();
        let total_estimated_minutes: u64 = tasks
            .iter()
            .filter_map(|t| t.estimated_minutes)
            .map(u64::from)
            .sum();
        let average_estimated_minutes = if total == 0 {
            0
        } else {
            (total_estimated_minutes as f64 / total as f64).round() as u64
        };

        Self {
            total,
            completed,
            pending: total - completed,
            completion_rate: percent(completed, total),
            overdue,
            total_estimated_minutes,
            average_estimated_minutes,
        }
    }
}

/// Ordered satisfaction ladder; the first matching rung wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Satisfaction {
    SurprisinglyDecent,
    Mediocre,
    Declining,
    Disappointing,
    DumpsterFire,
    Overwhelming,
    RockBottom,
}

impl Satisfaction {
    pub fn assess(completion_rate: u32, overdue: usize, pending: usize) -> Self {
        if completion_rate > 80 {
            Self::SurprisinglyDecent
        } else if completion_rate > 60 {
            Self::Mediocre
        } else if completion_rate > 40 {
            Self::Declining
        } else if completion_rate > 20 {
            Self::Disappointing
        } else if overdue > 0 {
            Self::DumpsterFire
        } else if pending > 10 {
            Self::Overwhelming
        } else {
            Self::RockBottom
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SurprisinglyDecent => "Surprisingly Decent",
            Self::Mediocre => "Mediocre",
            Self::Declining => "Declining",
            Self::Disappointing => "Disappointing",
            Self::DumpsterFire => "Dumpster Fire",
            Self::Overwhelming => "Overwhelming",
            Self::RockBottom => "Rock Bottom",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::SurprisinglyDecent => "📈",
            Self::Mediocre => "📊",
            Self::Declining => "📉",
            Self::Disappointing => "💔",
            Self::DumpsterFire => "🔥",
            Self::Overwhelming => "😱",
            Self::RockBottom => "💀",
        }
    }
}

impl fmt::Display for Satisfaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.emoji(), self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SadStats {
    /// `None` when nothing has ever been completed.
    pub days_since_last_completion: Option<i64>,
    pub stale: usize,
    pub procrastination_score: u32,
    pub satisfaction: Satisfaction,
}

impl SadStats {
    pub fn compute(tasks: &[Task], stats: &Stats, now: DateTime<Utc>) -> Self {
        let days_since_last_completion = tasks
            .iter()
            .filter(|t| t.completed)
            .filter_map(|t| t.completed_at)
            .max()
            .map(|latest| (now - latest).num_days());

        let stale_cutoff = Duration::days(STALE_AFTER_DAYS);
        let stale = tasks
            .iter()
            .filter(|t| !t.completed && now - t.created_at > stale_cutoff)
            .count();

        let procrastination_score = percent(stats.overdue + stale, stats.total).min(100);

        Self {
            days_since_last_completion,
            stale,
            procrastination_score,
            satisfaction: Satisfaction::assess(
                stats.completion_rate,
                stats.overdue,
                stats.pending,
            ),
        }
    }

    pub fn days_since_label(&self) -> String {
        self.days_since_last_completion
            .map(|days| days.to_string())
            .unwrap_or_else(|| "∞".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Trend {
    fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.75 {
            Self::Excellent
        } else if ratio >= 0.5 {
            Self::Good
        } else if ratio >= 0.25 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductivityInsights {
    pub average_completion_days: Option<f64>,
    pub weekly_trend: Option<Trend>,
    pub best_day: Option<Weekday>,
}

impl ProductivityInsights {
    pub fn compute(tasks: &[Task], now: DateTime<Utc>, tz: &Tz) -> Self {
        let spans: Vec<f64> = tasks
            .iter()
            .filter_map(|t| t.completed_at.map(|done| done - t.created_at))
            .map(|span| span.num_seconds() as f64 / 86_400.0)
            .collect();
        let average_completion_days =
            (!spans.is_empty()).then(|| spans.iter().sum::<f64>() / spans.len() as f64);

        let window_start = now - Duration::days(TREND_WINDOW_DAYS);
        let recent: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.created_at >= window_start)
            .collect();
        let weekly_trend = (!recent.is_empty()).then(|| {
            let done = recent.iter().filter(|t| t.completed).count();
            Trend::from_ratio(done as f64 / recent.len() as f64)
        });

        let mut per_day = [0usize; 7];
        for done in tasks.iter().filter_map(|t| t.completed_at) {
            let idx = done.with_timezone(tz).weekday().num_days_from_sunday() as usize;
            per_day[idx] += 1;
        }
        let mut best: Option<(usize, usize)> = None;
        for (idx, count) in per_day.iter().copied().enumerate() {
            if count > 0 && best.map(|(_, top)| count > top).unwrap_or(true) {
                best = Some((idx, count));
            }
        }
        let best_day = best.map(|(idx, _)| weekday_from_sunday(idx));

        Self {
            average_completion_days,
            weekly_trend,
            best_day,
        }
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(days) = self.average_completion_days {
            parts.push(format!("Average completion time: {days:.1} days."));
        }
        if let Some(trend) = self.weekly_trend {
            parts.push(format!("Weekly trend: {}.", trend.as_str()));
        }
        if let Some(day) = self.best_day {
            parts.push(format!("Most productive day: {}.", weekday_name(day)));
        }
        if parts.is_empty() {
            return "Complete a few tasks to unlock productivity insights.".to_string();
        }
        parts.join(" ")
    }
}

fn weekday_from_sunday(idx: usize) -> Weekday {
    match idx {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}

/// Commentary lines shown next to the figures, in rule order.
pub fn insight_messages(stats: &Stats, sad: &SadStats, abandoned: usize) -> Vec<String> {
    let mut out = Vec::new();

    if stats.total == 0 {
        out.push("You haven't even started disappointing yourself yet. That's... something.".to_string());
    } else {
        if stats.completed == 0 {
            out.push("You've completed exactly zero tasks. Your productivity is as empty as your soul.".to_string());
        }
        if stats.overdue > 0 {
            out.push(format!(
                "You have {} overdue task{}. Time is a flat circle of disappointment.",
                stats.overdue,
                plural(stats.overdue)
            ));
        }
        if sad.procrastination_score > 70 {
            out.push("Your procrastination score is higher than most people's test scores. Congratulations?".to_string());
        }
        if stats.total > stats.completed * 3 {
            out.push("You create tasks faster than you complete them. You're basically a task hoarder.".to_string());
        }
        if abandoned > 0 {
            out.push(format!(
                "You've abandoned {abandoned} task{}. They trusted you, and you let them down.",
                plural(abandoned)
            ));
        }
    }

    if out.is_empty() {
        out.push("No specific insights available. Your mediocrity is too profound to analyze.".to_string());
    }
    out
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc, Weekday};

    use super::{ProductivityInsights, SadStats, Satisfaction, Stats, Trend, insight_messages};
    use crate::task::{Task, TaskDraft};

    fn now() -> chrono::DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0).unwrap()
    }

    fn task(id: u64, created_days_ago: i64) -> Task {
        Task::from_draft(
            id,
            TaskDraft::new(format!("task {id}")),
            now() - Duration::days(created_days_ago),
        )
    }

    fn complete(task: &mut Task, at: chrono::DateTime<Utc>) {
        task.completed = true;
        task.completed_at = Some(at);
    }

    #[test]
    fn empty_snapshot_is_all_zero() {
        let stats = Stats::compute(&[], now(), &chrono_tz::UTC);
        assert_eq!(stats, Stats::default());

        let sad = SadStats::compute(&[], &stats, now());
        assert_eq!(sad.procrastination_score, 0);
        assert_eq!(sad.days_since_last_completion, None);
        assert_eq!(sad.days_since_label(), "∞");
        assert_eq!(sad.satisfaction, Satisfaction::RockBottom);
    }

    #[test]
    fn counts_rates_and_estimates() {
        let mut a = task(1, 0);
        a.estimated_minutes = Some(30);
        let mut b = task(2, 0);
        b.estimated_minutes = Some(45);
        complete(&mut b, now());
        let mut c = task(3, 0);
        c.due_date = NaiveDate::from_ymd_opt(2026, 2, 15);

        let stats = Stats::compute(&[a, b, c], now(), &chrono_tz::UTC);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completion_rate, 33);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.total_estimated_minutes, 75);
        assert_eq!(stats.average_estimated_minutes, 25);
    }

    #[test]
    fn due_today_is_not_overdue() {
        let mut a = task(1, 0);
        a.due_date = NaiveDate::from_ymd_opt(2026, 2, 16);
        let mut b = task(2, 0);
        b.due_date = NaiveDate::from_ymd_opt(2026, 2, 10);
        complete(&mut b, now());

        let stats = Stats::compute(&[a, b], now(), &chrono_tz::UTC);
        assert_eq!(stats.overdue, 0);
    }

    #[test]
    fn procrastination_counts_overdue_and_stale() {
        let mut overdue = task(1, 1);
        overdue.due_date = NaiveDate::from_ymd_opt(2026, 2, 1);
        let stale = task(2, 8);
        let fresh = task(3, 2);
        let mut done_old = task(4, 30);
        complete(&mut done_old, now() - Duration::days(3));

        let tasks = vec![overdue, stale, fresh, done_old];
        let stats = Stats::compute(&tasks, now(), &chrono_tz::UTC);
        let sad = SadStats::compute(&tasks, &stats, now());
        assert_eq!(sad.stale, 1);
        assert_eq!(sad.procrastination_score, 50);
        assert_eq!(sad.days_since_last_completion, Some(3));
    }

    #[test]
    fn satisfaction_ladder_first_match_wins() {
        assert_eq!(Satisfaction::assess(81, 5, 50), Satisfaction::SurprisinglyDecent);
        assert_eq!(Satisfaction::assess(80, 0, 0), Satisfaction::Mediocre);
        assert_eq!(Satisfaction::assess(41, 0, 0), Satisfaction::Declining);
        assert_eq!(Satisfaction::assess(21, 0, 0), Satisfaction::Disappointing);
        assert_eq!(Satisfaction::assess(20, 1, 20), Satisfaction::DumpsterFire);
        assert_eq!(Satisfaction::assess(0, 0, 11), Satisfaction::Overwhelming);
        assert_eq!(Satisfaction::assess(0, 0, 10), Satisfaction::RockBottom);
    }

    #[test]
    fn insights_pick_busiest_weekday_and_trend() {
        let mut a = task(1, 9);
        // Monday
        complete(&mut a, Utc.with_ymd_and_hms(2026, 2, 9, 9, 0, 0).unwrap());
        let mut b = task(2, 8);
        // Tuesday
        complete(&mut b, Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap());
        let c = task(3, 1);
        let mut d = task(4, 2);
        // Saturday
        complete(&mut d, Utc.with_ymd_and_hms(2026, 2, 14, 9, 0, 0).unwrap());

        let insights = ProductivityInsights::compute(&[a, b, c, d], now(), &chrono_tz::UTC);
        assert_eq!(insights.best_day, Some(Weekday::Mon));
        assert_eq!(insights.weekly_trend, Some(Trend::Good));
        assert!(insights.average_completion_days.is_some());
        assert!(insights.summary().contains("Monday"));
    }

    #[test]
    fn insights_without_history() {
        let insights = ProductivityInsights::compute(&[task(1, 30)], now(), &chrono_tz::UTC);
        assert_eq!(insights.average_completion_days, None);
        assert_eq!(insights.weekly_trend, None);
        assert_eq!(insights.best_day, None);
        assert!(insights.summary().starts_with("Complete a few"));
    }

    #[test]
    fn messages_follow_rule_order() {
        let stats = Stats::compute(&[], now(), &chrono_tz::UTC);
        let sad = SadStats::compute(&[], &stats, now());
        assert_eq!(insight_messages(&stats, &sad, 0).len(), 1);

        let tasks = vec![task(1, 10)];
        let stats = Stats::compute(&tasks, now(), &chrono_tz::UTC);
        let sad = SadStats::compute(&tasks, &stats, now());
        let messages = insight_messages(&stats, &sad, 2);
        assert_eq!(
            messages[0],
            "You've completed exactly zero tasks. Your productivity is as empty as your soul."
        );
        assert_eq!(
            messages.last().unwrap(),
            "You've abandoned 2 tasks. They trusted you, and you let them down."
        );
    }
}
