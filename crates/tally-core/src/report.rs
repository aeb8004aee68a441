use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::datetime::format_local;
use crate::stats::Stats;
use crate::task::AbandonedTask;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mood {
    Terrible,
    Awful,
    Bad,
    #[default]
    Meh,
    SlightlyLessBad,
}

impl Mood {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terrible => "terrible",
            Self::Awful => "awful",
            Self::Bad => "bad",
            Self::Meh => "meh",
            Self::SlightlyLessBad => "slightly-less-bad",
        }
    }

    pub fn response(self) -> &'static str {
        match self {
            Self::Terrible => "Your honesty is refreshing, if depressing.",
            Self::Awful => "At least you're consistent in your misery.",
            Self::Bad => "Bad is the new normal, apparently.",
            Self::Meh => "Meh is a lifestyle choice at this point.",
            Self::SlightlyLessBad => "Setting the bar low and still struggling to reach it.",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terrible" => Ok(Self::Terrible),
            "awful" => Ok(Self::Awful),
            "bad" => Ok(Self::Bad),
            "meh" => Ok(Self::Meh),
            "slightly-less-bad" => Ok(Self::SlightlyLessBad),
            other => Err(anyhow!("unknown mood: {other}")),
        }
    }
}

const RECOMMENDATIONS: &str = "RECOMMENDATIONS:
1. Lower your expectations further
2. Accept that this is who you are now
3. Consider a hobby that requires less follow-through, like watching paint dry";

/// Plain-text summary of totals, abandoned items and recommendations.
pub fn failure_report(
    stats: &Stats,
    abandoned: &[AbandonedTask],
    mood: Mood,
    now: DateTime<Utc>,
    tz: &Tz,
) -> String {
    let verdict = if stats.total > 0 && stats.completed * 2 < stats.total {
        "significantly underperforming"
    } else {
        "meeting rock-bottom expectations"
    };

    let hall_of_shame = if abandoned.is_empty() {
        "None yet, but give it time.".to_string()
    } else {
        abandoned
            .iter()
            .map(|a| {
                format!(
                    "- \"{}\" (abandoned {})",
                    a.task.title,
                    a.abandoned_at.with_timezone(tz).format("%Y-%m-%d")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut out = String::new();
    out.push_str("PERSONAL FAILURE REPORT\n");
    out.push_str(&format!("Generated on: {}\n", format_local(now, tz)));
    out.push_str("===========================================\n\n");
    out.push_str("SUMMARY:\n");
    out.push_str(&format!("- Total tasks created: {}\n", stats.total));
    out.push_str(&format!("- Tasks actually completed: {}\n", stats.completed));
    out.push_str(&format!("- Tasks given up on: {}\n", abandoned.len()));
    out.push_str(&format!("- Overdue tasks: {}\n", stats.overdue));
    out.push_str(&format!("- Current mood: {mood}\n\n"));
    out.push_str("ANALYSIS:\n");
    out.push_str(&format!(
        "A completion rate of {}% suggests you are {verdict}.\n\n",
        stats.completion_rate
    ));
    out.push_str("ABANDONED TASKS:\n");
    out.push_str(&hall_of_shame);
    out.push_str("\n\n");
    out.push_str(RECOMMENDATIONS);
    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Mood, failure_report};
    use crate::stats::Stats;
    use crate::task::{ABANDON_REASON, AbandonedTask, Task, TaskDraft};

    #[test]
    fn report_lists_abandoned_and_recommendations() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap();
        let stats = Stats {
            total: 4,
            completed: 1,
            pending: 3,
            completion_rate: 25,
            ..Stats::default()
        };
        let abandoned = vec![AbandonedTask {
            task: Task::from_draft(3, TaskDraft::new("Learn piano"), now),
            abandoned_at: now,
            reason: ABANDON_REASON.to_string(),
        }];

        let report = failure_report(&stats, &abandoned, Mood::Bad, now, &chrono_tz::UTC);
        assert!(report.starts_with("PERSONAL FAILURE REPORT\nGenerated on: 2026-02-16 10:00:00"));
        assert!(report.contains("- Total tasks created: 4"));
        assert!(report.contains("- Current mood: bad"));
        assert!(report.contains("significantly underperforming"));
        assert!(report.contains("- \"Learn piano\" (abandoned 2026-02-16)"));
        assert!(report.ends_with("like watching paint dry"));
    }

    #[test]
    fn empty_report_has_placeholder() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap();
        let report = failure_report(&Stats::default(), &[], Mood::default(), now, &chrono_tz::UTC);
        assert!(report.contains("None yet, but give it time."));
        assert!(report.contains("meeting rock-bottom expectations"));
        assert!("slightly-less-bad".parse::<Mood>().is_ok());
    }

    #[test]
    fn mood_responses_keep_full_wording() {
        assert_eq!(Mood::Awful.response(), "At least you're consistent in your misery.");
        assert_eq!(
            Mood::SlightlyLessBad.response(),
            "Setting the bar low and still struggling to reach it."
        );
    }
}
