use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_TITLE_CHARS: usize = 100;
pub const MIN_ESTIMATE_MINUTES: u32 = 1;
pub const MAX_ESTIMATE_MINUTES: u32 = 480;
pub const ABANDON_REASON: &str = "Gave up due to lack of motivation";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
    /// Anything unrecognised coming back from storage.
    #[serde(other)]
    Unknown,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Self::VeryHigh => 5,
            Self::High => 4,
            Self::Medium => 3,
            Self::Low => 2,
            Self::VeryLow => 1,
            Self::Unknown => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryLow => "very-low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very-high",
            Self::Unknown => "unknown",
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            Self::VeryHigh => "V.High",
            Self::High => "High",
            Self::Medium => "Med",
            Self::Low => "Low",
            Self::VeryLow => "V.Low",
            Self::Unknown => "?",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "very-low" | "vl" => Ok(Self::VeryLow),
            "low" | "l" => Ok(Self::Low),
            "medium" | "med" | "m" => Ok(Self::Medium),
            "high" | "h" => Ok(Self::High),
            "very-high" | "vh" => Ok(Self::VeryHigh),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Shopping,
    Health,
    #[default]
    Miscellaneous,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::Work,
        Self::Personal,
        Self::Shopping,
        Self::Health,
        Self::Miscellaneous,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Shopping => "shopping",
            Self::Health => "health",
            Self::Miscellaneous => "miscellaneous",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == wanted || (wanted == "misc" && *category == Self::Miscellaneous))
            .ok_or_else(|| anyhow!("unknown category: {wanted}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: u64,

    pub title: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub category: Category,

    #[serde(default)]
    pub estimated_minutes: Option<u32>,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub completed: bool,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Builds a pending task from an already validated draft.
    pub fn from_draft(id: u64, draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            priority: draft.priority,
            category: draft.category,
            estimated_minutes: draft.estimated_minutes,
            due_date: draft.due_date,
            notes: draft.notes,
            completed: false,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.map(|due| due < today).unwrap_or(false)
    }

    pub fn notes_or_empty(&self) -> &str {
        self.notes.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Pre-fills a draft from an existing record.
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            priority: task.priority,
            category: task.category,
            estimated_minutes: task.estimated_minutes,
            due_date: task.due_date,
            notes: task.notes.clone(),
        }
    }
}

/// Per-field overrides used by `edit`. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub estimated_minutes: Option<Option<u32>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub notes: Option<Option<String>>,
}

impl TaskPatch {
    pub fn apply(self, mut draft: TaskDraft) -> TaskDraft {
        if let Some(title) = self.title {
            draft.title = title;
        }
        if let Some(priority) = self.priority {
            draft.priority = priority;
        }
        if let Some(category) = self.category {
            draft.category = category;
        }
        if let Some(estimate) = self.estimated_minutes {
            draft.estimated_minutes = estimate;
        }
        if let Some(due) = self.due_date {
            draft.due_date = due;
        }
        if let Some(notes) = self.notes {
            draft.notes = notes;
        }
        draft
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbandonedTask {
    #[serde(flatten)]
    pub task: Task,
    pub abandoned_at: DateTime<Utc>,
    pub reason: String,
}
