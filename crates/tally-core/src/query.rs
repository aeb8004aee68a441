use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::trace;

use crate::task::{Category, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Pending,
}

impl StatusFilter {
    fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Completed => task.completed,
            Self::Pending => !task.completed,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "completed" | "done" => Ok(Self::Completed),
            "pending" => Ok(Self::Pending),
            other => Err(anyhow!("unknown status filter: {other}")),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Completed => "completed",
            Self::Pending => "pending",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Only(category) => task.category == category,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        Ok(Self::Only(s.parse()?))
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(category) => write!(f, "{category}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Created,
    Priority,
    Category,
    DueDate,
    EstimatedTime,
    Title,
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "priority" => Ok(Self::Priority),
            "category" => Ok(Self::Category),
            "due-date" | "due" => Ok(Self::DueDate),
            "estimated-time" | "estimate" => Ok(Self::EstimatedTime),
            "title" => Ok(Self::Title),
            other => Err(anyhow!("unknown sort key: {other}")),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Priority => "priority",
            Self::Category => "category",
            Self::DueDate => "due-date",
            Self::EstimatedTime => "estimated-time",
            Self::Title => "title",
        })
    }
}

/// Filter and sort selection driving the visible list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewConfig {
    pub status: StatusFilter,
    pub category: CategoryFilter,
    pub search: String,
    pub sort: SortKey,
}

impl ViewConfig {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.matches(task) && self.category.matches(task) && matches_search(task, &self.search)
    }
}

fn matches_search(task: &Task, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    task.title.to_lowercase().contains(&needle)
        || task
            .notes
            .as_deref()
            .map(|notes| notes.to_lowercase().contains(&needle))
            .unwrap_or(false)
}

/// Tasks passing every predicate of `cfg`, in store order.
pub fn filter(tasks: &[Task], cfg: &ViewConfig) -> Vec<Task> {
    let out: Vec<Task> = tasks.iter().filter(|t| cfg.matches(t)).cloned().collect();
    trace!(before = tasks.len(), after = out.len(), "filtered tasks");
    out
}

/// Stable sort into a new sequence.
pub fn sort(tasks: &[Task], key: SortKey) -> Vec<Task> {
    let mut out = tasks.to_vec();
    out.sort_by(|a, b| compare(a, b, key));
    out
}

pub fn view(tasks: &[Task], cfg: &ViewConfig) -> Vec<Task> {
    sort(&filter(tasks, cfg), cfg.sort)
}

fn compare(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::Created => b.created_at.cmp(&a.created_at),
        SortKey::Priority => b.priority.rank().cmp(&a.priority.rank()),
        SortKey::Category => a.category.as_str().cmp(b.category.as_str()),
        SortKey::DueDate => match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortKey::EstimatedTime => a
            .estimated_minutes
            .unwrap_or(0)
            .cmp(&b.estimated_minutes.unwrap_or(0)),
        SortKey::Title => a.title.cmp(&b.title),
    }
}
