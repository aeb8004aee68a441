use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Error, Field, Result};
use crate::task::{
    ABANDON_REASON, AbandonedTask, MAX_ESTIMATE_MINUTES, MAX_TITLE_CHARS, MIN_ESTIMATE_MINUTES,
    Task, TaskDraft, TaskPatch,
};

/// How `delete` disposes of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Permanent,
    Abandon,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Removed(Task),
    Abandoned(AbandonedTask),
    Kept(Task),
}

/// Owns the active tasks, the abandoned set and the id counter.
#[derive(Debug, Clone)]
pub struct TaskStore {
    tasks: Vec<Task>,
    abandoned: Vec<AbandonedTask>,
    next_id: u64,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            abandoned: Vec::new(),
            next_id: 1,
        }
    }
}

impl TaskStore {
    /// Rebuilds a store from persisted parts. The counter is bumped past
    /// any id already in use so ids are never handed out twice.
    pub fn from_parts(tasks: Vec<Task>, abandoned: Vec<AbandonedTask>, next_id: u64) -> Self {
        let highest = tasks
            .iter()
            .map(|t| t.id)
            .chain(abandoned.iter().map(|a| a.task.id))
            .max()
            .unwrap_or(0);
        let next_id = next_id.max(highest + 1);
        debug!(
            tasks = tasks.len(),
            abandoned = abandoned.len(),
            next_id,
            "restored task store"
        );
        Self {
            tasks,
            abandoned,
            next_id,
        }
    }

    pub fn snapshot(&self) -> &[Task] {
        &self.tasks
    }

    pub fn abandoned(&self) -> &[AbandonedTask] {
        &self.abandoned
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    #[tracing::instrument(skip(self, draft, now))]
    pub fn create(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Result<Task> {
        let draft = validate(draft)?;
        let id = self.next_id;
        self.next_id += 1;

        let task = Task::from_draft(id, draft, now);
        self.tasks.push(task.clone());
        info!(id, title = %task.title, "task created");
        Ok(task)
    }

    #[tracing::instrument(skip(self, now))]
    pub fn toggle_complete(&mut self, id: u64, now: DateTime<Utc>) -> Result<Task> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(Error::NotFound { id })?;

        task.completed = !task.completed;
        task.completed_at = task.completed.then_some(now);
        debug!(id, completed = task.completed, "toggled task");
        Ok(task.clone())
    }

    #[tracing::instrument(skip(self, now))]
    pub fn delete(
        &mut self,
        id: u64,
        disposition: Disposition,
        now: DateTime<Utc>,
    ) -> Result<DeleteOutcome> {
        let idx = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(Error::NotFound { id })?;

        let outcome = match disposition {
            Disposition::Cancel => DeleteOutcome::Kept(self.tasks[idx].clone()),
            Disposition::Permanent => DeleteOutcome::Removed(self.tasks.remove(idx)),
            Disposition::Abandon => {
                let abandoned = AbandonedTask {
                    task: self.tasks.remove(idx),
                    abandoned_at: now,
                    reason: ABANDON_REASON.to_string(),
                };
                self.abandoned.push(abandoned.clone());
                DeleteOutcome::Abandoned(abandoned)
            }
        };
        info!(id, ?disposition, "delete handled");
        Ok(outcome)
    }

    /// Replaces a task by removing it and creating a new one from the
    /// merged draft. The replacement gets a fresh id and creation time.
    #[tracing::instrument(skip(self, patch, now))]
    pub fn edit(&mut self, id: u64, patch: TaskPatch, now: DateTime<Utc>) -> Result<Task> {
        let existing = self.get(id).ok_or(Error::NotFound { id })?;
        let draft = validate(patch.apply(TaskDraft::from_task(existing)))?;

        self.tasks.retain(|t| t.id != id);
        let task = self.create(draft, now)?;
        info!(old_id = id, new_id = task.id, "task re-created by edit");
        Ok(task)
    }
}

fn validate(mut draft: TaskDraft) -> Result<TaskDraft> {
    draft.title = draft.title.trim().to_string();
    if draft.title.is_empty() {
        return Err(Error::validation(Field::Title, "description is required"));
    }

    let len = draft.title.chars().count();
    if len > MAX_TITLE_CHARS {
        return Err(Error::validation(
            Field::Title,
            format!("exceeds {MAX_TITLE_CHARS} characters (got {len})"),
        ));
    }

    if let Some(minutes) = draft.estimated_minutes
        && !(MIN_ESTIMATE_MINUTES..=MAX_ESTIMATE_MINUTES).contains(&minutes)
    {
        return Err(Error::validation(
            Field::EstimatedMinutes,
            format!("must be between {MIN_ESTIMATE_MINUTES} and {MAX_ESTIMATE_MINUTES} minutes"),
        ));
    }

    draft.notes = draft
        .notes
        .map(|notes| notes.trim().to_string())
        .filter(|notes| !notes.is_empty());

    Ok(draft)
}
