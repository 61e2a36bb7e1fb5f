//! The hierarchical task plan
//!
//! A controller mutates its plan through exactly two operations:
//! [`TaskPlan::add_subtask`] and [`TaskPlan::set_subtask_state`]. Task ids
//! are dotted index paths from the root ("0", "0.1", "0.1.2"); the root
//! itself has the empty id.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from plan mutations. Reported on the bus as error observations;
/// never fatal to the controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The id is not a dotted index path.
    #[error("Invalid task id: {0}")]
    InvalidTaskId(String),

    /// The path names no task in the tree.
    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

/// Lifecycle status of a plan task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Completed,
    Abandoned,
    Verified,
}

impl TaskStatus {
    /// Whether this status closes a task (no further work expected).
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Abandoned | TaskStatus::Verified
        )
    }
}

/// A node in the plan tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub goal: String,
    pub status: TaskStatus,
    pub subtasks: Vec<Task>,
}

impl Task {
    fn new(id: String, goal: impl Into<String>) -> Self {
        Self {
            id,
            goal: goal.into(),
            status: TaskStatus::Open,
            subtasks: Vec::new(),
        }
    }

    /// Set this task's status. Closing a task closes its still-open
    /// subtasks with the same status.
    fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        if status.is_closed() {
            for subtask in &mut self.subtasks {
                if !subtask.status.is_closed() {
                    subtask.set_status(status);
                }
            }
        }
    }
}

/// The task tree, rooted at an anonymous top-level goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    root: Task,
}

impl TaskPlan {
    /// Create a plan whose root carries the overall goal.
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            root: Task::new(String::new(), goal),
        }
    }

    /// The root task.
    pub fn root(&self) -> &Task {
        &self.root
    }

    /// Look up a task by its dotted id. The empty id is the root.
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        if task_id.is_empty() {
            return Some(&self.root);
        }
        let mut current = &self.root;
        for part in task_id.split('.') {
            let index: usize = part.parse().ok()?;
            current = current.subtasks.get(index)?;
        }
        Some(current)
    }

    /// Add a subtask with the given goal under `parent` (empty id for the
    /// root), plus one leaf child per entry in `subtasks`.
    pub fn add_subtask(
        &mut self,
        parent: &str,
        goal: &str,
        subtasks: Vec<String>,
    ) -> Result<(), PlanError> {
        let parent_task = self.task_mut(parent)?;
        let child_id = if parent_task.id.is_empty() {
            parent_task.subtasks.len().to_string()
        } else {
            format!("{}.{}", parent_task.id, parent_task.subtasks.len())
        };

        let mut child = Task::new(child_id.clone(), goal);
        for (index, sub_goal) in subtasks.into_iter().enumerate() {
            child
                .subtasks
                .push(Task::new(format!("{}.{}", child_id, index), sub_goal));
        }
        parent_task.subtasks.push(child);
        Ok(())
    }

    /// Set the status of the task at `task_id`.
    pub fn set_subtask_state(&mut self, task_id: &str, status: TaskStatus) -> Result<(), PlanError> {
        self.task_mut(task_id)?.set_status(status);
        Ok(())
    }

    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task, PlanError> {
        if task_id.is_empty() {
            return Ok(&mut self.root);
        }
        let mut current = &mut self.root;
        for part in task_id.split('.') {
            let index: usize = part
                .parse()
                .map_err(|_| PlanError::InvalidTaskId(task_id.to_string()))?;
            current = current
                .subtasks
                .get_mut(index)
                .ok_or_else(|| PlanError::TaskNotFound(task_id.to_string()))?;
        }
        Ok(current)
    }
}

impl Default for TaskPlan {
    fn default() -> Self {
        Self::new("")
    }
}
