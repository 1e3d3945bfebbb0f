//! Mutation helpers for common plan operations.

use super::{Plan, Section, Task, TaskStatus};
use crate::error::{MusterError, Result};
use chrono::{DateTime, Utc};

impl Plan {
    /// Append a section to the end of the plan.
    ///
    /// Returns an error if a section with that name already exists.
    pub fn add_section(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.sections.iter().any(|s| s.name == name) {
            return Err(MusterError::User(format!(
                "plan already has a section named '{}'",
                name
            )));
        }
        self.sections.push(Section {
            name,
            tasks: Vec::new(),
        });
        Ok(())
    }

    /// Append a task to a section, creating the section if needed.
    ///
    /// Returns an error if the task name collides (case-insensitively)
    /// with an existing task.
    pub fn add_task(&mut self, section_name: &str, task: Task) -> Result<()> {
        if self.find_task(&task.name).is_some() {
            return Err(MusterError::User(format!(
                "plan already has a task named '{}' (names are case-insensitive)",
                task.name
            )));
        }

        if !self.sections.iter().any(|s| s.name == section_name) {
            self.add_section(section_name)?;
        }

        let section = self
            .sections
            .iter_mut()
            .find(|s| s.name == section_name)
            .expect("section was just ensured to exist");
        section.tasks.push(task);
        Ok(())
    }

    /// Set the status of a task by name.
    pub fn set_status(&mut self, name: &str, status: TaskStatus) -> Result<()> {
        self.find_task_mut(name)?.status = status;
        Ok(())
    }

    /// Mark a task Completed and stamp a `completed` timestamp note.
    pub fn mark_completed(&mut self, name: &str, at: DateTime<Utc>) -> Result<()> {
        let task = self.find_task_mut(name)?;
        task.status = TaskStatus::Completed;
        task.notes.set("completed", at.to_rfc3339());
        Ok(())
    }

    /// Mark a task Blocked and record the error that blocked it.
    pub fn mark_blocked(&mut self, name: &str, error: &str) -> Result<()> {
        let task = self.find_task_mut(name)?;
        task.status = TaskStatus::Blocked;
        task.notes.set("error", error);
        Ok(())
    }

    fn find_task_mut(&mut self, name: &str) -> Result<&mut Task> {
        let normalized = name.to_ascii_lowercase();
        self.sections
            .iter_mut()
            .flat_map(|s| s.tasks.iter_mut())
            .find(|t| t.name == normalized)
            .ok_or_else(|| MusterError::not_found("task", name))
    }
}
