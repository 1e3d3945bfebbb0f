//! Convoy plan document model for muster.
//!
//! This module provides parsing and serialization of plan documents: the
//! external text form of a convoy's task graph. A plan uses a
//! `---`-delimited frontmatter block for the convoy meta map, followed by
//! markdown sections of task entries:
//!
//! ```text
//! ---
//! convoy: cv-12
//! title: Port the wire codec
//! ---
//!
//! ## Planning
//!
//! - [x] planner: draft the execution plan
//!
//! ## Execution
//!
//! - [ ] worker-1: implement the frame parser
//!   - depends: planner
//! - [~] worker-2: port the handshake
//!   - depends: planner
//! ```
//!
//! Parsing and serialization round-trip: section names and order, task
//! names, statuses, and notes, and the meta map all survive unchanged.
//!
//! Task names are role names with an optional instance number
//! (`worker-2`); they are normalized to lowercase at parse time and must
//! be unique within the plan.

use crate::agent::Role;
use crate::error::{MusterError, Result};

mod mutations;

/// The section holding seed tasks created with the convoy.
///
/// Every other section holds execution tasks; a convoy is only complete
/// once a non-empty execution task list is fully Completed.
pub const SEED_SECTION: &str = "Planning";

/// Status of a task in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Not yet started.
    Pending,
    /// Assigned to a worker.
    Active,
    /// Finished; never revisited.
    Completed,
    /// Stopped on a failure; a later pass or a human may retry.
    Blocked,
}

impl TaskStatus {
    /// The status marker used inside the `[ ]` brackets of a task line.
    pub fn marker(self) -> char {
        match self {
            TaskStatus::Pending => ' ',
            TaskStatus::Active => '~',
            TaskStatus::Completed => 'x',
            TaskStatus::Blocked => '!',
        }
    }

    /// Parse a status from its marker character.
    pub fn from_marker(c: char) -> Option<TaskStatus> {
        match c {
            ' ' => Some(TaskStatus::Pending),
            '~' => Some(TaskStatus::Active),
            'x' => Some(TaskStatus::Completed),
            '!' => Some(TaskStatus::Blocked),
            _ => None,
        }
    }

    /// The lowercase name of this status.
    pub fn name(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }

    /// Parse a status from its lowercase name.
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "active" => Some(TaskStatus::Active),
            "completed" => Some(TaskStatus::Completed),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An insertion-ordered key/value log.
///
/// One entry per key: setting an existing key overwrites its value in
/// place, preserving the key's original position. Used for task notes and
/// for the plan meta map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notes {
    entries: Vec<(String, String)>,
}

impl Notes {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, overwriting in place if it already exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A task in a convoy plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Normalized (lowercase) task name: role plus optional instance
    /// number, e.g. `worker-2`.
    pub name: String,

    /// The role that executes this task, derived from the name.
    pub role: Role,

    /// Instance number, if the name carries one.
    pub instance: Option<u32>,

    /// Human-readable description.
    pub description: String,

    /// Current status.
    pub status: TaskStatus,

    /// Keyed note log. The `depends` note holds the comma-separated
    /// dependency list.
    pub notes: Notes,
}

impl Task {
    /// Create a Pending task with no notes.
    pub fn new(name: &str, description: impl Into<String>) -> Result<Self> {
        let normalized = name.to_ascii_lowercase();
        let (role, instance) = parse_task_name(&normalized)?;
        Ok(Self {
            name: normalized,
            role,
            instance,
            description: description.into(),
            status: TaskStatus::Pending,
            notes: Notes::new(),
        })
    }

    /// The dependency set of this task: the `depends` note parsed as a
    /// comma-separated list, each entry normalized to lowercase.
    pub fn dependencies(&self) -> Vec<String> {
        match self.notes.get("depends") {
            Some(value) => value
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// A named section of a plan, holding tasks in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name as written in the `##` heading.
    pub name: String,

    /// Tasks in insertion order.
    pub tasks: Vec<Task>,
}

/// A parsed convoy plan document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    /// The meta map from the YAML frontmatter, in document order.
    pub meta: Notes,

    /// Sections in document order.
    pub sections: Vec<Section>,
}

impl Plan {
    /// Parse a plan document from its content string.
    ///
    /// The content must start with `---`-delimited YAML frontmatter (the
    /// meta map), followed by zero or more `## Section` blocks of task
    /// lines. Any other non-blank line is a parse error. Task names must
    /// be unique case-insensitively across the whole plan.
    pub fn parse(content: &str) -> Result<Self> {
        let normalized = content.replace("\r\n", "\n");
        let (meta, rest) = parse_frontmatter(&normalized)?;

        let mut sections: Vec<Section> = Vec::new();
        let mut seen_names: Vec<String> = Vec::new();

        for (lineno, line) in rest.lines().enumerate() {
            // lineno is relative to the end of the frontmatter; good
            // enough to locate the problem.
            if line.trim().is_empty() {
                continue;
            }

            if let Some(heading) = line.strip_prefix("## ") {
                let name = heading.trim();
                if name.is_empty() {
                    return Err(MusterError::User(format!(
                        "plan line {}: section heading has no name",
                        lineno + 1
                    )));
                }
                sections.push(Section {
                    name: name.to_string(),
                    tasks: Vec::new(),
                });
                continue;
            }

            if let Some(note_line) = line.strip_prefix("  - ") {
                let task = sections
                    .last_mut()
                    .and_then(|s| s.tasks.last_mut())
                    .ok_or_else(|| {
                        MusterError::User(format!(
                            "plan line {}: note line without a preceding task",
                            lineno + 1
                        ))
                    })?;
                let (key, value) = split_key_value(note_line).ok_or_else(|| {
                    MusterError::User(format!(
                        "plan line {}: note line must be '- key: value'",
                        lineno + 1
                    ))
                })?;
                task.notes.set(key, value);
                continue;
            }

            if let Some(task_line) = line.strip_prefix("- ") {
                let section = sections.last_mut().ok_or_else(|| {
                    MusterError::User(format!(
                        "plan line {}: task line before any section heading",
                        lineno + 1
                    ))
                })?;
                let task = parse_task_line(task_line, lineno + 1)?;

                if seen_names.contains(&task.name) {
                    return Err(MusterError::User(format!(
                        "plan line {}: duplicate task name '{}' (names are case-insensitive)",
                        lineno + 1,
                        task.name
                    )));
                }
                seen_names.push(task.name.clone());
                section.tasks.push(task);
                continue;
            }

            return Err(MusterError::User(format!(
                "plan line {}: unrecognized line: {}",
                lineno + 1,
                line
            )));
        }

        Ok(Plan { meta, sections })
    }

    /// Serialize the plan back to its document form.
    ///
    /// The output parses back to an identical plan.
    pub fn to_document(&self) -> String {
        let mut out = String::from("---\n");
        for (key, value) in self.meta.iter() {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        out.push_str("---\n");

        for section in &self.sections {
            out.push_str(&format!("\n## {}\n\n", section.name));
            for task in &section.tasks {
                out.push_str(&format!(
                    "- [{}] {}: {}\n",
                    task.status.marker(),
                    task.name,
                    task.description
                ));
                for (key, value) in task.notes.iter() {
                    out.push_str(&format!("  - {}: {}\n", key, value));
                }
            }
        }

        out
    }

    /// Iterate all tasks in section order, insertion order within each
    /// section. This is the stable enumeration order the scheduler uses.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.sections.iter().flat_map(|s| s.tasks.iter())
    }

    /// Iterate execution tasks: every task outside the seed section.
    pub fn execution_tasks(&self) -> impl Iterator<Item = &Task> {
        self.sections
            .iter()
            .filter(|s| s.name != SEED_SECTION)
            .flat_map(|s| s.tasks.iter())
    }

    /// Find a task by name, case-insensitively.
    pub fn find_task(&self, name: &str) -> Option<&Task> {
        let normalized = name.to_ascii_lowercase();
        self.tasks().find(|t| t.name == normalized)
    }

    /// The convoy id from the meta map, if present.
    pub fn convoy_id(&self) -> Option<&str> {
        self.meta.get("convoy")
    }

    /// The convoy title from the meta map, if present.
    pub fn title(&self) -> Option<&str> {
        self.meta.get("title")
    }
}

/// Parse a task name into its role and optional instance number.
///
/// Valid names are a role name optionally followed by `-<n>`:
/// `planner`, `worker-1`, `reviewer-12`.
pub fn parse_task_name(name: &str) -> Result<(Role, Option<u32>)> {
    let invalid = || {
        MusterError::User(format!(
            "invalid task name '{}': expected a role name with an optional \
             instance number (e.g. 'worker-2').\n\
             Roles: coordinator, planner, lead, worker, reviewer, tester, \
             auditor, monitor.",
            name
        ))
    };

    if let Some(role) = Role::parse(name) {
        return Ok((role, None));
    }

    let (role_part, instance_part) = name.rsplit_once('-').ok_or_else(invalid)?;
    let role = Role::parse(role_part).ok_or_else(invalid)?;
    let instance: u32 = instance_part.parse().map_err(|_| invalid())?;
    Ok((role, Some(instance)))
}

/// Parse the `---`-delimited frontmatter, returning the meta map and the
/// remaining document body.
///
/// The meta map is flat `key: value` lines. Parsing is line-based (not a
/// full YAML document) so values containing colons round-trip exactly.
fn parse_frontmatter(content: &str) -> Result<(Notes, &str)> {
    let rest = content.strip_prefix("---\n").ok_or_else(|| {
        MusterError::User("plan document must start with '---' frontmatter delimiter".to_string())
    })?;

    let mut meta = Notes::new();
    let mut offset = 0;

    loop {
        let line_end = rest[offset..]
            .find('\n')
            .map(|p| offset + p)
            .ok_or_else(|| {
                MusterError::User(
                    "plan document missing closing '---' frontmatter delimiter".to_string(),
                )
            })?;
        let line = &rest[offset..line_end];
        offset = line_end + 1;

        if line.trim_end() == "---" {
            break;
        }

        if line.trim().is_empty() {
            continue;
        }

        let (key, value) = split_key_value(line).ok_or_else(|| {
            MusterError::User(format!(
                "plan frontmatter line must be 'key: value': {}",
                line
            ))
        })?;
        meta.set(key, value);
    }

    let body = rest[offset..].strip_prefix('\n').unwrap_or(&rest[offset..]);
    Ok((meta, body))
}

/// Parse a task line (after the leading `- `): `[M] name: description`.
fn parse_task_line(line: &str, lineno: usize) -> Result<Task> {
    let malformed = |what: &str| {
        MusterError::User(format!(
            "plan line {}: {}: {}",
            lineno, what, line
        ))
    };

    let rest = line
        .strip_prefix('[')
        .ok_or_else(|| malformed("task line must start with a status marker"))?;
    let (marker, rest) = {
        let mut chars = rest.chars();
        let marker = chars
            .next()
            .ok_or_else(|| malformed("task line must start with a status marker"))?;
        let rest = chars
            .as_str()
            .strip_prefix("] ")
            .ok_or_else(|| malformed("task line must start with a status marker"))?;
        (marker, rest)
    };

    let status = TaskStatus::from_marker(marker)
        .ok_or_else(|| malformed("unknown status marker"))?;

    let (name, description) = split_key_value(rest)
        .ok_or_else(|| malformed("task line must be '[M] name: description'"))?;

    let mut task = Task::new(&name, description)?;
    task.status = status;
    Ok(task)
}

/// Split `key: value` at the first colon, trimming both parts.
fn split_key_value(s: &str) -> Option<(String, String)> {
    let (key, value) = s.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}
