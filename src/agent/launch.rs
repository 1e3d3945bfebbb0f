//! Launch command construction for the agent runtime.
//!
//! Each worker pane runs a single shell-style invocation of the runtime
//! binary carrying the agent's identity: role, convoy, attached task,
//! optional external context path, optional resume flag, and an initial
//! instruction payload. The exact flag names are the runtime's contract;
//! everything here is quoted through shell-words so descriptions and
//! paths survive the shell.

use super::Role;
use shell_words::quote;

/// Everything needed to build a runtime launch command.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// The agent identity the process runs as.
    pub agent_id: String,
    /// The agent's role.
    pub role: Role,
    /// The owning convoy.
    pub convoy_id: String,
    /// The attached task's ledger id, if any.
    pub task_id: Option<String>,
    /// External context path from the convoy's `context:` label.
    pub context_path: Option<String>,
    /// When set, the runtime resumes the prior conversation of this
    /// agent id instead of starting fresh. Used by respawn.
    pub resume: bool,
    /// Initial instruction payload handed to the runtime.
    pub instruction: String,
}

impl LaunchSpec {
    /// Build the shell invocation string for this launch.
    ///
    /// The command carries the agent identity twice on purpose: flags for
    /// the runtime's own argument parsing, and `MUSTER_*` environment
    /// variables for anything the runtime spawns beneath itself.
    pub fn command(&self, runtime_bin: &str) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.push(format!("MUSTER_AGENT={}", quote(&self.agent_id)));
        parts.push(format!("MUSTER_ROLE={}", self.role.name()));
        if let Some(task_id) = &self.task_id {
            parts.push(format!("MUSTER_TASK={}", quote(task_id)));
        }

        parts.push(quote(runtime_bin).into_owned());
        parts.push("--role".to_string());
        parts.push(self.role.name().to_string());
        parts.push("--convoy".to_string());
        parts.push(quote(&self.convoy_id).into_owned());

        if let Some(task_id) = &self.task_id {
            parts.push("--task".to_string());
            parts.push(quote(task_id).into_owned());
        }

        if let Some(path) = &self.context_path {
            parts.push("--context".to_string());
            parts.push(quote(path).into_owned());
        }

        if self.resume {
            parts.push("--resume".to_string());
            parts.push(quote(&self.agent_id).into_owned());
        }

        parts.push(quote(&self.instruction).into_owned());

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            agent_id: "ag-3".to_string(),
            role: Role::Worker,
            convoy_id: "cv-7".to_string(),
            task_id: Some("cv-7/worker-1".to_string()),
            context_path: None,
            resume: false,
            instruction: "work your hooked task".to_string(),
        }
    }

    #[test]
    fn command_carries_identity_flags_and_env() {
        let cmd = spec().command("agentd");

        assert!(cmd.contains("MUSTER_AGENT=ag-3"));
        assert!(cmd.contains("MUSTER_ROLE=worker"));
        assert!(cmd.contains("MUSTER_TASK=cv-7/worker-1"));
        assert!(cmd.contains("agentd --role worker --convoy cv-7"));
        assert!(cmd.contains("--task cv-7/worker-1"));
        assert!(!cmd.contains("--resume"));
        assert!(!cmd.contains("--context"));
    }

    #[test]
    fn resume_flag_reuses_the_agent_id() {
        let mut s = spec();
        s.resume = true;
        let cmd = s.command("agentd");
        assert!(cmd.contains("--resume ag-3"));
    }

    #[test]
    fn context_path_is_passed_through() {
        let mut s = spec();
        s.context_path = Some("/work/brief.md".to_string());
        let cmd = s.command("agentd");
        assert!(cmd.contains("--context /work/brief.md"));
    }

    #[test]
    fn taskless_launch_omits_task_identity() {
        let mut s = spec();
        s.task_id = None;
        let cmd = s.command("agentd");
        assert!(!cmd.contains("MUSTER_TASK"));
        assert!(!cmd.contains("--task"));
    }

    #[test]
    fn instruction_is_shell_quoted() {
        let mut s = spec();
        s.instruction = "fix the parser; don't touch the codec".to_string();
        let cmd = s.command("agentd");

        // The instruction must arrive as a single argument.
        let args = shell_words::split(&cmd).unwrap();
        assert_eq!(
            args.last().map(String::as_str),
            Some("fix the parser; don't touch the codec")
        );
    }
}
