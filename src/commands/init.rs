//! Implementation of the `muster init` command.

use crate::config::Config;
use crate::context::{ExecContext, STATE_DIR};
use crate::error::{MusterError, Result};
use crate::events::{Event, EventAction, append_event};
use serde_json::json;
use std::env;
use std::fs;

/// Initialize a muster workspace in the current directory.
///
/// Creates `.muster/` with a default `config.yaml` and the events
/// directory. Running it twice is an error: an existing workspace is
/// never overwritten.
pub fn cmd_init() -> Result<()> {
    let cwd = env::current_dir()
        .map_err(|e| MusterError::User(format!("failed to get current working directory: {}", e)))?;

    let state_dir = cwd.join(STATE_DIR);
    if state_dir.exists() {
        return Err(MusterError::User(format!(
            "muster workspace already initialized at '{}'",
            state_dir.display()
        )));
    }

    fs::create_dir_all(&state_dir).map_err(|e| {
        MusterError::User(format!(
            "failed to create state directory '{}': {}",
            state_dir.display(),
            e
        ))
    })?;

    let config = Config::default();
    let config_path = state_dir.join("config.yaml");
    fs::write(&config_path, config.to_yaml()?).map_err(|e| {
        MusterError::User(format!(
            "failed to write config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let ctx = ExecContext::resolve_from(&cwd)?;
    append_event(
        &ctx,
        &Event::new(EventAction::Init).with_details(json!({
            "workspace": ctx.workspace_root.to_string_lossy(),
        })),
    )?;

    println!("Initialized muster workspace at {}", state_dir.display());
    println!();
    println!("Next steps:");
    println!("  muster convoy new \"<title>\" --description \"<what and why>\"");
    println!("  muster schedule --convoy <id>");

    Ok(())
}
