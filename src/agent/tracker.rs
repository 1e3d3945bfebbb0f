//! Agent lifecycle tracker.
//!
//! Typed lifecycle operations over the ledger: creation, validated state
//! transitions, heartbeats, and slot attachment. The tracker owns the
//! transition rules: callers hand it an [`AgentEvent`] and the tracker
//! reads the current state, applies [`transition`], and persists the
//! result, so an illegal transition is rejected here rather than trusted
//! to every call site.
//!
//! Heartbeats update `last_activity` for liveness probing only; nothing
//! in this subsystem evicts a stale agent. Staleness detection belongs to
//! an external collaborator.

use super::{AgentEvent, AgentState, HOOK_SLOT, Role, transition};
use crate::error::{MusterError, Result};
use crate::ledger::{AgentRecord, Ledger};

/// Typed lifecycle operations for a convoy's agents.
pub struct Tracker<'a, L: Ledger + ?Sized> {
    ledger: &'a L,
}

impl<'a, L: Ledger + ?Sized> Tracker<'a, L> {
    /// Create a tracker over the given ledger.
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Create a new agent record in the Idle state, returning its id.
    pub fn create(&self, convoy_id: &str, role: Role) -> Result<String> {
        self.ledger.create_agent(convoy_id, role)
    }

    /// Fetch an agent record.
    pub fn get(&self, agent_id: &str) -> Result<AgentRecord> {
        self.ledger.show_agent(agent_id)
    }

    /// The agent's current lifecycle state.
    pub fn state(&self, agent_id: &str) -> Result<AgentState> {
        Ok(self.ledger.show_agent(agent_id)?.state)
    }

    /// Apply a lifecycle event, persisting and returning the new state.
    ///
    /// Rejects illegal transitions with a `Validation` error before
    /// anything is written.
    pub fn apply(&self, agent_id: &str, event: AgentEvent) -> Result<AgentState> {
        let current = self.state(agent_id)?;
        let next = transition(current, event)
            .map_err(|e| MusterError::Validation(format!("agent {}: {}", agent_id, e)))?;
        self.ledger.set_agent_state(agent_id, next)?;
        Ok(next)
    }

    /// Update the agent's last-activity timestamp.
    pub fn heartbeat(&self, agent_id: &str) -> Result<()> {
        self.ledger.touch_agent(agent_id)
    }

    /// List agents, optionally restricted to a convoy.
    pub fn list(&self, convoy_id: Option<&str>) -> Result<Vec<AgentRecord>> {
        self.ledger.list_agents(convoy_id)
    }

    /// Set an agent's auxiliary state label.
    pub fn set_label(&self, agent_id: &str, label: &str) -> Result<()> {
        self.ledger.set_agent_label(agent_id, label)
    }

    // -- slots --------------------------------------------------------------

    /// Read a named slot. Returns `None` for an empty slot.
    pub fn slot(&self, agent_id: &str, name: &str) -> Result<Option<String>> {
        self.ledger.slot_get(agent_id, name)
    }

    /// Set a named slot (single value, last-write-wins, no history).
    pub fn set_slot(&self, agent_id: &str, name: &str, value: &str) -> Result<()> {
        self.ledger.slot_set(agent_id, name, value)
    }

    /// Clear a named slot.
    pub fn clear_slot(&self, agent_id: &str, name: &str) -> Result<()> {
        self.ledger.slot_clear(agent_id, name)
    }

    /// The task the agent is currently working, from its hook slot.
    pub fn hooked_task(&self, agent_id: &str) -> Result<Option<String>> {
        self.slot(agent_id, HOOK_SLOT)
    }
}
