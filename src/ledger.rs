// omnipool_rs/src/ledger.rs
use crate::types::{get_or_zero, AgentId, Amount, Holdings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Holdings of the external parties trading against a pool.
///
/// Balances are signed; the ledger records flows and does not enforce solvency.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentLedger {
    agents: HashMap<AgentId, Holdings>,
}

impl AgentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holdings(&self, agent: &str) -> Option<&Holdings> {
        self.agents.get(agent)
    }

    pub fn balance(&self, agent: &str, asset: &str) -> Amount {
        self.agents
            .get(agent)
            .map(|h| get_or_zero(h, asset))
            .unwrap_or(0.0)
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentId> {
        self.agents.keys()
    }

    /// Adds `amount` (which may be negative) to an agent's balance, creating the agent on first use.
    pub fn credit(&mut self, agent: &str, asset: &str, amount: Amount) {
        *self
            .agents
            .entry(agent.to_string())
            .or_default()
            .entry(asset.to_string())
            .or_insert(0.0) += amount;
    }

    /// Mirrors a committed swap: the agent's change is the negation of the pool's change.
    pub fn apply(
        &mut self,
        agent: &str,
        asset_in: &str,
        asset_out: &str,
        delta_reserve_in: Amount,
        delta_reserve_out: Amount,
    ) {
        self.credit(agent, asset_in, -delta_reserve_in);
        self.credit(agent, asset_out, -delta_reserve_out);
    }
}
