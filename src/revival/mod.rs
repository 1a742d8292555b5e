//! Resurrection economy: the controller's resource pool, per-encounter
//! health ledgers, and rank-priced revival with batched settlement.
//!
//! Cost scales up with the dead agent's rank and down with the local
//! controller's rank; at the top of the controller ladder revival is free.
//! Batch settlement exists for correctness at scale: hundreds of deaths in
//! one tick must settle against the pool with a single read and a single
//! write, not one round-trip per corpse.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::agents::{Agent, AgentId};
use crate::core::constants::*;
use crate::error::{SimError, SimResult};
use crate::ranks::{RankIndex, RankLadder};

/// Per-agent HP entry inside one encounter.
///
/// An entry at 0 HP means "dead, awaiting revival or cleanup"; absence
/// means the agent was never assigned here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthEntry {
    pub hp: u32,
    pub max_hp: u32,
}

/// Per-encounter mapping of assigned agents to their HP.
#[derive(Debug, Clone, Default)]
pub struct HealthLedger {
    entries: HashMap<AgentId, HealthEntry>,
}

impl HealthLedger {
    /// Lazily creates the entry for a newly assigned agent at full HP.
    /// An existing entry (including a dead one) is left untouched.
    pub fn ensure(&mut self, agent: &Agent) {
        self.entries.entry(agent.id).or_insert_with(|| HealthEntry {
            hp: agent.max_hp(),
            max_hp: agent.max_hp(),
        });
    }

    /// Drops entries for agents no longer in `assigned`.
    pub fn prune_except(&mut self, assigned: &HashSet<AgentId>) {
        self.entries.retain(|id, _| assigned.contains(id));
    }

    pub fn get(&self, id: AgentId) -> Option<HealthEntry> {
        self.entries.get(&id).copied()
    }

    pub fn is_alive(&self, id: AgentId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.hp > 0)
    }

    pub fn alive_count(&self) -> usize {
        self.entries.values().filter(|e| e.hp > 0).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies `amount` damage, flooring at 0. Returns true if this call
    /// killed the agent (was alive, now at 0).
    pub fn apply_damage(&mut self, id: AgentId, amount: u32) -> bool {
        if let Some(entry) = self.entries.get_mut(&id) {
            let was_alive = entry.hp > 0;
            entry.hp = entry.hp.saturating_sub(amount);
            return was_alive && entry.hp == 0;
        }
        false
    }

    /// Restores an agent to full HP.
    pub fn restore_full(&mut self, id: AgentId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.hp = entry.max_hp;
        }
    }

    /// Every tracked agent id, dead or alive.
    pub fn ids(&self) -> Vec<AgentId> {
        self.entries.keys().copied().collect()
    }

    /// Ids of agents currently alive, for combat participation.
    pub fn alive_ids(&self) -> Vec<AgentId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.hp > 0)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Ephemeral per-tick set of agents that died this tick. Prevents the same
/// death being settled twice inside one tick; cleared every tick.
#[derive(Debug, Default)]
pub struct ReviveLedger {
    died_this_tick: HashSet<AgentId>,
}

impl ReviveLedger {
    /// Records a death; returns false if it was already recorded this tick.
    pub fn record(&mut self, id: AgentId) -> bool {
        self.died_this_tick.insert(id)
    }

    pub fn clear(&mut self) {
        self.died_this_tick.clear();
    }

    pub fn len(&self) -> usize {
        self.died_this_tick.len()
    }
}

/// The local controller's depletable resource. Mutated only inside tick
/// boundaries; regenerates over simulated time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    pub current: f64,
    pub max: f64,
    pub regen_per_second: f64,
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self {
            current: DEFAULT_RESOURCE_MAX,
            max: DEFAULT_RESOURCE_MAX,
            regen_per_second: RESOURCE_REGEN_PER_SECOND,
        }
    }
}

impl ResourcePool {
    pub fn new(max: f64, regen_per_second: f64) -> Self {
        Self {
            current: max,
            max,
            regen_per_second,
        }
    }

    pub fn regenerate(&mut self, elapsed_seconds: f64) {
        if elapsed_seconds > 0.0 {
            self.current = (self.current + self.regen_per_second * elapsed_seconds).min(self.max);
        }
    }
}

/// Fraction of the resource maximum a revival of this rank costs.
/// Monotone increasing up the ladder, capped at the full pool.
pub fn rank_cost_fraction(rank: RankIndex, ladder: &RankLadder) -> f64 {
    let idx = ladder.clamp(rank);
    (REVIVE_COST_FRACTION_BASE + REVIVE_COST_FRACTION_STEP * idx as f64).min(1.0)
}

/// Controller-rank discount on revival cost. Approaches 1.0 at the top of
/// the ladder: a top-rank controller revives for free.
pub fn rank_discount(controller_rank: RankIndex, ladder: &RankLadder) -> f64 {
    let top = ladder.top();
    if top == 0 {
        return 1.0;
    }
    let idx = ladder.clamp(controller_rank);
    (idx as f64 / top as f64).powf(REVIVE_DISCOUNT_EXPONENT)
}

/// Full revival cost for one agent.
pub fn revive_cost(
    agent_rank: RankIndex,
    controller_rank: RankIndex,
    ladder: &RankLadder,
    resource_max: f64,
) -> f64 {
    resource_max
        * rank_cost_fraction(agent_rank, ladder)
        * (1.0 - rank_discount(controller_rank, ladder))
}

/// Attempts to revive a single agent. Fails without any mutation if the
/// pool cannot cover the cost.
pub fn attempt_revive(
    ledger: &mut HealthLedger,
    pool: &mut ResourcePool,
    agent_id: AgentId,
    agent_rank: RankIndex,
    controller_rank: RankIndex,
    ladder: &RankLadder,
) -> SimResult<f64> {
    let cost = revive_cost(agent_rank, controller_rank, ladder, pool.max);
    if pool.current < cost {
        return Err(SimError::ResourceInsufficient {
            cost,
            available: pool.current,
        });
    }
    pool.current -= cost;
    ledger.restore_full(agent_id);
    Ok(cost)
}

/// Outcome of one batched revival settlement.
#[derive(Debug, Clone, Default)]
pub struct BatchReviveReport {
    pub revived: Vec<AgentId>,
    /// Agents left dead because the resource ran out.
    pub denied: Vec<AgentId>,
    pub spent: f64,
}

/// Settles a batch of same-tick deaths against the pool.
///
/// Highest-value (highest-rank) agents are revived first; the resource is
/// read once, drawn down locally, and written back exactly once regardless
/// of batch size or order.
pub fn revive_batch(
    ledger: &mut HealthLedger,
    pool: &mut ResourcePool,
    deaths: &[(AgentId, RankIndex)],
    controller_rank: RankIndex,
    ladder: &RankLadder,
) -> BatchReviveReport {
    let mut ordered: Vec<(AgentId, RankIndex)> = deaths.to_vec();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut remaining = pool.current;
    let mut report = BatchReviveReport::default();

    for (id, rank) in ordered {
        let cost = revive_cost(rank, controller_rank, ladder, pool.max);
        if remaining >= cost {
            remaining -= cost;
            report.spent += cost;
            ledger.restore_full(id);
            report.revived.push(id);
        } else {
            report.denied.push(id);
        }
    }

    // Single settlement write for the whole batch.
    pool.current = remaining;
    report
}
