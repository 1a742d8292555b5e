//! Agents and the external agent-pool collaborator.
//!
//! Agents are reusable, persistent combat participants owned by an external
//! system: the core never creates or destroys one, it only assigns them.
//! [`AgentSource`] is the collaborator boundary; [`CachedAgentPool`] puts
//! the short TTL caches in front of it and handles pool-change
//! invalidation.

use serde::{Deserialize, Serialize};

use crate::combat::types::StatBlock;
use crate::ranks::RankIndex;

/// Stable id for an agent, assigned by the external pool.
pub type AgentId = u64;

/// A reusable combat participant drawn from the shared pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub rank: RankIndex,
    pub stats: StatBlock,
}

impl Agent {
    /// Base HP of an agent when first assigned to an encounter.
    pub fn max_hp(&self) -> u32 {
        80 + self.stats.vitality * 12
    }
}

/// External collaborator exposing the agent pool.
///
/// Calls may be arbitrarily expensive (the real pool lives behind storage),
/// which is why the core only talks to it through [`CachedAgentPool`].
pub trait AgentSource {
    fn agent_count(&self) -> usize;
    fn all_agents(&self) -> Vec<Agent>;
}

/// TTL-cached front for an [`AgentSource`].
///
/// Count and list are cached independently (the count is asked far more
/// often). `notify_changed` is wired to the external "agent-pool-changed"
/// notification and drops both caches.
pub struct CachedAgentPool {
    source: Box<dyn AgentSource>,
    count_ttl: f64,
    list_ttl: f64,
    cached_count: Option<(f64, usize)>,
    cached_list: Option<(f64, Vec<Agent>)>,
}

impl CachedAgentPool {
    pub fn new(source: Box<dyn AgentSource>, count_ttl: f64, list_ttl: f64) -> Self {
        Self {
            source,
            count_ttl,
            list_ttl,
            cached_count: None,
            cached_list: None,
        }
    }

    /// Pool size, served from cache within the TTL.
    pub fn agent_count(&mut self, now: f64) -> usize {
        if let Some((stamp, count)) = self.cached_count {
            if now - stamp < self.count_ttl {
                return count;
            }
        }
        let count = self.source.agent_count();
        self.cached_count = Some((now, count));
        count
    }

    /// Full agent list. `use_cache = false` forces a refetch (used when an
    /// allocation pass must see the pool as it is right now).
    pub fn all_agents(&mut self, now: f64, use_cache: bool) -> &[Agent] {
        let fresh = use_cache
            && self
                .cached_list
                .as_ref()
                .is_some_and(|(stamp, _)| now - stamp < self.list_ttl);
        if !fresh {
            let list = self.source.all_agents();
            self.cached_count = Some((now, list.len()));
            self.cached_list = Some((now, list));
        }
        &self.cached_list.as_ref().expect("list cached above").1
    }

    /// Invalidation hook for the external pool-changed notification.
    pub fn notify_changed(&mut self) {
        self.cached_count = None;
        self.cached_list = None;
    }
}

/// In-memory pool used by tests and the headless simulator.
#[derive(Debug, Clone, Default)]
pub struct StaticAgentPool {
    pub agents: Vec<Agent>,
}

impl StaticAgentPool {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self { agents }
    }
}

impl AgentSource for StaticAgentPool {
    fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn all_agents(&self) -> Vec<Agent> {
        self.agents.clone()
    }
}
