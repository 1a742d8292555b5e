//! Agent allocation: splits the finite agent pool across active encounters
//! by weighted priority, with rebalancing hysteresis.
//!
//! Assignment is by id only; an agent reference appears in at most one
//! record at a time, and records are rebuilt wholesale on a TTL or on
//! explicit invalidation rather than patched incrementally. The allocator
//! always works from a stable snapshot of the pool taken before any record
//! is mutated.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::agents::{Agent, AgentId};
use crate::core::constants::*;
use crate::encounter::types::{Encounter, EncounterKey};
use crate::ranks::ScalingTables;

/// Combat score used to order agents during allocation: rank power times
/// the weighted stat sum.
pub fn combat_score(agent: &Agent, tables: &ScalingTables) -> f64 {
    tables.rank_power(agent.rank) * agent.stats.weighted_sum()
}

/// One encounter's current assignment.
#[derive(Debug, Clone, Default)]
pub struct AssignmentRecord {
    /// Assigned agents, strongest first.
    pub agents: Vec<AgentId>,
    /// Aggregate combat score of the assigned agents.
    pub power: f64,
    /// The power this encounter's weight share entitled it to.
    pub expected_power: f64,
    /// Mean |agent rank − encounter rank| across assignments.
    pub avg_rank_distance: f64,
}

/// Outcome of one full allocation pass.
#[derive(Debug, Clone, Default)]
pub struct AllocationReport {
    pub encounters: usize,
    pub agents_assigned: usize,
    /// Demand the pool could not cover. Encounters are under-assigned and
    /// proceed at reduced effectiveness; this is informational.
    pub shortfall: usize,
    /// Encounters whose pressure factor moved enough to rescale HP ranges.
    pub rescaled: Vec<EncounterKey>,
}

pub struct Allocator {
    records: HashMap<EncounterKey, AssignmentRecord>,
    last_full_pass: Option<f64>,
    last_rebalance_check: HashMap<EncounterKey, f64>,
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            last_full_pass: None,
            last_rebalance_check: HashMap::new(),
        }
    }

    pub fn assignment_for(&self, key: &EncounterKey) -> Option<&AssignmentRecord> {
        self.records.get(key)
    }

    /// Drops the TTL so the next [`Allocator::reallocate`] call runs a full
    /// pass. Wired to encounter creation and pool-change notifications.
    pub fn invalidate(&mut self) {
        self.last_full_pass = None;
    }

    /// Drops bookkeeping for a torn-down encounter.
    pub fn remove(&mut self, key: &EncounterKey) {
        self.records.remove(key);
        self.last_rebalance_check.remove(key);
    }

    /// Rebuilds every assignment record from a stable pool snapshot.
    ///
    /// No-op (returns `None`) while the TTL cache is valid and `force` is
    /// false. Otherwise: weight each live encounter, convert weights to
    /// target counts over the pool size, then greedily hand the
    /// highest-scoring unassigned agents to each encounter, preferring
    /// agents within a narrow rank window and widening it until the target
    /// is met or the pool runs dry.
    pub fn reallocate(
        &mut self,
        encounters: &mut HashMap<EncounterKey, Encounter>,
        pool: &[Agent],
        tables: &ScalingTables,
        now: f64,
        force: bool,
    ) -> Option<AllocationReport> {
        if !force {
            if let Some(stamp) = self.last_full_pass {
                if now - stamp < ALLOCATION_TTL_SECONDS {
                    return None;
                }
            }
        }
        self.last_full_pass = Some(now);

        // Stable snapshot: index by id once; nothing below touches the
        // caller's pool again.
        let agent_by_id: HashMap<AgentId, &Agent> = pool.iter().map(|a| (a.id, a)).collect();
        let mut ranked_pool: Vec<&Agent> = pool.iter().collect();
        ranked_pool.sort_by(|a, b| {
            combat_score(b, tables)
                .partial_cmp(&combat_score(a, tables))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        let total_pool_power: f64 = ranked_pool.iter().map(|a| combat_score(a, tables)).sum();

        // Weight live encounters; deterministic order (weight desc, key).
        let mut weighted: Vec<(EncounterKey, f64)> = encounters
            .values()
            .filter(|e| e.phase.is_live())
            .map(|e| {
                let weight = ((e.rank + 1) as f64).powf(WEIGHT_RANK_EXPONENT) * e.urgency();
                (e.key.clone(), weight)
            })
            .collect();
        weighted.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        if weighted.is_empty() {
            self.records.clear();
            return Some(AllocationReport::default());
        }

        let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
        let targets = share_targets(&weighted, total_weight, pool.len());

        // Single assigned-id set across all encounters guarantees the
        // exclusivity invariant for the whole pass.
        let mut assigned: HashSet<AgentId> = HashSet::new();
        let mut report = AllocationReport {
            encounters: weighted.len(),
            ..AllocationReport::default()
        };
        let mut new_records: HashMap<EncounterKey, AssignmentRecord> = HashMap::new();

        for ((key, weight), target) in weighted.iter().zip(targets.iter()) {
            let enc_rank = encounters
                .get(key)
                .map(|e| e.rank)
                .expect("weighted keys come from the live map");

            let mut picked: Vec<AgentId> = Vec::with_capacity(*target);

            // Widening rank-distance passes, then an unbounded sweep.
            let windows = RANK_WINDOW_PASSES
                .iter()
                .copied()
                .chain(std::iter::once(usize::MAX));
            for window in windows {
                if picked.len() >= *target {
                    break;
                }
                for agent in &ranked_pool {
                    if picked.len() >= *target {
                        break;
                    }
                    if assigned.contains(&agent.id) {
                        continue;
                    }
                    if rank_distance(agent.rank, enc_rank) <= window {
                        assigned.insert(agent.id);
                        picked.push(agent.id);
                    }
                }
            }

            if picked.len() < *target {
                report.shortfall += *target - picked.len();
            }
            report.agents_assigned += picked.len();

            let power: f64 = picked
                .iter()
                .filter_map(|id| agent_by_id.get(id))
                .map(|a| combat_score(a, tables))
                .sum();
            let avg_rank_distance = if picked.is_empty() {
                0.0
            } else {
                picked
                    .iter()
                    .filter_map(|id| agent_by_id.get(id))
                    .map(|a| rank_distance(a.rank, enc_rank) as f64)
                    .sum::<f64>()
                    / picked.len() as f64
            };

            new_records.insert(
                key.clone(),
                AssignmentRecord {
                    agents: picked,
                    power,
                    expected_power: weight / total_weight * total_pool_power,
                    avg_rank_distance,
                },
            );
        }

        if report.shortfall > 0 {
            warn!(
                shortfall = report.shortfall,
                encounters = report.encounters,
                "agent pool short of weighted demand; under-assigning"
            );
        }

        self.records = new_records;

        // Apply summaries, ledgers and pressure to the encounters.
        for (key, record) in &self.records {
            let Some(enc) = encounters.get_mut(key) else {
                continue;
            };
            enc.assignment.agent_count = record.agents.len();
            enc.assignment.combat_power = record.power;

            let keep: HashSet<AgentId> = record.agents.iter().copied().collect();
            for id in &record.agents {
                if let Some(agent) = agent_by_id.get(id) {
                    enc.health.ensure(agent);
                }
            }
            enc.health.prune_except(&keep);

            if apply_pressure(enc, record.power, tables) {
                report.rescaled.push(key.clone());
            }
        }

        Some(report)
    }

    /// Throttled rebalance check for one encounter. Returns true when a
    /// forced full pass is warranted: assigned power persistently below the
    /// expected share, or rank drift past the window.
    pub fn needs_rebalance(&mut self, enc: &Encounter, now: f64) -> bool {
        let last = self
            .last_rebalance_check
            .get(&enc.key)
            .copied()
            .unwrap_or(f64::NEG_INFINITY);
        if now - last < REBALANCE_MIN_INTERVAL_SECONDS {
            return false;
        }
        self.last_rebalance_check.insert(enc.key.clone(), now);

        let Some(record) = self.records.get(&enc.key) else {
            return true;
        };
        let starved = record.expected_power > 0.0
            && record.power < record.expected_power * POWER_SHORTFALL_RATIO;
        let drifted = record.avg_rank_distance > RANK_DRIFT_MAX;
        if starved || drifted {
            debug!(
                key = %enc.key,
                starved,
                drifted,
                "rebalance triggered"
            );
        }
        starved || drifted
    }
}

fn rank_distance(a: usize, b: usize) -> usize {
    a.abs_diff(b)
}

/// Largest-remainder rounding of weight shares into whole agent counts.
fn share_targets(weighted: &[(EncounterKey, f64)], total_weight: f64, pool_size: usize) -> Vec<usize> {
    if total_weight <= 0.0 {
        return vec![0; weighted.len()];
    }
    let exact: Vec<f64> = weighted
        .iter()
        .map(|(_, w)| w / total_weight * pool_size as f64)
        .collect();
    let mut targets: Vec<usize> = exact.iter().map(|x| x.floor() as usize).collect();
    let assigned: usize = targets.iter().sum();
    let mut leftover = pool_size.saturating_sub(assigned);

    let mut by_remainder: Vec<usize> = (0..exact.len()).collect();
    by_remainder.sort_by(|&i, &j| {
        let ri = exact[i] - exact[i].floor();
        let rj = exact[j] - exact[j].floor();
        rj.partial_cmp(&ri).unwrap_or(std::cmp::Ordering::Equal)
    });
    for idx in by_remainder {
        if leftover == 0 {
            break;
        }
        targets[idx] += 1;
        leftover -= 1;
    }
    targets
}

/// Recomputes the encounter's pressure factor from its assigned power and,
/// when it moved materially, rescales population and boss HP ranges
/// proportionally so relative progress is preserved.
fn apply_pressure(enc: &mut Encounter, power: f64, tables: &ScalingTables) -> bool {
    let reference = tables.rank_power(enc.rank) * PRESSURE_REFERENCE_POWER;
    let new_factor = if reference > 0.0 {
        (power / reference).clamp(PRESSURE_MIN, PRESSURE_MAX)
    } else {
        1.0
    };

    let old = enc.pressure_factor;
    let change = if old > 0.0 {
        ((new_factor - old) / old).abs()
    } else {
        1.0
    };
    if change <= PRESSURE_RESCALE_THRESHOLD {
        return false;
    }

    let ratio = new_factor / old;
    enc.pressure_factor = new_factor;
    enc.boss.rescale_hp(ratio);
    for mob in &mut enc.population.mobs {
        mob.rescale_hp(ratio);
    }
    true
}
