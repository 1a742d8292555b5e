//! The owning simulation context.
//!
//! One `SimulationContext` owns every piece of mutable simulation state:
//! the encounter arena, the allocator and its records, the spawner caches,
//! the scheduler, the resource pool and the persistence gateway. There is
//! no module-level state anywhere in the engine; embedders drive the
//! context from a single loop and all mutation happens synchronously
//! inside [`SimulationContext::tick`] and the explicit entry points.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};

use crate::agents::{Agent, AgentSource, CachedAgentPool};
use crate::allocator::Allocator;
use crate::combat::types::ControllerState;
use crate::core::catchup::{catch_up_encounter, gap_to_cycles, CatchupReport};
use crate::core::constants::*;
use crate::core::scheduler::TickScheduler;
use crate::core::tick::{
    controller_strike, run_combat_cycles, CombatDeps, TickEvent, TickReport,
};
use crate::encounter::logic::{
    archive_if_grace_expired, claim_bonus, fail_if_timed_out, BonusReward, BossAttackResult,
};
use crate::encounter::types::{Encounter, EncounterKey, Phase};
use crate::error::{SimError, SimResult};
use crate::ranks::{RankIndex, RankLadder, ScalingTables};
use crate::revival::{ResourcePool, ReviveLedger};
use crate::snapshot::{SnapshotEmitter, SnapshotSink};
use crate::spawner::{generate_boss, Spawner};
use crate::store::{StoreGateway, StoredRecord};

const ENCOUNTER_KEY_PREFIX: &str = "encounter/";
const PHASE_INDEX: &str = "phase";
const RANK_INDEX: &str = "rank";

pub struct SimulationContext {
    ladder: RankLadder,
    tables: ScalingTables,
    encounters: HashMap<EncounterKey, Encounter>,
    allocator: Allocator,
    spawner: Spawner,
    scheduler: TickScheduler,
    agent_pool: CachedAgentPool,
    resource: ResourcePool,
    controller: ControllerState,
    revive_ledger: ReviveLedger,
    emitter: SnapshotEmitter,
    sink: Box<dyn SnapshotSink>,
    gateway: Option<StoreGateway>,
    tick: u64,
    suspended_at: Option<i64>,
    shut_down: bool,
}

impl SimulationContext {
    pub fn new(
        agent_source: Box<dyn AgentSource>,
        controller: ControllerState,
        sink: Box<dyn SnapshotSink>,
        gateway: Option<StoreGateway>,
    ) -> Self {
        let ladder = RankLadder::default();
        let tables = ScalingTables::new(&ladder);
        Self {
            ladder,
            tables,
            encounters: HashMap::new(),
            allocator: Allocator::new(),
            spawner: Spawner::new(),
            scheduler: TickScheduler::new(),
            agent_pool: CachedAgentPool::new(
                agent_source,
                AGENT_COUNT_TTL_SECONDS,
                AGENT_LIST_TTL_SECONDS,
            ),
            resource: ResourcePool::default(),
            controller,
            revive_ledger: ReviveLedger::default(),
            emitter: SnapshotEmitter::default(),
            sink,
            gateway,
            tick: 0,
            suspended_at: None,
            shut_down: false,
        }
    }

    /// Swaps the rank ladder; scaling tables re-derive on the next use.
    pub fn set_ladder(&mut self, ladder: RankLadder) {
        self.ladder = ladder;
        self.tables.ensure(&self.ladder);
    }

    pub fn ladder(&self) -> &RankLadder {
        &self.ladder
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    fn now_seconds(&self) -> f64 {
        self.tick as f64 * BASE_TICK_MS as f64 / 1000.0
    }

    pub fn encounter(&self, key: &EncounterKey) -> Option<&Encounter> {
        self.encounters.get(key)
    }

    pub fn live_encounter_count(&self) -> usize {
        self.encounters
            .values()
            .filter(|e| e.phase.is_live())
            .count()
    }

    pub fn resource(&self) -> &ResourcePool {
        &self.resource
    }

    pub fn controller(&self) -> &ControllerState {
        &self.controller
    }

    /// Gate for the external encounter-trigger collaborator: a key can
    /// spawn when no live encounter claims it and the concurrency ceiling
    /// has room. Why and how often to ask is the trigger's business.
    pub fn should_spawn(&self, key: &EncounterKey) -> bool {
        !self
            .encounters
            .get(key)
            .is_some_and(|e| e.phase.is_live())
            && self.live_encounter_count() < MAX_ACTIVE_ENCOUNTERS
    }

    /// Creates a new encounter under `key`. Returns false (and does
    /// nothing) if the key is already claimed by a live encounter or the
    /// ceiling is reached.
    pub fn create_encounter<R: Rng>(
        &mut self,
        key: EncounterKey,
        rank: RankIndex,
        rng: &mut R,
    ) -> bool {
        if !self.should_spawn(&key) {
            return false;
        }
        self.tables.ensure(&self.ladder);
        let rank = self.ladder.clamp(rank);
        let now = self.now_seconds();

        let boss = generate_boss(rank, 1.0, &self.ladder, &self.tables, rng);
        let enc = Encounter::new(key.clone(), rank, boss, Default::default(), now);

        info!(key = %key, rank = %self.ladder.label(rank), "encounter created");
        self.scheduler.register(key.clone(), self.tick, rng);
        self.encounters.insert(key.clone(), enc);
        // New demand: the next tick's allocation pass must run in full.
        self.allocator.invalidate();
        self.persist_keys(&[key]);
        true
    }

    /// Embedder-reported observation signal. Observed encounters tick in
    /// the foreground.
    pub fn set_observed(&mut self, key: &EncounterKey, observed: bool) {
        let joined = self
            .encounters
            .get(key)
            .is_some_and(|e| e.controller_joined);
        self.scheduler.set_foreground(key, observed || joined);
    }

    /// The local controller joins an encounter, pinning it foreground.
    pub fn join_controller(&mut self, key: &EncounterKey) -> SimResult<()> {
        let enc = self
            .encounters
            .get_mut(key)
            .filter(|e| e.phase.is_live())
            .ok_or_else(|| SimError::StaleEncounter(key.clone()))?;
        enc.controller_joined = true;
        self.scheduler.set_foreground(key, true);
        Ok(())
    }

    /// Wired to the external agent-pool-changed notification.
    pub fn notify_agent_pool_changed(&mut self) {
        self.agent_pool.notify_changed();
        self.allocator.invalidate();
    }

    /// One manual controller swing at the boss of `key`. Surfaces
    /// [`BossAttackResult::NotVulnerable`] while the gate holds.
    pub fn controller_strike<R: Rng>(
        &mut self,
        key: &EncounterKey,
        rng: &mut R,
    ) -> SimResult<BossAttackResult> {
        let now = self.now_seconds();
        let enc = self
            .encounters
            .get_mut(key)
            .filter(|e| e.phase.is_live())
            .ok_or_else(|| SimError::StaleEncounter(key.clone()))?;
        let (result, _events) =
            controller_strike(enc, &self.controller, &self.tables, now, rng);
        Ok(result)
    }

    /// One bonus-extraction attempt during a resolved encounter's grace
    /// window. The reward feeds the resource pool.
    pub fn claim_bonus<R: Rng>(
        &mut self,
        key: &EncounterKey,
        rng: &mut R,
    ) -> SimResult<Option<BonusReward>> {
        let now = self.now_seconds();
        let enc = self
            .encounters
            .get_mut(key)
            .ok_or_else(|| SimError::StaleEncounter(key.clone()))?;
        let reward = claim_bonus(enc, now, rng);
        if let Some(reward) = &reward {
            self.resource.current = (self.resource.current + reward.resource).min(self.resource.max);
        }
        Ok(reward)
    }

    /// Advances the simulation by one base tick.
    pub fn tick<R: Rng>(&mut self, rng: &mut R) -> TickReport {
        if self.shut_down || self.suspended_at.is_some() {
            return TickReport::default();
        }

        self.tick += 1;
        let now = self.now_seconds();
        let now_ms = self.tick * BASE_TICK_MS;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        self.tables.ensure(&self.ladder);
        self.resource.regenerate(BASE_TICK_MS as f64 / 1000.0);

        // Allocation runs on its own TTL; a forced pass may follow below.
        let pool_snapshot: Vec<Agent> = self.agent_pool.all_agents(now, true).to_vec();
        if let Some(alloc) = self.allocator.reallocate(
            &mut self.encounters,
            &pool_snapshot,
            &self.tables,
            now,
            false,
        ) {
            if alloc.shortfall > 0 {
                report.events.push(TickEvent::AllocationShortfall {
                    shortfall: alloc.shortfall,
                });
            }
        }

        let due = self.scheduler.due_encounters(self.tick);
        let mut rebalance_needed = false;
        let mut processed_keys: Vec<EncounterKey> = Vec::new();

        for entry in due {
            // A stale schedule entry for a vanished encounter is discarded
            // silently.
            let Some(enc) = self.encounters.get_mut(&entry.key) else {
                continue;
            };
            if !enc.phase.is_live() {
                continue;
            }

            let spawn = self
                .spawner
                .update(enc, now, self.tick, &self.tables, rng);
            if spawn.units_flushed > 0 {
                report.events.push(TickEvent::WaveSpawned {
                    key: entry.key.clone(),
                    units: spawn.units_flushed,
                });
            }

            let assigned = roster_for(&self.allocator, &entry.key, &pool_snapshot);
            let mut deps = CombatDeps {
                tables: &self.tables,
                ladder: &self.ladder,
                resource: &mut self.resource,
                controller: &mut self.controller,
                revive_ledger: &mut self.revive_ledger,
            };
            let events =
                run_combat_cycles(enc, &assigned, &mut deps, entry.cycles, now, rng);
            report.events.extend(events);
            report.processed += 1;

            if fail_if_timed_out(enc, now) {
                report.events.push(TickEvent::EncounterFailed {
                    key: entry.key.clone(),
                });
                if enc.controller_joined {
                    enc.grace_until = Some(now + GRACE_WINDOW_SECONDS);
                }
            }

            if self.allocator.needs_rebalance(enc, now) {
                rebalance_needed = true;
            }
            processed_keys.push(entry.key.clone());
        }

        if rebalance_needed {
            self.allocator.reallocate(
                &mut self.encounters,
                &pool_snapshot,
                &self.tables,
                now,
                true,
            );
        }

        // Grace expiry and teardown of finished encounters.
        let mut to_teardown: Vec<EncounterKey> = Vec::new();
        for (key, enc) in self.encounters.iter_mut() {
            archive_if_grace_expired(enc, now);
            if enc.phase == Phase::Archived {
                to_teardown.push(key.clone());
            }
        }
        for key in to_teardown {
            self.teardown(&key);
            report
                .events
                .push(TickEvent::EncounterArchived { key: key.clone() });
        }

        // Throttled snapshots for everything still alive.
        for enc in self.encounters.values() {
            self.emitter
                .emit(enc, &self.ladder, now_ms, self.sink.as_mut());
        }

        self.persist_keys(&processed_keys);
        self.revive_ledger.clear();
        report
    }

    /// Records the start of an unobserved period. Ticks are no-ops until
    /// [`SimulationContext::resume_at`].
    pub fn suspend(&mut self) {
        self.suspend_at(Utc::now().timestamp());
    }

    pub fn suspend_at(&mut self, now_wall: i64) {
        if self.suspended_at.is_none() {
            self.suspended_at = Some(now_wall);
            let keys: Vec<EncounterKey> = self.encounters.keys().cloned().collect();
            self.persist_keys(&keys);
        }
    }

    /// Ends a suspension with one aggregate catch-up pass per encounter
    /// instead of replaying every missed tick.
    pub fn resume<R: Rng>(&mut self, rng: &mut R) -> CatchupReport {
        self.resume_at(Utc::now().timestamp(), rng)
    }

    pub fn resume_at<R: Rng>(&mut self, now_wall: i64, rng: &mut R) -> CatchupReport {
        let Some(started) = self.suspended_at.take() else {
            return CatchupReport::default();
        };
        let elapsed = now_wall - started;
        let (cycles, capped) = gap_to_cycles(elapsed);
        let mut report = CatchupReport {
            elapsed_seconds: elapsed.max(0),
            simulated_seconds: cycles as i64,
            capped,
            ..CatchupReport::default()
        };
        if cycles == 0 {
            return report;
        }

        // The simulated clock jumps over the whole gap at once.
        self.tick += cycles;
        let now = self.now_seconds();
        self.resource
            .regenerate(cycles as f64 * BASE_TICK_MS as f64 / 1000.0);

        let pool_snapshot: Vec<Agent> = self.agent_pool.all_agents(now, false).to_vec();
        self.allocator.reallocate(
            &mut self.encounters,
            &pool_snapshot,
            &self.tables,
            now,
            true,
        );

        let keys: Vec<EncounterKey> = self
            .encounters
            .iter()
            .filter(|(_, e)| e.phase.is_live())
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            let Some(enc) = self.encounters.get_mut(&key) else {
                continue;
            };
            let assigned = roster_for(&self.allocator, &key, &pool_snapshot);
            let mut deps = CombatDeps {
                tables: &self.tables,
                ladder: &self.ladder,
                resource: &mut self.resource,
                controller: &mut self.controller,
                revive_ledger: &mut self.revive_ledger,
            };
            let summary =
                catch_up_encounter(enc, &assigned, &mut deps, cycles, now, rng);
            report.encounters.push(summary);
        }
        self.revive_ledger.clear();

        let keys: Vec<EncounterKey> = self.encounters.keys().cloned().collect();
        self.persist_keys(&keys);
        report
    }

    /// Restores persisted encounters after a restart. Malformed records
    /// are repaired to valid shapes; unreadable ones are dropped.
    pub fn load_persisted<R: Rng>(&mut self, rng: &mut R) -> usize {
        let Some(gateway) = self.gateway.as_mut() else {
            return 0;
        };
        let records = match gateway.query_by_index(self.tick, PHASE_INDEX, "live", "live") {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "could not load persisted encounters");
                return 0;
            }
        };

        let mut restored = 0;
        for record in records {
            let mut enc: Encounter = match record.decode() {
                Ok(enc) => enc,
                Err(e) => {
                    warn!(key = %record.key, error = %e, "dropping unreadable record");
                    continue;
                }
            };
            enc.repair();
            if !enc.phase.is_live() {
                continue;
            }
            self.scheduler.register(enc.key.clone(), self.tick, rng);
            self.encounters.insert(enc.key.clone(), enc);
            restored += 1;
        }
        if restored > 0 {
            self.allocator.invalidate();
        }
        restored
    }

    /// Deterministically cancels all pending scheduled work and flushes
    /// state. Further ticks are no-ops.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        let keys: Vec<EncounterKey> = self.encounters.keys().cloned().collect();
        self.persist_keys(&keys);
        self.scheduler.clear();
        self.revive_ledger.clear();
        self.shut_down = true;
        info!("simulation context shut down");
    }

    fn teardown(&mut self, key: &EncounterKey) {
        self.scheduler.deregister(key);
        self.spawner.remove(key);
        self.allocator.remove(key);
        self.emitter.remove(key);
        if let Some(gateway) = self.gateway.as_mut() {
            let store_key = format!("{}{}", ENCOUNTER_KEY_PREFIX, key);
            // Memory-only degradation: a failed delete is logged by the
            // gateway and the encounter still leaves memory.
            let _ = gateway.delete_by_key(self.tick, &store_key);
        }
        self.encounters.remove(key);
    }

    /// Write-behind persistence of a batch of encounters. Store failures
    /// degrade to memory-only operation.
    fn persist_keys(&mut self, keys: &[EncounterKey]) {
        let Some(gateway) = self.gateway.as_mut() else {
            return;
        };
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(enc) = self.encounters.get(key) else {
                continue;
            };
            let phase_value = if enc.phase.is_live() { "live" } else { "done" };
            match StoredRecord::new(
                format!("{}{}", ENCOUNTER_KEY_PREFIX, key),
                vec![
                    (PHASE_INDEX.to_string(), phase_value.to_string()),
                    (RANK_INDEX.to_string(), enc.rank.to_string()),
                ],
                enc,
            ) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %key, error = %e, "could not encode record"),
            }
        }
        if !records.is_empty() {
            let _ = gateway.put_batch(self.tick, &records);
        }
    }
}

/// Resolves an encounter's assignment record into owned agent data from
/// the pool snapshot taken this tick.
fn roster_for(
    allocator: &Allocator,
    key: &EncounterKey,
    pool: &[Agent],
) -> Vec<Agent> {
    let Some(record) = allocator.assignment_for(key) else {
        return Vec::new();
    };
    let wanted: HashSet<u64> = record.agents.iter().copied().collect();
    pool.iter()
        .filter(|a| wanted.contains(&a.id))
        .cloned()
        .collect()
}
