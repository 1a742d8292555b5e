//! Per-encounter combat orchestration.
//!
//! One call to [`run_combat_cycles`] advances a single encounter by a batch
//! of base ticks: foreground encounters pass `cycles == 1` every tick,
//! background encounters pass the number of ticks elapsed since they were
//! last processed, and the suspend/catch-up pass reuses the same function
//! with the whole suspension gap. Damage per channel is a sampled
//! aggregate, not a per-entity replay.
//!
//! Channel order inside one call is fixed: agents strike first, hostile
//! damage to agents (including revival settlement) resolves before any
//! damage to the controller, and dead-unit cleanup runs last.

use rand::Rng;

use crate::agents::Agent;
use crate::combat::resolver::resolve;
use crate::combat::sampling::sampled_attack_total;
use crate::combat::types::ControllerState;
use crate::core::constants::*;
use crate::encounter::logic::{
    apply_boss_damage, apply_population_damage, cleanup_dead, update_gate, BossAttackResult,
};
use crate::encounter::types::{Encounter, EncounterKey, Phase};
use crate::ranks::{RankLadder, ScalingTables};
use crate::revival::{revive_batch, ResourcePool, ReviveLedger};

/// A single event produced while advancing an encounter.
///
/// The presentation layer maps these to log lines and effects; the core
/// never formats for display beyond what snapshots carry.
#[derive(Debug, Clone)]
pub enum TickEvent {
    WaveSpawned {
        key: EncounterKey,
        units: usize,
    },
    BossGateOpened {
        key: EncounterKey,
    },
    BossDamaged {
        key: EncounterKey,
        damage: u64,
    },
    BossDefeated {
        key: EncounterKey,
    },
    PopulationDamaged {
        key: EncounterKey,
        damage: u64,
        kills: u64,
    },
    AgentsStruck {
        key: EncounterKey,
        damage: u64,
        deaths: usize,
    },
    RevivalSettled {
        key: EncounterKey,
        revived: usize,
        denied: usize,
        spent: f64,
    },
    ControllerStruck {
        key: EncounterKey,
        damage: u32,
    },
    ControllerDowned {
        key: EncounterKey,
    },
    EncounterFailed {
        key: EncounterKey,
    },
    EncounterArchived {
        key: EncounterKey,
    },
    AllocationShortfall {
        shortfall: usize,
    },
}

/// Everything produced by one scheduler tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub events: Vec<TickEvent>,
    /// Encounters whose combat pass ran this tick.
    pub processed: usize,
}

/// Mutable simulation state shared by every combat channel.
pub struct CombatDeps<'a> {
    pub tables: &'a ScalingTables,
    pub ladder: &'a RankLadder,
    pub resource: &'a mut ResourcePool,
    pub controller: &'a mut ControllerState,
    pub revive_ledger: &'a mut ReviveLedger,
}

fn tick_seconds() -> f64 {
    BASE_TICK_MS as f64 / 1000.0
}

/// Advances one encounter by `cycles` base ticks' worth of combat.
pub fn run_combat_cycles<R: Rng>(
    enc: &mut Encounter,
    assigned: &[Agent],
    deps: &mut CombatDeps<'_>,
    cycles: u64,
    now: f64,
    rng: &mut R,
) -> Vec<TickEvent> {
    let mut events = Vec::new();
    if !enc.phase.is_live() || cycles == 0 {
        return events;
    }

    // ── 1. Gate evaluation ──────────────────────────────────────
    let was_gated = enc.phase == Phase::BossGated;
    update_gate(enc, now);
    if was_gated && enc.phase == Phase::BossUnlocked {
        events.push(TickEvent::BossGateOpened {
            key: enc.key.clone(),
        });
    }

    // Agents fighting in this encounter right now.
    let fighters: Vec<&Agent> = assigned
        .iter()
        .filter(|a| enc.health.is_alive(a.id))
        .collect();

    // ── 2. Agents strike ────────────────────────────────────────
    let agent_rounds = cycles as f64 * tick_seconds() / AGENT_ATTACK_INTERVAL_SECONDS;
    if !fighters.is_empty() {
        let boss_focus = if enc.phase.boss_vulnerable() && enc.boss.is_alive() {
            if enc.population.alive() > 0 {
                AGENT_BOSS_FOCUS_SHARE
            } else {
                1.0
            }
        } else {
            0.0
        };
        let boss_squad = (fighters.len() as f64 * boss_focus).round() as usize;
        let (boss_squad, mob_squad) = fighters.split_at(boss_squad.min(fighters.len()));

        if !boss_squad.is_empty() {
            let report = sampled_attack_total(
                boss_squad,
                |a| (&a.stats, a.rank),
                &enc.boss.stats,
                enc.boss.rank,
                AGENT_SAMPLE_CAP,
                agent_rounds,
                deps.tables,
                rng,
            );
            match apply_boss_damage(enc, report.total_damage, now) {
                BossAttackResult::Applied { damage, defeated } => {
                    events.push(TickEvent::BossDamaged {
                        key: enc.key.clone(),
                        damage,
                    });
                    if defeated {
                        events.push(TickEvent::BossDefeated {
                            key: enc.key.clone(),
                        });
                    }
                }
                BossAttackResult::NotVulnerable => {}
            }
        }

        if !mob_squad.is_empty() && enc.population.alive() > 0 {
            // Representative defender: mobs in one encounter share a
            // generation archetype, so any alive one stands in for all.
            let defender = enc
                .population
                .mobs
                .iter()
                .find(|m| m.is_alive())
                .map(|m| (m.stats, m.rank));
            if let Some((defender_stats, defender_rank)) = defender {
                let report = sampled_attack_total(
                    mob_squad,
                    |a| (&a.stats, a.rank),
                    &defender_stats,
                    defender_rank,
                    AGENT_SAMPLE_CAP,
                    agent_rounds,
                    deps.tables,
                    rng,
                );
                let applied = apply_population_damage(enc, report.total_damage);
                if applied.damage_applied > 0 {
                    events.push(TickEvent::PopulationDamaged {
                        key: enc.key.clone(),
                        damage: applied.damage_applied,
                        kills: applied.kills,
                    });
                }
            }
        }
    }

    // ── 3. Hostiles strike agents, then revival settles ─────────
    if !fighters.is_empty() && enc.phase.is_live() {
        let incoming = hostile_damage_total(enc, &fighters, cycles, deps.tables, rng);
        if incoming > 0 {
            let share = (incoming / fighters.len() as u64).max(1) as u32;
            let mut deaths: Vec<(u64, usize)> = Vec::new();
            for agent in &fighters {
                if enc.health.apply_damage(agent.id, share) && deps.revive_ledger.record(agent.id)
                {
                    deaths.push((agent.id, agent.rank));
                }
            }
            events.push(TickEvent::AgentsStruck {
                key: enc.key.clone(),
                damage: incoming,
                deaths: deaths.len(),
            });

            if !deaths.is_empty() {
                let report = revive_batch(
                    &mut enc.health,
                    deps.resource,
                    &deaths,
                    deps.controller.rank,
                    deps.ladder,
                );
                enc.revives += report.revived.len() as u64;
                events.push(TickEvent::RevivalSettled {
                    key: enc.key.clone(),
                    revived: report.revived.len(),
                    denied: report.denied.len(),
                    spent: report.spent,
                });
            }
        }
    }

    // ── 4. Hostiles strike the controller ───────────────────────
    // Only after agent damage has fully settled.
    if enc.controller_joined && deps.controller.is_alive() && enc.phase.is_live() {
        let damage = controller_damage_total(enc, deps.controller, cycles, deps.tables, rng);
        if damage > 0 {
            deps.controller.take_damage(damage);
            events.push(TickEvent::ControllerStruck {
                key: enc.key.clone(),
                damage,
            });
            if !deps.controller.is_alive() {
                events.push(TickEvent::ControllerDowned {
                    key: enc.key.clone(),
                });
            }
        }
    }

    // ── 5. Population cleanup ───────────────────────────────────
    cleanup_dead(enc);

    events
}

/// Aggregate hostile (population + boss) damage aimed at the agents.
fn hostile_damage_total<R: Rng>(
    enc: &Encounter,
    fighters: &[&Agent],
    cycles: u64,
    tables: &ScalingTables,
    rng: &mut R,
) -> u64 {
    // Representative defender for the sampled pass.
    let idx = rng.gen_range(0..fighters.len());
    let defender_stats = fighters[idx].stats;
    let defender_rank = fighters[idx].rank;

    let mob_rounds = cycles as f64 * tick_seconds() / MOB_ATTACK_INTERVAL_SECONDS;
    let alive: Vec<&crate::combat::types::Mob> =
        enc.population.mobs.iter().filter(|m| m.is_alive()).collect();
    let mut total = sampled_attack_total(
        &alive,
        |m| (&m.stats, m.rank),
        &defender_stats,
        defender_rank,
        MOB_SAMPLE_CAP,
        mob_rounds,
        tables,
        rng,
    )
    .total_damage;

    if enc.boss.is_alive() {
        let boss_rounds = cycles as f64 * tick_seconds() / enc.boss.attack_interval;
        let swing = resolve(
            &enc.boss.stats,
            &defender_stats,
            enc.boss.rank,
            defender_rank,
            tables,
            rng,
        );
        total += (swing as f64 * boss_rounds).round() as u64;
    }
    total
}

/// Aggregate hostile damage reaching a joined controller: the boss's
/// attention plus a small share of the population's.
fn controller_damage_total<R: Rng>(
    enc: &Encounter,
    controller: &ControllerState,
    cycles: u64,
    tables: &ScalingTables,
    rng: &mut R,
) -> u32 {
    let mut total = 0.0;

    if enc.boss.is_alive() {
        let boss_rounds = cycles as f64 * tick_seconds() / enc.boss.attack_interval;
        let swing = resolve(
            &enc.boss.stats,
            &controller.stats,
            enc.boss.rank,
            controller.rank,
            tables,
            rng,
        );
        total += swing as f64 * boss_rounds;
    }

    let alive: Vec<&crate::combat::types::Mob> =
        enc.population.mobs.iter().filter(|m| m.is_alive()).collect();
    if !alive.is_empty() {
        let mob_rounds = cycles as f64 * tick_seconds() / MOB_ATTACK_INTERVAL_SECONDS;
        let report = sampled_attack_total(
            &alive,
            |m| (&m.stats, m.rank),
            &controller.stats,
            controller.rank,
            MOB_SAMPLE_CAP,
            mob_rounds * CONTROLLER_AGGRO_SHARE,
            tables,
            rng,
        );
        total += report.total_damage as f64;
    }

    total.round() as u32
}

/// The controller's own swing against the boss (or, while the boss is
/// gated, the population). Used by the manual strike entry point.
pub fn controller_strike<R: Rng>(
    enc: &mut Encounter,
    controller: &ControllerState,
    tables: &ScalingTables,
    now: f64,
    rng: &mut R,
) -> (BossAttackResult, Vec<TickEvent>) {
    let mut events = Vec::new();
    let damage = resolve(
        &controller.stats,
        &enc.boss.stats,
        controller.rank,
        enc.boss.rank,
        tables,
        rng,
    ) as u64;

    let result = apply_boss_damage(enc, damage, now);
    match result {
        BossAttackResult::Applied { damage, defeated } => {
            events.push(TickEvent::BossDamaged {
                key: enc.key.clone(),
                damage,
            });
            if defeated {
                events.push(TickEvent::BossDefeated {
                    key: enc.key.clone(),
                });
            }
        }
        BossAttackResult::NotVulnerable => {
            // Gated: the swing lands on the population instead.
            let applied = apply_population_damage(enc, damage);
            if applied.damage_applied > 0 {
                events.push(TickEvent::PopulationDamaged {
                    key: enc.key.clone(),
                    damage: applied.damage_applied,
                    kills: applied.kills,
                });
            }
        }
    }
    (result, events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::types::{Mob, StatBlock, Tier};
    use crate::encounter::types::GateState;
    use crate::spawner::generate_boss;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn test_rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    fn harness() -> (RankLadder, ScalingTables, ResourcePool, ControllerState, ReviveLedger) {
        let ladder = RankLadder::default();
        let tables = ScalingTables::new(&ladder);
        (
            ladder,
            tables,
            ResourcePool::default(),
            ControllerState::new(4, StatBlock::uniform(40), 2000),
            ReviveLedger::default(),
        )
    }

    fn agents(count: usize, rank: usize) -> Vec<Agent> {
        (0..count as u64)
            .map(|id| Agent {
                id,
                name: format!("Agent {}", id),
                rank,
                stats: StatBlock::uniform(25),
            })
            .collect()
    }

    fn battle_encounter(rank: usize, mobs: usize, gate: bool) -> Encounter {
        let ladder = RankLadder::default();
        let tables = ScalingTables::new(&ladder);
        let mut rng = test_rng(42);
        let boss = generate_boss(rank, 1.0, &ladder, &tables, &mut rng);
        let mut enc = Encounter::new(
            "battle".to_string(),
            rank,
            boss,
            GateState {
                enabled: gate,
                ..GateState::default()
            },
            0.0,
        );
        enc.phase = if gate { Phase::BossGated } else { Phase::Active };
        for _ in 0..mobs {
            enc.population.mobs.push(Mob {
                id: Uuid::new_v4(),
                name: "mob".to_string(),
                rank,
                tier: Tier::Normal,
                max_hp: 150,
                hp: 150,
                stats: StatBlock::uniform(12),
                attack_interval: MOB_ATTACK_INTERVAL_SECONDS,
            });
            enc.population.spawned += 1;
        }
        enc
    }

    fn register_fighters(enc: &mut Encounter, roster: &[Agent]) {
        for a in roster {
            enc.health.ensure(a);
        }
    }

    #[test]
    fn test_gated_tick_damages_population_not_boss() {
        let (ladder, tables, mut resource, mut controller, mut deaths) = harness();
        let mut enc = battle_encounter(2, 50, true);
        let roster = agents(10, 2);
        register_fighters(&mut enc, &roster);
        let boss_hp = enc.boss.hp;

        let mut deps = CombatDeps {
            tables: &tables,
            ladder: &ladder,
            resource: &mut resource,
            controller: &mut controller,
            revive_ledger: &mut deaths,
        };
        let mut rng = test_rng(1);
        let events = run_combat_cycles(&mut enc, &roster, &mut deps, 1, 5.0, &mut rng);

        assert_eq!(enc.boss.hp, boss_hp, "gated boss must be untouched");
        assert!(events
            .iter()
            .any(|e| matches!(e, TickEvent::PopulationDamaged { .. })));
    }

    #[test]
    fn test_unlocked_tick_splits_damage() {
        let (ladder, tables, mut resource, mut controller, mut deaths) = harness();
        let mut enc = battle_encounter(2, 50, false);
        let roster = agents(10, 2);
        register_fighters(&mut enc, &roster);
        let boss_hp = enc.boss.hp;

        let mut deps = CombatDeps {
            tables: &tables,
            ladder: &ladder,
            resource: &mut resource,
            controller: &mut controller,
            revive_ledger: &mut deaths,
        };
        let mut rng = test_rng(2);
        let events = run_combat_cycles(&mut enc, &roster, &mut deps, 1, 5.0, &mut rng);

        assert!(enc.boss.hp < boss_hp, "vulnerable boss takes damage");
        assert!(events
            .iter()
            .any(|e| matches!(e, TickEvent::BossDamaged { .. })));
    }

    #[test]
    fn test_agent_damage_resolves_before_controller() {
        let (ladder, tables, mut resource, mut controller, mut deaths) = harness();
        let mut enc = battle_encounter(3, 80, false);
        enc.controller_joined = true;
        let roster = agents(5, 3);
        register_fighters(&mut enc, &roster);

        let mut deps = CombatDeps {
            tables: &tables,
            ladder: &ladder,
            resource: &mut resource,
            controller: &mut controller,
            revive_ledger: &mut deaths,
        };
        let mut rng = test_rng(3);
        let events = run_combat_cycles(&mut enc, &roster, &mut deps, 1, 5.0, &mut rng);

        let agents_idx = events
            .iter()
            .position(|e| matches!(e, TickEvent::AgentsStruck { .. }));
        let controller_idx = events
            .iter()
            .position(|e| matches!(e, TickEvent::ControllerStruck { .. }));
        if let (Some(a), Some(c)) = (agents_idx, controller_idx) {
            assert!(a < c, "agent channel must settle before controller channel");
        }
        assert!(agents_idx.is_some(), "agents should take hostile damage");
    }

    #[test]
    fn test_deaths_trigger_batched_revival() {
        let (ladder, tables, mut resource, mut controller, mut deaths) = harness();
        controller.rank = 0;
        let mut enc = battle_encounter(7, 400, false);
        // Fragile low-rank agents inside a high-rank encounter die fast.
        let roster = agents(8, 0);
        register_fighters(&mut enc, &roster);

        let mut rng = test_rng(4);
        let mut saw_settlement = false;
        for tick in 0..50u64 {
            let mut deps = CombatDeps {
                tables: &tables,
                ladder: &ladder,
                resource: &mut resource,
                controller: &mut controller,
                revive_ledger: &mut deaths,
            };
            let events =
                run_combat_cycles(&mut enc, &roster, &mut deps, 1, tick as f64, &mut rng);
            for event in &events {
                if let TickEvent::RevivalSettled {
                    revived, denied, ..
                } = event
                {
                    saw_settlement = true;
                    assert!(revived + denied > 0);
                }
            }
            deaths.clear();
            if saw_settlement {
                break;
            }
        }
        assert!(saw_settlement, "overwhelmed agents should hit the economy");
    }

    #[test]
    fn test_cycles_scale_background_damage() {
        let (ladder, tables, mut resource, mut controller, mut deaths) = harness();
        let roster = agents(10, 2);

        let mut run = |cycles: u64, seed: u64| {
            let mut enc = battle_encounter(2, 200, true);
            register_fighters(&mut enc, &roster);
            let mut deps = CombatDeps {
                tables: &tables,
                ladder: &ladder,
                resource: &mut resource,
                controller: &mut controller,
                revive_ledger: &mut deaths,
            };
            let mut rng = test_rng(seed);
            let events = run_combat_cycles(&mut enc, &roster, &mut deps, cycles, 5.0, &mut rng);
            events
                .iter()
                .filter_map(|e| match e {
                    TickEvent::PopulationDamaged { damage, .. } => Some(*damage),
                    _ => None,
                })
                .sum::<u64>()
        };

        let mut single: u64 = 0;
        let mut batched: u64 = 0;
        for s in 0..10 {
            single += run(1, 100 + s);
        }
        for s in 0..10 {
            batched += run(15, 200 + s);
        }
        // A 15-cycle batch should land roughly 15x one tick's damage.
        assert!(
            batched > single * 8 && batched < single * 25,
            "batched {} vs single {}",
            batched,
            single
        );
    }

    #[test]
    fn test_controller_strike_gated_vs_open() {
        let (_ladder, tables, _resource, controller, _deaths) = harness();
        let mut enc = battle_encounter(2, 20, true);
        let mut rng = test_rng(5);

        let (result, _) = controller_strike(&mut enc, &controller, &tables, 5.0, &mut rng);
        assert_eq!(result, BossAttackResult::NotVulnerable);

        enc.population.killed = enc.gate.min_kills;
        let gate_time = enc.gate.min_elapsed_seconds + 1.0;
        update_gate(&mut enc, gate_time);
        let strike_time = enc.gate.min_elapsed_seconds + 2.0;
        let (result, events) = controller_strike(
            &mut enc,
            &controller,
            &tables,
            strike_time,
            &mut rng,
        );
        assert!(matches!(result, BossAttackResult::Applied { .. }));
        assert!(events
            .iter()
            .any(|e| matches!(e, TickEvent::BossDamaged { .. })));
    }

    #[test]
    fn test_dead_cleanup_runs_last() {
        let (ladder, tables, mut resource, mut controller, mut deaths) = harness();
        let mut enc = battle_encounter(0, 30, true);
        // Strong agents one-shot the whole population.
        let roster: Vec<Agent> = (0..20u64)
            .map(|id| Agent {
                id,
                name: format!("A{}", id),
                rank: 7,
                stats: StatBlock::uniform(90),
            })
            .collect();
        register_fighters(&mut enc, &roster);

        let mut deps = CombatDeps {
            tables: &tables,
            ladder: &ladder,
            resource: &mut resource,
            controller: &mut controller,
            revive_ledger: &mut deaths,
        };
        let mut rng = test_rng(6);
        run_combat_cycles(&mut enc, &roster, &mut deps, 5, 5.0, &mut rng);

        // Whatever died this tick is already gone from the collection.
        assert!(enc.population.mobs.iter().all(|m| m.is_alive()));
    }
}
