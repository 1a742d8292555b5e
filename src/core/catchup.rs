//! Suspend/catch-up time compression.
//!
//! When the whole simulation goes unobserved, nothing ticks. On resumption
//! the elapsed wall time is converted into one batched combat pass per
//! encounter (sampled average damage scaled by elapsed-time over cadence)
//! instead of replaying every missed tick. This is an explicit
//! approximation: resuming after six hours costs the same as resuming
//! after six seconds.

use rand::Rng;

use crate::agents::Agent;
use crate::core::constants::{BASE_TICK_MS, MAX_SUSPENSION_SECONDS};
use crate::core::tick::{run_combat_cycles, CombatDeps, TickEvent};
use crate::encounter::logic::fail_if_timed_out;
use crate::encounter::types::{Encounter, EncounterKey};

/// Summary of one encounter's catch-up pass.
#[derive(Debug, Clone, Default)]
pub struct EncounterCatchup {
    pub key: EncounterKey,
    pub cycles: u64,
    pub boss_damage: u64,
    pub population_damage: u64,
    pub population_kills: u64,
    pub agent_deaths: usize,
    pub agents_revived: usize,
    pub controller_damage: u64,
    pub resolved: bool,
    pub failed: bool,
}

/// Result of a full resume.
#[derive(Debug, Clone, Default)]
pub struct CatchupReport {
    /// Wall seconds the simulation was suspended.
    pub elapsed_seconds: i64,
    /// Seconds actually simulated (after the cap).
    pub simulated_seconds: i64,
    /// True when the suspension exceeded the catch-up cap.
    pub capped: bool,
    pub encounters: Vec<EncounterCatchup>,
}

/// Clamps a suspension gap to the catch-up cap and converts it to base
/// ticks. Negative gaps (clock skew) simulate nothing.
pub fn gap_to_cycles(elapsed_seconds: i64) -> (u64, bool) {
    let capped = elapsed_seconds > MAX_SUSPENSION_SECONDS;
    let simulated = elapsed_seconds.clamp(0, MAX_SUSPENSION_SECONDS);
    let cycles = (simulated as f64 / (BASE_TICK_MS as f64 / 1000.0)).floor() as u64;
    (cycles, capped)
}

/// Runs the one-shot aggregate pass for a single encounter and folds the
/// emitted events into a summary.
pub fn catch_up_encounter<R: Rng>(
    enc: &mut Encounter,
    assigned: &[Agent],
    deps: &mut CombatDeps<'_>,
    cycles: u64,
    now: f64,
    rng: &mut R,
) -> EncounterCatchup {
    let mut summary = EncounterCatchup {
        key: enc.key.clone(),
        cycles,
        ..EncounterCatchup::default()
    };

    let events = run_combat_cycles(enc, assigned, deps, cycles, now, rng);
    for event in events {
        match event {
            TickEvent::BossDamaged { damage, .. } => summary.boss_damage += damage,
            TickEvent::BossDefeated { .. } => summary.resolved = true,
            TickEvent::PopulationDamaged { damage, kills, .. } => {
                summary.population_damage += damage;
                summary.population_kills += kills;
            }
            TickEvent::AgentsStruck { deaths, .. } => summary.agent_deaths += deaths,
            TickEvent::RevivalSettled { revived, .. } => summary.agents_revived += revived,
            TickEvent::ControllerStruck { damage, .. } => {
                summary.controller_damage += damage as u64
            }
            _ => {}
        }
    }

    // The deadline may have passed mid-suspension.
    if fail_if_timed_out(enc, now) {
        summary.failed = true;
    }

    summary
}
