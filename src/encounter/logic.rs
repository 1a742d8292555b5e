//! Encounter behavior: gate evaluation, damage application, terminal
//! transitions and the post-resolution grace window.

use rand::Rng;

use crate::core::constants::*;
use crate::encounter::types::{Encounter, Phase};

/// Outcome of an attack directed at the boss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BossAttackResult {
    /// The gate is still closed (or the encounter is not in a damageable
    /// phase). Nothing changed.
    NotVulnerable,
    Applied { damage: u64, defeated: bool },
}

/// Damage spread over the hostile population in one batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct PopulationDamageReport {
    pub damage_applied: u64,
    pub kills: u64,
}

/// Reward from a bonus-extraction attempt against a defeated boss.
#[derive(Debug, Clone)]
pub struct BonusReward {
    pub label: String,
    pub resource: f64,
}

/// Marks the end of initial spawning: the encounter becomes Active, or
/// BossGated when a gate is configured.
pub fn on_first_wave(enc: &mut Encounter) {
    if enc.phase == Phase::Spawning {
        let next = if enc.gate.enabled {
            Phase::BossGated
        } else {
            Phase::Active
        };
        enc.advance_phase(next);
    }
}

/// Opens the boss gate once both thresholds hold.
pub fn update_gate(enc: &mut Encounter, now: f64) {
    if enc.phase == Phase::BossGated
        && enc.elapsed(now) >= enc.gate.min_elapsed_seconds
        && enc.population.killed >= enc.gate.min_kills
    {
        enc.advance_phase(Phase::BossUnlocked);
    }
}

/// Applies aggregate damage to the boss, honoring the gate.
pub fn apply_boss_damage(enc: &mut Encounter, amount: u64, now: f64) -> BossAttackResult {
    if !enc.phase.boss_vulnerable() || !enc.boss.is_alive() {
        return BossAttackResult::NotVulnerable;
    }

    let damage = amount.min(enc.boss.hp);
    enc.boss.hp -= damage;
    let defeated = !enc.boss.is_alive();
    if defeated {
        resolve(enc, now);
    }
    BossAttackResult::Applied { damage, defeated }
}

/// Spreads aggregate damage across the alive population, front to back,
/// and counts resulting kills toward the gate.
pub fn apply_population_damage(enc: &mut Encounter, total: u64) -> PopulationDamageReport {
    let mut report = PopulationDamageReport::default();
    let mut remaining = total;

    for mob in enc.population.mobs.iter_mut().filter(|m| m.is_alive()) {
        if remaining == 0 {
            break;
        }
        let bite = remaining.min(mob.hp as u64) as u32;
        mob.take_damage(bite);
        remaining -= bite as u64;
        report.damage_applied += bite as u64;
        if !mob.is_alive() {
            report.kills += 1;
        }
    }

    enc.population.killed += report.kills;
    report
}

/// Removes dead hostile units. Runs after all damage channels in a tick.
pub fn cleanup_dead(enc: &mut Encounter) -> usize {
    let before = enc.population.mobs.len();
    enc.population.mobs.retain(|m| m.is_alive());
    before - enc.population.mobs.len()
}

/// Fails a live encounter whose duration timeout has passed.
/// Returns true when the transition happened on this call.
pub fn fail_if_timed_out(enc: &mut Encounter, now: f64) -> bool {
    if enc.phase.is_live() && now >= enc.deadline {
        enc.advance_phase(Phase::Failed);
        if !enc.controller_joined {
            enc.advance_phase(Phase::Archived);
        }
        return true;
    }
    false
}

fn resolve(enc: &mut Encounter, now: f64) {
    enc.advance_phase(Phase::Resolved);
    if enc.controller_joined {
        // Stay queryable for bonus extraction against the defeated boss.
        enc.grace_until = Some(now + GRACE_WINDOW_SECONDS);
        enc.bonus_attempts_left = BONUS_EXTRACTION_ATTEMPTS;
    } else {
        enc.advance_phase(Phase::Archived);
    }
}

/// One bonus-extraction attempt during the grace window.
///
/// Yields a resource refund proportional to the encounter rank. Returns
/// `None` when no window is open or the attempts are spent.
pub fn claim_bonus<R: Rng>(enc: &mut Encounter, now: f64, rng: &mut R) -> Option<BonusReward> {
    if enc.phase != Phase::Resolved
        || enc.bonus_attempts_left == 0
        || !enc.grace_until.is_some_and(|until| now < until)
    {
        return None;
    }

    enc.bonus_attempts_left -= 1;
    let scale = (enc.rank + 1) as f64;
    let resource = rng.gen_range(2.0..6.0) * scale;
    Some(BonusReward {
        label: format!("Spoils of {}", enc.boss.name),
        resource,
    })
}

/// Archives a terminal encounter whose grace window has lapsed.
pub fn archive_if_grace_expired(enc: &mut Encounter, now: f64) -> bool {
    if matches!(enc.phase, Phase::Resolved | Phase::Failed)
        && enc.grace_until.is_some_and(|until| now >= until)
    {
        enc.advance_phase(Phase::Archived);
        return true;
    }
    false
}
