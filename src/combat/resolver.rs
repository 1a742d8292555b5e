//! Pure damage resolution between two stat blocks.
//!
//! This is the hot inner loop: no state, no I/O, no allocation beyond the
//! return value. Bulk combat calls it once per sampled combatant, so keep
//! it branch-light.

use rand::Rng;

use crate::combat::types::StatBlock;
use crate::core::constants::*;
use crate::ranks::{RankIndex, ScalingTables};

/// Result of a single attack resolution.
#[derive(Debug, Clone, Copy)]
pub struct AttackOutcome {
    /// Damage dealt. Zero only on a dodge; otherwise always at least 1.
    pub damage: u32,
    pub was_crit: bool,
    pub dodged: bool,
}

/// Resolves one attack and returns the full outcome.
///
/// Pipeline: dodge roll (early out), linear base damage, clamped rank-power
/// ratio, probabilistic crit, saturating defense reduction, floor of 1.
pub fn resolve_attack<R: Rng>(
    attacker: &StatBlock,
    defender: &StatBlock,
    attacker_rank: RankIndex,
    defender_rank: RankIndex,
    tables: &ScalingTables,
    rng: &mut R,
) -> AttackOutcome {
    // Dodge preempts everything else.
    let dodge_chance = (defender.finesse as f64 * DODGE_CHANCE_PER_FINESSE)
        .min(DODGE_CHANCE_MAX_PERCENT);
    if rng.gen::<f64>() * 100.0 < dodge_chance {
        return AttackOutcome {
            damage: 0,
            was_crit: false,
            dodged: true,
        };
    }

    let base = BASE_DAMAGE
        + attacker.power as f64 * DAMAGE_PER_POWER
        + attacker.finesse as f64 * DAMAGE_PER_FINESSE;

    let rank_mult = tables.rank_damage_multiplier(attacker_rank, defender_rank);
    let mut damage = base * rank_mult;

    let crit_chance = (BASE_CRIT_CHANCE_PERCENT
        + attacker.instinct as f64 * CRIT_CHANCE_PER_INSTINCT)
        .min(CRIT_CHANCE_MAX_PERCENT);
    let was_crit = rng.gen::<f64>() * 100.0 < crit_chance;
    if was_crit {
        damage *= CRIT_MULTIPLIER;
    }

    let defense =
        defender.guard as f64 * DEFENSE_PER_GUARD + defender.vitality as f64 * DEFENSE_PER_VITALITY;
    let reduction = (defense / (defense + DEFENSE_SOFTCAP_K)).min(DAMAGE_REDUCTION_CAP);
    damage *= 1.0 - reduction;

    AttackOutcome {
        damage: (damage as u32).max(1),
        was_crit,
        dodged: false,
    }
}

/// Damage-only convenience wrapper over [`resolve_attack`].
pub fn resolve<R: Rng>(
    attacker: &StatBlock,
    defender: &StatBlock,
    attacker_rank: RankIndex,
    defender_rank: RankIndex,
    tables: &ScalingTables,
    rng: &mut R,
) -> u32 {
    resolve_attack(attacker, defender, attacker_rank, defender_rank, tables, rng).damage
}
