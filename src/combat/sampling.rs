//! Statistical sampling for bulk combat.
//!
//! Resolving every one of possibly thousands of combatants each tick is
//! wasted work: the engine resolves a bounded random sample and scales the
//! result by the population ratio. Exact per-entity fidelity is deliberately
//! traded for O(sample) tick cost regardless of true population size.

use rand::seq::index::sample as index_sample;
use rand::Rng;

use crate::combat::resolver::resolve;
use crate::combat::types::StatBlock;
use crate::core::constants::{SCALE_FACTOR_MAX, SCALE_FACTOR_MIN};
use crate::ranks::{RankIndex, ScalingTables};

/// One batched aggregate-damage result.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleReport {
    /// Total damage across the whole population over all rounds.
    pub total_damage: u64,
    /// How many combatants were actually resolved.
    pub sample_size: usize,
    /// Population/sample ratio after clamping.
    pub scale_factor: f64,
}

/// Computes aggregate damage from a population of attackers against one
/// defender stat block.
///
/// At most `sample_cap` attackers are resolved; the summed sample damage is
/// multiplied by `population / sample` (clamped to
/// `[SCALE_FACTOR_MIN, SCALE_FACTOR_MAX]`) and by `rounds`, the number of
/// attack rounds the batch represents (elapsed time over cadence; may be
/// fractional for catch-up passes).
pub fn sampled_attack_total<A, R: Rng>(
    attackers: &[A],
    stats_of: impl Fn(&A) -> (&StatBlock, RankIndex),
    defender: &StatBlock,
    defender_rank: RankIndex,
    sample_cap: usize,
    rounds: f64,
    tables: &ScalingTables,
    rng: &mut R,
) -> SampleReport {
    if attackers.is_empty() || rounds <= 0.0 || sample_cap == 0 {
        return SampleReport::default();
    }

    let sample_size = attackers.len().min(sample_cap);
    let mut sample_total: u64 = 0;

    if sample_size == attackers.len() {
        for attacker in attackers {
            let (stats, rank) = stats_of(attacker);
            sample_total += resolve(stats, defender, rank, defender_rank, tables, rng) as u64;
        }
    } else {
        for idx in index_sample(rng, attackers.len(), sample_size) {
            let (stats, rank) = stats_of(&attackers[idx]);
            sample_total += resolve(stats, defender, rank, defender_rank, tables, rng) as u64;
        }
    }

    let scale_factor = (attackers.len() as f64 / sample_size as f64)
        .clamp(SCALE_FACTOR_MIN, SCALE_FACTOR_MAX);

    SampleReport {
        total_damage: (sample_total as f64 * scale_factor * rounds).round() as u64,
        sample_size,
        scale_factor,
    }
}

/// Average per-unit damage of a sampled population against a defender,
/// over a single round. Used by the catch-up pass, which scales the mean
/// by population and elapsed-time/cadence itself.
pub fn sampled_mean_damage<A, R: Rng>(
    attackers: &[A],
    stats_of: impl Fn(&A) -> (&StatBlock, RankIndex),
    defender: &StatBlock,
    defender_rank: RankIndex,
    sample_cap: usize,
    tables: &ScalingTables,
    rng: &mut R,
) -> f64 {
    let report = sampled_attack_total(
        attackers,
        stats_of,
        defender,
        defender_rank,
        sample_cap,
        1.0,
        tables,
        rng,
    );
    if report.sample_size == 0 {
        return 0.0;
    }
    report.total_damage as f64 / attackers.len() as f64
}
