//! Rank ladder configuration and memoized scaling curves.
//!
//! The ladder (an ordered list of rank labels) is configuration, not
//! hard-coded arithmetic: every curve in [`ScalingTables`] is derived from
//! the active ladder and cached for the process lifetime. Swapping the
//! ladder re-derives the cache. All lookups clamp out-of-range indices to
//! the nearest valid rank, so the tables cannot fail.

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    POPULATION_HP_FLOOR, POPULATION_HP_STAT_FACTOR, RANK_DAMAGE_MULT_EXPONENT,
    RANK_DAMAGE_MULT_MAX, RANK_DAMAGE_MULT_MIN, RANK_POWER_BASE, RANK_POWER_GROWTH,
};

/// Index into the active rank ladder. 0 is the weakest rank.
pub type RankIndex = usize;

/// Ordered list of rank labels, weakest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankLadder {
    labels: Vec<String>,
}

impl Default for RankLadder {
    fn default() -> Self {
        Self::new(&["E", "D", "C", "B", "A", "S", "SS", "SSS"])
    }
}

impl RankLadder {
    pub fn new(labels: &[&str]) -> Self {
        assert!(!labels.is_empty(), "rank ladder cannot be empty");
        Self {
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for a rank index, clamped to the ladder.
    pub fn label(&self, rank: RankIndex) -> &str {
        &self.labels[self.clamp(rank)]
    }

    /// Index of a label, if present.
    pub fn index_of(&self, label: &str) -> Option<RankIndex> {
        self.labels.iter().position(|l| l == label)
    }

    /// Top (strongest) rank index.
    pub fn top(&self) -> RankIndex {
        self.labels.len() - 1
    }

    /// Clamps an arbitrary index to a valid rank.
    pub fn clamp(&self, rank: RankIndex) -> RankIndex {
        rank.min(self.top())
    }

    /// Cheap identity used to detect ladder swaps without comparing labels
    /// on every lookup.
    fn fingerprint(&self) -> u64 {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for label in &self.labels {
            hasher.update(label.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
    }
}

/// Memoized numeric curves over the active ladder.
///
/// Owned by the simulation context; call [`ScalingTables::ensure`] after any
/// configuration change and the cache re-derives itself when the ladder
/// actually differs.
#[derive(Debug, Clone)]
pub struct ScalingTables {
    fingerprint: u64,
    ladder_len: usize,
    powers: Vec<f64>,
    hp_factors: Vec<f64>,
}

impl ScalingTables {
    pub fn new(ladder: &RankLadder) -> Self {
        let mut tables = Self {
            fingerprint: 0,
            ladder_len: 0,
            powers: Vec::new(),
            hp_factors: Vec::new(),
        };
        tables.derive(ladder);
        tables
    }

    /// Re-derives the cached curves if `ladder` is not the one they were
    /// built from. No-op on a fingerprint match.
    pub fn ensure(&mut self, ladder: &RankLadder) {
        if ladder.fingerprint() != self.fingerprint {
            self.derive(ladder);
        }
    }

    fn derive(&mut self, ladder: &RankLadder) {
        self.fingerprint = ladder.fingerprint();
        self.ladder_len = ladder.len();
        self.powers = (0..ladder.len())
            .map(|i| RANK_POWER_BASE * RANK_POWER_GROWTH.powi(i as i32))
            .collect();
        self.hp_factors = (0..ladder.len())
            .map(|i| POPULATION_HP_FLOOR + POPULATION_HP_STAT_FACTOR * i as f64)
            .collect();
    }

    fn clamp(&self, rank: RankIndex) -> usize {
        rank.min(self.ladder_len - 1)
    }

    /// Raw combat power of a rank. Grows geometrically up the ladder.
    pub fn rank_power(&self, rank: RankIndex) -> f64 {
        self.powers[self.clamp(rank)]
    }

    /// Damage multiplier for an attacker/defender rank pair.
    ///
    /// `(power_att / power_def) ^ exponent`, clamped so that extreme rank
    /// gaps (in either direction, including indices outside the ladder)
    /// never leave `[RANK_DAMAGE_MULT_MIN, RANK_DAMAGE_MULT_MAX]`.
    pub fn rank_damage_multiplier(&self, attacker: RankIndex, defender: RankIndex) -> f64 {
        let ratio = self.rank_power(attacker) / self.rank_power(defender);
        ratio
            .powf(RANK_DAMAGE_MULT_EXPONENT)
            .clamp(RANK_DAMAGE_MULT_MIN, RANK_DAMAGE_MULT_MAX)
    }

    /// HP scaling factor for population units of a rank.
    pub fn population_hp_factor(&self, rank: RankIndex) -> f64 {
        self.hp_factors[self.clamp(rank)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_shape() {
        let ladder = RankLadder::default();
        assert_eq!(ladder.len(), 8);
        assert_eq!(ladder.label(0), "E");
        assert_eq!(ladder.label(2), "C");
        assert_eq!(ladder.index_of("S"), Some(5));
        assert_eq!(ladder.top(), 7);
    }

    #[test]
    fn test_label_clamps_out_of_range() {
        let ladder = RankLadder::default();
        assert_eq!(ladder.label(999), "SSS");
    }

    #[test]
    fn test_rank_power_monotonic() {
        let ladder = RankLadder::default();
        let tables = ScalingTables::new(&ladder);
        for i in 1..ladder.len() {
            assert!(
                tables.rank_power(i) > tables.rank_power(i - 1),
                "rank power must grow up the ladder"
            );
        }
    }

    #[test]
    fn test_damage_multiplier_clamped_for_all_pairs() {
        let ladder = RankLadder::default();
        let tables = ScalingTables::new(&ladder);

        // Include indices far outside the ladder; they clamp to SSS.
        for att in [0usize, 1, 3, 7, 50, 10_000] {
            for def in [0usize, 1, 3, 7, 50, 10_000] {
                let m = tables.rank_damage_multiplier(att, def);
                assert!(
                    (RANK_DAMAGE_MULT_MIN..=RANK_DAMAGE_MULT_MAX).contains(&m),
                    "multiplier {} for ({}, {}) outside clamp",
                    m,
                    att,
                    def
                );
            }
        }
    }

    #[test]
    fn test_damage_multiplier_favors_higher_attacker() {
        let tables = ScalingTables::new(&RankLadder::default());
        let up = tables.rank_damage_multiplier(4, 1);
        let even = tables.rank_damage_multiplier(3, 3);
        let down = tables.rank_damage_multiplier(1, 4);
        assert!(up > even);
        assert!(down < even);
        assert!((even - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_hp_factor_monotonic() {
        let tables = ScalingTables::new(&RankLadder::default());
        for i in 1..8 {
            assert!(tables.population_hp_factor(i) > tables.population_hp_factor(i - 1));
        }
    }

    #[test]
    fn test_ensure_rederives_on_ladder_change() {
        let short = RankLadder::new(&["I", "II", "III"]);
        let long = RankLadder::default();

        let mut tables = ScalingTables::new(&short);
        let short_top = tables.rank_power(99);

        tables.ensure(&long);
        let long_top = tables.rank_power(99);
        assert!(
            long_top > short_top,
            "re-derived table should reflect the longer ladder"
        );

        // Same ladder again: fingerprint match, values stable.
        tables.ensure(&long);
        assert_eq!(tables.rank_power(99), long_top);
    }
}
