//! Read-only presentation snapshots.
//!
//! The presentation collaborator receives throttled, serializable views of
//! encounter state. The core never blocks on the sink and never hands out
//! references into live state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::constants::SNAPSHOT_MIN_INTERVAL_MS;
use crate::encounter::types::{Encounter, EncounterKey, Phase};
use crate::ranks::RankLadder;

/// One rendering-ready view of an encounter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterSnapshot {
    pub key: EncounterKey,
    pub rank_label: String,
    pub phase: Phase,
    pub boss_name: String,
    pub boss_hp: u64,
    pub boss_max_hp: u64,
    pub boss_vulnerable: bool,
    pub alive: usize,
    pub spawned: u64,
    pub killed: u64,
    pub cap: u32,
    pub agent_count: usize,
    pub combat_power: f64,
    pub pressure_factor: f64,
    pub controller_joined: bool,
    pub revives: u64,
}

impl EncounterSnapshot {
    pub fn capture(enc: &Encounter, ladder: &RankLadder) -> Self {
        Self {
            key: enc.key.clone(),
            rank_label: ladder.label(enc.rank).to_string(),
            phase: enc.phase,
            boss_name: enc.boss.name.clone(),
            boss_hp: enc.boss.hp,
            boss_max_hp: enc.boss.max_hp,
            boss_vulnerable: enc.phase.boss_vulnerable(),
            alive: enc.population.alive(),
            spawned: enc.population.spawned,
            killed: enc.population.killed,
            cap: enc.population.cap,
            agent_count: enc.assignment.agent_count,
            combat_power: enc.assignment.combat_power,
            pressure_factor: enc.pressure_factor,
            controller_joined: enc.controller_joined,
            revives: enc.revives,
        }
    }
}

/// Presentation collaborator. Implementations must return promptly; the
/// tick loop calls this inline.
pub trait SnapshotSink {
    fn publish(&mut self, snapshot: EncounterSnapshot);
}

/// No-op sink for headless operation.
#[derive(Debug, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn publish(&mut self, _snapshot: EncounterSnapshot) {}
}

/// Throttles snapshot emission to at most one per encounter per
/// `min_interval_ms` (default: 4/sec).
pub struct SnapshotEmitter {
    min_interval_ms: u64,
    last_emit_ms: HashMap<EncounterKey, u64>,
}

impl Default for SnapshotEmitter {
    fn default() -> Self {
        Self::new(SNAPSHOT_MIN_INTERVAL_MS)
    }
}

impl SnapshotEmitter {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_emit_ms: HashMap::new(),
        }
    }

    /// Publishes a snapshot unless this encounter emitted too recently.
    /// Returns whether one was published.
    pub fn emit(
        &mut self,
        enc: &Encounter,
        ladder: &RankLadder,
        now_ms: u64,
        sink: &mut dyn SnapshotSink,
    ) -> bool {
        if let Some(last) = self.last_emit_ms.get(&enc.key) {
            if now_ms.saturating_sub(*last) < self.min_interval_ms {
                return false;
            }
        }
        self.last_emit_ms.insert(enc.key.clone(), now_ms);
        sink.publish(EncounterSnapshot::capture(enc, ladder));
        true
    }

    pub fn remove(&mut self, key: &EncounterKey) {
        self.last_emit_ms.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::types::StatBlock;
    use crate::encounter::types::{Boss, GateState};

    #[derive(Default)]
    struct CollectingSink {
        published: Vec<EncounterSnapshot>,
    }

    impl SnapshotSink for CollectingSink {
        fn publish(&mut self, snapshot: EncounterSnapshot) {
            self.published.push(snapshot);
        }
    }

    fn test_encounter() -> Encounter {
        let boss = Boss {
            name: "Nullshard Herald [B]".to_string(),
            rank: 3,
            max_hp: 5000,
            hp: 5000,
            stats: StatBlock::uniform(25),
            attack_interval: 1.8,
        };
        Encounter::new("site-9".to_string(), 3, boss, GateState::default(), 0.0)
    }

    #[test]
    fn test_snapshot_captures_state() {
        let enc = test_encounter();
        let snapshot = EncounterSnapshot::capture(&enc, &RankLadder::default());
        assert_eq!(snapshot.key, "site-9");
        assert_eq!(snapshot.rank_label, "B");
        assert_eq!(snapshot.boss_max_hp, 5000);
        assert!(!snapshot.boss_vulnerable);
    }

    #[test]
    fn test_emitter_throttles_per_encounter() {
        let enc = test_encounter();
        let ladder = RankLadder::default();
        let mut emitter = SnapshotEmitter::new(250);
        let mut sink = CollectingSink::default();

        assert!(emitter.emit(&enc, &ladder, 0, &mut sink));
        assert!(!emitter.emit(&enc, &ladder, 100, &mut sink));
        assert!(!emitter.emit(&enc, &ladder, 249, &mut sink));
        assert!(emitter.emit(&enc, &ladder, 250, &mut sink));
        assert_eq!(sink.published.len(), 2);
    }

    #[test]
    fn test_emitter_tracks_encounters_independently() {
        let enc_a = test_encounter();
        let mut enc_b = test_encounter();
        enc_b.key = "site-10".to_string();

        let ladder = RankLadder::default();
        let mut emitter = SnapshotEmitter::new(250);
        let mut sink = CollectingSink::default();

        assert!(emitter.emit(&enc_a, &ladder, 0, &mut sink));
        assert!(emitter.emit(&enc_b, &ladder, 10, &mut sink));
        assert!(!emitter.emit(&enc_a, &ladder, 20, &mut sink));
    }
}
