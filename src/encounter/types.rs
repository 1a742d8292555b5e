use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::combat::types::{Mob, StatBlock};
use crate::core::constants::*;
use crate::ranks::RankIndex;
use crate::revival::HealthLedger;

/// Unique key claimed by a live encounter (spawn-site id from the trigger
/// collaborator). At most one live encounter exists per key.
pub type EncounterKey = String;

/// Encounter lifecycle phase. Transitions are monotonic; see
/// [`Encounter::advance_phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Initial population is being built up.
    Spawning,
    /// Fighting, no boss gate configured: the boss is vulnerable.
    Active,
    /// Fighting, boss gate not yet satisfied.
    BossGated,
    /// Gate satisfied; the boss can take damage.
    BossUnlocked,
    /// Boss defeated.
    Resolved,
    /// Duration timeout hit before the boss fell.
    Failed,
    /// Fully torn down; only a tombstone remains.
    Archived,
}

impl Phase {
    /// Monotonic ordering rank. Phases sharing a stage (Active/BossGated,
    /// Resolved/Failed) are alternatives, not steps.
    fn stage(&self) -> u8 {
        match self {
            Phase::Spawning => 0,
            Phase::Active | Phase::BossGated => 1,
            Phase::BossUnlocked => 2,
            Phase::Resolved | Phase::Failed => 3,
            Phase::Archived => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Resolved | Phase::Failed | Phase::Archived)
    }

    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    pub fn boss_vulnerable(&self) -> bool {
        matches!(self, Phase::Active | Phase::BossUnlocked)
    }
}

/// The encounter's elite unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Boss {
    pub name: String,
    pub rank: RankIndex,
    pub max_hp: u64,
    pub hp: u64,
    pub stats: StatBlock,
    /// Seconds between attacks.
    pub attack_interval: f64,
}

impl Boss {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn hp_fraction(&self) -> f64 {
        if self.max_hp == 0 {
            0.0
        } else {
            self.hp as f64 / self.max_hp as f64
        }
    }

    /// Empty-but-valid placeholder used when a loaded record is missing its
    /// boss substructure.
    pub fn empty(rank: RankIndex) -> Self {
        Self {
            name: String::new(),
            rank,
            max_hp: 0,
            hp: 0,
            stats: StatBlock::default(),
            attack_interval: BOSS_ATTACK_INTERVAL_SECONDS,
        }
    }

    /// Rescales max HP by `factor`, preserving the current HP fraction.
    pub fn rescale_hp(&mut self, factor: f64) {
        let fraction = self.hp_fraction();
        self.max_hp = ((self.max_hp as f64 * factor).round() as u64).max(1);
        self.hp = ((self.max_hp as f64 * fraction).round() as u64).min(self.max_hp);
    }
}

/// Time + kill-count precondition before the boss may be damaged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateState {
    pub enabled: bool,
    pub min_elapsed_seconds: f64,
    pub min_kills: u64,
}

impl Default for GateState {
    fn default() -> Self {
        Self {
            enabled: true,
            min_elapsed_seconds: BOSS_GATE_MIN_ELAPSED_SECONDS,
            min_kills: BOSS_GATE_MIN_KILLS,
        }
    }
}

/// Population counters plus the live hostile-unit collection.
///
/// The unit collection is transient (never persisted); the counters are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopulationState {
    pub spawned: u64,
    pub killed: u64,
    pub cap: u32,
    #[serde(skip)]
    pub mobs: Vec<Mob>,
}

impl PopulationState {
    pub fn alive(&self) -> usize {
        self.mobs.iter().filter(|m| m.is_alive()).count()
    }

    /// Fraction of the cap currently alive. Drives allocation urgency.
    pub fn alive_fraction(&self) -> f64 {
        if self.cap == 0 {
            0.0
        } else {
            (self.alive() as f64 / self.cap as f64).min(1.0)
        }
    }

    /// Room left under the population cap.
    pub fn remaining_capacity(&self) -> u32 {
        (self.cap as usize).saturating_sub(self.alive()) as u32
    }
}

/// Cached allocation outcome for display and urgency math.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AssignmentSummary {
    pub agent_count: usize,
    pub combat_power: f64,
}

/// One active instance of the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encounter {
    pub key: EncounterKey,
    pub rank: RankIndex,
    pub phase: Phase,
    /// Simulation-clock second this encounter was created.
    pub created_at: f64,
    /// Hard duration timeout; reaching it fails the encounter.
    pub deadline: f64,
    #[serde(default = "default_boss")]
    pub boss: Boss,
    #[serde(default)]
    pub gate: GateState,
    #[serde(default)]
    pub population: PopulationState,
    #[serde(default)]
    pub assignment: AssignmentSummary,
    #[serde(default)]
    pub controller_joined: bool,
    /// Difficulty multiplier derived from assigned combat power.
    pub pressure_factor: f64,
    /// Total successful revives inside this encounter.
    #[serde(default)]
    pub revives: u64,
    /// End of the post-resolution grace window, when one applies.
    #[serde(default)]
    pub grace_until: Option<f64>,
    #[serde(default)]
    pub bonus_attempts_left: u32,
    /// Per-agent HP tracking, lazily populated on first assignment.
    #[serde(skip)]
    pub health: HealthLedger,
    #[serde(skip, default)]
    repair_logged: bool,
}

fn default_boss() -> Boss {
    Boss::empty(0)
}

impl Encounter {
    pub fn new(key: EncounterKey, rank: RankIndex, boss: Boss, gate: GateState, now: f64) -> Self {
        Self {
            key,
            rank,
            phase: Phase::Spawning,
            created_at: now,
            deadline: now + ENCOUNTER_TIMEOUT_SECONDS,
            boss,
            gate,
            population: PopulationState {
                cap: DEFAULT_POPULATION_CAP,
                ..PopulationState::default()
            },
            assignment: AssignmentSummary::default(),
            controller_joined: false,
            pressure_factor: 1.0,
            revives: 0,
            grace_until: None,
            bonus_attempts_left: 0,
            health: HealthLedger::default(),
            repair_logged: false,
        }
    }

    pub fn elapsed(&self, now: f64) -> f64 {
        (now - self.created_at).max(0.0)
    }

    /// Advances the phase, ignoring (and logging) any backward transition.
    /// Phases only ever move forward; a stale caller cannot regress one.
    pub fn advance_phase(&mut self, next: Phase) {
        if next.stage() >= self.phase.stage() {
            self.phase = next;
        } else {
            warn!(
                key = %self.key,
                from = ?self.phase,
                to = ?next,
                "ignoring backward phase transition"
            );
        }
    }

    /// Allocation urgency: an alive boss and a full population both pull
    /// agents toward this encounter.
    pub fn urgency(&self) -> f64 {
        let boss_term = if self.boss.is_alive() {
            URGENCY_BOSS_WEIGHT * self.boss.hp_fraction()
        } else {
            0.0
        };
        1.0 + boss_term + URGENCY_POPULATION_WEIGHT * self.population.alive_fraction()
    }

    /// Defensively reconstructs missing or nonsensical substructures to
    /// empty-but-valid shapes. Returns true if anything was repaired.
    ///
    /// Losing a long-running encounter to a transient data-shape problem is
    /// worse than continuing with degraded state, so this never fails.
    pub fn repair(&mut self) -> bool {
        let mut repaired = false;

        if self.boss.hp > self.boss.max_hp {
            self.boss.hp = self.boss.max_hp;
            repaired = true;
        }
        if self.boss.attack_interval <= 0.0 {
            self.boss.attack_interval = BOSS_ATTACK_INTERVAL_SECONDS;
            repaired = true;
        }
        if self.population.cap == 0 {
            self.population.cap = DEFAULT_POPULATION_CAP;
            repaired = true;
        }
        if self.population.killed > self.population.spawned {
            self.population.killed = self.population.spawned;
            repaired = true;
        }
        if !(self.pressure_factor.is_finite()) || self.pressure_factor <= 0.0 {
            self.pressure_factor = 1.0;
            repaired = true;
        }
        if self.deadline < self.created_at {
            self.deadline = self.created_at + ENCOUNTER_TIMEOUT_SECONDS;
            repaired = true;
        }

        if repaired && !self.repair_logged {
            warn!(key = %self.key, "repaired malformed encounter state");
            self.repair_logged = true;
        }
        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_boss(hp: u64) -> Boss {
        Boss {
            name: "Ashmaw Tyrant [C]".to_string(),
            rank: 2,
            max_hp: hp,
            hp,
            stats: StatBlock::uniform(30),
            attack_interval: BOSS_ATTACK_INTERVAL_SECONDS,
        }
    }

    fn test_encounter() -> Encounter {
        Encounter::new(
            "site-7".to_string(),
            2,
            test_boss(1000),
            GateState::default(),
            0.0,
        )
    }

    #[test]
    fn test_new_encounter_starts_spawning() {
        let enc = test_encounter();
        assert_eq!(enc.phase, Phase::Spawning);
        assert!(enc.phase.is_live());
        assert!(!enc.phase.boss_vulnerable());
        assert_eq!(enc.population.cap, DEFAULT_POPULATION_CAP);
    }

    #[test]
    fn test_phase_never_regresses() {
        let mut enc = test_encounter();
        enc.advance_phase(Phase::BossGated);
        enc.advance_phase(Phase::BossUnlocked);
        enc.advance_phase(Phase::BossGated);
        assert_eq!(enc.phase, Phase::BossUnlocked);

        enc.advance_phase(Phase::Resolved);
        enc.advance_phase(Phase::Spawning);
        assert_eq!(enc.phase, Phase::Resolved);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Resolved.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Archived.is_terminal());
        assert!(!Phase::BossUnlocked.is_terminal());
    }

    #[test]
    fn test_urgency_rises_with_boss_and_population() {
        let mut enc = test_encounter();
        let base = enc.urgency();

        // Kill the boss: urgency drops.
        enc.boss.hp = 0;
        assert!(enc.urgency() < base);
    }

    #[test]
    fn test_repair_fixes_bad_shapes() {
        let mut enc = test_encounter();
        enc.boss.hp = enc.boss.max_hp + 50;
        enc.population.cap = 0;
        enc.population.killed = 10;
        enc.pressure_factor = f64::NAN;
        enc.deadline = -5.0;

        assert!(enc.repair());
        assert_eq!(enc.boss.hp, enc.boss.max_hp);
        assert_eq!(enc.population.cap, DEFAULT_POPULATION_CAP);
        assert_eq!(enc.population.killed, 0);
        assert!((enc.pressure_factor - 1.0).abs() < 1e-9);
        assert!(enc.deadline > enc.created_at);

        // A healthy encounter repairs nothing.
        assert!(!enc.repair());
    }

    #[test]
    fn test_boss_rescale_preserves_fraction() {
        let mut boss = test_boss(1000);
        boss.hp = 250;
        boss.rescale_hp(2.0);
        assert_eq!(boss.max_hp, 2000);
        assert_eq!(boss.hp, 500);
    }

    #[test]
    fn test_serde_round_trip_skips_transients() {
        let mut enc = test_encounter();
        enc.population.mobs.push(crate::combat::types::Mob {
            id: uuid::Uuid::new_v4(),
            name: "x".into(),
            rank: 2,
            tier: crate::combat::types::Tier::Normal,
            max_hp: 10,
            hp: 10,
            stats: StatBlock::default(),
            attack_interval: 2.0,
        });
        enc.population.spawned = 1;

        let json = serde_json::to_string(&enc).unwrap();
        let loaded: Encounter = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.key, enc.key);
        assert_eq!(loaded.population.spawned, 1);
        assert!(loaded.population.mobs.is_empty(), "mobs are transient");
        assert!(loaded.health.is_empty(), "ledger is transient");
    }
}
