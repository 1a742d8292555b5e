//! Encounter lifecycle: state machine, boss gate, damage application.

pub mod logic;
pub mod types;

pub use logic::{apply_boss_damage, apply_population_damage, BossAttackResult};
pub use types::{Boss, Encounter, EncounterKey, GateState, Phase, PopulationState};
