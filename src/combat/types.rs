use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::constants::*;
use crate::ranks::RankIndex;

/// The five-scalar stat vector shared by every combatant kind.
///
/// Agents, hostile units and the local controller all carry slightly
/// different surrounding shapes, but combat only ever sees this projection
/// (via [`Combatant::stats`]), so the resolver never branches on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    /// Primary offensive stat.
    pub power: u32,
    /// Secondary offensive stat; also drives dodge.
    pub finesse: u32,
    /// Bulk; contributes to effective defense.
    pub vitality: u32,
    /// Primary defensive stat.
    pub guard: u32,
    /// Drives critical-hit chance.
    pub instinct: u32,
}

impl StatBlock {
    pub fn new(power: u32, finesse: u32, vitality: u32, guard: u32, instinct: u32) -> Self {
        Self {
            power,
            finesse,
            vitality,
            guard,
            instinct,
        }
    }

    /// Uniform stats, handy for tests and templates.
    pub fn uniform(value: u32) -> Self {
        Self::new(value, value, value, value, value)
    }

    /// Weighted sum used for combat-score ordering in allocation.
    /// Offensive stats dominate; defensive stats still count.
    pub fn weighted_sum(&self) -> f64 {
        self.power as f64 * 1.0
            + self.finesse as f64 * 0.7
            + self.instinct as f64 * 0.5
            + self.guard as f64 * 0.4
            + self.vitality as f64 * 0.3
    }

    /// Applies a symmetric ±`variance` multiplier to every stat.
    pub fn with_variance<R: Rng>(&self, variance: f64, rng: &mut R) -> Self {
        let mut roll = |v: u32| {
            let factor = rng.gen_range(1.0 - variance..1.0 + variance);
            ((v as f64 * factor).round() as u32).max(1)
        };
        Self {
            power: roll(self.power),
            finesse: roll(self.finesse),
            vitality: roll(self.vitality),
            guard: roll(self.guard),
            instinct: roll(self.instinct),
        }
    }

    /// Scales every stat by `factor`, flooring at 1.
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |v: u32| ((v as f64 * factor).round() as u32).max(1);
        Self {
            power: scale(self.power),
            finesse: scale(self.finesse),
            vitality: scale(self.vitality),
            guard: scale(self.guard),
            instinct: scale(self.instinct),
        }
    }
}

impl Default for StatBlock {
    fn default() -> Self {
        Self::uniform(10)
    }
}

/// Hostile unit tier. Shares are configurable; see the spawner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Normal,
    Elite,
    Champion,
}

impl Tier {
    /// (hp multiplier, damage multiplier) for this tier.
    pub fn multipliers(&self) -> (f64, f64) {
        match self {
            Tier::Normal => NORMAL_TIER_MULTIPLIERS,
            Tier::Elite => ELITE_TIER_MULTIPLIERS,
            Tier::Champion => CHAMPION_TIER_MULTIPLIERS,
        }
    }
}

/// Stable id for a hostile unit.
pub type MobId = Uuid;

/// A transient hostile unit, bound to exactly one encounter.
///
/// Created by the spawner, destroyed on death or encounter teardown.
/// Never persisted long-term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mob {
    pub id: MobId,
    pub name: String,
    pub rank: RankIndex,
    pub tier: Tier,
    pub max_hp: u32,
    pub hp: u32,
    pub stats: StatBlock,
    /// Seconds between attacks.
    pub attack_interval: f64,
}

impl Mob {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.hp = self.hp.saturating_sub(amount);
    }

    /// Rescales max HP by `factor`, preserving the current HP fraction.
    pub fn rescale_hp(&mut self, factor: f64) {
        let fraction = if self.max_hp == 0 {
            1.0
        } else {
            self.hp as f64 / self.max_hp as f64
        };
        self.max_hp = ((self.max_hp as f64 * factor).round() as u32).max(1);
        self.hp = ((self.max_hp as f64 * fraction).round() as u32).min(self.max_hp);
    }
}

/// The local controller's combat shape. The controller participates
/// directly in foreground encounters and owns the resource pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    pub rank: RankIndex,
    pub stats: StatBlock,
    pub max_hp: u32,
    pub hp: u32,
}

impl ControllerState {
    pub fn new(rank: RankIndex, stats: StatBlock, max_hp: u32) -> Self {
        Self {
            rank,
            stats,
            max_hp,
            hp: max_hp,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.hp = self.hp.saturating_sub(amount);
    }
}

/// Tagged view over the three combatant kinds.
///
/// The resolver consumes only [`Combatant::stats`] and [`Combatant::rank`];
/// there is deliberately no "has property X" escape hatch here.
#[derive(Debug, Clone, Copy)]
pub enum Combatant<'a> {
    Agent(&'a crate::agents::Agent),
    Hostile(&'a Mob),
    Controller(&'a ControllerState),
}

impl Combatant<'_> {
    pub fn stats(&self) -> &StatBlock {
        match self {
            Combatant::Agent(a) => &a.stats,
            Combatant::Hostile(m) => &m.stats,
            Combatant::Controller(c) => &c.stats,
        }
    }

    pub fn rank(&self) -> RankIndex {
        match self {
            Combatant::Agent(a) => a.rank,
            Combatant::Hostile(m) => m.rank,
            Combatant::Controller(c) => c.rank,
        }
    }
}

const MOB_PREFIXES: [&str; 10] = [
    "Ash", "Rift", "Grave", "Husk", "Vile", "Dread", "Rot", "Storm", "Fell", "Null",
];
const MOB_ROOTS: [&str; 10] = [
    "fang", "maw", "claw", "brood", "shard", "spine", "hide", "wing", "eye", "husk",
];
const MOB_KINDS: [&str; 10] = [
    "Stalker", "Render", "Shambler", "Warden", "Brute", "Howler", "Creeper", "Ravager",
    "Lurker", "Spawn",
];
const BOSS_TITLES: [&str; 8] = [
    "Harbinger", "Overlord", "Matriarch", "Tyrant", "Devourer", "Sovereign", "Colossus",
    "Herald",
];

/// Generates a flavor name for a hostile unit. Presentation data only.
pub fn generate_mob_name<R: Rng>(tier: Tier, rng: &mut R) -> String {
    let prefix = MOB_PREFIXES[rng.gen_range(0..MOB_PREFIXES.len())];
    let root = MOB_ROOTS[rng.gen_range(0..MOB_ROOTS.len())];
    let kind = MOB_KINDS[rng.gen_range(0..MOB_KINDS.len())];
    match tier {
        Tier::Normal => format!("{}{} {}", prefix, root, kind),
        Tier::Elite => format!("Elite {}{} {}", prefix, root, kind),
        Tier::Champion => format!("Champion {}{} {}", prefix, root, kind),
    }
}

/// Generates a boss name for an encounter of the given rank label.
pub fn generate_boss_name<R: Rng>(rank_label: &str, rng: &mut R) -> String {
    let prefix = MOB_PREFIXES[rng.gen_range(0..MOB_PREFIXES.len())];
    let root = MOB_ROOTS[rng.gen_range(0..MOB_ROOTS.len())];
    let title = BOSS_TITLES[rng.gen_range(0..BOSS_TITLES.len())];
    format!("{}{} {} [{}]", prefix, root, title, rank_label)
}
