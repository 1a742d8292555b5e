// Tick and timing
pub const BASE_TICK_MS: u64 = 1000;
pub const BACKGROUND_MIN_INTERVAL_SECONDS: f64 = 15.0;
pub const BACKGROUND_MAX_INTERVAL_SECONDS: f64 = 20.0;
pub const MAX_SUSPENSION_SECONDS: i64 = 7 * 24 * 60 * 60;

// Attack cadence (seconds between swings, by combatant kind)
pub const AGENT_ATTACK_INTERVAL_SECONDS: f64 = 1.5;
pub const MOB_ATTACK_INTERVAL_SECONDS: f64 = 2.0;
pub const BOSS_ATTACK_INTERVAL_SECONDS: f64 = 1.8;

// Combat channel split: share of agents focusing the boss once it is
// vulnerable, and share of hostile attacks that reach a joined controller
pub const AGENT_BOSS_FOCUS_SHARE: f64 = 0.6;
pub const CONTROLLER_AGGRO_SHARE: f64 = 0.1;

// Bulk combat sampling
pub const AGENT_SAMPLE_CAP: usize = 250;
pub const MOB_SAMPLE_CAP: usize = 500;
pub const SCALE_FACTOR_MIN: f64 = 0.25;
pub const SCALE_FACTOR_MAX: f64 = 25.0;

// Damage resolution
pub const BASE_DAMAGE: f64 = 3.0;
pub const DAMAGE_PER_POWER: f64 = 1.0;
pub const DAMAGE_PER_FINESSE: f64 = 0.5;
pub const BASE_CRIT_CHANCE_PERCENT: f64 = 5.0;
pub const CRIT_CHANCE_PER_INSTINCT: f64 = 0.4;
pub const CRIT_CHANCE_MAX_PERCENT: f64 = 40.0;
pub const CRIT_MULTIPLIER: f64 = 1.75;
pub const DEFENSE_PER_GUARD: f64 = 1.0;
pub const DEFENSE_PER_VITALITY: f64 = 0.25;
pub const DEFENSE_SOFTCAP_K: f64 = 120.0;
pub const DAMAGE_REDUCTION_CAP: f64 = 0.72;
pub const DODGE_CHANCE_PER_FINESSE: f64 = 0.1;
pub const DODGE_CHANCE_MAX_PERCENT: f64 = 12.0;

// Rank curves: power grows geometrically, damage ratio clamped
pub const RANK_POWER_BASE: f64 = 10.0;
pub const RANK_POWER_GROWTH: f64 = 1.55;
pub const RANK_DAMAGE_MULT_EXPONENT: f64 = 1.15;
pub const RANK_DAMAGE_MULT_MIN: f64 = 0.35;
pub const RANK_DAMAGE_MULT_MAX: f64 = 3.0;
pub const POPULATION_HP_FLOOR: f64 = 60.0;
pub const POPULATION_HP_STAT_FACTOR: f64 = 45.0;

// Wave spawning
pub const BASE_WAVE_SIZE: u32 = 70;
pub const WAVE_SIZE_VARIANCE: f64 = 0.20;
pub const WAVE_INTERVAL_SECONDS: f64 = 30.0;
pub const UNIT_STAT_VARIANCE: f64 = 0.15;
pub const UNIT_HP_VARIANCE_MIN: f64 = 0.9;
pub const UNIT_HP_VARIANCE_MAX: f64 = 1.1;
pub const DEFAULT_POPULATION_CAP: u32 = 500;
pub const TEMPLATE_CACHE_CAP: usize = 32;
pub const SPAWN_FLUSH_DEBOUNCE_TICKS: u64 = 2;

// Mob tier shares and multipliers: (hp_mult, dmg_mult)
pub const ELITE_SHARE: f64 = 0.12;
pub const CHAMPION_SHARE: f64 = 0.03;
pub const NORMAL_TIER_MULTIPLIERS: (f64, f64) = (1.0, 1.0);
pub const ELITE_TIER_MULTIPLIERS: (f64, f64) = (2.2, 1.5);
pub const CHAMPION_TIER_MULTIPLIERS: (f64, f64) = (3.5, 1.8);

// Boss scaling (relative to a population unit of the same rank)
pub const BOSS_HP_MULTIPLIER: f64 = 40.0;
pub const BOSS_DAMAGE_MULTIPLIER: f64 = 2.5;
pub const BOSS_STAT_MULTIPLIER: f64 = 1.8;

// Agent allocation
pub const ALLOCATION_TTL_SECONDS: f64 = 60.0;
pub const REBALANCE_MIN_INTERVAL_SECONDS: f64 = 15.0;
pub const WEIGHT_RANK_EXPONENT: f64 = 1.25;
pub const URGENCY_BOSS_WEIGHT: f64 = 0.6;
pub const URGENCY_POPULATION_WEIGHT: f64 = 0.8;
pub const RANK_WINDOW_PASSES: [usize; 3] = [1, 2, 4];
pub const POWER_SHORTFALL_RATIO: f64 = 0.6;
pub const RANK_DRIFT_MAX: f64 = 2.0;
pub const PRESSURE_RESCALE_THRESHOLD: f64 = 0.03;

// Pressure factor: assigned combat power vs the encounter's expected power
pub const PRESSURE_MIN: f64 = 0.5;
pub const PRESSURE_MAX: f64 = 4.0;
// Reference squad power per unit of rank power; ~10 even-rank agents land
// a pressure factor near 1.0.
pub const PRESSURE_REFERENCE_POWER: f64 = 300.0;

// Resurrection economy
pub const DEFAULT_RESOURCE_MAX: f64 = 100.0;
pub const RESOURCE_REGEN_PER_SECOND: f64 = 0.5;
pub const REVIVE_COST_FRACTION_BASE: f64 = 0.12;
pub const REVIVE_COST_FRACTION_STEP: f64 = 0.08;
pub const REVIVE_DISCOUNT_EXPONENT: f64 = 1.5;

// Boss gate
pub const BOSS_GATE_MIN_ELAPSED_SECONDS: f64 = 60.0;
pub const BOSS_GATE_MIN_KILLS: u64 = 25;

// Encounter lifecycle
pub const MAX_ACTIVE_ENCOUNTERS: usize = 64;
pub const ENCOUNTER_TIMEOUT_SECONDS: f64 = 3600.0;
pub const GRACE_WINDOW_SECONDS: f64 = 120.0;
pub const BONUS_EXTRACTION_ATTEMPTS: u32 = 3;

// Agent source caches
pub const AGENT_COUNT_TTL_SECONDS: f64 = 30.0;
pub const AGENT_LIST_TTL_SECONDS: f64 = 5.0;

// Presentation snapshots
pub const SNAPSHOT_MIN_INTERVAL_MS: u64 = 250;

// Persistence gateway
pub const STORE_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const STORE_BACKOFF_BASE_MS: u64 = 50;
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
pub const CIRCUIT_COOLDOWN_TICKS: u64 = 120;

// Store file format
pub const STORE_VERSION_MAGIC: u64 = 0x5741_5246_0000_0001;
