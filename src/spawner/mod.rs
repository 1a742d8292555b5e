//! Population controller: grows each encounter's hostile population in
//! waves, with per-unit variance, tier rolls, and a small template cache so
//! steady-state waves reuse generation work instead of recomputing it.

use std::collections::{HashMap, VecDeque};

use rand::Rng;
use uuid::Uuid;

use crate::combat::types::{generate_boss_name, generate_mob_name, Mob, StatBlock, Tier};
use crate::core::constants::*;
use crate::encounter::logic::on_first_wave;
use crate::encounter::types::{Boss, Encounter, EncounterKey};
use crate::ranks::{RankIndex, RankLadder, ScalingTables};

/// Wave progress for one encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WavePhase {
    Idle,
    WaveDue,
    WaveSpawned,
}

/// A generated unit archetype: everything but identity.
#[derive(Debug, Clone)]
struct MobTemplate {
    name: String,
    tier: Tier,
    stats: StatBlock,
    max_hp: u32,
}

impl MobTemplate {
    fn instantiate(&self, rank: RankIndex) -> Mob {
        Mob {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            rank,
            tier: self.tier,
            max_hp: self.max_hp,
            hp: self.max_hp,
            stats: self.stats,
            attack_interval: MOB_ATTACK_INTERVAL_SECONDS,
        }
    }
}

/// Template-cache key: waves that look alike (same site, rank, rough size
/// and pressure) share archetypes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TemplateKey {
    encounter: EncounterKey,
    rank: RankIndex,
    size_bucket: u32,
    pressure_bucket: u32,
}

#[derive(Debug)]
struct SpawnState {
    phase: WavePhase,
    next_wave_at: f64,
    pending: Vec<Mob>,
    flush_at_tick: u64,
    waves_spawned: u64,
}

impl SpawnState {
    fn new(now: f64) -> Self {
        Self {
            phase: WavePhase::WaveDue,
            next_wave_at: now,
            pending: Vec::new(),
            flush_at_tick: 0,
            waves_spawned: 0,
        }
    }
}

/// What one spawner update did to an encounter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnReport {
    pub units_flushed: usize,
    pub wave_generated: bool,
    pub template_reused: bool,
}

/// Grows and trims hostile populations across all live encounters.
pub struct Spawner {
    states: HashMap<EncounterKey, SpawnState>,
    // FIFO: push_back on insert, pop_front on eviction.
    template_cache: VecDeque<(TemplateKey, Vec<MobTemplate>)>,
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawner {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            template_cache: VecDeque::new(),
        }
    }

    /// Drops all bookkeeping for a torn-down encounter.
    pub fn remove(&mut self, key: &EncounterKey) {
        self.states.remove(key);
        self.template_cache.retain(|(k, _)| &k.encounter != key);
    }

    /// Advances the wave state machine for one encounter.
    ///
    /// Spawning stops entirely once the boss is defeated or the encounter
    /// is terminal; the population cap is never exceeded.
    pub fn update<R: Rng>(
        &mut self,
        enc: &mut Encounter,
        now: f64,
        tick: u64,
        tables: &ScalingTables,
        rng: &mut R,
    ) -> SpawnReport {
        let mut report = SpawnReport::default();

        if enc.phase.is_terminal() || !enc.boss.is_alive() {
            self.states.remove(&enc.key);
            return report;
        }

        let state = self
            .states
            .entry(enc.key.clone())
            .or_insert_with(|| SpawnState::new(now));

        if state.phase == WavePhase::Idle && now >= state.next_wave_at {
            state.phase = WavePhase::WaveDue;
        }

        if state.phase == WavePhase::WaveDue {
            let capacity = enc.population.remaining_capacity();
            let wave_size = roll_wave_size(BASE_WAVE_SIZE, WAVE_SIZE_VARIANCE, capacity, rng);
            if wave_size == 0 {
                // Population is at cap; try again next interval.
                state.phase = WavePhase::Idle;
                state.next_wave_at = now + WAVE_INTERVAL_SECONDS;
            } else {
                let (units, reused) =
                    self.generate_wave(enc, wave_size, tables, rng);
                let state = self.states.get_mut(&enc.key).expect("state inserted above");
                state.pending = units;
                state.flush_at_tick = tick + SPAWN_FLUSH_DEBOUNCE_TICKS;
                state.phase = WavePhase::WaveSpawned;
                report.wave_generated = true;
                report.template_reused = reused;
            }
        }

        let state = self.states.get_mut(&enc.key).expect("state exists");
        if state.phase == WavePhase::WaveSpawned && tick >= state.flush_at_tick {
            // Re-clamp on flush: the cap may have tightened since the wave
            // was generated.
            let room = enc.population.remaining_capacity() as usize;
            let units: Vec<Mob> = state.pending.drain(..).take(room).collect();
            report.units_flushed = units.len();
            enc.population.spawned += units.len() as u64;
            enc.population.mobs.extend(units);

            state.phase = WavePhase::Idle;
            state.next_wave_at = now + WAVE_INTERVAL_SECONDS;
            state.waves_spawned += 1;
            if state.waves_spawned == 1 {
                on_first_wave(enc);
            }
        }

        report
    }

    /// Builds the units for one wave, reusing a cached archetype set when a
    /// matching one exists. Returns (units, reused-from-cache).
    fn generate_wave<R: Rng>(
        &mut self,
        enc: &Encounter,
        wave_size: u32,
        tables: &ScalingTables,
        rng: &mut R,
    ) -> (Vec<Mob>, bool) {
        let key = TemplateKey {
            encounter: enc.key.clone(),
            rank: enc.rank,
            size_bucket: wave_size / 10,
            pressure_bucket: (enc.pressure_factor * 20.0).round() as u32,
        };

        if let Some((_, templates)) = self.template_cache.iter().find(|(k, _)| *k == key) {
            if templates.len() >= wave_size as usize {
                let units = templates[..wave_size as usize]
                    .iter()
                    .map(|t| t.instantiate(enc.rank))
                    .collect();
                return (units, true);
            }
        }

        let templates: Vec<MobTemplate> = (0..wave_size)
            .map(|_| generate_template(enc.rank, enc.pressure_factor, tables, rng))
            .collect();
        let units = templates.iter().map(|t| t.instantiate(enc.rank)).collect();

        self.template_cache.push_back((key, templates));
        while self.template_cache.len() > TEMPLATE_CACHE_CAP {
            self.template_cache.pop_front();
        }

        (units, false)
    }

    #[cfg(test)]
    fn cached_template_sets(&self) -> usize {
        self.template_cache.len()
    }
}

/// `base ± variance%`, clamped to the remaining capacity.
fn roll_wave_size<R: Rng>(base: u32, variance: f64, capacity: u32, rng: &mut R) -> u32 {
    let factor = rng.gen_range(1.0 - variance..=1.0 + variance);
    let size = (base as f64 * factor).round() as u32;
    size.min(capacity)
}

fn roll_tier<R: Rng>(rng: &mut R) -> Tier {
    let roll = rng.gen::<f64>();
    if roll < CHAMPION_SHARE {
        Tier::Champion
    } else if roll < CHAMPION_SHARE + ELITE_SHARE {
        Tier::Elite
    } else {
        Tier::Normal
    }
}

fn generate_template<R: Rng>(
    rank: RankIndex,
    pressure_factor: f64,
    tables: &ScalingTables,
    rng: &mut R,
) -> MobTemplate {
    let tier = roll_tier(rng);
    let (hp_mult, dmg_mult) = tier.multipliers();

    let base_stat = 8 + 4 * rank as u32;
    let stats = StatBlock::uniform(base_stat)
        .with_variance(UNIT_STAT_VARIANCE, rng)
        .scaled(dmg_mult);

    let hp_variance = rng.gen_range(UNIT_HP_VARIANCE_MIN..UNIT_HP_VARIANCE_MAX);
    let max_hp = (tables.population_hp_factor(rank) * hp_mult * pressure_factor * hp_variance)
        .max(1.0) as u32;

    MobTemplate {
        name: generate_mob_name(tier, rng),
        tier,
        stats,
        max_hp,
    }
}

/// Builds the elite unit for a new encounter, scaled off the same curves
/// as its population.
pub fn generate_boss<R: Rng>(
    rank: RankIndex,
    pressure_factor: f64,
    ladder: &RankLadder,
    tables: &ScalingTables,
    rng: &mut R,
) -> Boss {
    let base_stat = 8 + 4 * rank as u32;
    let stats = StatBlock::uniform(base_stat)
        .with_variance(UNIT_STAT_VARIANCE, rng)
        .scaled(BOSS_STAT_MULTIPLIER);

    let unit_hp = tables.population_hp_factor(rank) * pressure_factor;
    let max_hp = (unit_hp * BOSS_HP_MULTIPLIER).max(1.0) as u64;

    Boss {
        name: generate_boss_name(ladder.label(rank), rng),
        rank,
        max_hp,
        hp: max_hp,
        stats,
        attack_interval: BOSS_ATTACK_INTERVAL_SECONDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encounter::types::GateState;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    fn test_encounter(rank: RankIndex) -> Encounter {
        let ladder = RankLadder::default();
        let tables = ScalingTables::new(&ladder);
        let mut rng = test_rng(99);
        let boss = generate_boss(rank, 1.0, &ladder, &tables, &mut rng);
        Encounter::new(format!("site-{}", rank), rank, boss, GateState::default(), 0.0)
    }

    /// Runs updates until the pending wave is flushed.
    fn spawn_one_wave(spawner: &mut Spawner, enc: &mut Encounter, start_tick: u64) -> usize {
        let tables = ScalingTables::new(&RankLadder::default());
        let mut rng = test_rng(5);
        let mut flushed = 0;
        for t in 0..=SPAWN_FLUSH_DEBOUNCE_TICKS + 1 {
            let report = spawner.update(enc, (start_tick + t) as f64, start_tick + t, &tables, &mut rng);
            flushed += report.units_flushed;
        }
        flushed
    }

    #[test]
    fn test_first_wave_size_within_variance_bounds() {
        // Rank C (index 2), cap 500, base 70 ± 20% → alive in [56, 84].
        let mut spawner = Spawner::new();
        let mut enc = test_encounter(2);
        enc.population.cap = 500;

        let flushed = spawn_one_wave(&mut spawner, &mut enc, 0);
        assert!(
            (56..=84).contains(&flushed),
            "wave size {} outside ±20% of 70",
            flushed
        );
        assert_eq!(enc.population.alive(), flushed);
        assert!(enc.population.alive() <= 500);
    }

    #[test]
    fn test_first_wave_advances_phase() {
        let mut spawner = Spawner::new();
        let mut enc = test_encounter(2);
        assert_eq!(enc.phase, crate::encounter::types::Phase::Spawning);
        spawn_one_wave(&mut spawner, &mut enc, 0);
        assert_eq!(enc.phase, crate::encounter::types::Phase::BossGated);
    }

    #[test]
    fn test_population_cap_never_exceeded() {
        let mut spawner = Spawner::new();
        let mut enc = test_encounter(1);
        enc.population.cap = 90;

        let tables = ScalingTables::new(&RankLadder::default());
        let mut rng = test_rng(6);
        // Simulate many wave intervals.
        for tick in 0..500u64 {
            let now = tick as f64;
            spawner.update(&mut enc, now, tick, &tables, &mut rng);
            assert!(
                enc.population.alive() <= 90,
                "alive {} exceeded cap at tick {}",
                enc.population.alive(),
                tick
            );
        }
    }

    #[test]
    fn test_no_spawning_after_boss_dead() {
        let mut spawner = Spawner::new();
        let mut enc = test_encounter(1);
        enc.boss.hp = 0;

        let tables = ScalingTables::new(&RankLadder::default());
        let mut rng = test_rng(7);
        for tick in 0..100u64 {
            let report = spawner.update(&mut enc, tick as f64, tick, &tables, &mut rng);
            assert_eq!(report.units_flushed, 0);
        }
        assert_eq!(enc.population.alive(), 0);
    }

    #[test]
    fn test_template_cache_reuse_at_steady_state() {
        let mut spawner = Spawner::new();
        let mut enc = test_encounter(3);
        enc.population.cap = 10_000;

        let tables = ScalingTables::new(&RankLadder::default());
        let mut rng = test_rng(8);

        let mut reused_any = false;
        let mut now = 0.0;
        let mut tick = 0u64;
        // Enough intervals for several waves at identical rank/pressure.
        for _ in 0..20 {
            for _ in 0..(WAVE_INTERVAL_SECONDS as u64 + SPAWN_FLUSH_DEBOUNCE_TICKS + 1) {
                let report = spawner.update(&mut enc, now, tick, &tables, &mut rng);
                reused_any |= report.template_reused;
                now += 1.0;
                tick += 1;
            }
        }
        assert!(
            reused_any,
            "steady-state waves should hit the template cache"
        );
    }

    #[test]
    fn test_template_cache_fifo_eviction() {
        let mut spawner = Spawner::new();
        let tables = ScalingTables::new(&RankLadder::default());
        let mut rng = test_rng(9);

        // Many distinct encounters, each generating one wave, overflow the cap.
        for i in 0..(TEMPLATE_CACHE_CAP + 10) {
            let mut enc = test_encounter(i % 8);
            enc.key = format!("distinct-{}", i);
            spawner.update(&mut enc, 0.0, 0, &tables, &mut rng);
        }
        assert!(spawner.cached_template_sets() <= TEMPLATE_CACHE_CAP);
    }

    #[test]
    fn test_tier_distribution_roughly_matches_shares() {
        let mut rng = test_rng(10);
        let mut champions = 0u32;
        let mut elites = 0u32;
        let trials = 20_000;
        for _ in 0..trials {
            match roll_tier(&mut rng) {
                Tier::Champion => champions += 1,
                Tier::Elite => elites += 1,
                Tier::Normal => {}
            }
        }
        let champion_share = champions as f64 / trials as f64;
        let elite_share = elites as f64 / trials as f64;
        assert!((champion_share - CHAMPION_SHARE).abs() < 0.01);
        assert!((elite_share - ELITE_SHARE).abs() < 0.02);
    }

    #[test]
    fn test_boss_scales_with_rank_and_pressure() {
        let ladder = RankLadder::default();
        let tables = ScalingTables::new(&ladder);
        let mut rng = test_rng(11);

        let low = generate_boss(0, 1.0, &ladder, &tables, &mut rng);
        let high = generate_boss(6, 1.0, &ladder, &tables, &mut rng);
        assert!(high.max_hp > low.max_hp);

        let pressured = generate_boss(0, 2.0, &ladder, &tables, &mut rng);
        assert!(pressured.max_hp > low.max_hp * 3 / 2);
    }

    #[test]
    fn test_remove_clears_state_and_templates() {
        let mut spawner = Spawner::new();
        let mut enc = test_encounter(2);
        let tables = ScalingTables::new(&RankLadder::default());
        let mut rng = test_rng(12);
        spawner.update(&mut enc, 0.0, 0, &tables, &mut rng);

        spawner.remove(&enc.key);
        assert_eq!(spawner.cached_template_sets(), 0);
        assert!(spawner.states.is_empty());
    }
}
