//! Headless simulation runner.
//!
//! Drives a full simulation context for a configurable number of simulated
//! minutes and prints an end-of-run report. Useful for balance work and
//! for profiling the tick budget.
//!
//! Usage:
//!   cargo run --bin simulate -- [OPTIONS]
//!
//! Examples:
//!   cargo run --bin simulate                          # 30 min, 6 encounters
//!   cargo run --bin simulate -- -m 120 -e 24 -a 200   # bigger battlefield
//!   cargo run --bin simulate -- --seed 42             # reproducible run
//!   cargo run --bin simulate -- --suspend 300         # test catch-up pass

use std::env;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use warfront::agents::{Agent, StaticAgentPool};
use warfront::combat::types::{ControllerState, StatBlock};
use warfront::snapshot::NullSink;
use warfront::{RankLadder, SimulationContext, TickEvent};

struct RunConfig {
    minutes: u64,
    encounters: usize,
    agents: usize,
    seed: Option<u64>,
    suspend_seconds: Option<i64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            minutes: 30,
            encounters: 6,
            agents: 80,
            seed: None,
            suspend_seconds: None,
        }
    }
}

#[derive(Default)]
struct RunStats {
    waves: u64,
    units_spawned: u64,
    population_kills: u64,
    boss_damage: u64,
    bosses_defeated: u64,
    agent_deaths: u64,
    agents_revived: u64,
    revival_spent: f64,
    encounters_failed: u64,
    shortfall_ticks: u64,
}

impl RunStats {
    fn absorb(&mut self, events: &[TickEvent]) {
        for event in events {
            match event {
                TickEvent::WaveSpawned { units, .. } => {
                    self.waves += 1;
                    self.units_spawned += *units as u64;
                }
                TickEvent::PopulationDamaged { kills, .. } => self.population_kills += kills,
                TickEvent::BossDamaged { damage, .. } => self.boss_damage += damage,
                TickEvent::BossDefeated { .. } => self.bosses_defeated += 1,
                TickEvent::AgentsStruck { deaths, .. } => self.agent_deaths += *deaths as u64,
                TickEvent::RevivalSettled { revived, spent, .. } => {
                    self.agents_revived += *revived as u64;
                    self.revival_spent += spent;
                }
                TickEvent::EncounterFailed { .. } => self.encounters_failed += 1,
                TickEvent::AllocationShortfall { .. } => self.shortfall_ticks += 1,
                _ => {}
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let config = parse_args(&env::args().collect::<Vec<_>>());
    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    println!("warfront headless simulation");
    println!("  minutes:    {}", config.minutes);
    println!("  encounters: {}", config.encounters);
    println!("  agents:     {}", config.agents);
    if let Some(seed) = config.seed {
        println!("  seed:       {}", seed);
    }
    println!();

    let ladder = RankLadder::default();
    let pool = build_pool(config.agents, &ladder, &mut rng);
    let controller = ControllerState::new(4, StatBlock::uniform(45), 3000);
    let mut ctx = SimulationContext::new(Box::new(pool), controller, Box::new(NullSink), None);

    for i in 0..config.encounters {
        let rank = i % ladder.len();
        ctx.create_encounter(format!("site-{}", i), rank, &mut rng);
    }
    // The first encounter is the one the controller cares about.
    let home = "site-0".to_string();
    let _ = ctx.join_controller(&home);

    let mut stats = RunStats::default();
    let total_ticks = config.minutes * 60;
    for _ in 0..total_ticks {
        let report = ctx.tick(&mut rng);
        stats.absorb(&report.events);
    }

    if let Some(gap) = config.suspend_seconds {
        println!("suspending for {}s...", gap);
        ctx.suspend_at(0);
        let catchup = ctx.resume_at(gap, &mut rng);
        println!(
            "catch-up: {} encounters, {} cycles each, capped: {}",
            catchup.encounters.len(),
            catchup.simulated_seconds,
            catchup.capped
        );
        for enc in &catchup.encounters {
            println!(
                "  {}: boss -{}, population -{} ({} kills), agent deaths {}, revived {}",
                enc.key,
                enc.boss_damage,
                enc.population_damage,
                enc.population_kills,
                enc.agent_deaths,
                enc.agents_revived
            );
        }
        println!();
    }

    println!("── report ──────────────────────────────");
    println!("  ticks:              {}", total_ticks);
    println!("  waves:              {}", stats.waves);
    println!("  units spawned:      {}", stats.units_spawned);
    println!("  population kills:   {}", stats.population_kills);
    println!("  boss damage:        {}", stats.boss_damage);
    println!("  bosses defeated:    {}", stats.bosses_defeated);
    println!("  encounters failed:  {}", stats.encounters_failed);
    println!("  agent deaths:       {}", stats.agent_deaths);
    println!("  agents revived:     {}", stats.agents_revived);
    println!("  revival spent:      {:.1}", stats.revival_spent);
    println!("  shortfall ticks:    {}", stats.shortfall_ticks);
    println!(
        "  resource:           {:.1}/{:.1}",
        ctx.resource().current,
        ctx.resource().max
    );
    println!("  controller hp:      {}", ctx.controller().hp);

    ctx.shutdown();
}

fn build_pool(count: usize, ladder: &RankLadder, rng: &mut ChaCha8Rng) -> StaticAgentPool {
    use rand::Rng;
    let agents = (0..count as u64)
        .map(|id| {
            let rank = rng.gen_range(0..ladder.len());
            Agent {
                id,
                name: format!("Agent {}", id),
                rank,
                stats: StatBlock::uniform(15 + 5 * rank as u32).with_variance(0.15, rng),
            }
        })
        .collect();
    StaticAgentPool::new(agents)
}

fn parse_args(args: &[String]) -> RunConfig {
    let mut config = RunConfig::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-m" | "--minutes" => {
                if i + 1 < args.len() {
                    config.minutes = args[i + 1].parse().unwrap_or(config.minutes);
                    i += 1;
                }
            }
            "-e" | "--encounters" => {
                if i + 1 < args.len() {
                    config.encounters = args[i + 1].parse().unwrap_or(config.encounters);
                    i += 1;
                }
            }
            "-a" | "--agents" => {
                if i + 1 < args.len() {
                    config.agents = args[i + 1].parse().unwrap_or(config.agents);
                    i += 1;
                }
            }
            "--seed" => {
                if i + 1 < args.len() {
                    config.seed = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--suspend" => {
                if i + 1 < args.len() {
                    config.suspend_seconds = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "-h" | "--help" => {
                println!("Options:");
                println!("  -m, --minutes N     simulated minutes (default 30)");
                println!("  -e, --encounters N  concurrent encounters (default 6)");
                println!("  -a, --agents N      agent pool size (default 80)");
                println!("      --seed N        deterministic RNG seed");
                println!("      --suspend N     run a catch-up pass of N seconds at the end");
                std::process::exit(0);
            }
            other => {
                eprintln!("unknown option: {}", other);
                std::process::exit(1);
            }
        }
        i += 1;
    }
    config
}
