//! Integration test: agent allocation invariants.
//!
//! Exclusivity (an agent serves at most one encounter), conservation
//! (assignments never exceed the pool), weighted splitting, and graceful
//! degradation when the pool cannot cover demand.

use std::collections::HashSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use warfront::agents::{Agent, StaticAgentPool};
use warfront::combat::types::{ControllerState, StatBlock};
use warfront::snapshot::NullSink;
use warfront::SimulationContext;

fn test_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

fn build_pool(count: usize) -> Box<StaticAgentPool> {
    Box::new(StaticAgentPool::new(
        (0..count as u64)
            .map(|id| Agent {
                id,
                name: format!("Agent {}", id),
                rank: (id % 8) as usize,
                stats: StatBlock::uniform(20),
            })
            .collect(),
    ))
}

fn build_context(agents: usize) -> SimulationContext {
    SimulationContext::new(
        build_pool(agents),
        ControllerState::new(4, StatBlock::uniform(40), 2000),
        Box::new(NullSink),
        None,
    )
}

/// Collects every encounter's assigned agent ids from the public summary
/// plus the ledger sizes, asserting exclusivity via the ledgers.
fn assert_invariants(ctx: &SimulationContext, keys: &[String], pool_size: usize) {
    let mut total_assigned = 0usize;
    let mut seen: HashSet<u64> = HashSet::new();
    for key in keys {
        let Some(enc) = ctx.encounter(key) else {
            continue;
        };
        total_assigned += enc.assignment.agent_count;
        for id in enc.health.ids() {
            assert!(
                seen.insert(id),
                "agent {} appears in more than one encounter",
                id
            );
        }
    }
    assert!(
        total_assigned <= pool_size,
        "assigned {} agents from a pool of {}",
        total_assigned,
        pool_size
    );
}

#[test]
fn test_exclusivity_and_conservation_over_many_passes() {
    let mut ctx = build_context(60);
    let mut rng = test_rng(1);

    let keys: Vec<String> = (0..6).map(|i| format!("front-{}", i)).collect();
    for (i, key) in keys.iter().enumerate() {
        assert!(ctx.create_encounter(key.clone(), i, &mut rng));
    }

    // Run long enough to cross several allocation TTLs and rebalances.
    for _ in 0..180 {
        ctx.tick(&mut rng);
        assert_invariants(&ctx, &keys, 60);
    }
}

#[test]
fn test_higher_rank_encounter_draws_more_agents() {
    let mut ctx = build_context(40);
    let mut rng = test_rng(2);

    ctx.create_encounter("minor".to_string(), 0, &mut rng);
    ctx.create_encounter("major".to_string(), 6, &mut rng);

    // First tick runs the initial allocation pass.
    ctx.tick(&mut rng);

    let minor = ctx.encounter(&"minor".to_string()).unwrap();
    let major = ctx.encounter(&"major".to_string()).unwrap();
    assert!(
        major.assignment.agent_count > minor.assignment.agent_count,
        "rank-weighted split: major {} vs minor {}",
        major.assignment.agent_count,
        minor.assignment.agent_count
    );
    assert_eq!(
        major.assignment.agent_count + minor.assignment.agent_count,
        40,
        "the whole pool should be put to work"
    );
}

#[test]
fn test_undersized_pool_degrades_without_failing() {
    let mut ctx = build_context(3);
    let mut rng = test_rng(3);

    for i in 0..5 {
        ctx.create_encounter(format!("starved-{}", i), i, &mut rng);
    }

    // Ticks proceed; nothing panics, encounters just run lean.
    for _ in 0..60 {
        let report = ctx.tick(&mut rng);
        assert!(report.tick > 0);
    }
    let keys: Vec<String> = (0..5).map(|i| format!("starved-{}", i)).collect();
    assert_invariants(&ctx, &keys, 3);
}

#[test]
fn test_pool_change_notification_reallocates() {
    let mut ctx = build_context(20);
    let mut rng = test_rng(4);
    ctx.create_encounter("front".to_string(), 3, &mut rng);
    ctx.tick(&mut rng);

    let before = ctx
        .encounter(&"front".to_string())
        .unwrap()
        .assignment
        .agent_count;
    assert!(before > 0);

    // Invalidation forces a fresh pass on the next tick instead of waiting
    // out the 60s TTL.
    ctx.notify_agent_pool_changed();
    let report = ctx.tick(&mut rng);
    assert!(report.tick > 1);
    let after = ctx
        .encounter(&"front".to_string())
        .unwrap()
        .assignment
        .agent_count;
    assert_eq!(before, after, "same pool, same outcome, fresh pass");
}
