//! Simulation error taxonomy.
//!
//! The engine favors degraded operation over failure: most of these errors
//! are reported to the caller and absorbed at the tick boundary rather than
//! unwinding. See each variant for its recovery semantics.

use thiserror::Error;

use crate::encounter::types::EncounterKey;

#[derive(Debug, Error)]
pub enum SimError {
    /// The agent pool could not cover the weighted demand of all active
    /// encounters. Recovery: encounters are under-assigned and proceed at
    /// reduced effectiveness; never blocks.
    #[error("agent pool short by {shortfall} for {encounters} encounters")]
    AllocationShortfall {
        shortfall: usize,
        encounters: usize,
    },

    /// A resource-gated action (revival) was denied. Reported to the caller;
    /// never retried automatically.
    #[error("resource {available:.1} below cost {cost:.1}")]
    ResourceInsufficient { cost: f64, available: f64 },

    /// A scheduled operation targeted an encounter that no longer exists.
    /// Call sites discard the operation silently.
    #[error("encounter {0} no longer exists")]
    StaleEncounter(EncounterKey),

    /// The persistence collaborator failed. The gateway logs, continues
    /// memory-only, and retries after a cooldown.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Loaded or in-memory state was missing an expected substructure and
    /// was repaired to an empty-but-valid shape.
    #[error("malformed {what} repaired for encounter {key}")]
    MalformedState { key: EncounterKey, what: &'static str },
}

pub type SimResult<T> = Result<T, SimError>;
