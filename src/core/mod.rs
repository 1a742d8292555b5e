//! Simulation core: constants, context, scheduler, tick orchestration and
//! the suspend/catch-up pass.

pub mod catchup;
pub mod constants;
pub mod context;
pub mod scheduler;
pub mod tick;

pub use constants::*;
pub use context::SimulationContext;
pub use tick::{TickEvent, TickReport};
