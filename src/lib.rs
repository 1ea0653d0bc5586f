//! Cell-graph automaton.
//!
//! A graph of cells (nodes, directed links and oscillators) advanced in
//! discrete ticks. Every cell computes its next state from its neighbors'
//! previous-tick values, optionally in parallel; learning writes queued during
//! the tick are applied before the new state is published.

#[path = "core/arena.rs"]
pub mod arena;

#[path = "core/automaton.rs"]
pub mod automaton;

#[path = "core/cell.rs"]
pub mod cell;

#[path = "core/deferred.rs"]
pub mod deferred;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/network.rs"]
pub mod network;

#[path = "core/params.rs"]
pub mod params;

#[path = "core/runner.rs"]
pub mod runner;

#[path = "core/storage.rs"]
pub mod storage;

pub mod observer;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::arena::CellIndex;
    pub use crate::automaton::{Automaton, AutomatonCell, ExecutionTier, TickHandle, TickReport};
    pub use crate::cell::{Cell, CellKind, CellTag, Oscillator};
    pub use crate::network::SimulationNetwork;
    pub use crate::params::SimulationParameters;
    pub use crate::runner::AutoStepper;
    pub use crate::{Error, Result};
}
