//! Turn aggregation.

mod collector;
#[allow(clippy::module_inception)]
mod turn;

pub use collector::{TurnFeed, collect_turns};
pub use turn::{RunResult, Turn};
