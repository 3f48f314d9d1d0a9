//! Core data model: positions, portfolio snapshots, policy-engine
//! actions, VIX regimes, and the invariant/agent error types.

pub mod action;
pub mod errors;
pub mod position;
pub mod regime;

pub use action::{Action, ActionKind, OrderSide, OrderType};
pub use errors::{AgentError, InvariantError};
pub use position::{PortfolioSnapshot, Position};
pub use regime::VixRegime;
