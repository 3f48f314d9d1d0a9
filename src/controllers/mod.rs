pub mod defensive;
pub mod rotation;

pub use defensive::DefensiveController;
pub use rotation::RotationController;
