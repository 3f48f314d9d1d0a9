use serde::{Deserialize, Serialize};
use std::fmt;

/// VIX regime bucket. Intervals are right-open: CALM [0,15),
/// NORMAL [15,20), ELEVATED [20,30), HIGH [30,inf).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VixRegime {
    Calm,
    Normal,
    Elevated,
    High,
}

impl VixRegime {
    pub fn classify(vix: f64) -> Self {
        if vix < 15.0 {
            VixRegime::Calm
        } else if vix < 20.0 {
            VixRegime::Normal
        } else if vix < 30.0 {
            VixRegime::Elevated
        } else {
            VixRegime::High
        }
    }

    /// A significant transition is any ordered pair drawn from
    /// (CALM<->NORMAL), (NORMAL<->ELEVATED), (ELEVATED<->HIGH). Two-step
    /// jumps (e.g. CALM->ELEVATED) and same-regime restatements are not
    /// significant.
    pub fn is_significant_transition(from: VixRegime, to: VixRegime) -> bool {
        use VixRegime::*;
        matches!(
            (from, to),
            (Calm, Normal)
                | (Normal, Calm)
                | (Normal, Elevated)
                | (Elevated, Normal)
                | (Elevated, High)
                | (High, Elevated)
        )
    }
}

impl fmt::Display for VixRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VixRegime::Calm => "CALM",
            VixRegime::Normal => "NORMAL",
            VixRegime::Elevated => "ELEVATED",
            VixRegime::High => "HIGH",
        };
        write!(f, "{s}")
    }
}
