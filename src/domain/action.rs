use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side as submitted to the Broker Port. Short and cover are
/// symmetric to buy/sell but operate on negative-quantity positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
    Short,
    Cover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// Kinds of action the Policy Engine may emit for a ticker in a single
/// cycle. Invariant: at most one of {StopLossExit, ProfitProtectionExit}
/// per ticker per cycle; DipBuy never coexists with either on the same
/// ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    StopLossExit,
    ProfitProtectionExit,
    DipBuy,
    DefensiveTrim,
    DefensiveExit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub ticker: String,
    pub kind: ActionKind,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub reason: String,
    /// Set when this action's entry also requests a scheduled review with
    /// redeployment context (profit-protection entries marked
    /// `trigger_review`).
    pub request_review: bool,
}

impl Action {
    pub fn market(
        ticker: impl Into<String>,
        kind: ActionKind,
        side: OrderSide,
        quantity: Decimal,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            kind,
            side,
            quantity,
            order_type: OrderType::Market,
            reason: reason.into(),
            request_review: false,
        }
    }

    pub fn with_review(mut self, request_review: bool) -> Self {
        self.request_review = request_review;
        self
    }
}
