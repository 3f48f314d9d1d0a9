use crate::domain::{OrderSide, OrderType, PortfolioSnapshot};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    Partial,
    Rejected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub id: String,
    pub ticker: String,
    pub side: OrderSide,
    pub quantity: Decimal,
}

/// Abstract interface over the brokerage. Mixing long and
/// short in the same ticker is forbidden at the port level — an
/// implementation must return `InvariantError` rather than silently
/// flipping a position's sign.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn get_portfolio(&self) -> Result<PortfolioSnapshot>;

    async fn submit_order(
        &self,
        ticker: &str,
        side: OrderSide,
        quantity: Decimal,
        order_type: OrderType,
        limit_price: Option<Decimal>,
    ) -> Result<OrderResult>;

    async fn get_open_orders(&self) -> Result<Vec<OpenOrder>>;

    async fn cancel_order(&self, id: &str) -> Result<()>;
}

pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory broker for tests: a mutable in-process snapshot
    /// behind a lock.
    pub struct MockBroker {
        pub snapshot: Mutex<PortfolioSnapshot>,
        pub submitted: Mutex<Vec<(String, OrderSide, Decimal)>>,
    }

    impl MockBroker {
        pub fn new(snapshot: PortfolioSnapshot) -> Self {
            Self {
                snapshot: Mutex::new(snapshot),
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BrokerPort for MockBroker {
        async fn get_portfolio(&self) -> Result<PortfolioSnapshot> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn submit_order(
            &self,
            ticker: &str,
            side: OrderSide,
            quantity: Decimal,
            _order_type: OrderType,
            _limit_price: Option<Decimal>,
        ) -> Result<OrderResult> {
            self.submitted
                .lock()
                .unwrap()
                .push((ticker.to_string(), side, quantity));

            let mut snap = self.snapshot.lock().unwrap();
            match side {
                OrderSide::Sell | OrderSide::Cover => {
                    if let Some(pos) = snap.positions.get_mut(ticker) {
                        pos.quantity -= quantity.abs() * if side == OrderSide::Cover { -Decimal::ONE } else { Decimal::ONE };
                        if pos.quantity.is_zero() {
                            snap.positions.remove(ticker);
                        }
                    }
                }
                OrderSide::Buy | OrderSide::Short => {
                    let entry = snap.positions.entry(ticker.to_string()).or_insert(
                        crate::domain::Position {
                            ticker: ticker.to_string(),
                            quantity: Decimal::ZERO,
                            average_cost: Decimal::ZERO,
                            current_price: Decimal::ZERO,
                        },
                    );
                    let delta = if side == OrderSide::Short {
                        -quantity.abs()
                    } else {
                        quantity.abs()
                    };
                    entry.quantity += delta;
                }
            }

            Ok(OrderResult {
                order_id: format!("mock-{ticker}-{quantity}"),
                status: OrderStatus::Filled,
                filled_quantity: quantity,
                message: None,
            })
        }

        async fn get_open_orders(&self) -> Result<Vec<OpenOrder>> {
            Ok(Vec::new())
        }

        async fn cancel_order(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[allow(dead_code)]
    pub type SharedSubmissions = HashMap<String, Decimal>;
}
