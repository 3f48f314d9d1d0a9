use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TechnicalSignal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
    Unknown,
}

/// Abstract interface over market data. Implementations must never
/// throw/panic on a provider error — they return `Unknown`/`None`
/// and let the caller decide how to degrade.
#[async_trait]
pub trait QuotePort: Send + Sync {
    /// Spot price fan-out for the given tickers, bounded to a small
    /// concurrency limit by the caller. A ticker missing from
    /// the result map means its fetch failed this cycle.
    async fn spot(&self, tickers: &[String]) -> HashMap<String, Decimal>;

    async fn vix(&self) -> Option<f64>;

    async fn technical_signal(&self, ticker: &str) -> TechnicalSignal;
}

pub mod mock {
    use super::*;
    use std::sync::Mutex;

    pub struct MockQuotes {
        pub prices: Mutex<HashMap<String, Decimal>>,
        pub vix: Mutex<Option<f64>>,
        pub signals: Mutex<HashMap<String, TechnicalSignal>>,
    }

    impl MockQuotes {
        pub fn new() -> Self {
            Self {
                prices: Mutex::new(HashMap::new()),
                vix: Mutex::new(None),
                signals: Mutex::new(HashMap::new()),
            }
        }
    }

    impl Default for MockQuotes {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl QuotePort for MockQuotes {
        async fn spot(&self, tickers: &[String]) -> HashMap<String, Decimal> {
            let prices = self.prices.lock().unwrap();
            tickers
                .iter()
                .filter_map(|t| prices.get(t).map(|p| (t.clone(), *p)))
                .collect()
        }

        async fn vix(&self) -> Option<f64> {
            *self.vix.lock().unwrap()
        }

        async fn technical_signal(&self, ticker: &str) -> TechnicalSignal {
            self.signals
                .lock()
                .unwrap()
                .get(ticker)
                .copied()
                .unwrap_or(TechnicalSignal::Unknown)
        }
    }
}
