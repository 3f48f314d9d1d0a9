//! Abstract interfaces over the out-of-scope collaborators: brokerage
//! and market data. Each trait follows the same style: `async_trait`,
//! `Send + Sync`, returning `anyhow::Result`.

pub mod broker;
pub mod quote;

pub use broker::{BrokerPort, OrderResult, OrderStatus};
pub use quote::{QuotePort, TechnicalSignal};
