//! Trading core for the Polymarket CLOB.
//!
//! - [`signer`] / [`builder`]: EIP-712 orders with integer-exact amounts
//! - [`client`]: L2-authenticated REST with proxy rotation
//! - [`stream`]: reconnecting market-data WebSocket
//! - [`ledger`]: locally tracked open orders and reconciliation
//! - [`onchain`]: collateral `approve` onboarding

pub mod auth;
pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod onchain;
pub mod orderbook;
pub mod shutdown;
pub mod signer;
pub mod stream;
pub mod telemetry;
pub mod wallet;

pub use error::{Error, Result};
