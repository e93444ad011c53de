//! A minimal proof-of-work ledger node.
//!
//! The [`blockchain`] module holds the ledger core; [`network`] and [`api`]
//! carry it between peers over HTTP.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod network;

pub use blockchain::{Block, Blockchain, Transaction, Wallet};
pub use config::NodeConfig;
