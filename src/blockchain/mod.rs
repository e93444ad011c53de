// Blockchain module
//
// This module contains the ledger core:
// - Block and transaction structures
// - Signing and key handling
// - Proof of work
// - Validation predicates
// - The ledger engine and its state store

pub mod block;
pub mod chain;
pub mod crypto;
pub mod proof;
pub mod storage;
pub mod transaction;
pub mod verification;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{BlockReceipt, Blockchain, BlockchainError, Origin};
pub use crypto::{Address, DigitalSignature, Wallet};
pub use proof::ProofOfWork;
pub use storage::{BlockchainStorage, PersistedState};
pub use transaction::{Transaction, TransactionRecord, MINING_SENDER};
