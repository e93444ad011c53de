use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::{Transaction, TransactionRecord};

/// Proof value carried by the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Hash of the previous block, empty for genesis
    pub previous_hash: String,

    /// Ordered transactions; a mined block ends with its reward
    #[schema(value_type = Vec<TransactionRecord>)]
    pub transactions: Vec<Transaction>,

    /// Proof of work (nonce)
    pub proof: u64,

    /// Creation time in seconds since the Unix epoch
    pub timestamp: i64,
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `previous_hash` - The hash of the previous block
    /// * `transactions` - The list of transactions to include in the block
    /// * `proof` - The proof of work (nonce)
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>, proof: u64) -> Self {
        Block {
            index,
            previous_hash,
            transactions,
            proof,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// The fixed first block every chain starts with
    pub fn genesis() -> Self {
        Block {
            index: 0,
            previous_hash: String::new(),
            transactions: Vec::new(),
            proof: GENESIS_PROOF,
            timestamp: 0,
        }
    }

    pub fn is_genesis(&self) -> bool {
        *self == Self::genesis()
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block record as a hexadecimal string
    pub fn hash(&self) -> String {
        // The record is plain strings and numbers, so encoding cannot fail
        let block_string = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&block_string))
    }

    /// Transactions covered by the proof: everything but the trailing reward
    pub fn proof_transactions(&self) -> &[Transaction] {
        match self.transactions.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Address;

    #[test]
    fn test_new_block() {
        let transactions = vec![
            Transaction::new_reward(Address("recipient1".to_string()), 10.0),
            Transaction::new_reward(Address("recipient2".to_string()), 20.0),
        ];

        let block = Block::new(1, "previous_hash".to_string(), transactions, 100);

        assert_eq!(block.index, 1);
        assert_eq!(block.proof, 100);
        assert_eq!(block.previous_hash, "previous_hash");
        assert!(block.timestamp > 0);
    }

    #[test]
    fn test_hash() {
        let block = Block::genesis();
        let hash = block.hash();

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, Block::genesis().hash());
    }

    #[test]
    fn test_hash_covers_every_field() {
        let base = Block::new(
            3,
            "abc".to_string(),
            vec![Transaction::new_reward(Address::from("miner"), 10.0)],
            42,
        );
        let hash = base.hash();

        let mut changed = base.clone();
        changed.index = 4;
        assert_ne!(changed.hash(), hash);

        let mut changed = base.clone();
        changed.previous_hash = "abd".to_string();
        assert_ne!(changed.hash(), hash);

        let mut changed = base.clone();
        changed.proof = 43;
        assert_ne!(changed.hash(), hash);

        let mut changed = base.clone();
        changed.timestamp += 1;
        assert_ne!(changed.hash(), hash);

        let mut changed = base;
        changed.transactions.clear();
        assert_ne!(changed.hash(), hash);
    }

    #[test]
    fn test_proof_transactions_skip_reward() {
        let transfer = Transaction::new("a", "b", "sig", 1.0, "pay");
        let reward = Transaction::new_reward(Address::from("miner"), 10.0);
        let block = Block::new(1, String::new(), vec![transfer.clone(), reward], 0);

        assert_eq!(block.proof_transactions(), &[transfer]);
        assert!(Block::genesis().proof_transactions().is_empty());
    }

    #[test]
    fn test_genesis_record() {
        let value = serde_json::to_value(Block::genesis()).unwrap();

        assert_eq!(value["index"], 0);
        assert_eq!(value["previous_hash"], "");
        assert_eq!(value["proof"], 100);
        assert_eq!(value["timestamp"], 0);
        assert!(value["transactions"].as_array().unwrap().is_empty());
    }
}
