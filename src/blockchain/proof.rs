use sha2::{Digest, Sha256};

use super::transaction::{transactions_digest, Transaction};

/// Default difficulty: two leading zero hex digits
pub const DEFAULT_DIFFICULTY_BITS: u32 = 8;

/// Proof-of-work puzzle over (transactions, previous hash, nonce)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty_bits: u32,
}

impl ProofOfWork {
    pub fn new(difficulty_bits: u32) -> Self {
        ProofOfWork { difficulty_bits }
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    /// Hash of the guess `digest(transactions) ++ previous_hash ++ nonce`
    pub fn guess_hash(transactions: &[Transaction], previous_hash: &str, nonce: u64) -> [u8; 32] {
        let guess = format!("{}{}{}", transactions_digest(transactions), previous_hash, nonce);
        Sha256::digest(guess.as_bytes()).into()
    }

    /// Whether `nonce` solves the puzzle for this transaction set
    pub fn is_valid_proof(&self, transactions: &[Transaction], previous_hash: &str, nonce: u64) -> bool {
        let hash = Self::guess_hash(transactions, previous_hash, nonce);
        leading_zero_bits(&hash) >= self.difficulty_bits
    }

    /// Smallest non-negative nonce satisfying [`ProofOfWork::is_valid_proof`].
    ///
    /// Blocks until found; there is no cancellation.
    pub fn find_proof(&self, transactions: &[Transaction], previous_hash: &str) -> u64 {
        // The transaction digest is fixed for the whole search
        let prefix = format!("{}{}", transactions_digest(transactions), previous_hash);
        let mut nonce = 0;

        loop {
            let hash: [u8; 32] = Sha256::digest(format!("{}{}", prefix, nonce).as_bytes()).into();
            if leading_zero_bits(&hash) >= self.difficulty_bits {
                return nonce;
            }
            nonce += 1;
        }
    }
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY_BITS)
    }
}

fn leading_zero_bits(hash: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Address;

    fn sample_transactions() -> Vec<Transaction> {
        vec![
            Transaction::new("alice", "bob", "sig", 5.0, "pay"),
            Transaction::new("bob", "carol", "sig2", 1.5, "pay"),
        ]
    }

    #[test]
    fn test_leading_zero_bits() {
        assert_eq!(leading_zero_bits(&[0xff]), 0);
        assert_eq!(leading_zero_bits(&[0x00, 0x80]), 8);
        assert_eq!(leading_zero_bits(&[0x00, 0x0f]), 12);
        assert_eq!(leading_zero_bits(&[0x00, 0x00]), 16);
    }

    #[test]
    fn test_find_proof_is_valid() {
        let pow = ProofOfWork::new(8);
        let transactions = sample_transactions();

        let nonce = pow.find_proof(&transactions, "prev");
        assert!(pow.is_valid_proof(&transactions, "prev", nonce));
        assert_eq!(ProofOfWork::guess_hash(&transactions, "prev", nonce)[0], 0);
    }

    #[test]
    fn test_find_proof_is_deterministic_and_minimal() {
        let pow = ProofOfWork::new(6);
        let transactions = sample_transactions();

        let first = pow.find_proof(&transactions, "prev");
        let second = pow.find_proof(&transactions, "prev");
        assert_eq!(first, second);

        for nonce in 0..first {
            assert!(!pow.is_valid_proof(&transactions, "prev", nonce));
        }
    }

    #[test]
    fn test_proof_is_bound_to_inputs() {
        let pow = ProofOfWork::new(12);
        let transactions = sample_transactions();
        let nonce = pow.find_proof(&transactions, "prev");

        let other = vec![Transaction::new_reward(Address::from("x"), 1.0)];
        // A 12-bit puzzle accepts a random guess with probability 1/4096
        let rejected = [
            pow.is_valid_proof(&transactions, "other-prev", nonce),
            pow.is_valid_proof(&other, "prev", nonce),
        ];
        assert!(rejected.iter().any(|valid| !valid));
    }

    #[test]
    fn test_zero_difficulty_accepts_first_nonce() {
        let pow = ProofOfWork::new(0);
        assert_eq!(pow.find_proof(&[], ""), 0);
    }
}
