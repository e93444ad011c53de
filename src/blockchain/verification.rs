//! Pure validity predicates over transactions, blocks and chains.

use log::warn;

use super::block::Block;
use super::proof::ProofOfWork;
use super::transaction::Transaction;

/// Signature check that treats undecodable keys or signatures as invalid
pub fn verify_signature(transaction: &Transaction) -> bool {
    match transaction.verify_signature() {
        Ok(valid) => valid,
        Err(err) => {
            warn!("Signature check failed for sender {}: {}", transaction.sender(), err);
            false
        }
    }
}

/// Admission check: a signed transfer with a sane amount and enough funds.
/// Rewards are only ever created by mining.
pub fn verify_transaction<F>(transaction: &Transaction, get_balance: F) -> bool
where
    F: Fn(&str) -> f64,
{
    if transaction.is_reward() {
        return false;
    }

    let amount = transaction.amount();
    if !amount.is_finite() || amount < 0.0 {
        return false;
    }

    if !verify_signature(transaction) {
        return false;
    }

    get_balance(transaction.sender()) >= amount
}

pub fn verify_transactions(transactions: &[Transaction]) -> bool {
    transactions.iter().all(verify_signature)
}

/// Checks `block` against the block it claims to follow
pub fn verify_block(block: &Block, previous: &Block, pow: &ProofOfWork) -> bool {
    if block.previous_hash != previous.hash() {
        return false;
    }

    if block.index != previous.index + 1 {
        return false;
    }

    // Exactly one reward, closing the block
    match block.transactions.split_last() {
        Some((last, rest)) if last.is_reward() && !rest.iter().any(Transaction::is_reward) => {}
        _ => {
            warn!("Block {} does not end with a single mining reward", block.index);
            return false;
        }
    }

    if !pow.is_valid_proof(block.proof_transactions(), &block.previous_hash, block.proof) {
        warn!("Proof of work is invalid for block {}", block.index);
        return false;
    }

    verify_transactions(&block.transactions)
}

/// Full chain check. Genesis is compared for equality, never re-validated.
pub fn verify_chain(chain: &[Block], pow: &ProofOfWork) -> bool {
    match chain.first() {
        Some(first) if first.is_genesis() => {}
        _ => return false,
    }

    chain
        .windows(2)
        .all(|pair| verify_block(&pair[1], &pair[0], pow))
}
