use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{error, info, warn};
use thiserror::Error;

use super::block::Block;
use super::crypto::Address;
use super::proof::ProofOfWork;
use super::storage::{BlockchainStorage, PersistedState, StorageError};
use super::transaction::{Transaction, TransactionError};
use super::verification;
use crate::config::LedgerConfig;
use crate::network::{BroadcastOutcome, PeerGateway};

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("System error: {0}")]
    SystemError(String),
}

/// Where a transaction entered this node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Submitted by a client of this node; fanned out to peers
    Local,
    /// Delivered by a peer broadcast; never re-broadcast
    Peer,
}

/// What happened to a block pushed to us by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReceipt {
    /// Appended on top of the local tip
    Added,
    /// Meant to follow our tip but failed validation
    Rejected,
    /// The peer is more than one block ahead; resolution is flagged
    NeedsResolution,
    /// The peer is behind or level with us
    Stale,
}

/// Everything guarded by the ledger lock
#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    open_transactions: Vec<Transaction>,
    peers: HashSet<String>,
    resolve_conflicts: bool,
}

impl LedgerState {
    fn from_persisted(persisted: PersistedState) -> Self {
        LedgerState {
            chain: persisted.chain,
            open_transactions: persisted.open_transactions,
            peers: persisted.peers.into_iter().collect(),
            resolve_conflicts: false,
        }
    }

    fn to_persisted(&self) -> PersistedState {
        let mut peers: Vec<String> = self.peers.iter().cloned().collect();
        peers.sort();

        PersistedState {
            chain: self.chain.clone(),
            open_transactions: self.open_transactions.clone(),
            peers,
        }
    }

    fn tip_hash(&self) -> String {
        self.chain.last().map(Block::hash).unwrap_or_default()
    }

    fn tip_index(&self) -> u64 {
        self.chain.last().map_or(0, |block| block.index)
    }

    fn peer_list(&self) -> Vec<String> {
        self.peers.iter().cloned().collect()
    }

    /// Received in committed blocks minus sent in committed blocks and the pool
    fn balance(&self, participant: &str) -> f64 {
        let committed = self.chain.iter().flat_map(|block| block.transactions.iter());

        let received: f64 = committed
            .clone()
            .filter(|tx| tx.recipient() == participant)
            .map(Transaction::amount)
            .sum();

        let sent: f64 = committed
            .chain(self.open_transactions.iter())
            .filter(|tx| tx.sender() == participant)
            .map(Transaction::amount)
            .sum();

        received - sent
    }
}

/// The ledger engine: owns the chain, the open pool and the peer set
pub struct Blockchain {
    /// Chain, pool, peers and the resolution flag, behind one lock
    state: Mutex<LedgerState>,

    /// Held for the whole of a mining attempt
    mining: Mutex<()>,

    /// Identity credited with mining rewards
    public_key: Option<Address>,

    pow: ProofOfWork,

    mining_reward: f64,

    /// Storage for ledger state
    storage: Option<Arc<BlockchainStorage>>,

    gateway: Arc<dyn PeerGateway>,
}

impl Blockchain {
    /// Creates an in-memory ledger holding only the genesis block
    pub fn new(config: &LedgerConfig, public_key: Option<Address>, gateway: Arc<dyn PeerGateway>) -> Self {
        Self::from_state(config, public_key, gateway, None, PersistedState::default())
    }

    /// Creates a ledger backed by `storage`, resuming whatever it holds.
    ///
    /// An empty or unreadable store starts from genesis.
    pub fn with_storage(
        config: &LedgerConfig,
        public_key: Option<Address>,
        gateway: Arc<dyn PeerGateway>,
        storage: Arc<BlockchainStorage>,
    ) -> Self {
        let persisted = storage.load();
        Self::from_state(config, public_key, gateway, Some(storage), persisted)
    }

    fn from_state(
        config: &LedgerConfig,
        public_key: Option<Address>,
        gateway: Arc<dyn PeerGateway>,
        storage: Option<Arc<BlockchainStorage>>,
        persisted: PersistedState,
    ) -> Self {
        Blockchain {
            state: Mutex::new(LedgerState::from_persisted(persisted)),
            mining: Mutex::new(()),
            public_key,
            pow: ProofOfWork::new(config.difficulty_bits),
            mining_reward: config.mining_reward,
            storage,
            gateway,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, BlockchainError> {
        self.state
            .lock()
            .map_err(|e| BlockchainError::SystemError(format!("ledger lock poisoned: {}", e)))
    }

    /// Persists `state`. Failures are logged; memory stays authoritative.
    fn save(&self, state: &LedgerState) {
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.save(&state.to_persisted()) {
                error!("Saving ledger state failed: {}", err);
            }
        }
    }

    pub fn public_key(&self) -> Option<&Address> {
        self.public_key.as_ref()
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Gets a copy of the entire chain
    pub fn get_chain(&self) -> Result<Vec<Block>, BlockchainError> {
        Ok(self.lock()?.chain.clone())
    }

    /// Gets a copy of the open transaction pool
    pub fn get_open_transactions(&self) -> Result<Vec<Transaction>, BlockchainError> {
        Ok(self.lock()?.open_transactions.clone())
    }

    /// Gets the known peers, in no particular order
    pub fn get_peers(&self) -> Result<Vec<String>, BlockchainError> {
        Ok(self.lock()?.peer_list())
    }

    pub fn get_last_block(&self) -> Result<Option<Block>, BlockchainError> {
        Ok(self.lock()?.chain.last().cloned())
    }

    /// Whether a peer has signalled that our chain diverges from theirs
    pub fn needs_resolution(&self) -> Result<bool, BlockchainError> {
        Ok(self.lock()?.resolve_conflicts)
    }

    /// Balance of `participant`, replayed from the chain and the open pool
    pub fn get_balance(&self, participant: &str) -> Result<f64, BlockchainError> {
        Ok(self.lock()?.balance(participant))
    }

    /// Balance of this node's own identity, if it has one
    pub fn own_balance(&self) -> Result<Option<f64>, BlockchainError> {
        match &self.public_key {
            Some(key) => self.get_balance(key.as_str()).map(Some),
            None => Ok(None),
        }
    }

    /// Validates the local chain
    pub fn is_valid(&self) -> Result<bool, BlockchainError> {
        let chain = self.get_chain()?;
        Ok(verification::verify_chain(&chain, &self.pow))
    }

    /// Admits a transaction into the open pool.
    ///
    /// Returns `Ok(false)` when the signature or the sender's balance does
    /// not check out. Locally submitted transactions are then offered to
    /// every peer; a peer failing or refusing does not undo the admission.
    pub fn add_transaction(&self, transaction: Transaction, origin: Origin) -> Result<bool, BlockchainError> {
        let peers = {
            let mut state = self.lock()?;

            if !verification::verify_transaction(&transaction, |participant| state.balance(participant)) {
                warn!(
                    "Rejected transaction of {} from {} to {}",
                    transaction.amount(),
                    transaction.sender(),
                    transaction.recipient()
                );
                return Ok(false);
            }

            state.open_transactions.push(transaction.clone());
            self.save(&state);
            state.peer_list()
        };

        info!(
            "Admitted transaction of {} from {} to {}",
            transaction.amount(),
            transaction.sender(),
            transaction.recipient()
        );

        if origin == Origin::Local {
            for peer in &peers {
                match self.gateway.broadcast_transaction(peer, &transaction) {
                    Ok(BroadcastOutcome::Accepted) => {}
                    Ok(outcome) => warn!("Peer {} declined transaction ({:?})", peer, outcome),
                    Err(err) => warn!("Transaction broadcast skipped: {}", err),
                }
            }
        }

        Ok(true)
    }

    /// Mines the open pool into a new block.
    ///
    /// Returns `Ok(None)` when the node has no identity, when a pooled
    /// signature no longer verifies, or when the chain moved on while the
    /// proof was being searched.
    pub fn mine_block(&self) -> Result<Option<Block>, BlockchainError> {
        let public_key = match &self.public_key {
            Some(key) => key.clone(),
            None => {
                warn!("Cannot mine without a public key");
                return Ok(None);
            }
        };

        let _mining = self
            .mining
            .lock()
            .map_err(|e| BlockchainError::SystemError(format!("mining lock poisoned: {}", e)))?;

        let (snapshot, previous_hash, index) = {
            let state = self.lock()?;
            (state.open_transactions.clone(), state.tip_hash(), state.chain.len() as u64)
        };

        if !verification::verify_transactions(&snapshot) {
            warn!("Open pool holds a transaction with an invalid signature, not mining");
            return Ok(None);
        }

        let proof = self.pow.find_proof(&snapshot, &previous_hash);

        let mut transactions = snapshot.clone();
        transactions.push(Transaction::new_reward(public_key, self.mining_reward));
        let block = Block::new(index, previous_hash.clone(), transactions, proof);

        let peers = {
            let mut state = self.lock()?;

            if state.tip_hash() != previous_hash {
                warn!("Chain advanced while mining block {}, discarding it", index);
                return Ok(None);
            }

            state.chain.push(block.clone());
            state.open_transactions.retain(|tx| !snapshot.contains(tx));
            self.save(&state);
            state.peer_list()
        };

        info!("Mined block {} with {} transactions", block.index, block.transactions.len());

        for peer in &peers {
            match self.gateway.broadcast_block(peer, &block) {
                Ok(BroadcastOutcome::Accepted) => {}
                Ok(BroadcastOutcome::Conflict) => {
                    warn!("Peer {} reports a conflicting chain, resolution needed", peer);
                    self.lock()?.resolve_conflicts = true;
                }
                Ok(BroadcastOutcome::Rejected) => warn!("Peer {} declined block {}", peer, block.index),
                Err(err) => warn!("Block broadcast skipped: {}", err),
            }
        }

        Ok(Some(block))
    }

    /// Appends a block mined elsewhere on top of the local tip.
    ///
    /// Returns `Ok(false)` unless the block passes the same check a chain
    /// validation applies to it against our tip. Pooled transactions
    /// carried by the block leave the pool.
    pub fn add_block(&self, block: Block) -> Result<bool, BlockchainError> {
        let mut state = self.lock()?;

        let follows_tip = match state.chain.last() {
            Some(tip) => verification::verify_block(&block, tip, &self.pow),
            None => false,
        };
        if !follows_tip {
            warn!("Rejected block {}: does not extend the local tip", block.index);
            return Ok(false);
        }

        state
            .open_transactions
            .retain(|tx| !block.transactions.contains(tx));
        info!("Added block {} from peer", block.index);
        state.chain.push(block);
        self.save(&state);

        Ok(true)
    }

    /// Classifies and applies a block broadcast by a peer
    pub fn receive_block(&self, block: Block) -> Result<BlockReceipt, BlockchainError> {
        let tip_index = self.lock()?.tip_index();

        if block.index == tip_index + 1 {
            if self.add_block(block)? {
                Ok(BlockReceipt::Added)
            } else {
                Ok(BlockReceipt::Rejected)
            }
        } else if block.index > tip_index + 1 {
            info!("Peer is ahead at block {}, resolution needed", block.index);
            self.lock()?.resolve_conflicts = true;
            Ok(BlockReceipt::NeedsResolution)
        } else {
            Ok(BlockReceipt::Stale)
        }
    }

    /// Adopts the longest valid chain offered by any peer.
    ///
    /// Returns whether the local chain was replaced. Replacing the chain
    /// drops the open pool.
    pub fn resolve(&self) -> Result<bool, BlockchainError> {
        let (mut winner_chain, peers) = {
            let state = self.lock()?;
            (state.chain.clone(), state.peer_list())
        };

        let mut replace = false;
        for peer in &peers {
            let peer_chain = match self.gateway.fetch_chain(peer) {
                Ok(chain) => chain,
                Err(err) => {
                    warn!("Skipping peer during resolution: {}", err);
                    continue;
                }
            };

            if peer_chain.len() > winner_chain.len() && verification::verify_chain(&peer_chain, &self.pow) {
                info!("Peer {} offers a longer valid chain ({} blocks)", peer, peer_chain.len());
                winner_chain = peer_chain;
                replace = true;
            }
        }

        let mut state = self.lock()?;
        state.resolve_conflicts = false;

        // The local chain may have grown while peers were being queried
        let replaced = replace && winner_chain.len() > state.chain.len();
        if replaced {
            state.chain = winner_chain;
            state.open_transactions.clear();
            info!("Replaced local chain, now {} blocks", state.chain.len());
        }
        self.save(&state);

        Ok(replaced)
    }

    /// Adds a peer address. Returns false if it was already known.
    pub fn add_peer(&self, peer: &str) -> Result<bool, BlockchainError> {
        let mut state = self.lock()?;
        let inserted = state.peers.insert(peer.to_string());
        self.save(&state);
        Ok(inserted)
    }

    /// Removes a peer address. Returns false if it was not known.
    pub fn remove_peer(&self, peer: &str) -> Result<bool, BlockchainError> {
        let mut state = self.lock()?;
        let removed = state.peers.remove(peer);
        self.save(&state);
        Ok(removed)
    }
}
