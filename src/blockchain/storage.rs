use std::path::Path;

use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use thiserror::Error;

use super::block::Block;
use super::transaction::Transaction;

const CHAIN_KEY: &str = "chain";
const OPEN_TRANSACTIONS_KEY: &str = "open_transactions";
const PEERS_KEY: &str = "peers";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Item not found: {0}")]
    NotFound(String),
}

/// Snapshot of everything a node persists
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedState {
    pub chain: Vec<Block>,
    pub open_transactions: Vec<Transaction>,
    pub peers: Vec<String>,
}

impl Default for PersistedState {
    fn default() -> Self {
        PersistedState {
            chain: vec![Block::genesis()],
            open_transactions: Vec::new(),
            peers: Vec::new(),
        }
    }
}

/// Storage for ledger state: chain, open pool and peers as three records
pub struct BlockchainStorage {
    /// The database instance
    db: Db,

    /// Tree holding the three records
    ledger: Tree,
}

impl std::fmt::Debug for BlockchainStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainStorage").finish()
    }
}

impl BlockchainStorage {
    /// Opens (or creates) the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }

    /// Opens a throwaway database that is removed on drop
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let ledger = db.open_tree("ledger")?;
        Ok(Self { db, ledger })
    }

    /// Writes all three records and flushes them to disk
    pub fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        self.put(CHAIN_KEY, &state.chain)?;
        self.put(OPEN_TRANSACTIONS_KEY, &state.open_transactions)?;
        self.put(PEERS_KEY, &state.peers)?;
        self.flush()
    }

    /// Loads the persisted state, degrading to defaults instead of failing.
    ///
    /// A missing or unreadable chain resets everything; an unreadable pool
    /// or peer list resets only that record.
    pub fn load(&self) -> PersistedState {
        let chain: Vec<Block> = match self.get(CHAIN_KEY) {
            Ok(chain) => chain,
            Err(StorageError::NotFound(_)) => {
                info!("No stored chain found, starting from genesis");
                return PersistedState::default();
            }
            Err(err) => {
                error!("Failed to load stored chain, starting from genesis: {}", err);
                return PersistedState::default();
            }
        };

        if !chain.first().is_some_and(Block::is_genesis) {
            warn!("Stored chain does not start at genesis, discarding it");
            return PersistedState::default();
        }

        let open_transactions = self.get(OPEN_TRANSACTIONS_KEY).unwrap_or_else(|err| {
            warn!("Failed to load open transactions: {}", err);
            Vec::new()
        });

        let peers = self.get(PEERS_KEY).unwrap_or_else(|err| {
            warn!("Failed to load peers: {}", err);
            Vec::new()
        });

        info!("Loaded {} blocks from storage", chain.len());

        PersistedState {
            chain,
            open_transactions,
            peers,
        }
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = bincode::serialize(value)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.ledger.insert(key, bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, StorageError> {
        match self.ledger.get(key)? {
            Some(value) => bincode::deserialize(&value)
                .map_err(|e| StorageError::DeserializationError(e.to_string())),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    #[cfg(test)]
    fn put_raw(&self, key: &str, bytes: &[u8]) {
        self.ledger.insert(key, bytes).unwrap();
    }
}
