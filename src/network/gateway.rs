use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::blockchain::{Block, Transaction};

/// Errors that can occur while talking to a peer
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("Peer {peer} sent an invalid response: {reason}")]
    InvalidResponse { peer: String, reason: String },
}

/// How a peer answered a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Accepted,
    Rejected,
    /// The peer's chain diverges from ours and needs resolving
    Conflict,
}

/// Body of a block broadcast
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlockEnvelope {
    pub block: Block,
}

/// Delivery of ledger messages to peers.
///
/// Calls are best-effort and at-most-once; implementations bound their own
/// timeouts and never retry.
pub trait PeerGateway: Send + Sync {
    fn broadcast_transaction(
        &self,
        peer: &str,
        transaction: &Transaction,
    ) -> Result<BroadcastOutcome, GatewayError>;

    fn broadcast_block(&self, peer: &str, block: &Block) -> Result<BroadcastOutcome, GatewayError>;

    /// Fetches the full chain held by `peer`
    fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, GatewayError>;
}

/// Gateway for nodes running without a network: every peer is unreachable
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGateway;

impl NullGateway {
    fn unreachable(peer: &str) -> GatewayError {
        GatewayError::Unreachable {
            peer: peer.to_string(),
            reason: "networking disabled".to_string(),
        }
    }
}

impl PeerGateway for NullGateway {
    fn broadcast_transaction(&self, peer: &str, _: &Transaction) -> Result<BroadcastOutcome, GatewayError> {
        Err(Self::unreachable(peer))
    }

    fn broadcast_block(&self, peer: &str, _: &Block) -> Result<BroadcastOutcome, GatewayError> {
        Err(Self::unreachable(peer))
    }

    fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, GatewayError> {
        Err(Self::unreachable(peer))
    }
}
