use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use super::gateway::{BlockEnvelope, BroadcastOutcome, GatewayError, PeerGateway};
use crate::blockchain::{Block, Transaction};

/// Peer gateway speaking the node HTTP protocol
#[derive(Debug, Clone)]
pub struct HttpPeerGateway {
    client: Client,
}

impl HttpPeerGateway {
    /// Builds a gateway whose requests give up after `timeout`.
    ///
    /// Must be called outside of an async runtime: the blocking client owns
    /// its own.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn url(peer: &str, path: &str) -> String {
        format!("http://{}/{}", peer, path)
    }

    fn unreachable(peer: &str, err: reqwest::Error) -> GatewayError {
        GatewayError::Unreachable {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Maps a peer's status code onto a broadcast outcome
fn outcome_for(status: StatusCode) -> BroadcastOutcome {
    match status {
        StatusCode::CONFLICT => BroadcastOutcome::Conflict,
        s if s.is_success() => BroadcastOutcome::Accepted,
        _ => BroadcastOutcome::Rejected,
    }
}

impl PeerGateway for HttpPeerGateway {
    fn broadcast_transaction(
        &self,
        peer: &str,
        transaction: &Transaction,
    ) -> Result<BroadcastOutcome, GatewayError> {
        let response = self
            .client
            .post(Self::url(peer, "broadcast-transaction"))
            .json(transaction)
            .send()
            .map_err(|e| Self::unreachable(peer, e))?;

        debug!("Transaction broadcast to {} answered {}", peer, response.status());
        Ok(outcome_for(response.status()))
    }

    fn broadcast_block(&self, peer: &str, block: &Block) -> Result<BroadcastOutcome, GatewayError> {
        let envelope = BlockEnvelope { block: block.clone() };
        let response = self
            .client
            .post(Self::url(peer, "broadcast-block"))
            .json(&envelope)
            .send()
            .map_err(|e| Self::unreachable(peer, e))?;

        debug!("Block {} broadcast to {} answered {}", block.index, peer, response.status());
        Ok(outcome_for(response.status()))
    }

    fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, GatewayError> {
        let response = self
            .client
            .get(Self::url(peer, "chain"))
            .send()
            .map_err(|e| Self::unreachable(peer, e))?;

        if !response.status().is_success() {
            return Err(GatewayError::InvalidResponse {
                peer: peer.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        response.json::<Vec<Block>>().map_err(|e| GatewayError::InvalidResponse {
            peer: peer.to_string(),
            reason: e.to_string(),
        })
    }
}
