// Network module
//
// This module contains the peer gateway used by the ledger engine:
// - The gateway trait and broadcast outcomes
// - An HTTP implementation of the peer protocol

pub mod gateway;
pub mod http;

pub use gateway::{BlockEnvelope, BroadcastOutcome, GatewayError, NullGateway, PeerGateway};
pub use http::HttpPeerGateway;
