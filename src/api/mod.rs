// API module
//
// This module contains the node's HTTP interface: the peer protocol
// (chain fetch, transaction and block broadcasts) and the client endpoints

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use handlers::{NodeData, NodeState};
pub use routes::configure_routes;
