use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{
    Address, Block, BlockReceipt, Blockchain, BlockchainError, Origin, Transaction, TransactionRecord, Wallet,
};
use crate::network::BlockEnvelope;

/// Shared node state: the ledger plus the wallet used for local signing
pub struct NodeState {
    pub blockchain: Blockchain,
    pub wallet: Option<Wallet>,
}

impl NodeState {
    pub fn new(blockchain: Blockchain, wallet: Option<Wallet>) -> Self {
        NodeState { blockchain, wallet }
    }
}

/// Data structure for the node state
pub type NodeData = web::Data<NodeState>;

/// Request for the local transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: f64,

    /// Free-form label
    #[serde(default)]
    pub action: String,
}

/// Response for the local transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub message: String,
    pub transaction: TransactionRecord,

    /// The node's balance after admission
    pub funds: f64,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    pub message: String,

    /// The newly mined block
    pub block: Block,

    /// The miner's balance afterwards
    pub funds: f64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub funds: f64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct NodeRequest {
    /// Peer address as `host:port`
    pub node: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct NodesResponse {
    pub message: String,
    pub all_nodes: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: &str) -> MessageResponse {
    MessageResponse {
        message: text.to_string(),
    }
}

fn internal_error(err: impl std::fmt::Display) -> HttpResponse {
    error!("Request failed: {}", err);
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": err.to_string()
    }))
}

/// Runs a ledger call on the blocking pool; every engine call takes the ledger lock
async fn run_blocking<F, T>(state: &NodeData, call: F) -> Result<T, HttpResponse>
where
    F: FnOnce(&NodeState) -> Result<T, BlockchainError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    match web::block(move || call(state.get_ref())).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(internal_error(err)),
        Err(err) => Err(internal_error(err)),
    }
}

/// Get the full chain
///
/// Returns every block from genesis to tip; peers use this during resolution
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = Vec<Block>)
    )
)]
pub async fn get_chain(state: NodeData) -> impl Responder {
    match run_blocking(&state, |node| node.blockchain.get_chain()).await {
        Ok(chain) => HttpResponse::Ok().json(chain),
        Err(response) => response,
    }
}

/// Get the open transactions
#[utoipa::path(
    get,
    path = "/transactions",
    responses(
        (status = 200, description = "Open transactions retrieved successfully", body = Vec<TransactionRecord>)
    )
)]
pub async fn get_open_transactions(state: NodeData) -> impl Responder {
    match run_blocking(&state, |node| node.blockchain.get_open_transactions()).await {
        Ok(transactions) => HttpResponse::Ok().json(transactions),
        Err(response) => response,
    }
}

/// Create a transaction signed by this node's wallet
///
/// Admits the transaction and broadcasts it to every known peer
#[utoipa::path(
    post,
    path = "/transaction",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction admitted", body = TransactionResponse),
        (status = 400, description = "No wallet, or the transaction was rejected"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn new_transaction(state: NodeData, request: web::Json<TransactionRequest>) -> impl Responder {
    let wallet = match &state.wallet {
        Some(wallet) => wallet.clone(),
        None => {
            return HttpResponse::BadRequest().json(message("No wallet set up."));
        }
    };

    let request = request.into_inner();
    let transaction = Transaction::new_signed(
        &wallet,
        Address(request.recipient),
        request.amount,
        &request.action,
    );
    let record = transaction.to_record();

    let result = run_blocking(&state, move |node| {
        let admitted = node.blockchain.add_transaction(transaction, Origin::Local)?;
        let funds = node.blockchain.get_balance(wallet.address().as_str())?;
        Ok((admitted, funds))
    })
    .await;

    match result {
        Ok((true, funds)) => HttpResponse::Created().json(TransactionResponse {
            message: "Successfully added transaction.".to_string(),
            transaction: record,
            funds,
        }),
        Ok((false, _)) => HttpResponse::BadRequest().json(message("Creating a transaction failed.")),
        Err(response) => response,
    }
}

/// Receive a transaction broadcast by a peer
#[utoipa::path(
    post,
    path = "/broadcast-transaction",
    request_body = TransactionRecord,
    responses(
        (status = 201, description = "Transaction admitted", body = MessageResponse),
        (status = 400, description = "Transaction malformed or rejected", body = MessageResponse)
    )
)]
pub async fn broadcast_transaction(state: NodeData, record: web::Json<TransactionRecord>) -> impl Responder {
    let transaction = match Transaction::try_from(record.into_inner()) {
        Ok(transaction) => transaction,
        Err(err) => {
            return HttpResponse::BadRequest().json(message(&err.to_string()));
        }
    };

    match run_blocking(&state, move |node| node.blockchain.add_transaction(transaction, Origin::Peer)).await {
        Ok(true) => HttpResponse::Created().json(message("Successfully added transaction.")),
        Ok(false) => HttpResponse::BadRequest().json(message("Creating a transaction failed.")),
        Err(response) => response,
    }
}

/// Receive a block broadcast by a peer
///
/// 201 when appended, 200 when the peer is ahead and resolution is flagged,
/// 409 when the block conflicts with the local chain
#[utoipa::path(
    post,
    path = "/broadcast-block",
    request_body = BlockEnvelope,
    responses(
        (status = 201, description = "Block added", body = MessageResponse),
        (status = 200, description = "Local chain is behind, resolution needed", body = MessageResponse),
        (status = 409, description = "Block conflicts with the local chain", body = MessageResponse)
    )
)]
pub async fn broadcast_block(state: NodeData, envelope: web::Json<BlockEnvelope>) -> impl Responder {
    let block = envelope.into_inner().block;

    match run_blocking(&state, move |node| node.blockchain.receive_block(block)).await {
        Ok(BlockReceipt::Added) => HttpResponse::Created().json(message("Block added.")),
        Ok(BlockReceipt::Rejected) => HttpResponse::Conflict().json(message("Block seems invalid.")),
        Ok(BlockReceipt::NeedsResolution) => {
            HttpResponse::Ok().json(message("Blockchain seems to differ from local blockchain."))
        }
        Ok(BlockReceipt::Stale) => {
            HttpResponse::Conflict().json(message("Blockchain seems to be shorter, block not added."))
        }
        Err(response) => response,
    }
}

/// Mine a new block
///
/// Bundles the open transactions with a mining reward for this node
#[utoipa::path(
    post,
    path = "/mine",
    responses(
        (status = 201, description = "Block mined", body = MineResponse),
        (status = 400, description = "No wallet, or mining was abandoned", body = MessageResponse),
        (status = 409, description = "Conflicts must be resolved first", body = MessageResponse)
    )
)]
pub async fn mine_block(state: NodeData) -> impl Responder {
    match run_blocking(&state, |node| node.blockchain.needs_resolution()).await {
        Ok(true) => {
            return HttpResponse::Conflict().json(message("Resolve conflicts first, block not added!"));
        }
        Ok(false) => {}
        Err(response) => return response,
    }

    let result = run_blocking(&state, |node| {
        let block = node.blockchain.mine_block()?;
        let funds = node.blockchain.own_balance()?;
        Ok((block, funds))
    })
    .await;

    match result {
        Ok((Some(block), funds)) => HttpResponse::Created().json(MineResponse {
            message: "Block added successfully.".to_string(),
            block,
            funds: funds.unwrap_or_default(),
        }),
        Ok((None, _)) => HttpResponse::BadRequest().json(message("Adding a block failed.")),
        Err(response) => response,
    }
}

/// Resolve conflicts with peers
///
/// Adopts the longest valid chain any peer offers
#[utoipa::path(
    post,
    path = "/resolve-conflicts",
    responses(
        (status = 200, description = "Resolution finished", body = MessageResponse)
    )
)]
pub async fn resolve_conflicts(state: NodeData) -> impl Responder {
    match run_blocking(&state, |node| node.blockchain.resolve()).await {
        Ok(true) => HttpResponse::Ok().json(message("Chain was replaced!")),
        Ok(false) => HttpResponse::Ok().json(message("Local chain kept!")),
        Err(response) => response,
    }
}

/// Get this node's balance
#[utoipa::path(
    get,
    path = "/balance",
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse),
        (status = 400, description = "No wallet set up", body = MessageResponse)
    )
)]
pub async fn get_own_balance(state: NodeData) -> impl Responder {
    let address = match state.blockchain.public_key() {
        Some(address) => address.clone(),
        None => return HttpResponse::BadRequest().json(message("No wallet set up.")),
    };

    let participant = address.clone();
    match run_blocking(&state, move |node| node.blockchain.get_balance(participant.as_str())).await {
        Ok(funds) => HttpResponse::Ok().json(BalanceResponse {
            address: address.0,
            funds,
        }),
        Err(response) => response,
    }
}

/// Get the balance of any participant
#[utoipa::path(
    get,
    path = "/balance/{address}",
    params(
        ("address" = String, Path, description = "Participant address")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_balance(state: NodeData, address: web::Path<String>) -> impl Responder {
    let address = address.into_inner();
    let participant = address.clone();

    match run_blocking(&state, move |node| node.blockchain.get_balance(&participant)).await {
        Ok(funds) => HttpResponse::Ok().json(BalanceResponse { address, funds }),
        Err(response) => response,
    }
}

/// List known peers
#[utoipa::path(
    get,
    path = "/nodes",
    responses(
        (status = 200, description = "Peers retrieved successfully", body = NodesResponse)
    )
)]
pub async fn get_nodes(state: NodeData) -> impl Responder {
    match run_blocking(&state, |node| node.blockchain.get_peers()).await {
        Ok(all_nodes) => HttpResponse::Ok().json(NodesResponse {
            message: "Nodes retrieved.".to_string(),
            all_nodes,
        }),
        Err(response) => response,
    }
}

/// Add a peer
#[utoipa::path(
    post,
    path = "/node",
    request_body = NodeRequest,
    responses(
        (status = 201, description = "Peer added", body = NodesResponse),
        (status = 400, description = "No node supplied", body = MessageResponse)
    )
)]
pub async fn add_node(state: NodeData, request: web::Json<NodeRequest>) -> impl Responder {
    let peer = request.node.trim().to_string();
    if peer.is_empty() {
        return HttpResponse::BadRequest().json(message("No node data found."));
    }

    let result = run_blocking(&state, move |node| {
        node.blockchain.add_peer(&peer)?;
        node.blockchain.get_peers()
    })
    .await;

    match result {
        Ok(all_nodes) => HttpResponse::Created().json(NodesResponse {
            message: "Node added successfully.".to_string(),
            all_nodes,
        }),
        Err(response) => response,
    }
}

/// Remove a peer
#[utoipa::path(
    delete,
    path = "/node/{node}",
    params(
        ("node" = String, Path, description = "Peer address as host:port")
    ),
    responses(
        (status = 200, description = "Peer removed", body = NodesResponse)
    )
)]
pub async fn remove_node(state: NodeData, node: web::Path<String>) -> impl Responder {
    let peer = node.into_inner();

    let result = run_blocking(&state, move |node| {
        node.blockchain.remove_peer(&peer)?;
        node.blockchain.get_peers()
    })
    .await;

    match result {
        Ok(all_nodes) => HttpResponse::Ok().json(NodesResponse {
            message: "Node removed.".to_string(),
            all_nodes,
        }),
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{http::StatusCode, test, App};

    use super::*;
    use crate::api::configure_routes;
    use crate::config::LedgerConfig;
    use crate::network::NullGateway;

    fn state(wallet: Option<Wallet>) -> NodeData {
        let config = LedgerConfig {
            difficulty_bits: 4,
            mining_reward: 10.0,
        };
        let blockchain = Blockchain::new(&config, wallet.as_ref().map(|w| w.address().clone()), Arc::new(NullGateway));
        web::Data::new(NodeState::new(blockchain, wallet))
    }

    #[actix_web::test]
    async fn test_chain_starts_at_genesis() {
        let app = test::init_service(App::new().app_data(state(None)).configure(configure_routes)).await;

        let request = test::TestRequest::get().uri("/chain").to_request();
        let chain: Vec<Block> = test::call_and_read_body_json(&app, request).await;

        assert_eq!(chain, vec![Block::genesis()]);
    }

    #[actix_web::test]
    async fn test_mine_and_transfer() {
        let data = state(Some(Wallet::new()));
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure_routes)).await;

        let request = test::TestRequest::post().uri("/mine").to_request();
        let mined: MineResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(mined.block.index, 1);
        assert_eq!(mined.funds, 10.0);

        let request = test::TestRequest::post()
            .uri("/transaction")
            .set_json(serde_json::json!({"recipient": "bob", "amount": 4.0, "action": "pay"}))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let request = test::TestRequest::get().uri("/balance/bob").to_request();
        let balance: BalanceResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(balance.funds, 0.0);

        let request = test::TestRequest::get().uri("/transactions").to_request();
        let open: Vec<TransactionRecord> = test::call_and_read_body_json(&app, request).await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].recipient, "bob");
    }

    #[actix_web::test]
    async fn test_transaction_without_wallet() {
        let app = test::init_service(App::new().app_data(state(None)).configure(configure_routes)).await;

        let request = test::TestRequest::post()
            .uri("/transaction")
            .set_json(serde_json::json!({"recipient": "bob", "amount": 1.0}))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_broadcast_transaction_rejects_bad_signature() {
        let app = test::init_service(App::new().app_data(state(None)).configure(configure_routes)).await;
        let alice = Wallet::new();

        let request = test::TestRequest::post()
            .uri("/broadcast-transaction")
            .set_json(serde_json::json!({
                "sender": alice.address().as_str(),
                "recipient": "bob",
                "signature": "",
                "amount": 0.0,
                "action": "pay"
            }))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_broadcast_transaction_refuses_rewards() {
        let data = state(Some(Wallet::new()));
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure_routes)).await;

        let request = test::TestRequest::post()
            .uri("/broadcast-transaction")
            .set_json(serde_json::json!({
                "sender": "MINING",
                "recipient": "attacker",
                "signature": "",
                "amount": 0.0,
                "action": "Mining"
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::get().uri("/transactions").to_request();
        let open: Vec<TransactionRecord> = test::call_and_read_body_json(&app, request).await;
        assert!(open.is_empty());
    }

    #[actix_web::test]
    async fn test_broadcast_block_statuses() {
        let remote = state(Some(Wallet::new()));
        remote.blockchain.mine_block().unwrap().unwrap();
        remote.blockchain.mine_block().unwrap().unwrap();
        remote.blockchain.mine_block().unwrap().unwrap();
        let chain = remote.blockchain.get_chain().unwrap();

        let local = state(None);
        let app = test::init_service(App::new().app_data(local.clone()).configure(configure_routes)).await;

        let send = |block: &Block| {
            test::TestRequest::post()
                .uri("/broadcast-block")
                .set_json(BlockEnvelope { block: block.clone() })
                .to_request()
        };

        let response = test::call_service(&app, send(&chain[1])).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = test::call_service(&app, send(&chain[1])).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = test::call_service(&app, send(&chain[3])).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(local.blockchain.needs_resolution().unwrap());

        let request = test::TestRequest::post().uri("/mine").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_node_management() {
        let app = test::init_service(App::new().app_data(state(None)).configure(configure_routes)).await;

        let request = test::TestRequest::post()
            .uri("/node")
            .set_json(serde_json::json!({"node": "localhost:5001"}))
            .to_request();
        let added: NodesResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(added.all_nodes, vec!["localhost:5001".to_string()]);

        let request = test::TestRequest::delete().uri("/node/localhost:5001").to_request();
        let removed: NodesResponse = test::call_and_read_body_json(&app, request).await;
        assert!(removed.all_nodes.is_empty());

        let request = test::TestRequest::post()
            .uri("/node")
            .set_json(serde_json::json!({"node": " "}))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
