use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pow_ledger::api::{self, NodeData, NodeState};
use pow_ledger::blockchain::{self, Blockchain, BlockchainStorage, Wallet};
use pow_ledger::network::{self, HttpPeerGateway, PeerGateway};
use pow_ledger::NodeConfig;

#[derive(Parser, Debug)]
#[command(name = "pow_ledger", about = "Run a proof-of-work ledger node")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Port to listen on, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Node identifier used to name the state and wallet files
    #[arg(long)]
    node_id: Option<String>,
}

// Load this node's wallet, creating and saving a fresh one on first start
fn load_or_create_wallet(config: &NodeConfig) -> Wallet {
    let path = config.wallet_path();

    match Wallet::load_keys(&path) {
        Ok(wallet) => {
            info!("Loaded wallet {} from {}", wallet.address(), path.display());
            wallet
        }
        Err(err) => {
            warn!("Loading wallet failed ({}), creating a new one", err);
            let wallet = Wallet::new();

            if let Err(err) = wallet.save_keys(&path) {
                warn!("Saving wallet failed: {}", err);
            }

            info!("Created wallet with address: {}", wallet.address());
            wallet
        }
    }
}

// Open the ledger on disk, falling back to memory if the store is unavailable
fn initialize_blockchain(config: &NodeConfig, wallet: &Wallet, gateway: Arc<dyn PeerGateway>) -> Blockchain {
    let public_key = Some(wallet.address().clone());
    let state_path = config.state_path();

    let blockchain = match BlockchainStorage::new(&state_path) {
        Ok(storage) => {
            info!("Using ledger storage at {}", state_path.display());
            Blockchain::with_storage(&config.ledger, public_key, gateway, Arc::new(storage))
        }
        Err(err) => {
            warn!("Failed to open ledger storage: {}", err);
            warn!("Creating in-memory ledger instead");
            Blockchain::new(&config.ledger, public_key, gateway)
        }
    };

    for peer in &config.network.bootstrap_peers {
        if let Err(err) = blockchain.add_peer(peer) {
            warn!("Failed to add bootstrap peer {}: {}", peer, err);
        }
    }

    blockchain
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_open_transactions,
        api::handlers::new_transaction,
        api::handlers::broadcast_transaction,
        api::handlers::broadcast_block,
        api::handlers::mine_block,
        api::handlers::resolve_conflicts,
        api::handlers::get_own_balance,
        api::handlers::get_balance,
        api::handlers::get_nodes,
        api::handlers::add_node,
        api::handlers::remove_node
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::TransactionRecord,
            network::BlockEnvelope,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineResponse,
            api::handlers::BalanceResponse,
            api::handlers::NodeRequest,
            api::handlers::NodesResponse,
            api::handlers::MessageResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "0.1.0",
        description = "Peer protocol and client endpoints of a proof-of-work ledger node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

async fn run_server(state: NodeData, host: String, port: u16) -> std::io::Result<()> {
    info!("Starting HTTP server at http://{}:{}", host, port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args = Args::parse();
    let mut config = NodeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(port) = args.port {
        config.node.port = port;
    }
    if let Some(node_id) = args.node_id {
        config.node.node_id = node_id;
    }
    config.validate()?;

    std::fs::create_dir_all(&config.node.data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    let wallet = load_or_create_wallet(&config);

    // The blocking HTTP client must be built outside the server's runtime
    let gateway = HttpPeerGateway::new(config.peer_timeout()).context("building peer gateway")?;
    let blockchain = initialize_blockchain(&config, &wallet, Arc::new(gateway));
    let state = web::Data::new(NodeState::new(blockchain, Some(wallet)));

    // Keep a handle here so the gateway is dropped after the runtime exits
    actix_web::rt::System::new().block_on(run_server(state.clone(), config.node.host.clone(), config.node.port))?;

    drop(state);
    Ok(())
}
