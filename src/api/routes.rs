use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/chain", web::get().to(handlers::get_chain))
        .route("/transactions", web::get().to(handlers::get_open_transactions))
        .route("/transaction", web::post().to(handlers::new_transaction))
        .route("/broadcast-transaction", web::post().to(handlers::broadcast_transaction))
        .route("/broadcast-block", web::post().to(handlers::broadcast_block))
        .route("/mine", web::post().to(handlers::mine_block))
        .route("/resolve-conflicts", web::post().to(handlers::resolve_conflicts))
        .route("/balance", web::get().to(handlers::get_own_balance))
        .route("/balance/{address}", web::get().to(handlers::get_balance))
        .route("/nodes", web::get().to(handlers::get_nodes))
        .route("/node", web::post().to(handlers::add_node))
        .route("/node/{node}", web::delete().to(handlers::remove_node));
}
