use actix_web::{web, App, HttpServer};

use server::config::ServerConfig;
use server::connection::ws_index;
use server::server::spawn_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = ServerConfig::from_env();
    let srv_tx = spawn_server(&config);

    log::info!("whiteboard broker listening on http://{}", config.bind_addr);

    let bind_addr = config.bind_addr.clone();
    HttpServer::new(move || {
        App::new()
            .data(srv_tx.clone())
            .route("/ws/", web::get().to(ws_index))
    })
    .bind(&bind_addr)?
    .run()
    .await
}
