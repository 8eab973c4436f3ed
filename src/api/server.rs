use actix_web::{web, App, HttpServer};

use super::{configure, AppState};

/// Start the HTTP server and run until shutdown
pub async fn start_server(state: AppState, port: u16) -> std::io::Result<()> {
    tracing::info!(port, "Starting HTTP server on http://0.0.0.0:{}", port);

    let state = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
