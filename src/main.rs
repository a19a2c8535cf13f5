use log::{error, info};
use service::{config::Config, logging::Logger, AppState};

mod controller;
mod router;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    let address = config.bind_address();
    let events_path = config.events_path().to_string();
    let app_state = AppState::new(config);
    let app = router::define_routes(app_state);

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {address}: {e}");
            std::process::exit(1);
        }
    };

    info!("Streaming events on http://{address}{events_path}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
