use log::*;
use service::{config::Config, init_cache, init_services, logging::Logger};

#[tokio::main]
async fn main() {
    let config = Config::new();

    Logger::init_logger(&config);

    info!(
        "Starting up realtime platform ({} environment)...",
        config.runtime_env()
    );

    let cache = init_cache(&config);
    let app_state = init_services(&config, cache);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server exited with an error: {e}");
        std::process::exit(1);
    }

    info!("Server shut down cleanly");
}
