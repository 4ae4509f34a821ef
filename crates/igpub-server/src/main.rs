use igpub_server::{AppState, load_config, observability, resolve_config_path};

#[tokio::main]
async fn main() {
    // Load .env file if present, before anything reads the environment.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let config = match load_config(Some(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %config_path, source = %source, "configuration loaded");
    observability::apply_logging_level(&config.logging.level);

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Server initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = igpub_server::run(state, &config.server.listen_addr()).await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}
