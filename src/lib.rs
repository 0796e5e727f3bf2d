pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod models;
pub mod store;

pub use config::Config;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("serve") => run_server(config).await,

        Some("init" | "--init") => {
            if Config::create_default_if_missing()? {
                println!("✓ Config file created. Edit config.toml and run again.");
            } else {
                println!("Config file already exists.");
            }
            Ok(())
        }

        Some("help" | "-h" | "--help") => {
            print_help();
            Ok(())
        }

        Some(other) => {
            println!("Unknown command: {other}");
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Clientele - Client Contact Manager");
    println!("A small self-hosted address book with per-user accounts");
    println!();
    println!("USAGE:");
    println!("  clientele [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("  serve             Start the HTTP server (default)");
    println!("  init              Create default config file");
    println!("  help              Show this help message");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml to change the port, storage paths, etc.");
    println!("  Set CLIENTELE_TOKEN_SECRET to override the signing secret.");
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!(
        "Clientele v{} starting on port {}",
        env!("CARGO_PKG_VERSION"),
        config.server.port
    );

    let port = config.server.port;
    let state = api::create_app_state(config);
    let app = api::router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening at http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }
}
