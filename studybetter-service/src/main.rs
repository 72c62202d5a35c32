use tokio::net::TcpListener;
use tracing::info;

mod api;
mod config;
mod error;
mod extract;
mod generation;
mod groq;

use crate::config::StaticConfig;
use crate::extract::ocr;

// Re-export config crate types to avoid namespace collision
use ::config::{Config as ConfigBuilder, Environment, File};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting StudyBetter service v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration from an optional config file plus environment
    // overrides (STUDYBETTER__SERVER__PORT etc.)
    let static_config: StaticConfig = ConfigBuilder::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("STUDYBETTER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    info!(
        host = %static_config.server.host,
        port = static_config.server.port,
        "Configuration loaded"
    );

    // Probe the OCR engine up front so degraded mode is visible at startup
    // rather than on the first upload.
    match ocr::engine() {
        Some(location) => info!(
            command = %location.command.display(),
            version = %location.version,
            "OCR engine available"
        ),
        None => info!("OCR engine not found; running with native text extraction only"),
    }

    if !static_config.groq.is_configured() {
        info!("Groq API key not configured; quiz generation will use content-based fallbacks");
    }

    let addr = format!(
        "{}:{}",
        static_config.server.host, static_config.server.port
    );
    let app = api::router(static_config)?;

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("studybetter_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
