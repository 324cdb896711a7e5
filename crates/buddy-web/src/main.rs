//! Coding buddy web server.
//!
//! Loads configuration, then serves the chat page and streams assistant
//! replies from the Groq chat completions API.
//!
//! # Usage
//!
//! ```bash
//! echo 'GROQ_API_KEY=gsk_...' > .env
//! cargo run -p buddy-web
//! cargo run -p buddy-web -- --port 8080 --model llama-3.3-70b-versatile
//! RUST_LOG=buddy=debug cargo run -p buddy-web
//! ```
//!
//! Then open the printed URL in a browser.
//!
//! ## Sending messages without a browser
//!
//! **WebSocket** (connect to `/ws`):
//! ```json
//! {"type": "chat", "message": "Explain binary search"}
//! ```
//!
//! **REST**: `POST /api/sessions`, then `POST /api/sessions/{id}/chat` with
//! ```json
//! {"message": "Explain binary search"}
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use buddy::prelude::*;
use buddy_web::{WebConfig, spawn_web};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Coding buddy chat server.
#[derive(Parser)]
#[command(about = "Browser-based coding buddy backed by the Groq chat completions API")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: std::net::IpAddr,

    /// Port for the web UI server.
    #[arg(long, default_value_t = 8501)]
    port: u16,

    /// Dotenv file checked first for GROQ_API_KEY and prompts.
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// JSON file checked second.
    #[arg(long, default_value = "config.json")]
    config_file: PathBuf,

    /// Model to use (overrides GROQ_MODEL).
    #[arg(long)]
    model: Option<String>,

    /// Chat completions URL of an OpenAI-compatible endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Serve this directory instead of the built-in page.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 1. Configuration: dotenv file, JSON file, then the environment.
    let config = match ConfigLoader::standard(&args.env_file, &args.config_file).load() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let config = match args.model {
        Some(model) => config.with_model(model),
        None => config,
    };
    info!("Using model {}", config.model);

    // 2. Completion client.
    let client = match args.endpoint {
        Some(url) => GroqClient::with_endpoint(config.api_key.clone(), url),
        None => GroqClient::new(config.api_key.clone()),
    };
    let client = match client {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to create API client: {e}");
            std::process::exit(1);
        }
    };

    // 3. Web server.
    let web_config = WebConfig {
        bind_addr: (args.host, args.port).into(),
        static_dir: args.static_dir,
    };
    let addr = spawn_web(Arc::new(client), Arc::new(config), web_config).await;
    println!("Coding buddy: http://{addr}");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
    }
    info!("Shutting down");
}
