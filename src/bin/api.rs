use nao_assistant_relay::{
    api::{start_server, ApiState},
    auth::{AuthState, TOKEN_EXPIRY_SECS},
    memory::{build_summary_store, ContextWindow, SummaryPipeline},
    provider::OpenAiClient,
    relay::CompletionRelay,
    users::UserStore,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let openai_api_key = std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!("OPENAI_API_KEY not set in .env — queries will fail until configured");
        String::new()
    });

    let jwt_secret = std::env::var("JWT_KEY").unwrap_or_else(|_| {
        eprintln!("JWT_KEY not set in .env — using an insecure development secret");
        "insecure-development-secret".to_string()
    });

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("NAO Assistant Relay - API Server");
    info!("Port: {}", api_port);

    // Create components
    let provider = Arc::new(OpenAiClient::new(openai_api_key));
    let window = Arc::new(ContextWindow::new());
    let relay = Arc::new(CompletionRelay::new(provider.clone()));
    let summary_store = build_summary_store();
    let summarizer = Arc::new(SummaryPipeline::new(provider, summary_store));
    let users = Arc::new(UserStore::from_env());
    let auth = AuthState::new(jwt_secret, TOKEN_EXPIRY_SECS);

    let state = ApiState {
        window,
        relay,
        summarizer,
        users,
        auth,
    };

    info!("Relay initialized");
    info!("Starting API server...");

    start_server(state, api_port).await?;

    Ok(())
}
