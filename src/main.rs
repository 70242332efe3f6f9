use std::sync::Arc;

use crm_bridge::config::BridgeConfig;
use crm_bridge::conversations::ConversationsClient;
use crm_bridge::conversations::twilio::TwilioConversations;
use crm_bridge::crm::CrmStore;
use crm_bridge::crm::airtable::AirtableCrm;
use crm_bridge::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env before reading any configuration
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BridgeConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!(
            "  Required: AIRTABLE_API_KEY, AIRTABLE_BASE_ID, TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN"
        );
        std::process::exit(1);
    });

    eprintln!("🔗 crm-bridge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Conversations: http://0.0.0.0:{}/callbacks/conversations",
        config.port
    );
    eprintln!(
        "   Routing:       http://0.0.0.0:{}/callbacks/routing",
        config.port
    );
    eprintln!(
        "   Directory:     http://0.0.0.0:{}/callbacks/crm",
        config.port
    );
    eprintln!(
        "   CRM:           Airtable base {} / table {}\n",
        config.airtable.base_id, config.airtable.table
    );

    let crm: Arc<dyn CrmStore> = Arc::new(AirtableCrm::new(config.airtable.clone()));
    let conversations: Arc<dyn ConversationsClient> =
        Arc::new(TwilioConversations::new(config.twilio.clone()));

    let app = server::app(crm, conversations);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "crm-bridge started");
    axum::serve(listener, app).await?;

    Ok(())
}
