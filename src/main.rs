use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wa_gateway::config::Config;
use wa_gateway::dispatcher::{DispatcherConfig, WebhookDispatcher};
use wa_gateway::http_server::{self, AppState};
use wa_gateway::session::{GatewayClientFactory, GatewayConfig, SessionManager, SessionManagerConfig};
use wa_gateway::settings::WebhookSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wa_gateway=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    // ─── Webhooks ───────────────────────────────────────────────────────────

    let dispatcher = Arc::new(WebhookDispatcher::new(DispatcherConfig {
        timeout: config.webhook_timeout,
        signing_secret: config.webhook_secret.clone(),
        ..DispatcherConfig::default()
    }));
    let settings = Arc::new(WebhookSettings::new(
        config.webhook_urls.clone(),
        config.env_file.clone(),
    ));
    if config.webhook_urls.is_empty() {
        warn!("no webhook URLs configured; incoming messages will not be forwarded");
    } else {
        info!("forwarding to {} webhook URL(s)", config.webhook_urls.len());
    }

    // ─── Sessions ───────────────────────────────────────────────────────────

    let factory = Arc::new(GatewayClientFactory::new(GatewayConfig {
        base_url: config.gateway_url.clone(),
        api_key: config.gateway_api_key.clone().unwrap_or_default(),
        callback_base: config.public_url.clone(),
    }));
    let sessions = SessionManager::new(
        SessionManagerConfig {
            session_path: config.session_path.clone(),
            max_sessions: config.max_sessions,
        },
        factory,
        dispatcher.clone(),
        settings.clone(),
    );

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;

    // ─── HTTP ───────────────────────────────────────────────────────────────

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    // Restore after binding so gateway callbacks for restored sessions land.
    let restorer = sessions.clone();
    tokio::spawn(async move {
        let restored = restorer.restore_sessions().await;
        info!("restored {restored} session(s)");
    });

    let state = AppState {
        sessions,
        dispatcher,
        settings,
        auth_token: config.auth_token.clone(),
        gateway_api_key: config.gateway_api_key.clone(),
        upload_dir: config.upload_dir.clone(),
    };
    if state.auth_token.is_none() {
        warn!("AUTH_TOKEN is not set; send routes will reject every request");
    }

    http_server::start(listener, state)
        .await
        .context("HTTP server failed")
}
