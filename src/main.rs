use std::sync::Arc;

use email_gatekeeper::config::{GatekeeperConfig, ServerConfig};
use email_gatekeeper::relay::SmtpRelay;
use email_gatekeeper::server::{AppState, gatekeeper_routes};
use email_gatekeeper::Gatekeeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = GatekeeperConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    eprintln!("📬 Email Gatekeeper v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Inbound: http://0.0.0.0:{}/inbound", server_config.port);
    eprintln!("   Allowed: {}", config.allowlist_summary());
    eprintln!(
        "   Fallback: {}",
        config
            .forwarding_address
            .as_deref()
            .unwrap_or("none (reject)")
    );

    if let Err(e) = config.notify_target() {
        // Every message will be rejected until this is fixed.
        tracing::warn!("{e}");
    }

    let relay = match &server_config.smtp {
        Some(smtp) => {
            eprintln!("   Forwarding via SMTP: {}:{}", smtp.host, smtp.port);
            Some(Arc::new(SmtpRelay::new(smtp)?))
        }
        None => {
            eprintln!("   Forwarding: returned to caller");
            None
        }
    };

    let app = gatekeeper_routes(AppState {
        gatekeeper: Arc::new(Gatekeeper::new()),
        config: Arc::new(config),
        relay,
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port)).await?;
    tracing::info!(port = server_config.port, "Gatekeeper listening");
    axum::serve(listener, app).await?;

    Ok(())
}
