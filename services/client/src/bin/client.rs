//! services/client/src/bin/client.rs

use client_lib::{
    adapters::{gateway::GatewayAdapter, vault::FileVault},
    config::Config,
    error::ClientError,
    notifications::NotificationCache,
    session::SessionStore,
    state::AppState,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting client...");

    // --- 2. Restore the Durable Session ---
    let vault = Arc::new(FileVault::new(config.session_dir.clone()));
    let session = Arc::new(SessionStore::new(vault));
    session.restore().await;

    // --- 3. Initialize the Gateway Adapter ---
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| ClientError::Internal(e.to_string()))?;
    let gateway = Arc::new(GatewayAdapter::new(
        http,
        config.gateway_url.clone(),
        session.clone(),
    ));

    // --- 4. Optional Headless Login ---
    if !session.is_authenticated().await {
        match (
            std::env::var("LEARNHUB_EMAIL"),
            std::env::var("LEARNHUB_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) => {
                let user = session.login(gateway.as_ref(), &email, &password).await?;
                info!(user_id = user.id, "logged in as {}", user.display_name);
            }
            _ => {
                warn!("no stored session and no LEARNHUB_EMAIL/LEARNHUB_PASSWORD set; browsing unauthenticated");
            }
        }
    }

    // --- 5. Build the Shared AppState ---
    let notifications = Arc::new(NotificationCache::new(
        gateway.clone(),
        session.clone(),
        config.notification_poll,
        config.popup_ttl,
    ));
    let state = AppState {
        config: config.clone(),
        session: session.clone(),
        auth: gateway.clone(),
        catalog: gateway.clone(),
        enrollments: gateway.clone(),
        content: gateway.clone(),
        payments: gateway.clone(),
        notifications: notifications.clone(),
    };

    // --- 6. Start the Notification Poller ---
    let cancel = CancellationToken::new();
    let poller = {
        let notifications = notifications.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { notifications.run(cancel).await })
    };

    // --- 7. Report Notifications Until Ctrl-C ---
    let mut auth_changes = state.session.subscribe();
    let mut ticker = tokio::time::interval(config.notification_poll);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = auth_changes.changed() => {
                if changed.is_ok() && !*auth_changes.borrow() {
                    info!("signed out; notifications paused until the next login");
                }
            }
            _ = ticker.tick() => {
                for n in state.notifications.items().await.iter().filter(|n| !n.read) {
                    info!(notification_id = n.id, "{}: {}", n.title, n.message);
                }
            }
        }
    }

    // --- 8. Shut Down ---
    info!("Shutting down...");
    cancel.cancel();
    let _ = poller.await;
    Ok(())
}
