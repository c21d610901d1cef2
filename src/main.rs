//! Entry point: load config, open a live session, and tail it to the terminal.

use std::io::Write;
use std::sync::Arc;

use notif_live::auth::SharedToken;
use notif_live::connection::TungsteniteConnector;
use notif_live::models::{Notification, Severity};
use notif_live::services::NotificationPresenter;
use notif_live::{
    ClientConfig, ClientError, ClientResult, DisconnectKind, LiveSession,
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prints toasts to stdout and rings the terminal bell for audio cues.
struct TerminalPresenter;

impl NotificationPresenter for TerminalPresenter {
    fn toast(&self, n: &Notification) {
        println!("[{}] {}: {}", n.severity, n.title, n.message);
    }

    fn play_sound(&self, _severity: Severity) -> ClientResult<()> {
        let mut out = std::io::stdout();
        out.write_all(b"\x07")
            .and_then(|_| out.flush())
            .map_err(|e| ClientError::Presentation(e.to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let tokens = SharedToken::new(std::env::var("ACCESS_TOKEN").ok());
    let session = LiveSession::new(
        &config,
        Arc::new(tokens),
        Arc::new(TungsteniteConnector),
        Arc::new(TerminalPresenter),
    )?;

    let (rejected_tx, mut rejected) = mpsc::unbounded_channel();
    let _on_disconnect = session.manager().subscribers().on_disconnect(move |reason| {
        if matches!(
            reason.kind,
            DisconnectKind::AuthRejected | DisconnectKind::RetriesExhausted
        ) {
            let _ = rejected_tx.send(reason.clone());
        }
    });
    let _on_activity = session.manager().subscribers().on_activity(|activity| {
        println!("  {:?} {} ({})", activity.kind, activity.title, activity.time);
    });

    if !session.connect() {
        anyhow::bail!("no usable ACCESS_TOKEN; log in first");
    }
    tracing::info!(url = %config.ws_url, "tailing live events; ctrl-c to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
        Some(reason) = rejected.recv() => tracing::error!(reason = %reason, "live connection stopped"),
    }

    let notifications = session.notifications().snapshot();
    tracing::info!(
        received = notifications.notifications.len(),
        unread = notifications.unread_count,
        "session summary"
    );
    session.shutdown().await;
    Ok(())
}
