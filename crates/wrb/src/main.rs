//! Operator CLI: connect the gateway session, optionally draft attachments
//! given as arguments, then dispatch reminders to every pending recipient in
//! batches.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use wrb_core::{
    attach::AttachmentStore,
    config::Config,
    dispatch::{DispatchEngine, Recipient, SendOutcome},
    drafts::DraftQueue,
    session::{SessionObserver, SessionSupervisor},
    transport::types::{LocalFile, SessionStatus},
};
use wrb_gateway::GatewayClient;

/// Surfaces session events on the console.
struct ConsoleObserver {
    connected: watch::Sender<bool>,
}

#[async_trait::async_trait]
impl SessionObserver for ConsoleObserver {
    async fn pairing_artifact(&self, code: &str) {
        println!("Escanee el código para vincular la sesión:\n{code}");
    }

    async fn status_changed(&self, status: SessionStatus) {
        info!("session status: {status}");
        let _ = self.connected.send(status == SessionStatus::Connected);
    }

    async fn connected(&self) {
        info!("session established");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wrb_core::logging::init("wrb")?;

    let cfg = Arc::new(Config::load()?);
    let transport = Arc::new(GatewayClient::new(&cfg)?);

    let (connected_tx, mut connected_rx) = watch::channel(false);
    let observer = Arc::new(ConsoleObserver {
        connected: connected_tx,
    });
    let supervisor = SessionSupervisor::new(cfg.clone(), transport.clone(), observer);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let _stream = wrb_gateway::spawn_event_stream(
        cfg.gateway_url.clone(),
        cfg.gateway_token.clone(),
        event_tx,
    );
    let _consumer = supervisor.spawn_event_loop(event_rx);

    let drafts = Arc::new(DraftQueue::new());
    let engine = DispatchEngine::new(&cfg, supervisor.clone(), transport.clone(), drafts.clone());
    let attachments = AttachmentStore::new(transport, drafts, &cfg.sender_label);

    let raw = tokio::fs::read_to_string(&cfg.recipients_file).await?;
    let recipients: Vec<Recipient> = serde_json::from_str(&raw)?;
    info!(
        "loaded {} recipient(s) from {}",
        recipients.len(),
        cfg.recipients_file.display()
    );
    engine.load_recipients(recipients).await;

    // Any trailing arguments are files to draft as attachments.
    let attach_paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if !attach_paths.is_empty() {
        let mut files = Vec::new();
        for path in &attach_paths {
            let bytes = tokio::fs::read(path).await?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("archivo")
                .to_string();
            let mime = mime_for(&name).to_string();
            files.push(LocalFile { name, mime, bytes });
        }
        let added = attachments.upload(files).await?;
        info!("{} attachment(s) drafted", added.len());
    }

    supervisor.connect().await?;
    info!("waiting for the gateway session...");
    while !*connected_rx.borrow() {
        connected_rx.changed().await?;
    }

    loop {
        let batch = engine.send_batch(cfg.batch_limit).await;
        if batch.is_empty() {
            break;
        }

        let mut any_sent = false;
        for item in &batch {
            match &item.outcome {
                Ok(SendOutcome::Sent) => {
                    any_sent = true;
                    info!("sent to {}", item.name);
                }
                Ok(SendOutcome::AlreadyDelivered) => {}
                Err(e) => warn!("send to {} failed: {e}", item.name),
            }
        }
        if !any_sent {
            warn!("no progress in the last batch; stopping dispatch");
            break;
        }
    }

    let pending = engine.pending_count().await;
    if pending > 0 {
        warn!("{pending} recipient(s) left undelivered");
    }

    supervisor.disconnect().await?;
    Ok(())
}

fn mime_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}
