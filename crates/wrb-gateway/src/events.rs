//! Push-event reader: long-lived line-delimited JSON over `GET /events`.

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use wrb_core::transport::types::{PushEvent, SessionStatus};

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Deserialize)]
struct WireEvent {
    event: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn decode_line(line: &str) -> Option<PushEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let wire: WireEvent = match serde_json::from_str(line) {
        Ok(w) => w,
        Err(e) => {
            debug!("skipping undecodable gateway event: {e}");
            return None;
        }
    };

    match wire.event.as_str() {
        "qr" => wire.data.map(PushEvent::PairingArtifact),
        "status" => wire
            .status
            .as_deref()
            .map(|s| PushEvent::StatusChanged(SessionStatus::parse(s))),
        other => {
            debug!("ignoring gateway event kind '{other}'");
            None
        }
    }
}

/// Spawn the reader task for the gateway's push channel.
///
/// The stream is re-established after a fixed delay whenever it drops or is
/// refused; decode failures skip the line. Errors are logged, never fatal.
/// The task exits when the receiving side of `tx` is gone.
pub fn spawn_event_stream(
    base_url: String,
    token: Option<String>,
    tx: mpsc::UnboundedSender<PushEvent>,
) -> tokio::task::JoinHandle<()> {
    // Own client: a total request timeout would sever the long-lived stream.
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default();

    tokio::spawn(async move {
        loop {
            if tx.is_closed() {
                return;
            }

            let req = http.get(format!("{base_url}/events"));
            let req = match &token {
                Some(t) => req.bearer_auth(t),
                None => req,
            };

            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let mut buf = String::new();
                    let mut stream = resp.bytes_stream();
                    while let Some(chunk) = stream.next().await {
                        let Ok(chunk) = chunk else { break };
                        buf.push_str(&String::from_utf8_lossy(&chunk));
                        while let Some(pos) = buf.find('\n') {
                            let line: String = buf.drain(..=pos).collect();
                            if let Some(ev) = decode_line(&line) {
                                if tx.send(ev).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    warn!("gateway event stream ended; reconnecting");
                }
                Ok(resp) => warn!("gateway event stream refused: {}", resp.status()),
                Err(e) => warn!("gateway event stream failed: {e}"),
            }

            sleep(RECONNECT_DELAY).await;
        }
    })
}
