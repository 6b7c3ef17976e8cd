//! Session supervision: the lifecycle state machine of the gateway session.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    errors::Error,
    transport::{
        port::TransportPort,
        types::{PushEvent, SessionStatus},
    },
    Result,
};

/// Callbacks surfaced to the UI/operator layer.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// A new pairing artifact arrived; display it for scanning.
    async fn pairing_artifact(&self, code: &str);

    /// Authoritative status change (push event or status probe).
    async fn status_changed(&self, status: SessionStatus);

    /// Fired exactly once per established connection.
    async fn connected(&self);
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    last_transition_at: DateTime<Utc>,
    /// Re-armed whenever the session leaves `Connected`, so the
    /// `connected()` callback fires once per connection.
    connected_notified: bool,
}

enum StartKind {
    Fresh,
    Rekey,
}

/// Owns the transport session state machine.
///
/// Process-wide singleton: created `Disconnected`, mutated only here. Push
/// events from the gateway are applied in arrival order under the same state
/// mutex as explicit operator calls and win over locally-assumed state.
pub struct SessionSupervisor {
    cfg: Arc<Config>,
    transport: Arc<dyn TransportPort>,
    observer: Arc<dyn SessionObserver>,
    state: Mutex<SessionState>,
    /// Single-slot try-acquire guard on *initiation* of connect/reconnect.
    /// Duplicate requests are dropped, never queued.
    inflight: AtomicBool,
    status_probe_pending: AtomicBool,
}

impl SessionSupervisor {
    pub fn new(
        cfg: Arc<Config>,
        transport: Arc<dyn TransportPort>,
        observer: Arc<dyn SessionObserver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            transport,
            observer,
            state: Mutex::new(SessionState {
                status: SessionStatus::Disconnected,
                last_transition_at: Utc::now(),
                connected_notified: false,
            }),
            inflight: AtomicBool::new(false),
            status_probe_pending: AtomicBool::new(false),
        })
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    pub async fn last_transition_at(&self) -> DateTime<Utc> {
        self.state.lock().await.last_transition_at
    }

    /// Start the gateway session.
    ///
    /// Returns `Ok(false)` (with a warning) when a start is already in
    /// flight; duplicate requests are coalesced, not treated as failures.
    pub async fn connect(self: &Arc<Self>) -> Result<bool> {
        self.start(StartKind::Fresh).await
    }

    /// Same guard semantics as [`connect`](Self::connect), but drops the
    /// stored identity first so the operator can rebind the channel to a
    /// different account. Valid from `Connected` and from `Error`.
    pub async fn reconnect(self: &Arc<Self>) -> Result<bool> {
        self.start(StartKind::Rekey).await
    }

    async fn start(self: &Arc<Self>, kind: StartKind) -> Result<bool> {
        if self
            .inflight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("session start already in flight; request dropped");
            return Ok(false);
        }

        self.set_status(SessionStatus::Connecting).await;

        // The external call runs in its own task so the startup grace below
        // only stops waiting locally; a slow-but-succeeding start still
        // completes and emits its push event later.
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let res = match kind {
                StartKind::Fresh => this.transport.start_session().await,
                StartKind::Rekey => this.transport.rekey_session().await,
            };
            // Guard clears when the external call returns, success or not.
            this.inflight.store(false, Ordering::SeqCst);

            if let Err(e) = &res {
                warn!("session start failed: {e}");
                this.set_status(SessionStatus::Error).await;
                this.schedule_status_recheck();
            }
            res
        });

        match timeout(self.cfg.startup_grace, handle).await {
            Ok(Ok(res)) => res.map(|()| true),
            Ok(Err(join)) => Err(Error::Transport(format!(
                "session start task failed: {join}"
            ))),
            Err(_) => {
                // No terminal outcome within the grace window: leave the
                // status as last known instead of forcing `Error`.
                debug!("session start still pending after startup grace");
                Ok(true)
            }
        }
    }

    /// Stop the gateway session. Valid from any state.
    ///
    /// On failure the status is left unchanged and the error surfaced.
    pub async fn disconnect(&self) -> Result<()> {
        self.transport.stop_session().await?;
        self.inflight.store(false, Ordering::SeqCst);
        self.set_status(SessionStatus::Disconnected).await;
        info!("session stopped");
        Ok(())
    }

    /// Debounced status probe: calls within the quiet window collapse into a
    /// single gateway query executed once the window elapses.
    pub fn check_status(self: &Arc<Self>) {
        if self.status_probe_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.cfg.status_debounce).await;
            this.status_probe_pending.store(false, Ordering::SeqCst);
            match this.transport.session_status().await {
                Ok(status) => this.apply_push(PushEvent::StatusChanged(status)).await,
                Err(e) => warn!("status probe failed: {e}"),
            }
        });
    }

    fn schedule_status_recheck(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.cfg.status_recheck_delay).await;
            this.check_status();
        });
    }

    /// Spawn the consumer that applies gateway push events in arrival order.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<PushEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                this.apply_push(ev).await;
            }
            debug!("push channel closed; event loop exiting");
        })
    }

    /// Apply one push event.
    pub async fn apply_push(&self, ev: PushEvent) {
        match ev {
            PushEvent::PairingArtifact(code) => {
                info!("new pairing artifact received");
                self.observer.pairing_artifact(&code).await;
            }
            PushEvent::StatusChanged(status) => {
                let fire_connected = {
                    let mut st = self.state.lock().await;
                    if st.status != status {
                        info!("session status: {} -> {}", st.status, status);
                        st.status = status;
                        st.last_transition_at = Utc::now();
                    }
                    let fire = status == SessionStatus::Connected && !st.connected_notified;
                    st.connected_notified = status == SessionStatus::Connected;
                    fire
                };

                self.observer.status_changed(status).await;
                if fire_connected {
                    self.observer.connected().await;
                }
            }
        }
    }

    async fn set_status(&self, status: SessionStatus) {
        let mut st = self.state.lock().await;
        if st.status != status {
            st.status = status;
            st.last_transition_at = Utc::now();
        }
        if status != SessionStatus::Connected {
            st.connected_notified = false;
        }
    }

    #[cfg(test)]
    fn guard_held(&self) -> bool {
        self.inflight.load(Ordering::SeqCst)
    }
}
