//! Per-recipient dispatch: compose a bundle and send it, singly or in
//! batches, updating delivery status idempotently.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    compose::{self, Pet},
    config::{Config, MAX_BATCH_SIZE},
    domain::{PhoneNumber, UnitId},
    drafts::{DraftQueue, MessageUnit, UnitPayload},
    errors::Error,
    session::SessionSupervisor,
    transport::{
        port::TransportPort,
        types::{OutgoingBundle, SessionStatus},
    },
    Result,
};

/// One message target with its reminder records and delivery status.
///
/// Constructed from an operator-supplied data file; `message_history` and
/// `delivered` are runtime state owned by the engine.
#[derive(Clone, Debug, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub phone: PhoneNumber,
    #[serde(default)]
    pub pets: Vec<Pet>,
    #[serde(skip)]
    pub message_history: Vec<MessageUnit>,
    #[serde(default)]
    pub delivered: bool,
}

/// Outcome of a single `send` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The recipient was already delivered this cycle; the transport was not
    /// touched.
    AlreadyDelivered,
}

/// Per-recipient result of a batch run.
#[derive(Debug)]
pub struct BatchItem {
    pub index: usize,
    pub name: String,
    pub outcome: Result<SendOutcome>,
}

pub struct DispatchEngine {
    supervisor: Arc<SessionSupervisor>,
    transport: Arc<dyn TransportPort>,
    drafts: Arc<DraftQueue>,
    recipients: Mutex<Vec<Recipient>>,
    sender_label: String,
    batch_limit: usize,
}

impl DispatchEngine {
    pub fn new(
        cfg: &Config,
        supervisor: Arc<SessionSupervisor>,
        transport: Arc<dyn TransportPort>,
        drafts: Arc<DraftQueue>,
    ) -> Self {
        Self {
            supervisor,
            transport,
            drafts,
            recipients: Mutex::new(Vec::new()),
            sender_label: cfg.sender_label.clone(),
            batch_limit: cfg.batch_limit.min(MAX_BATCH_SIZE),
        }
    }

    /// Replace the recipient set (operator-level data reload).
    ///
    /// This is the only way `delivered` flags are ever reset.
    pub async fn load_recipients(&self, list: Vec<Recipient>) {
        let mut recipients = self.recipients.lock().await;
        *recipients = list;
    }

    pub async fn recipients(&self) -> Vec<Recipient> {
        self.recipients.lock().await.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.recipients
            .lock()
            .await
            .iter()
            .filter(|r| !r.delivered)
            .count()
    }

    /// Commit the operator's free-text buffer into the draft queue.
    pub async fn commit_draft_text(&self, buffer: &str) -> Result<UnitId> {
        self.drafts.commit_text(buffer, &self.sender_label).await
    }

    /// Send the pending bundle to one recipient.
    ///
    /// Idempotent: a recipient already marked delivered is a no-op and the
    /// transport is not invoked again. On failure the recipient and the
    /// draft set are left untouched so the operator can retry.
    pub async fn send(&self, index: usize) -> Result<SendOutcome> {
        let status = self.supervisor.status().await;
        if status != SessionStatus::Connected {
            return Err(Error::Validation(format!(
                "session is {status}; connect before sending"
            )));
        }

        // Snapshot without holding the recipient lock across the transport
        // call.
        let (phone, reminder) = {
            let recipients = self.recipients.lock().await;
            let r = recipients
                .get(index)
                .ok_or_else(|| Error::Validation(format!("no recipient at index {index}")))?;
            if r.delivered {
                return Ok(SendOutcome::AlreadyDelivered);
            }
            (r.phone.clone(), compose::reminder_sentence(&r.pets))
        };

        let pending = self.drafts.snapshot().await;
        let bundle = build_bundle(reminder.as_deref(), &pending);
        if bundle.text.is_empty() && bundle.attachments.is_empty() {
            return Err(Error::Validation(
                "nothing to send: no reminder data and no drafts".to_string(),
            ));
        }

        self.transport.send_message(&phone, &bundle).await?;

        // Success: mark delivered, move the sent content into history and
        // drain the draft queue.
        let sent = self.drafts.clear().await;
        let mut recipients = self.recipients.lock().await;
        if let Some(r) = recipients.get_mut(index) {
            r.delivered = true;
            if let Some(text) = &reminder {
                r.message_history
                    .push(self.drafts.history_text_unit(text, &self.sender_label));
            }
            r.message_history.extend(sent.iter().map(MessageUnit::frozen));
            info!("dispatched bundle to {} ({})", r.name, r.phone.0);
        }

        Ok(SendOutcome::Sent)
    }

    /// Send to up to `size` not-yet-delivered recipients, in display order.
    ///
    /// Sends are strictly sequential; one failure does not abort the rest.
    pub async fn send_batch(&self, size: usize) -> Vec<BatchItem> {
        let size = size.clamp(1, self.batch_limit);
        let indices: Vec<usize> = {
            let recipients = self.recipients.lock().await;
            recipients
                .iter()
                .enumerate()
                .filter(|(_, r)| !r.delivered)
                .map(|(i, _)| i)
                .take(size)
                .collect()
        };
        self.send_batch_to(&indices).await
    }

    /// Batch send to an explicit selection, with the same partial-failure
    /// semantics as [`send_batch`](Self::send_batch).
    pub async fn send_batch_to(&self, indices: &[usize]) -> Vec<BatchItem> {
        let mut results = Vec::with_capacity(indices.len());
        for &index in indices {
            let name = {
                let recipients = self.recipients.lock().await;
                recipients
                    .get(index)
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| format!("#{index}"))
            };

            let outcome = self.send(index).await;
            if let Err(e) = &outcome {
                warn!("send to {name} failed: {e}");
            }
            results.push(BatchItem {
                index,
                name,
                outcome,
            });
        }
        results
    }
}

/// Reminder sentence first, then pending free-text drafts, blank-line
/// separated; attachments travel by name.
fn build_bundle(reminder: Option<&str>, pending: &[MessageUnit]) -> OutgoingBundle {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(text) = reminder {
        parts.push(text);
    }

    let mut attachments = Vec::new();
    for unit in pending {
        match &unit.payload {
            UnitPayload::Text(t) => parts.push(t),
            UnitPayload::Attachment(a) => attachments.push(a.name.clone()),
        }
    }

    OutgoingBundle {
        text: parts.join("\n\n"),
        attachments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttachmentName;
    use crate::drafts::{AttachmentRef, PreviewHints};
    use crate::session::SessionObserver;
    use crate::transport::types::{LocalFile, PushEvent, UploadOutcome};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            gateway_url: "http://localhost:0".to_string(),
            gateway_token: None,
            request_timeout: Duration::from_secs(1),
            startup_grace: Duration::from_millis(20),
            status_debounce: Duration::from_millis(10),
            status_recheck_delay: Duration::from_secs(60),
            batch_limit: 5,
            sender_label: "yo".to_string(),
            recipients_file: PathBuf::from("/tmp/recipients.json"),
        })
    }

    #[derive(Default)]
    struct FakeTransport {
        sends: std::sync::Mutex<Vec<(String, OutgoingBundle)>>,
        send_calls: AtomicUsize,
        fail_phone: Option<String>,
    }

    #[async_trait]
    impl TransportPort for FakeTransport {
        async fn start_session(&self) -> Result<()> {
            Ok(())
        }

        async fn stop_session(&self) -> Result<()> {
            Ok(())
        }

        async fn rekey_session(&self) -> Result<()> {
            Ok(())
        }

        async fn session_status(&self) -> Result<SessionStatus> {
            Ok(SessionStatus::Connected)
        }

        async fn send_message(&self, to: &PhoneNumber, bundle: &OutgoingBundle) -> Result<()> {
            self.send_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_phone.as_deref() == Some(to.0.as_str()) {
                return Err(Error::Transport("number not on whatsapp".to_string()));
            }
            self.sends
                .lock()
                .unwrap()
                .push((to.0.clone(), bundle.clone()));
            Ok(())
        }

        async fn upload_files(&self, _files: Vec<LocalFile>) -> Result<UploadOutcome> {
            Ok(UploadOutcome::Unparsed)
        }

        async fn delete_file(&self, _name: &AttachmentName) -> Result<()> {
            Ok(())
        }
    }

    struct NullObserver;

    #[async_trait]
    impl SessionObserver for NullObserver {
        async fn pairing_artifact(&self, _code: &str) {}
        async fn status_changed(&self, _status: SessionStatus) {}
        async fn connected(&self) {}
    }

    fn recipient(name: &str, phone: &str) -> Recipient {
        Recipient {
            name: name.to_string(),
            phone: PhoneNumber(phone.to_string()),
            pets: vec![crate::compose::Pet {
                name: "Luna".to_string(),
                treatments: vec![crate::compose::Treatment {
                    name: "Vacuna".to_string(),
                    variants: vec![crate::compose::Variant {
                        name: "Séxtuple".to_string(),
                        due_date: NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
                    }],
                }],
            }],
            message_history: Vec::new(),
            delivered: false,
        }
    }

    async fn engine_with(
        transport: Arc<FakeTransport>,
        recipients: Vec<Recipient>,
        connected: bool,
    ) -> DispatchEngine {
        let cfg = test_config();
        let supervisor = SessionSupervisor::new(cfg.clone(), transport.clone(), Arc::new(NullObserver));
        if connected {
            supervisor
                .apply_push(PushEvent::StatusChanged(SessionStatus::Connected))
                .await;
        }
        let engine = DispatchEngine::new(&cfg, supervisor, transport, Arc::new(DraftQueue::new()));
        engine.load_recipients(recipients).await;
        engine
    }

    #[tokio::test]
    async fn send_requires_a_connected_session() {
        let transport = Arc::new(FakeTransport::default());
        let engine = engine_with(transport.clone(), vec![recipient("Ana", "549111")], false).await;

        let err = engine.send(0).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(transport.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_send_is_a_no_op_after_delivery() {
        let transport = Arc::new(FakeTransport::default());
        let engine = engine_with(transport.clone(), vec![recipient("Ana", "549111")], true).await;

        assert_eq!(engine.send(0).await.unwrap(), SendOutcome::Sent);
        let history_len = engine.recipients().await[0].message_history.len();

        assert_eq!(
            engine.send(0).await.unwrap(),
            SendOutcome::AlreadyDelivered
        );
        assert_eq!(transport.send_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            engine.recipients().await[0].message_history.len(),
            history_len
        );
    }

    #[tokio::test]
    async fn failed_send_leaves_recipient_and_drafts_retryable() {
        let transport = Arc::new(FakeTransport {
            fail_phone: Some("549111".to_string()),
            ..FakeTransport::default()
        });
        let engine = engine_with(transport.clone(), vec![recipient("Ana", "549111")], true).await;
        engine.commit_draft_text("nos vemos!").await.unwrap();

        let err = engine.send(0).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        let r = &engine.recipients().await[0];
        assert!(!r.delivered);
        assert!(r.message_history.is_empty());
        assert_eq!(engine.drafts.len().await, 1);
    }

    #[tokio::test]
    async fn success_freezes_drafts_into_history_and_clears_the_queue() {
        let transport = Arc::new(FakeTransport::default());
        let engine = engine_with(transport.clone(), vec![recipient("Ana", "549111")], true).await;
        engine.commit_draft_text("nos vemos!").await.unwrap();
        engine
            .drafts
            .push_attachment(
                AttachmentRef {
                    name: AttachmentName("promo.pdf".to_string()),
                    remote_locator: "files/promo.pdf".to_string(),
                    preview: PreviewHints {
                        mime_category: "pdf",
                        icon: "mdi-file-pdf-box",
                        color: "red",
                    },
                },
                "yo",
            )
            .await;

        assert_eq!(engine.send(0).await.unwrap(), SendOutcome::Sent);

        let sends = transport.sends.lock().unwrap();
        let (phone, bundle) = &sends[0];
        assert_eq!(phone, "549111");
        assert!(bundle.text.contains("su(s) mascota(s) 'Luna.'"));
        assert!(bundle.text.contains("nos vemos!"));
        assert_eq!(bundle.attachments, [AttachmentName("promo.pdf".to_string())]);
        drop(sends);

        let r = &engine.recipients().await[0];
        assert!(r.delivered);
        // Reminder text + the two drafts, all frozen.
        assert_eq!(r.message_history.len(), 3);
        assert!(r.message_history.iter().all(|u| !u.editable));
        assert!(engine.drafts.is_empty().await);
    }

    #[tokio::test]
    async fn batch_continues_past_a_failing_recipient() {
        let transport = Arc::new(FakeTransport {
            fail_phone: Some("549333".to_string()),
            ..FakeTransport::default()
        });
        let engine = engine_with(
            transport.clone(),
            vec![
                recipient("Ana", "549111"),
                recipient("Beto", "549222"),
                recipient("Caro", "549333"),
                recipient("Dani", "549444"),
                recipient("Eva", "549555"),
            ],
            true,
        )
        .await;

        let results = engine.send_batch(5).await;
        assert_eq!(results.len(), 5);
        assert!(results[2].outcome.is_err());

        let recipients = engine.recipients().await;
        let delivered: Vec<bool> = recipients.iter().map(|r| r.delivered).collect();
        assert_eq!(delivered, [true, true, false, true, true]);
    }

    #[tokio::test]
    async fn auto_batch_selects_undelivered_in_display_order_up_to_size() {
        let transport = Arc::new(FakeTransport::default());
        let mut list = vec![
            recipient("Ana", "549111"),
            recipient("Beto", "549222"),
            recipient("Caro", "549333"),
        ];
        list[0].delivered = true;
        let engine = engine_with(transport.clone(), list, true).await;

        let results = engine.send_batch(1).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Beto");
        assert_eq!(engine.pending_count().await, 1);
    }

    #[tokio::test]
    async fn batch_size_is_capped() {
        let transport = Arc::new(FakeTransport::default());
        let list = (0..8)
            .map(|i| recipient(&format!("r{i}"), &format!("549{i:03}")))
            .collect();
        let engine = engine_with(transport.clone(), list, true).await;

        let results = engine.send_batch(50).await;
        assert_eq!(results.len(), MAX_BATCH_SIZE);
        assert_eq!(engine.pending_count().await, 3);
    }

    #[tokio::test]
    async fn empty_draft_commit_is_rejected_without_side_effects() {
        let transport = Arc::new(FakeTransport::default());
        let engine = engine_with(transport, vec![recipient("Ana", "549111")], true).await;

        let err = engine.commit_draft_text("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(engine.drafts.is_empty().await);
    }

    #[tokio::test]
    async fn recipient_without_reminder_data_still_sends_drafts() {
        let transport = Arc::new(FakeTransport::default());
        let mut r = recipient("Ana", "549111");
        r.pets.clear();
        let engine = engine_with(transport.clone(), vec![r], true).await;
        engine.commit_draft_text("hola!").await.unwrap();

        assert_eq!(engine.send(0).await.unwrap(), SendOutcome::Sent);
        let sends = transport.sends.lock().unwrap();
        assert_eq!(sends[0].1.text, "hola!");
    }

    #[tokio::test]
    async fn nothing_to_send_is_a_validation_error() {
        let transport = Arc::new(FakeTransport::default());
        let mut r = recipient("Ana", "549111");
        r.pets.clear();
        let engine = engine_with(transport.clone(), vec![r], true).await;

        let err = engine.send(0).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(transport.send_calls.load(Ordering::SeqCst), 0);
    }
}
