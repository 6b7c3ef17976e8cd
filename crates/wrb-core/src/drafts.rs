//! The shared queue of unsent draft units.
//!
//! Both the dispatch engine (free text) and the attachment store (uploaded
//! files) append here; a successful dispatch drains the queue into the
//! recipient's message history.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    domain::{AttachmentName, UnitId},
    errors::Error,
    Result,
};

/// Reference to an uploaded attachment plus advisory preview metadata.
#[derive(Clone, Debug)]
pub struct AttachmentRef {
    pub name: AttachmentName,
    pub remote_locator: String,
    pub preview: PreviewHints,
}

/// Preview rendering hints derived once from the file extension.
/// Advisory only; they never affect dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreviewHints {
    pub mime_category: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

/// Payload of one piece of outgoing/sent content.
#[derive(Clone, Debug)]
pub enum UnitPayload {
    Text(String),
    Attachment(AttachmentRef),
}

/// One piece of outgoing or sent content.
#[derive(Clone, Debug)]
pub struct MessageUnit {
    pub id: UnitId,
    pub payload: UnitPayload,
    pub sender_label: String,
    pub timestamp: DateTime<Utc>,
    pub is_own: bool,
    /// Draft units stay editable/deletable until sent; history copies are
    /// frozen.
    pub editable: bool,
}

impl MessageUnit {
    /// Immutable copy for a recipient's message history.
    pub fn frozen(&self) -> Self {
        Self {
            editable: false,
            ..self.clone()
        }
    }
}

/// Singleton draft queue. Mutated only from the operator's event loop.
#[derive(Debug, Default)]
pub struct DraftQueue {
    units: Mutex<Vec<MessageUnit>>,
    next_id: AtomicU64,
}

impl DraftQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&self) -> UnitId {
        UnitId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Convert the operator's text buffer into a new editable draft unit.
    ///
    /// An empty or whitespace-only buffer is rejected, not silently dropped.
    pub async fn commit_text(&self, buffer: &str, sender_label: &str) -> Result<UnitId> {
        let text = buffer.trim();
        if text.is_empty() {
            return Err(Error::Validation("draft text is empty".to_string()));
        }

        let unit = MessageUnit {
            id: self.alloc_id(),
            payload: UnitPayload::Text(text.to_string()),
            sender_label: sender_label.to_string(),
            timestamp: Utc::now(),
            is_own: true,
            editable: true,
        };
        let id = unit.id;
        self.units.lock().await.push(unit);
        Ok(id)
    }

    /// Append an attachment draft unless its name is already present.
    ///
    /// Returns `false` when the name was a duplicate and nothing was added.
    pub async fn push_attachment(&self, reference: AttachmentRef, sender_label: &str) -> bool {
        let mut units = self.units.lock().await;
        let duplicate = units.iter().any(
            |u| matches!(&u.payload, UnitPayload::Attachment(a) if a.name == reference.name),
        );
        if duplicate {
            return false;
        }

        units.push(MessageUnit {
            id: self.alloc_id(),
            payload: UnitPayload::Attachment(reference),
            sender_label: sender_label.to_string(),
            timestamp: Utc::now(),
            is_own: true,
            editable: true,
        });
        true
    }

    /// Remove the draft unit holding the named attachment, if any.
    pub async fn remove_attachment(&self, name: &AttachmentName) -> Option<MessageUnit> {
        let mut units = self.units.lock().await;
        let pos = units.iter().position(
            |u| matches!(&u.payload, UnitPayload::Attachment(a) if &a.name == name),
        )?;
        Some(units.remove(pos))
    }

    /// Remove an editable draft unit by id (operator deleted it).
    pub async fn remove_unit(&self, id: UnitId) -> bool {
        let mut units = self.units.lock().await;
        let Some(pos) = units.iter().position(|u| u.id == id && u.editable) else {
            return false;
        };
        units.remove(pos);
        true
    }

    /// A frozen text unit for direct insertion into message history
    /// (used for the composed reminder text, which never sits in the queue).
    pub fn history_text_unit(&self, text: &str, sender_label: &str) -> MessageUnit {
        MessageUnit {
            id: self.alloc_id(),
            payload: UnitPayload::Text(text.to_string()),
            sender_label: sender_label.to_string(),
            timestamp: Utc::now(),
            is_own: true,
            editable: false,
        }
    }

    pub async fn snapshot(&self) -> Vec<MessageUnit> {
        self.units.lock().await.clone()
    }

    /// Drain the queue, returning the units that were pending.
    pub async fn clear(&self) -> Vec<MessageUnit> {
        std::mem::take(&mut *self.units.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.units.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.units.lock().await.is_empty()
    }
}
