//! Attachment lifecycle: upload, dedup, remote deletion.

use std::sync::Arc;

use tracing::warn;

use crate::{
    domain::AttachmentName,
    drafts::{AttachmentRef, DraftQueue, PreviewHints},
    errors::Error,
    transport::{
        port::TransportPort,
        types::{LocalFile, UploadOutcome},
    },
    Result,
};

/// Derive preview hints from a file name. Names without an extension fall
/// through to the generic entry.
pub fn preview_hints(name: &str) -> PreviewHints {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" => PreviewHints {
            mime_category: "image",
            icon: "mdi-file-image",
            color: "teal",
        },
        "pdf" => PreviewHints {
            mime_category: "pdf",
            icon: "mdi-file-pdf-box",
            color: "red",
        },
        "doc" | "docx" => PreviewHints {
            mime_category: "word",
            icon: "mdi-file-word",
            color: "blue",
        },
        "xls" | "xlsx" | "csv" => PreviewHints {
            mime_category: "excel",
            icon: "mdi-file-excel",
            color: "green",
        },
        _ => PreviewHints {
            mime_category: "file",
            icon: "mdi-file",
            color: "grey",
        },
    }
}

/// Uploads and deletes draft attachments against the gateway's file area.
pub struct AttachmentStore {
    transport: Arc<dyn TransportPort>,
    drafts: Arc<DraftQueue>,
    sender_label: String,
}

impl AttachmentStore {
    pub fn new(
        transport: Arc<dyn TransportPort>,
        drafts: Arc<DraftQueue>,
        sender_label: &str,
    ) -> Self {
        Self {
            transport,
            drafts,
            sender_label: sender_label.to_string(),
        }
    }

    /// Upload files and append one draft unit per stored name.
    ///
    /// When the gateway's response cannot be parsed into names we fall back
    /// to the client-side file names so the operator always gets feedback.
    /// Names already present in the draft set are skipped. Returns the refs
    /// actually added.
    pub async fn upload(&self, files: Vec<LocalFile>) -> Result<Vec<AttachmentRef>> {
        if files.is_empty() {
            return Err(Error::Validation("no files selected".to_string()));
        }

        let local_names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        let names = match self.transport.upload_files(files).await? {
            UploadOutcome::Named(names) => names,
            UploadOutcome::Unparsed => {
                warn!("upload response not understood; falling back to local file names");
                local_names
            }
        };

        let mut added = Vec::new();
        for name in names {
            let reference = AttachmentRef {
                remote_locator: format!("files/{name}"),
                preview: preview_hints(&name),
                name: AttachmentName(name),
            };
            if self
                .drafts
                .push_attachment(reference.clone(), &self.sender_label)
                .await
            {
                added.push(reference);
            } else {
                warn!("attachment '{}' already drafted; skipped", reference.name.0);
            }
        }
        Ok(added)
    }

    /// Remove the named attachment from the draft set, then delete it
    /// remotely.
    ///
    /// The local removal is optimistic and is not rolled back when the
    /// remote delete fails; the failure is surfaced instead (accepted
    /// inconsistency: the operator already dismissed the item).
    pub async fn delete(&self, name: &AttachmentName) -> Result<()> {
        if self.drafts.remove_attachment(name).await.is_none() {
            return Err(Error::Validation(format!(
                "no attachment named '{}' in the draft set",
                name.0
            )));
        }

        if let Err(e) = self.transport.delete_file(name).await {
            warn!("remote delete of '{}' failed: {e}", name.0);
            return Err(e);
        }
        Ok(())
    }
}
