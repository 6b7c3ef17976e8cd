use async_trait::async_trait;

use crate::{
    domain::{AttachmentName, PhoneNumber},
    transport::types::{LocalFile, OutgoingBundle, SessionStatus, UploadOutcome},
    Result,
};

/// Hexagonal port for the WhatsApp gateway sidecar.
///
/// The HTTP adapter is the first implementation; the shape is designed so a
/// future embedded client can fit behind the same interface.
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Start (or resume) the gateway session.
    async fn start_session(&self) -> Result<()>;

    /// Stop the gateway session and release its resources.
    async fn stop_session(&self) -> Result<()>;

    /// Drop the stored identity and request a fresh pairing artifact.
    async fn rekey_session(&self) -> Result<()>;

    /// Query the gateway for its current session status.
    async fn session_status(&self) -> Result<SessionStatus>;

    /// Send one composed bundle to a recipient.
    async fn send_message(&self, to: &PhoneNumber, bundle: &OutgoingBundle) -> Result<()>;

    /// Upload operator-picked files to the gateway's file area.
    async fn upload_files(&self, files: Vec<LocalFile>) -> Result<UploadOutcome>;

    /// Delete a stored file by name.
    async fn delete_file(&self, name: &AttachmentName) -> Result<()>;
}
