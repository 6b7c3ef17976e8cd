use crate::domain::AttachmentName;

/// Connectivity lifecycle of the gateway session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl SessionStatus {
    /// Map a gateway status string onto the lifecycle.
    ///
    /// Unknown strings are treated as `Disconnected` rather than rejected so
    /// a newer gateway cannot wedge the supervisor.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "connected" | "ready" => Self::Connected,
            "connecting" | "pairing" => Self::Connecting,
            "error" | "auth_failure" => Self::Error,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Asynchronous events pushed by the gateway.
#[derive(Clone, Debug)]
pub enum PushEvent {
    /// A fresh scannable pairing code is available for display.
    PairingArtifact(String),
    /// Authoritative status transition; wins over locally-assumed state.
    StatusChanged(SessionStatus),
}

/// One outgoing per-recipient bundle.
///
/// Attachments travel by stored name only; the gateway resolves names to
/// bytes on its side.
#[derive(Clone, Debug, Default)]
pub struct OutgoingBundle {
    pub text: String,
    pub attachments: Vec<AttachmentName>,
}

/// A client-side file picked by the operator for upload.
#[derive(Clone, Debug)]
pub struct LocalFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Result of an upload call.
#[derive(Clone, Debug)]
pub enum UploadOutcome {
    /// The gateway reported the stored names.
    Named(Vec<String>),
    /// The response body could not be interpreted as names; callers fall
    /// back to the client-side file names.
    Unparsed,
}
