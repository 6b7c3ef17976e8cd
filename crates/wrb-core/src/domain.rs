use serde::{Deserialize, Serialize};

/// WhatsApp phone number in international digit form (no `+`, no spaces).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(pub String);

/// Stored name of an uploaded attachment (unique within the draft set).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentName(pub String);

/// Monotonic id for draft/history message units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnitId(pub u64);
