//! Gateway abstractions (HTTP sidecar today; an embedded client later).

pub mod port;
pub mod types;
