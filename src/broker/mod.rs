pub mod bus;
pub mod protocol;
mod service;

pub use bus::{Bus, ContextId};
pub use protocol::{Envelope, Request};
pub use service::{BrokerService, RemoteTriage, TriageBackend};
