pub mod client;
pub mod gateway;
pub mod manager;

pub use client::{AutomationClient, ClientEvent, ClientFactory, EventSender, MediaFile};
pub use gateway::{GatewayClientFactory, GatewayConfig};
pub use manager::{normalize_recipient, SessionManager, SessionManagerConfig};
