//! HTTP service that manages WhatsApp sessions through an automation gateway
//! and forwards every incoming message to a configurable set of webhooks.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod http_server;
pub mod session;
pub mod settings;
pub mod store;
pub mod types;
pub mod verification;

pub use error::{Error, Result};
