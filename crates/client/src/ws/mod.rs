//! WebSocket layer of the chat client.
//!
//! This module provides:
//! - One managed socket to the chat server with heartbeat and bounded
//!   auto-reconnect ([`ConnectionManager`])
//! - Tag-based routing of inbound messages to registered handlers
//! - A [`Transport`] seam, implemented natively with tokio-tungstenite
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  commands   ┌─────────────────────────────┐
//! │  ConnectionManager   │ ──────────▶ │         event loop          │
//! │  (cloneable handle)  │ ◀────────── │ socket, heartbeat, reconnect│
//! └──────────────────────┘   watch     └─────────────────────────────┘
//!                                          │ open          ▲ events
//!                                          ▼               │ (generation)
//!                                   ┌─────────────────────────────┐
//!                                   │   Transport / socket task   │
//!                                   └─────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let manager = ConnectionManager::new(config, transport, credentials, notifier);
//! manager.register_message_handler(MessageTag::Chat, |payload| {
//!     if let MessagePayload::Chat(message) = payload {
//!         println!("{}: {:?}", message.from, message.body);
//!     }
//! });
//! manager.init("https://chat.example.com").await?;
//! ```

mod connection;
mod endpoint;
mod handlers;
mod manager;
mod registry;

pub use connection::{
    ConnectionState, ReconnectConfig, Transport, TransportEvent, TransportEvents,
    TransportHandle, TungsteniteTransport,
};
pub use endpoint::{socket_url, with_token};
pub use handlers::install_default_handlers;
pub use manager::{ConnectionManager, WeakConnectionManager};
pub use registry::{HandlerRegistry, MessageHandler};
