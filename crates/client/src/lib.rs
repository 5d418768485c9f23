//! Awachat Client - chat socket connection manager
//!
//! This crate keeps one authenticated WebSocket open to an awachat server,
//! routes incoming messages to handlers by tag, and sends chat messages,
//! read acknowledgements and history requests.

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod notify;
pub mod session;
pub mod storage;
pub mod ws;

pub use config::{ClientConfig, ManagerConfig};
pub use credentials::{CredentialStore, StaticCredentials, StoredCredentials};
pub use error::{ConfigError, ConnectionError, TransportError};
pub use notify::{Notifier, TracingNotifier};
pub use session::{SessionUser, UserData, UserStore};
pub use storage::Storage;
pub use ws::{
    install_default_handlers, ConnectionManager, ConnectionState, TungsteniteTransport,
    WeakConnectionManager,
};
