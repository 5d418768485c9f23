//! Tag-keyed message handler table.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use awachat_shared::{MessagePayload, MessageTag, ProtocolError, WireMessage};

/// Callback for one message tag.
pub type MessageHandler = Arc<dyn Fn(MessagePayload) + Send + Sync>;

/// At most one handler per tag; registering again replaces the old handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<MessageTag, MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tag: MessageTag, handler: MessageHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag, handler);
    }

    /// Returns whether a handler was removed.
    pub fn unregister(&self, tag: &MessageTag) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tag)
            .is_some()
    }

    pub fn contains(&self, tag: &MessageTag) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(tag)
    }

    fn handler_for(&self, tag: &MessageTag) -> Option<MessageHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .cloned()
    }

    /// Invoke the handler registered for the message's tag.
    ///
    /// Returns `Ok(false)` when there is no handler or `data` is null. The
    /// handler runs without the table locked, so it may (un)register handlers.
    /// A panicking handler is logged and counts as delivered.
    pub fn dispatch(&self, message: &WireMessage) -> Result<bool, ProtocolError> {
        let Some(data) = message.data.as_ref() else {
            return Ok(false);
        };
        let Some(handler) = self.handler_for(&message.tag) else {
            return Ok(false);
        };

        let payload = MessagePayload::decode(&message.tag, data.clone())?;
        if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            let reason = cause
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("non-string panic payload");
            crate::log_error!(tag = %message.tag, reason, "Message handler panicked");
        }
        Ok(true)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("HandlerRegistry")
            .field("tags", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
