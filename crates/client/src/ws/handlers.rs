//! Stock handlers installed at startup.

use std::sync::Arc;

use awachat_shared::{ChatBody, ChatMessagePayload, MessagePayload, MessageTag};

use super::manager::ConnectionManager;
use crate::notify::Notifier;
use crate::session::UserStore;

/// Register the `chat`, `system` and `error` handlers.
///
/// Anything registered later for the same tags replaces these.
pub fn install_default_handlers(
    manager: &ConnectionManager,
    notifier: Arc<dyn Notifier>,
    users: Arc<dyn UserStore>,
) {
    let chat_notifier = notifier.clone();
    manager.register_message_handler(MessageTag::Chat, move |payload| {
        if let MessagePayload::Chat(message) = payload {
            on_chat(&message, chat_notifier.as_ref(), users.as_ref());
        }
    });

    let system_notifier = notifier.clone();
    manager.register_message_handler(MessageTag::System, move |payload| {
        if let MessagePayload::System(text) = payload {
            crate::log_info!(text = %text, "System message");
            system_notifier.report_success(&format!("System message: {text}"));
        }
    });

    manager.register_message_handler(MessageTag::Error, move |payload| {
        if let MessagePayload::Error(text) = payload {
            crate::log_error!(text = %text, "Server reported an error");
            notifier.report_error("Error", &text);
        }
    });
}

fn on_chat(message: &ChatMessagePayload, notifier: &dyn Notifier, users: &dyn UserStore) {
    match &message.body {
        ChatBody::Text(_) | ChatBody::Compound(_) => {
            crate::log_debug!(
                id = ?message.id,
                chat_id = message.chat_id,
                from = message.from,
                msg_type = ?message.msg_type(),
                "Chat message received"
            );
        }
        ChatBody::FriendRequest(request) => {
            crate::log_info!(from = message.from, accepted = request.is_accepted, "Friend request received");
            // our own outgoing requests are echoed back
            if users.current_user_id() == Some(message.from) {
                return;
            }
            if request.is_accepted {
                notifier.report_info(
                    "Friend request accepted",
                    &format!("User {} accepted your friend request", message.from),
                );
            } else {
                notifier.report_info(
                    "New friend request",
                    &format!("User {} wants to add you as a friend", message.from),
                );
            }
        }
    }
}
