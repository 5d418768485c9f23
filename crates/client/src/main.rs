//! Awachat Client - terminal entry point
//!
//! Connects to the chat server configured in the environment and sends every
//! line typed on stdin as a private text message.
//!
//! Commands: `/history` fetches the latest page of the chat, `/quit` exits.

use std::sync::Arc;

use anyhow::Context;
use awachat_client::{
    install_default_handlers, logging, ClientConfig, ConnectionManager, CredentialStore,
    Notifier, SessionUser, StaticCredentials, Storage, StoredCredentials, TracingNotifier,
    TungsteniteTransport, UserData,
};
use awachat_shared::{ChatHistoryRequest, ChatMessagePayload, ChatType, MessagePayload, MessageTag};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("awachat_client=info");

    let config = ClientConfig::from_env()?;
    let user_id = env_id("AWACHAT_USER_ID")?;
    let peer_id = env_id("AWACHAT_PEER_ID")?;
    let chat_id = env_id("AWACHAT_CHAT_ID")?.unwrap_or(0);

    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let session = Arc::new(SessionUser::new(user_id.map(|user_id| UserData {
        user_id,
        username: String::new(),
    })));

    let manager = ConnectionManager::new(
        config.manager.clone(),
        Arc::new(TungsteniteTransport::new()),
        credentials(),
        notifier.clone(),
    );
    install_default_handlers(&manager, notifier, session);
    manager.register_message_handler(MessageTag::RequestChatHistory, |payload| {
        if let MessagePayload::ChatHistory(history) = payload {
            for message in history.messages {
                println!("[{}] {} -> {}: {:?}", message.chat_id, message.from, message.to, message.body);
            }
        }
    });

    manager
        .init(&config.base_url)
        .await
        .context("failed to start chat connection")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/history" => {
                let request = ChatHistoryRequest {
                    chat_type: ChatType::Private,
                    chat_id,
                    last_message_id: None,
                };
                manager.request_chat_history(&request).await;
            }
            text => {
                let (Some(from), Some(to)) = (user_id, peer_id) else {
                    awachat_client::log_warn!(
                        "Set AWACHAT_USER_ID and AWACHAT_PEER_ID to send messages"
                    );
                    continue;
                };
                let message = ChatMessagePayload::text(ChatType::Private, chat_id, from, to, text);
                manager.send_chat_message(&message).await;
            }
        }
    }

    manager.disconnect().await;
    Ok(())
}

/// Token from the config directory, replaced by `AWACHAT_TOKEN` when set.
fn credentials() -> Arc<dyn CredentialStore> {
    let token = std::env::var("AWACHAT_TOKEN").ok();
    match Storage::default_location() {
        Some(storage) => {
            let stored = StoredCredentials::new(storage);
            if let Some(token) = token {
                if !stored.save_token(&token) {
                    awachat_client::log_warn!("Could not persist AWACHAT_TOKEN");
                }
            }
            Arc::new(stored)
        }
        None => Arc::new(token.map(StaticCredentials::new).unwrap_or_default()),
    }
}

fn env_id(key: &str) -> anyhow::Result<Option<i64>> {
    std::env::var(key)
        .ok()
        .map(|value| {
            value
                .trim()
                .parse()
                .with_context(|| format!("{key} must be an integer, got {value:?}"))
        })
        .transpose()
}
